//! Credential checks for the two kinds of caller the Gateway sees. Mirrors `validar_credenciais`:
//! the last whitespace-separated token in `Authorization` is compared against the expected
//! value, tolerant of whatever scheme prefix ("Bearer", "Token", or none at all) the caller sent.
//!
//! `/advworkid` is the one endpoint that does not use this at all -- its credential travels as a
//! JSON body field instead, checked directly by its handler.

use errors::*;

use actix_web::HttpRequest;
use actix_web::http::header::AUTHORIZATION;

pub fn require_bearer(req: &HttpRequest, expected: &str) -> Result<()> {
    let header_value = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::from(ErrorKind::Unauthorized))?;

    let token = header_value
        .split_whitespace()
        .last()
        .ok_or_else(|| Error::from(ErrorKind::Unauthorized))?;

    if token == expected {
        Ok(())
    } else {
        Err(Error::from(ErrorKind::Unauthorized))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;
    use actix_web::http::header::AUTHORIZATION;
    use gateway::auth::require_bearer;

    #[test]
    fn test_missing_header_rejected() {
        let req = TestRequest::default().to_http_request();
        assert!(require_bearer(&req, "secret").is_err());
    }

    #[test]
    fn test_wrong_token_rejected() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer wrong"))
            .to_http_request();
        assert!(require_bearer(&req, "secret").is_err());
    }

    #[test]
    fn test_correct_token_accepted() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer secret"))
            .to_http_request();
        assert!(require_bearer(&req, "secret").is_ok());
    }

    #[test]
    fn test_bare_token_without_scheme_accepted() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "secret"))
            .to_http_request();
        assert!(require_bearer(&req, "secret").is_ok());
    }
}
