//! A thin abstraction over outbound HTTP so that Executor mediators can be tested against a
//! canned response instead of a live Gateway. The trait/factory split is kept from the
//! teacher's `http_requester.rs`; the live implementation is now a blocking `reqwest` client
//! instead of a hand-rolled `hyper` + `tokio_core` event loop.

use errors::*;

use reqwest::blocking::Client;
use serde_json::Value;
use slog::Logger;
use std::time::Duration;

pub trait HttpRequesterFactory: Send {
    fn clone_box(&self) -> Box<dyn HttpRequesterFactory>;
    fn create(&self) -> Box<dyn HttpRequester>;
}

#[derive(Clone, Debug)]
pub struct HttpRequesterFactoryLive {}

impl HttpRequesterFactory for HttpRequesterFactoryLive {
    fn clone_box(&self) -> Box<dyn HttpRequesterFactory> {
        Box::new(Self {})
    }

    fn create(&self) -> Box<dyn HttpRequester> {
        Box::new(HttpRequesterLive {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
        })
    }
}

pub trait HttpRequester: Send {
    /// POSTs a JSON body to `url` with the given bearer token and returns the parsed JSON
    /// response body.
    fn post_json(&mut self, log: &Logger, url: &str, token: &str, body: &Value) -> Result<Value>;
}

pub struct HttpRequesterLive {
    client: Client,
}

impl HttpRequester for HttpRequesterLive {
    fn post_json(&mut self, log: &Logger, url: &str, token: &str, body: &Value) -> Result<Value> {
        debug!(log, "Executing HTTP request"; "url" => url);

        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .chain_err(|| format!("error sending request to {}", url))?;

        resp.json::<Value>()
            .chain_err(|| format!("error parsing response body from {}", url))
    }
}

/// A canned-response double for tests: ignores the request entirely and returns a fixed value.
#[derive(Clone)]
pub struct HttpRequesterFactoryPassThrough {
    pub response: Value,
}

impl HttpRequesterFactory for HttpRequesterFactoryPassThrough {
    fn clone_box(&self) -> Box<dyn HttpRequesterFactory> {
        Box::new(self.clone())
    }

    fn create(&self) -> Box<dyn HttpRequester> {
        Box::new(HttpRequesterPassThrough {
            response: self.response.clone(),
        })
    }
}

pub struct HttpRequesterPassThrough {
    pub response: Value,
}

impl HttpRequester for HttpRequesterPassThrough {
    fn post_json(&mut self, _log: &Logger, _url: &str, _token: &str, _body: &Value) -> Result<Value> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use http_requester::*;
    use serde_json::json;
    use test_helpers;

    #[test]
    fn test_pass_through() {
        let log = test_helpers::log();
        let factory = HttpRequesterFactoryPassThrough {
            response: json!({"status": "Done"}),
        };
        let mut requester = factory.create();
        let resp = requester
            .post_json(&log, "http://example.invalid/attstatus", "token", &json!({}))
            .unwrap();
        assert_eq!(json!({"status": "Done"}), resp);
    }
}
