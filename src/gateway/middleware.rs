//! Request-scoped logging: mints a request id, attaches a child `Logger` carrying it (readable
//! back out of request extensions by handlers that want to log under it), and reports the
//! outcome at `info!` once the response is ready. Consolidates the teacher's
//! `log_initializer`/`request_id`/`request_response_logger` trio into the single
//! `Transform`/`Service` shape actix-web 4 middleware takes; the teacher's own trio predates that
//! API and doesn't carry over directly.

use slog::Logger;

use actix_web::body::MessageBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Clone)]
pub struct RequestLogger {
    root: Logger,
}

impl RequestLogger {
    pub fn new(root: Logger) -> RequestLogger {
        RequestLogger { root }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service: Rc::new(service),
            root: self.root.clone(),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: Rc<S>,
    root: Logger,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_id = Uuid::new_v4().simple().to_string();
        let log = self.root.new(o!("request_id" => request_id));
        let method = req.method().to_string();
        let path = req.path().to_owned();
        let start = Instant::now();

        req.extensions_mut().insert(log.clone());

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let res = service.call(req).await?;
            info!(log, "Request finished";
                "method" => method,
                "path" => path,
                "status" => res.status().as_u16(),
                "elapsed_ms" => start.elapsed().as_millis() as u64);
            Ok(res)
        })
    }
}
