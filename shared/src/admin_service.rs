use crate::http::make_boxed_error_response;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Operational endpoints served on a dedicated admin listener.
///
/// `/health` always answers ok, `/ready` consults the readiness probe so a
/// deployment can hold traffic until the first routing table is live, and
/// `/routes` renders the routing document currently in effect.
pub struct AdminService<F, R, E> {
    is_ready: F,
    routes: R,
    _error: PhantomData<E>,
}

impl<F, R, E> AdminService<F, R, E>
where
    F: Fn() -> bool,
    R: Fn() -> String,
{
    pub fn new(is_ready: F, routes: R) -> Self {
        Self {
            is_ready,
            routes,
            _error: PhantomData,
        }
    }
}

impl<F, R, E, B> Service<Request<B>> for AdminService<F, R, E>
where
    F: Fn() -> bool + Clone + Send + 'static,
    R: Fn() -> String + Clone + Send + 'static,
    E: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let is_ready = (self.is_ready)();
        let routes = (self.routes)();

        Box::pin(async move {
            let ok_body = || Full::new(Bytes::from("ok\n")).boxed();

            let res = match req.uri().path() {
                "/health" => Response::new(ok_body()),
                "/ready" => match is_ready {
                    true => Response::new(ok_body()),
                    false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
                },
                "/routes" => Response::builder()
                    .header("content-type", "text/plain; charset=utf-8")
                    .body(Full::new(Bytes::from(routes)).boxed())
                    .unwrap_or_else(|_| Response::new(ok_body())),
                _ => make_boxed_error_response(StatusCode::NOT_FOUND),
            };
            Ok(res)
        })
    }
}
