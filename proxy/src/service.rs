use crate::config::Config;
use crate::headers::add_headers;
use crate::http_proxy;
use crate::metrics_defs::{REQUESTS_DURATION, REQUESTS_NOROUTE, TARGET_DURATION};
use crate::raw_proxy;
use crate::shutdown::ShutdownGate;
use crate::table::RoutingTable;
use bytes::Bytes;
use http::header::{ACCEPT, HOST, UPGRADE};
use http::{HeaderMap, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body;
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub(crate) fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<ProxyBody> {
    let mut res = Response::new(Full::new(body.into()).map_err(|e| match e {}).boxed());
    *res.status_mut() = status;
    res
}

pub(crate) fn empty_response(status: StatusCode) -> Response<ProxyBody> {
    let mut res = Response::new(Empty::<Bytes>::new().map_err(|e| match e {}).boxed());
    *res.status_mut() = status;
    res
}

/// State shared by every connection: the immutable options, the live
/// routing table, the pooled backend transport, and the shutdown gate.
pub struct ProxyShared<B> {
    pub config: Config,
    pub table: RoutingTable,
    pub client: Client<HttpConnector, B>,
    pub shutdown: ShutdownGate,
}

impl<B> ProxyShared<B>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    pub fn new(config: Config, shutdown: ShutdownGate) -> Self {
        let client = http_proxy::build_client(&config);
        Self {
            config,
            table: RoutingTable::new(),
            client,
            shutdown,
        }
    }
}

/// Per-connection request dispatcher.
///
/// Carries the peer address for header injection and whether the connection
/// arrived on a TLS listener.
pub struct RequestDispatcher<B> {
    pub shared: Arc<ProxyShared<B>>,
    pub peer: SocketAddr,
    pub tls: bool,
}

impl<B> Service<Request<B>> for RequestDispatcher<B>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = Response<ProxyBody>;
    type Error = hyper::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, mut req: Request<B>) -> Self::Future {
        let shared = self.shared.clone();
        let peer = self.peer;
        let tls = self.tls;

        Box::pin(async move {
            if shared.shutdown.is_shutting_down() {
                return Ok(text_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "shutting down\n",
                ));
            }

            let host = req
                .headers()
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .or_else(|| req.uri().host())
                .unwrap_or("");
            let Some(target) =
                shared
                    .table
                    .lookup(host, req.uri().path(), shared.config.strategy)
            else {
                metrics::counter!(REQUESTS_NOROUTE.name).increment(1);
                let status = StatusCode::from_u16(shared.config.no_route_status)
                    .unwrap_or(StatusCode::NOT_FOUND);
                return Ok(empty_response(status));
            };

            if let Err(err) = add_headers(&mut req, peer, tls, &shared.config) {
                return Ok(text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("cannot parse {}: {}\n", peer, err),
                ));
            }

            let start = Instant::now();
            let response = if wants_websocket(req.headers()) {
                raw_proxy::serve(
                    req,
                    &target,
                    Duration::from_secs(shared.config.dial_timeout_secs),
                )
                .await
            } else {
                // the flush interval only applies to event streams
                let flush = if accepts_event_stream(req.headers()) {
                    Duration::from_secs(shared.config.flush_interval_secs)
                } else {
                    Duration::ZERO
                };
                http_proxy::serve(
                    &shared.client,
                    req,
                    &target,
                    flush,
                    Duration::from_secs(shared.config.response_header_timeout_secs),
                )
                .await
            };

            let elapsed = start.elapsed().as_secs_f64();
            metrics::histogram!(REQUESTS_DURATION.name).record(elapsed);
            metrics::histogram!(TARGET_DURATION.name, "service" => target.service.clone())
                .record(elapsed);

            Ok(response)
        })
    }
}

fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "text/event-stream")
}
