use crate::config::Config;
use crate::service::{ProxyBody, text_response};
use crate::table::Target;
use http::{StatusCode, Uri, Version};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shared::http::prepare_for_next_hop;
use std::error::Error as StdError;
use std::time::Duration;
use tokio::time::timeout;

/// Builds the pooled backend transport from the configured limits.
pub fn build_client<B>(config: &Config) -> Client<HttpConnector, B>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    connector.set_connect_timeout(Some(Duration::from_secs(config.dial_timeout_secs)));

    let mut builder = Client::builder(TokioExecutor::new());
    if config.keepalive_timeout_secs > 0 {
        builder.pool_idle_timeout(Duration::from_secs(config.keepalive_timeout_secs));
    }
    builder.pool_max_idle_per_host(config.max_conn);
    builder.build(connector)
}

/// Forwards one request over the shared transport.
///
/// With `flush_interval` zero the response body is collected before the
/// reply is sent; a non-zero interval streams every backend frame through
/// as it arrives, which keeps event streams flowing.
pub async fn serve<B>(
    client: &Client<HttpConnector, B>,
    mut req: Request<B>,
    target: &Target,
    flush_interval: Duration,
    response_header_timeout: Duration,
) -> Response<ProxyBody>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let version = req.version();

    let host = target.url.host_str().unwrap_or_default();
    let authority = match target.url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri: Uri = match format!("{}://{}{}", target.url.scheme(), authority, path_and_query).parse()
    {
        Ok(uri) => uri,
        Err(err) => {
            tracing::error!(error = %err, target = %target.url, "Cannot build backend URI");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid backend target\n");
        }
    };

    *req.uri_mut() = uri;
    *req.version_mut() = Version::HTTP_11;
    prepare_for_next_hop(req.headers_mut(), version);

    let outbound = client.request(req);
    let result = if response_header_timeout > Duration::ZERO {
        match timeout(response_header_timeout, outbound).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(target = %target.url, "Backend response headers timed out");
                return text_response(StatusCode::GATEWAY_TIMEOUT, "backend timed out\n");
            }
        }
    } else {
        outbound.await
    };

    let upstream = match result {
        Ok(res) => res,
        Err(err) => {
            tracing::warn!(target = %target.url, error = %err, "Backend request failed");
            return text_response(StatusCode::BAD_GATEWAY, "bad gateway\n");
        }
    };

    let (mut parts, body) = upstream.into_parts();
    prepare_for_next_hop(&mut parts.headers, version);

    if flush_interval > Duration::ZERO {
        return Response::from_parts(parts, body.boxed());
    }

    match body.collect().await {
        Ok(collected) => Response::from_parts(
            parts,
            Full::new(collected.to_bytes())
                .map_err(|e| match e {})
                .boxed(),
        ),
        Err(err) => {
            tracing::warn!(target = %target.url, error = %err, "Backend body read failed");
            text_response(StatusCode::BAD_GATEWAY, "bad gateway\n")
        }
    }
}
