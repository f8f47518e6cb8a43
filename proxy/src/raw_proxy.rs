use crate::service::{ProxyBody, text_response};
use crate::table::Target;
use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const MAX_HEAD: usize = 64 * 1024;

/// Tunnels a protocol-upgrade request to the backend.
///
/// The original request head is replayed verbatim on a fresh TCP connection;
/// once the backend answers 101 the client connection is taken over and
/// bytes are copied in both directions until either side closes.
pub async fn serve<B>(
    mut req: Request<B>,
    target: &Target,
    dial_timeout: Duration,
) -> Response<ProxyBody> {
    let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
        return text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "connection does not support upgrades\n",
        );
    };

    let host = target.url.host_str().unwrap_or_default();
    let addr = match target.url.port_or_known_default() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut backend = match timeout(dial_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            tracing::warn!(%addr, error = %err, "Cannot dial upgrade backend");
            return text_response(StatusCode::BAD_GATEWAY, "cannot connect to backend\n");
        }
        Err(_) => {
            tracing::warn!(%addr, "Timed out dialing upgrade backend");
            return text_response(StatusCode::BAD_GATEWAY, "cannot connect to backend\n");
        }
    };
    let _ = backend.set_nodelay(true);

    if let Err(err) = backend.write_all(&request_head(&req)).await {
        tracing::warn!(%addr, error = %err, "Cannot replay request head");
        return text_response(StatusCode::BAD_GATEWAY, "cannot connect to backend\n");
    }

    let mut buf = BytesMut::with_capacity(8 * 1024);
    let (head_len, status, headers) = loop {
        match backend.read_buf(&mut buf).await {
            Ok(0) => {
                return text_response(StatusCode::BAD_GATEWAY, "backend closed during handshake\n");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%addr, error = %err, "Backend handshake read failed");
                return text_response(StatusCode::BAD_GATEWAY, "backend handshake failed\n");
            }
        }

        match parse_response_head(&buf) {
            Ok(Some(head)) => break head,
            Ok(None) if buf.len() > MAX_HEAD => {
                return text_response(StatusCode::BAD_GATEWAY, "backend handshake too large\n");
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%addr, error = %err, "Invalid backend handshake");
                return text_response(StatusCode::BAD_GATEWAY, "invalid backend handshake\n");
            }
        }
    };
    let leftover = Bytes::copy_from_slice(&buf[head_len..]);

    if status == StatusCode::SWITCHING_PROTOCOLS {
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let mut client = TokioIo::new(upgraded);
                    if !leftover.is_empty() && client.write_all(&leftover).await.is_err() {
                        return;
                    }
                    tunnel(client, backend).await;
                }
                Err(err) => tracing::warn!(error = %err, "Client upgrade failed"),
            }
        });

        let mut res = Response::new(Full::new(Bytes::new()).map_err(|e| match e {}).boxed());
        *res.status_mut() = status;
        *res.headers_mut() = headers;
        res
    } else {
        // handshake refused: relay the backend's full answer
        let mut body = leftover.to_vec();
        let _ = backend.read_to_end(&mut body).await;

        let mut res = Response::new(Full::new(Bytes::from(body)).map_err(|e| match e {}).boxed());
        *res.status_mut() = status;
        *res.headers_mut() = headers;
        res
    }
}

/// Serializes the request line and headers for replay on the backend leg.
fn request_head<B>(req: &Request<B>) -> Vec<u8> {
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut head = format!("{} {} HTTP/1.1\r\n", req.method(), path).into_bytes();
    for (name, value) in req.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

type Head = (usize, StatusCode, HeaderMap);

/// Parses a response head from `buf`, returning None while incomplete.
fn parse_response_head(buf: &[u8]) -> Result<Option<Head>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(buf)? {
        httparse::Status::Partial => Ok(None),
        httparse::Status::Complete(head_len) => {
            let status = res
                .code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or(httparse::Error::Status)?;

            let mut map = HeaderMap::new();
            for h in res.headers.iter() {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(h.name.as_bytes()),
                    HeaderValue::from_bytes(h.value),
                ) {
                    map.append(name, value);
                }
            }

            Ok(Some((head_len, status, map)))
        }
    }
}

/// Copies bytes between the upgraded client connection and the backend.
/// The first direction to finish tears down both.
async fn tunnel(client: TokioIo<Upgraded>, backend: TcpStream) {
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = backend.into_split();

    tokio::select! {
        _ = tokio::io::copy(&mut client_read, &mut backend_write) => {}
        _ = tokio::io::copy(&mut backend_read, &mut client_write) => {}
    }
}
