// Per-hop header hygiene. The HTTP handler runs this on requests before
// they reach a backend and on responses before they return to the client.

use bytes::Bytes;
use http::Version;
use http::header::{
    CONNECTION, HeaderMap, HeaderName, HeaderValue, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE,
    TRAILER, TRANSFER_ENCODING, UPGRADE, VIA,
};
use http::{Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;

const VIA_PSEUDONYM: &str = "wayfinder";

// Connection-scoped per RFC 9110 §7.6.1; never forwarded across a hop.
static CONNECTION_SCOPED: &[HeaderName] = &[
    CONNECTION,
    TRANSFER_ENCODING,
    TE,
    TRAILER,
    UPGRADE,
    PROXY_AUTHORIZATION,
    PROXY_AUTHENTICATE,
];

/// Prepares a header map for the next hop.
///
/// `version` is the version the message arrived with. HTTP/1.x messages
/// lose their connection-scoped headers, including any extra names listed
/// in `Connection`; HTTP/2+ frames carry none, so only the Via entry is
/// added there.
pub fn prepare_for_next_hop(headers: &mut HeaderMap, version: Version) {
    strip_connection_headers(headers, version);
    append_via(headers, version);
}

fn strip_connection_headers(headers: &mut HeaderMap, version: Version) {
    if !matches!(
        version,
        Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11
    ) {
        return;
    }

    let mut drop_list: Vec<HeaderName> = CONNECTION_SCOPED.to_vec();

    if let Some(tokens) = headers.get(CONNECTION).and_then(|v| v.to_str().ok()) {
        drop_list.extend(
            tokens
                .split(',')
                .filter_map(|token| HeaderName::try_from(token.trim()).ok()),
        );
    }

    // keep-alive predates HTTP/1.1 and is connection-scoped there
    if matches!(version, Version::HTTP_09 | Version::HTTP_10) {
        drop_list.push(HeaderName::from_static("keep-alive"));
    }

    for name in drop_list {
        headers.remove(name);
    }
}

fn append_via(headers: &mut HeaderMap, version: Version) {
    let protocol = match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => {
            tracing::warn!(?version, "Not recording Via for unknown HTTP version");
            return;
        }
    };

    let entry = format!("{} {}", protocol, VIA_PSEUDONYM);
    let value = match headers.get(VIA).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, entry),
        None => entry,
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(VIA, value);
    }
}

/// Builds a plain-text response carrying the canonical reason for `status`.
pub fn make_boxed_error_response(status: StatusCode) -> Response<BoxBody<Bytes, Infallible>> {
    let body = status.canonical_reason().unwrap_or("error");
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(format!("{}\n", body))).boxed())
        .unwrap_or_else(|_| {
            let mut res = Response::new(Full::new(Bytes::new()).boxed());
            *res.status_mut() = status;
            res
        })
}
