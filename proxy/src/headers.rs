use crate::config::Config;
use crate::errors::ProxyError;
use http::header::{HeaderName, HeaderValue};
use hyper::Request;
use std::net::SocketAddr;
use std::str::FromStr;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Injects the forwarding headers the operator configured.
///
/// X-Forwarded-For is appended to, the client-IP header replaces any inbound
/// value, and the TLS header is only set for requests that arrived on a TLS
/// listener.
pub fn add_headers<B>(
    req: &mut Request<B>,
    peer: SocketAddr,
    tls: bool,
    config: &Config,
) -> Result<(), ProxyError> {
    let ip = peer.ip().to_string();

    let forwarded_for = match req.headers().get(&X_FORWARDED_FOR) {
        Some(existing) => {
            let existing = existing.to_str().map_err(|_| ProxyError::InvalidHeader)?;
            format!("{}, {}", existing, ip)
        }
        None => ip.clone(),
    };
    req.headers_mut().insert(
        X_FORWARDED_FOR,
        HeaderValue::from_str(&forwarded_for).map_err(|_| ProxyError::InvalidHeader)?,
    );

    if let Some(name) = &config.client_ip_header {
        req.headers_mut().insert(
            HeaderName::from_str(name).map_err(|_| ProxyError::InvalidHeader)?,
            HeaderValue::from_str(&ip).map_err(|_| ProxyError::InvalidHeader)?,
        );
    }

    if tls && let Some(name) = &config.tls_header {
        let value = config.tls_header_value.as_deref().unwrap_or("");
        req.headers_mut().insert(
            HeaderName::from_str(name).map_err(|_| ProxyError::InvalidHeader)?,
            HeaderValue::from_str(value).map_err(|_| ProxyError::InvalidHeader)?,
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config() -> Config {
        serde_yaml::from_str::<Config>("listen: [{addr: '0.0.0.0:9999'}]").unwrap()
    }

    fn peer() -> SocketAddr {
        "10.1.2.3:55555".parse().unwrap()
    }

    fn request() -> Request<()> {
        Request::builder().uri("/").body(()).unwrap()
    }

    #[test]
    fn forwarded_for_created_when_absent() {
        let mut req = request();
        add_headers(&mut req, peer(), false, &config()).unwrap();
        assert_eq!(req.headers().get("x-forwarded-for").unwrap(), "10.1.2.3");
    }

    #[test]
    fn forwarded_for_appends_to_existing() {
        let mut req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "192.168.0.9")
            .body(())
            .unwrap();
        add_headers(&mut req, peer(), false, &config()).unwrap();
        assert_eq!(
            req.headers().get("x-forwarded-for").unwrap(),
            "192.168.0.9, 10.1.2.3"
        );
    }

    #[test]
    fn client_ip_header_replaces_inbound_value() {
        let mut cfg = config();
        cfg.client_ip_header = Some("X-Client-IP".to_string());

        let mut req = Request::builder()
            .uri("/")
            .header("x-client-ip", "1.1.1.1")
            .body(())
            .unwrap();
        add_headers(&mut req, peer(), false, &cfg).unwrap();
        assert_eq!(req.headers().get("x-client-ip").unwrap(), "10.1.2.3");
    }

    #[test]
    fn tls_header_only_on_tls_listeners() {
        let mut cfg = config();
        cfg.tls_header = Some("X-Forwarded-Proto".to_string());
        cfg.tls_header_value = Some("https".to_string());

        let mut req = request();
        add_headers(&mut req, peer(), false, &cfg).unwrap();
        assert!(req.headers().get("x-forwarded-proto").is_none());

        let mut req = request();
        add_headers(&mut req, peer(), true, &cfg).unwrap();
        assert_eq!(req.headers().get("x-forwarded-proto").unwrap(), "https");
    }

    #[test]
    fn unparsable_forwarded_for_is_an_error() {
        let mut req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", HeaderValue::from_bytes(b"\xff").unwrap())
            .body(())
            .unwrap();
        assert!(add_headers(&mut req, peer(), false, &config()).is_err());
    }
}
