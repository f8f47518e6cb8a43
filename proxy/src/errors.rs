use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid route line: {0}")]
    InvalidRouteLine(String),

    #[error("invalid target URL in route line: {0}")]
    InvalidTargetUrl(String),

    #[error("invalid header name or value")]
    InvalidHeader,

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("listener {0} is https but has no cert_path/key_path")]
    MissingTlsConfig(String),
}
