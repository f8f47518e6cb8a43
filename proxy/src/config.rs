use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub listen: Vec<Listen>,
    /// Optional dedicated listener for /health and /ready.
    #[serde(default)]
    pub admin: Option<Listener>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_no_route_status")]
    pub no_route_status: u16,
    /// Grace period between the shutdown gate closing and listener teardown.
    #[serde(default)]
    pub shutdown_wait_secs: u64,
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    /// 0 disables the outbound response-header deadline.
    #[serde(default)]
    pub response_header_timeout_secs: u64,
    /// Idle time before pooled backend connections are dropped; 0 keeps the
    /// pool default.
    #[serde(default)]
    pub keepalive_timeout_secs: u64,
    /// Streaming cadence for event-stream responses; must be > 0 to stream.
    #[serde(default)]
    pub flush_interval_secs: u64,
    #[serde(default = "default_max_conn")]
    pub max_conn: usize,
    /// Time allowed for a client to send its request head; 0 disables.
    #[serde(default)]
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub client_ip_header: Option<String>,
    #[serde(default)]
    pub tls_header: Option<String>,
    #[serde(default)]
    pub tls_header_value: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listen {
    pub addr: String,
    #[serde(default)]
    pub scheme: ListenScheme,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ListenScheme {
    #[default]
    Http,
    Https,
}

/// How a target is picked when several instances serve the same prefix.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Cycle through the targets of a route.
    #[default]
    Rr,
    Random,
}

fn default_no_route_status() -> u16 {
    404
}

fn default_dial_timeout() -> u64 {
    30
}

fn default_max_conn() -> usize {
    10000
}
