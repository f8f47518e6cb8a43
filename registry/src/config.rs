use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub consul: ConsulConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ConsulConfig {
    /// Base URL of the local consul agent, e.g. `http://127.0.0.1:8500`.
    pub addr: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
    /// Health statuses that qualify an instance for routing.
    #[serde(default = "default_service_status")]
    pub service_status: Vec<String>,
}

fn default_tag_prefix() -> String {
    "urlprefix-".to_string()
}

fn default_service_status() -> Vec<String> {
    vec!["passing".to_string()]
}
