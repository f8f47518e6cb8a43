#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("consul returned status {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    #[error("local datacenter {0} not in catalog datacenter list")]
    UnknownDatacenter(String),
}
