use crate::config::ConsulConfig;
use crate::errors::RegistryError;
use serde::Deserialize;

const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";
const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

/// One health observation from the consul health endpoint.
///
/// Node-level checks (serfHealth) carry empty service fields; they group
/// under the empty service name and never produce routes.
#[derive(Clone, Debug, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "Node", default)]
    pub node: String,
    #[serde(rename = "ServiceName", default)]
    pub service_name: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

/// One registered backend instance from the catalog, scoped to the
/// datacenter it was fetched from.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceInstance {
    #[serde(rename = "Address", default)]
    pub node_address: String,
    #[serde(rename = "ServiceName", default)]
    pub service_name: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(rename = "ServiceAddress", default)]
    pub service_address: String,
    #[serde(rename = "ServicePort", default)]
    pub service_port: u16,
    #[serde(rename = "ServiceTags", default)]
    pub service_tags: Vec<String>,
}

#[derive(Deserialize)]
struct AgentSelf {
    #[serde(rename = "Config")]
    config: AgentConfig,
}

#[derive(Deserialize)]
struct AgentConfig {
    #[serde(rename = "Datacenter", default)]
    datacenter: String,
}

/// Thin client for the consul HTTP API.
///
/// Health reads are consistent reads; passing a wait index turns the call
/// into a blocking query that suspends server-side until the index advances
/// or the server timeout fires.
#[derive(Clone)]
pub struct ConsulClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ConsulClient {
    pub fn new(config: &ConsulConfig) -> Result<Self, RegistryError> {
        // No request timeout: blocking queries are held open by the server
        // for up to its default wait time.
        let client = reqwest::Client::builder().build()?;

        Ok(ConsulClient {
            client,
            base_url: config.addr.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Reads the aggregate health state of `dc`.
    ///
    /// With `wait_index` set this is a blocking query against that index.
    /// Returns the checks and the index reported by the server.
    pub async fn health_state(
        &self,
        dc: &str,
        wait_index: Option<u64>,
    ) -> Result<(Vec<HealthCheck>, u64), RegistryError> {
        let mut req = self
            .client
            .get(format!("{}/v1/health/state/any", self.base_url))
            .query(&[("dc", dc), ("consistent", "")]);
        if let Some(index) = wait_index {
            req = req.query(&[("index", index.to_string())]);
        }

        let res = self.send(req).await?;
        let index = res
            .headers()
            .get(CONSUL_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let checks = res.json().await?;

        Ok((checks, index))
    }

    /// Lists all datacenters known to the catalog.
    pub async fn datacenters(&self) -> Result<Vec<String>, RegistryError> {
        let req = self
            .client
            .get(format!("{}/v1/catalog/datacenters", self.base_url));
        Ok(self.send(req).await?.json().await?)
    }

    /// Fetches all instances of `service` registered in `dc`, consistently.
    pub async fn catalog_service(
        &self,
        service: &str,
        dc: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        let req = self
            .client
            .get(format!("{}/v1/catalog/service/{}", self.base_url, service))
            .query(&[("dc", dc), ("consistent", "")]);
        Ok(self.send(req).await?.json().await?)
    }

    /// Returns the datacenter of the agent this client is connected to.
    pub async fn agent_datacenter(&self) -> Result<String, RegistryError> {
        let req = self.client.get(format!("{}/v1/agent/self", self.base_url));
        let agent: AgentSelf = self.send(req).await?.json().await?;
        Ok(agent.config.datacenter)
    }

    async fn send(&self, mut req: reqwest::RequestBuilder) -> Result<reqwest::Response, RegistryError> {
        if let Some(token) = &self.token {
            req = req.header(CONSUL_TOKEN_HEADER, token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(RegistryError::UnexpectedStatus(res.status()));
        }
        Ok(res)
    }
}
