pub mod catalog;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod tags;
pub mod watcher;

#[cfg(test)]
mod testutils;

use client::ConsulClient;
use errors::RegistryError;
use tokio::sync::mpsc;

/// Connects to the discovery backend and spawns the service watcher.
///
/// Returns the channel on which routing documents arrive. One document is
/// sent per observed health change; the consumer must drain promptly or the
/// watcher blocks on stale state.
pub async fn start(config: config::Config) -> Result<mpsc::Receiver<String>, RegistryError> {
    let consul = config.consul;
    let client = ConsulClient::new(&consul)?;

    let local_dc = client.agent_datacenter().await?;
    let datacenters = client.datacenters().await?;
    let dc_index = datacenters
        .iter()
        .position(|dc| dc == &local_dc)
        .ok_or_else(|| RegistryError::UnknownDatacenter(local_dc.clone()))?;

    tracing::info!(datacenter = %local_dc, ?datacenters, "Connected to consul");

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(watcher::watch_services(
        client,
        consul.tag_prefix,
        consul.service_status,
        tx,
        dc_index,
        datacenters,
    ));

    Ok(rx)
}
