use crate::client::ConsulClient;
use crate::tags::parse_url_prefix_tag;
use crate::watcher::PassingServices;
use std::collections::{HashMap, HashSet};

/// Formats the canonical textual form of one routing rule.
pub fn format_route_line(
    service: &str,
    host: &str,
    path: &str,
    addr: &str,
    port: u16,
    tags: &[String],
) -> String {
    format!(
        "route add {} {}{} http://{}:{}/ tags {:?}",
        service,
        host,
        path,
        addr,
        port,
        tags.join(",")
    )
}

/// Builds the routing document for every service with passing instances.
///
/// Lines are deduplicated and sorted in reverse lexicographic order so that
/// more specific host/path prefixes of a service sort above less specific
/// ones.
pub async fn services_config(
    client: &ConsulClient,
    passing: PassingServices,
    tag_prefix: &str,
) -> String {
    let mut config = Vec::new();
    for (name, instances) in &passing {
        config.extend(service_config(client, name, instances, tag_prefix).await);
    }

    config.sort();
    config.dedup();
    config.reverse();
    config.join("\n")
}

/// Constructs the route lines for all passing instances of one service,
/// walking every datacenter in the catalog.
async fn service_config(
    client: &ConsulClient,
    name: &str,
    passing: &HashSet<String>,
    tag_prefix: &str,
) -> Vec<String> {
    if name.is_empty() || passing.is_empty() {
        return Vec::new();
    }

    let datacenters = match client.datacenters().await {
        Ok(dcs) => dcs,
        Err(err) => {
            tracing::warn!(error = %err, "Error getting datacenters");
            return Vec::new();
        }
    };

    let mut config = Vec::new();
    for dc in datacenters {
        let instances = match client.catalog_service(name, &dc).await {
            Ok(instances) => instances,
            Err(err) => {
                tracing::warn!(service = name, datacenter = %dc, error = %err,
                    "Error getting catalog service");
                // no partial state for this service this round
                return Vec::new();
            }
        };

        let env = HashMap::from([("DC".to_string(), dc.clone())]);

        for svc in instances {
            if !passing.contains(&svc.service_id) {
                continue;
            }

            for tag in &svc.service_tags {
                let Some((host, path)) = parse_url_prefix_tag(tag, tag_prefix, &env) else {
                    continue;
                };

                // use the consul node address if the service address is not set
                let mut addr = if svc.service_address.is_empty() {
                    svc.node_address.clone()
                } else {
                    svc.service_address.clone()
                };

                // add .local suffix on macOS for simple host names w/o domain
                if cfg!(target_os = "macos") && !addr.contains('.') && !addr.ends_with(".local") {
                    addr.push_str(".local");
                }

                config.push(format_route_line(
                    &svc.service_name,
                    &host,
                    &path,
                    &addr,
                    svc.service_port,
                    &svc.service_tags,
                ));
            }
        }
    }

    config
}
