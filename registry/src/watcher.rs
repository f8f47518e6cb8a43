use crate::catalog::services_config;
use crate::client::{ConsulClient, HealthCheck};
use crate::metrics_defs::{HEALTH_INDEX, ROUTES_PUBLISHED, WATCH_PUBLISH};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Instances whose health checks all pass, keyed by service name.
pub type PassingServices = HashMap<String, HashSet<String>>;

const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Monitors consul health state and sends a fresh routing document on every
/// change.
///
/// Only the local datacenter's blocking query drives the loop; the other
/// datacenters are read non-blockingly once the local index advances. The
/// loop runs until the receiving side of `config` is dropped.
pub async fn watch_services(
    client: ConsulClient,
    tag_prefix: String,
    status: Vec<String>,
    config: mpsc::Sender<String>,
    dc_index: usize,
    datacenters: Vec<String>,
) {
    let mut last_index = 0u64;

    loop {
        let (mut all_checks, index) = match client
            .health_state(&datacenters[dc_index], Some(last_index))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "Error fetching health state");
                sleep(RETRY_PAUSE).await;
                continue;
            }
        };

        tracing::debug!(index, "Health changed");
        last_index = index;
        metrics::gauge!(HEALTH_INDEX.name).set(index as f64);

        for (i, dc) in datacenters.iter().enumerate() {
            if i == dc_index {
                continue;
            }

            match client.health_state(dc, None).await {
                Ok((mut checks, _)) => all_checks.append(&mut checks),
                Err(err) => {
                    tracing::warn!(datacenter = %dc, error = %err, "Error fetching health state");
                    sleep(RETRY_PAUSE).await;
                    continue;
                }
            }
        }

        let passing = passing_services(&all_checks, &status);
        let doc = services_config(&client, passing, &tag_prefix).await;

        metrics::counter!(WATCH_PUBLISH.name).increment(1);
        metrics::gauge!(ROUTES_PUBLISHED.name).set(doc.lines().count() as f64);

        if config.send(doc).await.is_err() {
            // consumer is gone, nothing left to publish to
            return;
        }
    }
}

/// Folds health records into the instances every check of which has a
/// status in the allow-list. One non-allowed check excludes the instance.
pub fn passing_services(checks: &[HealthCheck], allowed: &[String]) -> PassingServices {
    let mut instance_ok: HashMap<(&str, &str), bool> = HashMap::new();
    for check in checks {
        let key = (check.service_name.as_str(), check.service_id.as_str());
        let passed = allowed.iter().any(|s| s == &check.status);
        instance_ok
            .entry(key)
            .and_modify(|ok| *ok &= passed)
            .or_insert(passed);
    }

    let mut passing = PassingServices::new();
    for ((name, id), ok) in instance_ok {
        if ok {
            passing
                .entry(name.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }
    passing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsulConfig;
    use crate::testutils::ConsulStub;

    fn check(service: &str, id: &str, status: &str) -> HealthCheck {
        HealthCheck {
            node: "n1".to_string(),
            service_name: service.to_string(),
            service_id: id.to_string(),
            status: status.to_string(),
        }
    }

    fn allow(statuses: &[&str]) -> Vec<String> {
        statuses.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_checks_must_pass() {
        let checks = vec![
            check("s", "i1", "passing"),
            check("s", "i1", "passing"),
            check("s", "i2", "passing"),
            check("s", "i2", "warning"),
        ];

        let passing = passing_services(&checks, &allow(&["passing"]));
        let instances = passing.get("s").unwrap();
        assert!(instances.contains("i1"));
        assert!(!instances.contains("i2"));
    }

    #[test]
    fn allow_list_extends_qualifying_statuses() {
        let checks = vec![
            check("s", "i1", "passing"),
            check("s", "i2", "warning"),
        ];

        let passing = passing_services(&checks, &allow(&["passing", "warning"]));
        let instances = passing.get("s").unwrap();
        assert!(instances.contains("i1"));
        assert!(instances.contains("i2"));
    }

    #[test]
    fn fully_failing_service_is_absent() {
        let checks = vec![check("s", "i1", "critical")];
        let passing = passing_services(&checks, &allow(&["passing"]));
        assert!(passing.get("s").is_none());
    }

    #[test]
    fn node_level_checks_group_under_empty_name() {
        let checks = vec![check("", "", "passing"), check("s", "i1", "passing")];
        let passing = passing_services(&checks, &allow(&["passing"]));
        // the empty service name never reaches the catalog reader
        assert!(passing.contains_key(""));
        assert!(passing.contains_key("s"));
    }

    #[tokio::test]
    async fn watcher_publishes_document_on_health_change() {
        let stub = ConsulStub::builder()
            .route(
                "/v1/health/state/any",
                r#"[{"Node":"n1","ServiceName":"web","ServiceID":"web-1","Status":"passing"}]"#,
            )
            .route("/v1/catalog/datacenters", r#"["dc1"]"#)
            .route(
                "/v1/catalog/service/web",
                r#"[{"Address":"10.0.0.1","ServiceName":"web","ServiceID":"web-1",
                     "ServiceAddress":"10.0.0.1","ServicePort":8080,
                     "ServiceTags":["urlprefix-/"]}]"#,
            )
            .index(7)
            .spawn()
            .await;

        let client = ConsulClient::new(&ConsulConfig {
            addr: stub.base_url(),
            token: None,
            tag_prefix: "urlprefix-".to_string(),
            service_status: vec!["passing".to_string()],
        })
        .unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(watch_services(
            client,
            "urlprefix-".to_string(),
            vec!["passing".to_string()],
            tx,
            0,
            vec!["dc1".to_string()],
        ));

        let doc = rx.recv().await.expect("routing document");
        assert_eq!(doc, r#"route add web / http://10.0.0.1:8080/ tags "urlprefix-/""#);

        // dropping the receiver stops the watcher
        drop(rx);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn failed_health_reads_retry_without_advancing_the_index() {
        let stub = ConsulStub::builder()
            .route(
                "/v1/health/state/any",
                r#"[{"Node":"n1","ServiceName":"web","ServiceID":"web-1","Status":"passing"}]"#,
            )
            .route("/v1/catalog/datacenters", r#"["dc1"]"#)
            .route(
                "/v1/catalog/service/web",
                r#"[{"Address":"10.0.0.1","ServiceName":"web","ServiceID":"web-1",
                     "ServiceAddress":"10.0.0.1","ServicePort":8080,
                     "ServiceTags":["urlprefix-/"]}]"#,
            )
            .index(7)
            .fail_first("/v1/health/state/any", 3)
            .spawn()
            .await;

        let client = ConsulClient::new(&ConsulConfig {
            addr: stub.base_url(),
            token: None,
            tag_prefix: "urlprefix-".to_string(),
            service_status: vec!["passing".to_string()],
        })
        .unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(watch_services(
            client,
            "urlprefix-".to_string(),
            vec!["passing".to_string()],
            tx,
            0,
            vec!["dc1".to_string()],
        ));

        // nothing is published while the health reads fail; the fourth
        // attempt succeeds and produces the document
        let doc = rx.recv().await.expect("routing document");
        assert_eq!(doc, r#"route add web / http://10.0.0.1:8080/ tags "urlprefix-/""#);

        drop(rx);
        let _ = handle.await;

        let health_queries: Vec<String> = stub
            .requests()
            .into_iter()
            .filter(|uri| uri.contains("/v1/health/state/any"))
            .collect();

        // three failures plus the successful read, all against index 0
        assert!(health_queries.len() >= 4, "queries: {health_queries:?}");
        for uri in &health_queries[..4] {
            assert!(uri.contains("index=0"), "index advanced early: {uri}");
        }

        // only the success moves the blocking-query index forward
        if let Some(uri) = health_queries.get(4) {
            assert!(uri.contains("index=7"), "index not recorded: {uri}");
        }
    }
}
