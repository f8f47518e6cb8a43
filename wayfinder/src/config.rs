use proxy::config::Config as ProxyConfig;
use registry::config::Config as RegistryConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Debug, Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub proxy: Option<ProxyConfig>,
    pub registry: Option<RegistryConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy::config::{ListenScheme, Strategy};
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            proxy:
                listen: [{addr: "0.0.0.0:9999"}]
                no_route_status: 503
                strategy: random
            registry:
                consul:
                    addr: http://127.0.0.1:8500
                    tag_prefix: urlprefix-
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_host, "127.0.0.1");
        assert_eq!(metrics.statsd_port, 8125);

        let proxy_config = config.proxy.expect("proxy config");
        assert_eq!(proxy_config.listen[0].addr, "0.0.0.0:9999");
        assert_eq!(proxy_config.listen[0].scheme, ListenScheme::Http);
        assert_eq!(proxy_config.no_route_status, 503);
        assert_eq!(proxy_config.strategy, Strategy::Random);

        let registry_config = config.registry.expect("registry config");
        assert_eq!(registry_config.consul.addr, "http://127.0.0.1:8500");
    }

    #[test]
    fn sections_are_optional() {
        let tmp = write_tmp_file("proxy:\n    listen: [{addr: ':9999'}]\n");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert!(config.common.metrics.is_none());
        assert!(config.common.logging.is_none());
        assert!(config.registry.is_none());
        assert!(config.proxy.is_some());
    }
}
