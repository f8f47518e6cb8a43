use clap::{Args, Parser};
use std::path::PathBuf;

mod config;
use config::{Config, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::future::Future;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
enum CliCommand {
    /// Run the proxy and its discovery watcher
    Proxy(ProxyArgs),
    /// Show all metrics definitions as markdown table
    ShowMetrics,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("Failed to load config file: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("Failed to create runtime: {0}")]
    RuntimeError(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
enum RunError {
    #[error(transparent)]
    Registry(#[from] registry::errors::RegistryError),
    #[error(transparent)]
    Proxy(#[from] proxy::errors::ProxyError),
}

fn main() {
    init_tracing();

    if let Err(e) = cli() {
        tracing::error!(error = %e, "Startup error");
        std::process::exit(1);
    }
}

fn cli() -> Result<(), CliError> {
    let cmd = CliCommand::parse();

    match &cmd {
        CliCommand::Proxy(proxy_args) => {
            let config = Config::from_file(&proxy_args.base.config_file_path)?;
            let _sentry_guard = init_sentry(config.common.logging);
            init_statsd_recorder("wayfinder", config.common.metrics);

            let proxy_config = config
                .proxy
                .ok_or(CliError::InvalidConfig("Missing proxy config"))?;
            let registry_config = config
                .registry
                .ok_or(CliError::InvalidConfig("Missing registry config"))?;

            run_async(run_proxy(proxy_config, registry_config))?;
            Ok(())
        }
        CliCommand::ShowMetrics => {
            let mut table = String::from(shared::metrics_defs::MARKDOWN_TABLE_HEADER);
            for def in proxy::metrics_defs::ALL_METRICS
                .iter()
                .chain(registry::metrics_defs::ALL_METRICS)
            {
                table.push('\n');
                table.push_str(&def.markdown_row());
            }
            println!("{table}");
            Ok(())
        }
    }
}

async fn run_proxy(
    proxy_config: proxy::config::Config,
    registry_config: registry::config::Config,
) -> Result<(), RunError> {
    let routes = registry::start(registry_config).await?;
    proxy::run(proxy_config, routes).await?;
    Ok(())
}

pub fn init_statsd_recorder(prefix: &str, metrics_config: Option<MetricsConfig>) {
    if let Some(MetricsConfig {
        statsd_host,
        statsd_port,
    }) = metrics_config
    {
        let recorder = StatsdBuilder::from(statsd_host, statsd_port)
            .build(Some(prefix))
            .expect("Could not create StatsdRecorder");

        metrics::set_global_recorder(recorder).expect("Could not set global metrics recorder")
    }
}

fn run_async(
    fut: impl Future<Output = Result<(), impl std::error::Error>>,
) -> Result<(), CliError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    if let Err(e) = rt.block_on(fut) {
        tracing::error!(error = %e, "Runtime error");
        process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(sentry::integrations::tracing::layer())
        .init();
}

fn init_sentry(logging_config: Option<config::LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    // The Sentry tracing layer (already initialized in main) starts sending
    // events once this client is initialized
    logging_config.map(|cfg| {
        sentry::init((
            cfg.sentry_dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    })
}

#[derive(Args, Debug, Clone)]
struct BaseArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(Args, Debug)]
struct ProxyArgs {
    #[command(flatten)]
    base: BaseArgs,
}
