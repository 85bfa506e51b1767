//! Relaybox - message relay client
//!
#![doc = "Relaybox - message relay client"]
#![doc = "Main entry point for the relaybox command-line client."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relaybox::cli::Cli;
use relaybox::commands;
use relaybox::config::{Config, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration; warnings go to a bootstrap subscriber until the
    // configured one is installed
    let config_path = cli.config.as_deref().unwrap_or("config/relaybox.yaml");
    let config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        Config::load(config_path, &cli)
    })?;

    init_tracing(&config.logging);

    // Validate configuration
    config.validate()?;

    let credential = cli.init_data.clone().unwrap_or_default();
    tracing::debug!("Running {:?}", cli.command);
    commands::run(config, &credential, cli.command).await
}

/// Plain stderr subscriber used while the configuration is loading
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LoggingConfig::default().level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
