use anyhow::Result;
use clap::Parser;
use scribed::cli::{Cli, Commands};
use scribed::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    if let Some(secs) = cli.max_gap {
        config.batching.max_gap_seconds = secs;
    }
    if let Some(secs) = cli.batch_timeout {
        config.batching.batch_timeout_seconds = secs;
    }

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        None => {
            scribed::app::run(config).await?;
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/scribed/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}
