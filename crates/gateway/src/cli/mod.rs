use clap::{Parser, Subcommand};

/// Foreman — a multi-tenant agent orchestration gateway.
#[derive(Debug, Parser)]
#[command(name = "foreman", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run a standalone queue worker loop (claims and executes queue items).
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Run pending database migrations and exit.
    Migrate,
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Start a worker that claims queue items and runs them to completion.
    Worker {
        /// Stable identifier for this worker process (defaults to hostname-pid).
        #[arg(long)]
        worker_id: Option<String>,
    },
}

/// Load the resolved [`foreman_domain::config::Config`] from `FOREMAN_CONFIG`
/// (default `config.toml`), falling back to defaults if the file is absent.
pub fn load_config() -> anyhow::Result<(foreman_domain::config::Config, String)> {
    let config_path = std::env::var("FOREMAN_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        foreman_domain::config::Config::default()
    };

    Ok((config, config_path))
}
