//! The `imgserve config` command.

use anyhow::Context;
use clap::{Args, Subcommand};
use imgserve_core::Config;
use std::path::{Path, PathBuf};

/// Top-level tables of the config file.
const SECTIONS: &[&str] = &[
    "server", "storage", "source", "pipeline", "fetch", "limits", "events", "logging",
];

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show {
        /// Only print one table, e.g. `storage` or `fetch`
        #[arg(long)]
        section: Option<String>,
    },

    /// Show config file path
    Path,

    /// Write a config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,

        /// Storage backend: local or memory
        #[arg(long)]
        backend: Option<String>,

        /// Root directory for the local backend
        #[arg(long)]
        storage_root: Option<PathBuf>,

        /// Origin prefix for originals requested without a source
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Validate a config file without starting the server
    Check {
        /// Config file (defaults to the standard location)
        file: Option<PathBuf>,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show { section } => {
            let config = Config::load()?;
            match section {
                Some(name) => print!("{}", render_section(&config, &name)?),
                None => print!("{}", config.to_toml()?),
            }
            println!();
            for line in summary(&config) {
                println!("# {line}");
            }
        }

        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
        }

        ConfigCommand::Init {
            force,
            backend,
            storage_root,
            base_url,
        } => {
            let mut config = Config::default();
            if let Some(backend) = backend {
                config.storage.backend = backend;
            }
            if let Some(root) = storage_root {
                config.storage.root = root;
            }
            if let Some(url) = base_url {
                config.source.base_url = url;
            }
            let path = Config::default_path();
            write_config(&path, &config, force).await?;

            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
            if config.storage.backend == "local" {
                println!("Originals and derivatives go under {}", config.storage_root().display());
            }
        }

        ConfigCommand::Check { file } => {
            let path = file.unwrap_or_else(Config::default_path);
            let config = Config::load_from(&path)
                .with_context(|| format!("{} is not a valid config", path.display()))?;
            println!("{} is valid", path.display());
            for line in summary(&config) {
                println!("  {line}");
            }
        }
    }

    Ok(())
}

/// One top-level table rendered as TOML.
fn render_section(config: &Config, name: &str) -> anyhow::Result<String> {
    let value = toml::Value::try_from(config)?;
    let Some(section) = value.get(name) else {
        anyhow::bail!(
            "Unknown config section {name:?}; expected one of: {}",
            SECTIONS.join(", ")
        );
    };
    let mut table = toml::Table::new();
    table.insert(name.to_string(), section.clone());
    Ok(toml::to_string_pretty(&table)?)
}

/// What the effective settings resolve to at runtime.
fn summary(config: &Config) -> Vec<String> {
    let storage = match config.storage.backend.as_str() {
        "local" => format!("storage: local at {}", config.storage_root().display()),
        other => format!("storage: {other} (not persisted)"),
    };
    let source = match config.source.base_url() {
        Some(base) => format!("default source: {base}/<original key>"),
        None => "default source: none (requests must name a source)".to_string(),
    };
    let metrics = if config.events.metrics {
        format!("metrics: http://{}/metrics", config.server.listen)
    } else {
        "metrics: disabled".to_string()
    };
    vec![
        format!("listen: {}", config.server.listen),
        storage,
        source,
        format!(
            "fetch: {} ms timeout, {} retries",
            config.fetch.timeout_ms, config.fetch.retry_attempts
        ),
        metrics,
    ]
}

/// Validate `config` and write it to `path`.
async fn write_config(path: &Path, config: &Config, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }
    let text = config.to_toml()?;
    // Reject overrides that would make the file unloadable
    Config::from_toml(&text)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text).await?;
    Ok(())
}
