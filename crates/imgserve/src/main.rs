//! imgserve CLI - content-addressed image derivative server.
//!
//! imgserve stores each original once under its content hash and generates
//! only the derivatives (resized, re-encoded versions) that are missing.
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP server
//! imgserve serve --listen 0.0.0.0:7000
//!
//! # Generate derivatives for a local file into the configured storage
//! imgserve process cat.jpg --namespace avatars --outputs x110.jpg,w400.webp
//!
//! # Print content identity
//! imgserve info cat.jpg
//!
//! # View configuration
//! imgserve config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;
mod server;

/// imgserve - content-addressed image derivative server.
#[derive(Parser, Debug)]
#[command(name = "imgserve")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve(cli::serve::ServeArgs),

    /// Generate derivatives for a local image
    Process(cli::process::ProcessArgs),

    /// Print the content identity of an image
    Info(cli::info::InfoArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match imgserve_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `imgserve config check`."
            );
            imgserve_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("imgserve v{}", imgserve_core::VERSION);

    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args, config).await,
        Commands::Process(args) => cli::process::execute(args, config).await,
        Commands::Info(args) => cli::info::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
