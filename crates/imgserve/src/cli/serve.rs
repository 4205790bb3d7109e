//! The `imgserve serve` command.

use clap::Args;
use imgserve_core::{Config, Imgserve};

use crate::server::{AppState, Server};

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides `[server] listen`)
    #[arg(short, long, env = "IMGSERVE_LISTEN")]
    pub listen: Option<String>,
}

/// Execute the serve command.
pub async fn execute(args: ServeArgs, config: Config) -> anyhow::Result<()> {
    let listen = args.listen.unwrap_or_else(|| config.server.listen.clone());
    let imgserve = Imgserve::new(config)?;
    tracing::info!(
        "Storage: {} at {}",
        imgserve.config().storage.backend,
        imgserve.config().storage_root().display()
    );
    if let Some(base) = imgserve.config().source.base_url() {
        tracing::info!("Default source: {base}");
    }
    if imgserve.metrics().is_some() {
        tracing::info!("Prometheus metrics at http://{listen}/metrics");
    }

    Server::new(AppState::from_imgserve(&imgserve), listen)
        .serve()
        .await
}
