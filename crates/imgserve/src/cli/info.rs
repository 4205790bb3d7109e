//! The `imgserve info` command.

use clap::Args;
use imgserve_core::identity::save_sidecar;
use imgserve_core::Config;
use imgserve_core::Identifier;
use std::path::PathBuf;

use super::expand_path;

/// Arguments for the `info` command.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Image file to identify
    #[arg(required = true)]
    pub input: PathBuf,

    /// Content type to report instead of the sniffed one
    #[arg(long)]
    pub content_type: Option<String>,

    /// Also write the properties as a JSON sidecar to this path
    #[arg(long)]
    pub save: Option<PathBuf>,
}

/// Execute the info command.
pub async fn execute(args: InfoArgs, config: Config) -> anyhow::Result<()> {
    let input = expand_path(&args.input);
    let props = Identifier::new(config.limits)
        .identify_file(&input, args.content_type.as_deref())
        .await?;

    if let Some(save) = &args.save {
        let save = expand_path(save);
        save_sidecar(&props, &save).await?;
        tracing::info!("Sidecar written to {}", save.display());
    }

    println!("{}", props.to_json()?);
    Ok(())
}
