//! The `imgserve process` command for generating derivatives of a local file.

use clap::Args;
use imgserve_core::{Config, Imgserve, Namespace, OutputSpec, PipelineRequest, SourceLocator};
use std::path::PathBuf;

use super::expand_path;

/// Arguments for the `process` command.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Original image file
    #[arg(required = true)]
    pub input: PathBuf,

    /// Namespace to store the original and derivatives under
    #[arg(short, long)]
    pub namespace: String,

    /// Comma-separated output specs, e.g. `x110.jpg,w400.webp,full_size.png`
    #[arg(short, long)]
    pub outputs: String,

    /// Content type to record for non-raster originals
    #[arg(long)]
    pub content_type: Option<String>,

    /// Number of derivatives generated concurrently
    #[arg(short, long)]
    pub parallel: Option<usize>,
}

/// Execute the process command.
pub async fn execute(args: ProcessArgs, mut config: Config) -> anyhow::Result<()> {
    let input = expand_path(&args.input);
    if !input.is_file() {
        anyhow::bail!(
            "Input file does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            input
        );
    }
    if let Some(parallel) = args.parallel {
        config.pipeline.parallel_workers = parallel.max(1);
    }

    let namespace = Namespace::parse(&args.namespace)?;
    let outputs = OutputSpec::parse_list(&args.outputs)?;
    let imgserve = Imgserve::new(config)?;

    let props = imgserve
        .identify_file(&input, args.content_type.as_deref())
        .await?;
    tracing::info!(
        "{}: {}x{} {} ({})",
        input.display(),
        props.width,
        props.height,
        props.content_type,
        props.hash
    );

    let request = PipelineRequest {
        namespace,
        hash: props.content_hash()?,
        source: Some(SourceLocator::Path(input)),
        outputs,
        content_type: args.content_type,
    };
    let report = imgserve.process(&request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = report.failures().len();
    if failed > 0 {
        anyhow::bail!("{failed} of {} outputs failed", report.items.len());
    }
    tracing::info!(
        "Generated {}, already present {}",
        report.generated().count(),
        report.items.len() - report.generated().count()
    );
    Ok(())
}
