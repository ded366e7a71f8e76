use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gibs_animator::{
    AnimationOutputs, Animator, AnimatorConfig, AssemblyOutcome, GeoPoint, HttpTileSource,
    LegendRegistry, OutputFormat, YearRange,
};

#[derive(Parser, Debug)]
#[command(name = "gibs-animator", version)]
#[command(about = "Animate NASA GIBS satellite layers around a location into MP4/GIF videos")]
struct Cli {
    /// Latitude of the picked point, degrees.
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude of the picked point, degrees.
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Year window, e.g. `2001-2003`.
    #[arg(long, default_value = "2001-2003")]
    years: YearRange,

    /// JSON config file. Missing fields use defaults.
    #[arg(long, env = "GIBS_ANIMATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Directory the videos are written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Output container (`mp4` needs ffmpeg on PATH). Overrides the config file.
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run(cli))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => AnimatorConfig::from_json_file(path)?,
        None => AnimatorConfig::default(),
    };
    if let Some(format) = cli.format {
        config.format = format;
        config.validate()?;
    }

    let legends = LegendRegistry::from_files(
        config
            .legends
            .iter()
            .map(|(group, path)| (*group, path.as_path())),
    )?;
    info!(legends = legends.len(), "legends loaded");

    let source = HttpTileSource::new(Duration::from_secs(15))?;
    let mut animator = Animator::new(&config, Arc::new(source), legends)?;
    animator.set_pick(GeoPoint::new(cli.lat, cli.lon));

    let cancel = animator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outputs = match animator.create_animation(cli.years).await {
        Ok(outputs) => outputs,
        Err(err) => {
            if let Some(msg) = animator.last_error() {
                eprintln!("{msg}");
            }
            return Err(err.into());
        }
    };
    write_outputs(outputs, &cli.out_dir)
}

fn write_outputs(outputs: &AnimationOutputs, out_dir: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir '{}'", out_dir.display()))?;

    for outcome in [&outputs.all_layers, &outputs.comparison] {
        match outcome {
            AssemblyOutcome::Delivered(blob) => {
                let path = out_dir.join(&blob.filename);
                std::fs::write(&path, &blob.bytes)
                    .with_context(|| format!("write '{}'", path.display()))?;
                eprintln!("wrote {} ({} bytes)", path.display(), blob.bytes.len());
            }
            AssemblyOutcome::Failed { error } => eprintln!("skipped: {error}"),
        }
    }
    Ok(())
}
