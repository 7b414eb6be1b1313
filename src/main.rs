// Command-line entry point: translate one manga page

use manga_translator::{
    core::Config,
    orchestration::PipelineOrchestrator,
    utils::{load_image_file_async, validate_image_dimensions},
};

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "manga-translate",
    version,
    about = "Detect, translate, erase and re-typeset the text on a manga page"
)]
struct Cli {
    /// Page image (PNG, JPEG, WebP or BMP)
    image: PathBuf,

    /// Job id used to name the output file (default: generated)
    #[arg(short = 'j', long = "job-id")]
    job_id: Option<String>,

    /// Output directory (default: TEMP_DIR)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
}

fn default_job_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("job-{}-{}", millis, std::process::id())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::new().context("Failed to load configuration")?;
    if let Some(output) = cli.output {
        config.storage.temp_dir = output;
    }

    // Initialize logging
    let filter = EnvFilter::new(format!(
        "manga_translator={},manga_translate={},cosmic_text=warn",
        config.log_level().as_str().to_lowercase(),
        config.log_level().as_str().to_lowercase()
    ));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("=== MANGA PAGE TRANSLATOR ===");
    info!(
        "Config: {} -> {}, fonts {}-{}px, output {}",
        config.source_lang(),
        config.target_lang(),
        config.rendering.font_size_min,
        config.rendering.font_size_max,
        config.temp_dir().display()
    );

    // Validate the upload the same way an API front end would
    let size = tokio::fs::metadata(&cli.image)
        .await
        .with_context(|| format!("Cannot read {}", cli.image.display()))?
        .len();
    if size > config.storage.max_file_size {
        anyhow::bail!(
            "{} is {} bytes (limit {})",
            cli.image.display(),
            size,
            config.storage.max_file_size
        );
    }
    let (_, image) = load_image_file_async(&cli.image).await?;
    validate_image_dimensions(&image, config.storage.min_image_dimension)?;
    drop(image);

    let job_id = cli.job_id.unwrap_or_else(default_job_id);
    let pipeline = PipelineOrchestrator::from_config(&config);

    match pipeline.process(&cli.image, &job_id).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            info!(
                "Metrics: {}",
                serde_json::to_string(&pipeline.metrics().snapshot())?
            );
            Ok(())
        }
        Err(e) => {
            error!("Processing failed: {}", e);
            Err(e.into())
        }
    }
}
