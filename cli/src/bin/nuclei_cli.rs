use clap::{Parser, Subcommand};
use cli::{load_analysis, load_config, AnalysisOverrides, CliError, ConfigOverrides, TracingProgress};
use color_eyre::eyre::Result;
use nuclei::{read_summary, BatchLayout, BatchRunner, DetectionConfig, RatioAnalysis};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count stained nuclei on every slide of a directory
    Detect {
        /// Directory holding the slides
        #[arg(short, long)]
        slides: PathBuf,
        /// Directory holding the `<stem>_annotation.json` zone files
        #[arg(short, long)]
        annotations: PathBuf,
        /// Directory receiving overlays and summaries
        #[arg(short, long)]
        output: PathBuf,
        /// TOML or JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Pyramid level to decode
        #[arg(long)]
        level: Option<u32>,
        /// DAB optical density threshold
        #[arg(long)]
        stain_threshold: Option<f32>,
        /// Per-slide timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Compute the loss/reference marker ratio per patient
    Analyze {
        /// Detection summary (`.json` or `.csv`)
        #[arg(short, long)]
        summary: PathBuf,
        /// JSON parameters file, defaults to `params.json` next to the summary
        #[arg(short, long)]
        params: Option<PathBuf>,
        /// Marker expected to drop [default: CD7]
        #[arg(long)]
        loss: Option<String>,
        /// Reference marker [default: CD3]
        #[arg(long)]
        reference: Option<String>,
        /// Ratio threshold in percent [default: 10]
        #[arg(long)]
        threshold: Option<f64>,
        /// Tolerance in percentage points [default: 2]
        #[arg(long)]
        tolerance: Option<f64>,
        /// Directory receiving the analysis CSV
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the JSON schema of the configuration file
    Schema,
    /// Print the default configuration as TOML
    DefaultConfig,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Detect {
            slides,
            annotations,
            output,
            config,
            level,
            stain_threshold,
            timeout,
        } => {
            let overrides = ConfigOverrides {
                level: *level,
                stain_threshold: *stain_threshold,
                timeout_s: *timeout,
            };
            detect(slides, annotations, output, config.as_deref(), &overrides)?;
        }
        Commands::Analyze {
            summary,
            params,
            loss,
            reference,
            threshold,
            tolerance,
            output,
        } => {
            let overrides = AnalysisOverrides {
                loss_marker: loss.clone(),
                reference_marker: reference.clone(),
                threshold_percent: *threshold,
                tolerance_percent: *tolerance,
            };
            let analysis = load_analysis(params.as_deref(), summary, &overrides)?;
            analyze(summary, &analysis, output)?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&DetectionConfig::schema())?);
        }
        Commands::DefaultConfig => {
            println!("{}", DetectionConfig::default().to_toml()?);
        }
    }

    Ok(())
}

fn detect(
    slides: &Path,
    annotations: &Path,
    output: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    info!(
        level = config.level,
        stain_threshold = config.stain_threshold,
        timeout_s = config.timeout_s,
        "Detection configuration"
    );

    let runner = BatchRunner::new(BatchLayout::new(slides, annotations, output), config);
    let summary = runner.run(&mut TracingProgress::default())?;

    info!(
        "✅ {} of {} slides counted, summary written to {}",
        summary.records.len(),
        summary.total(),
        summary.csv_path.display()
    );
    Ok(())
}

fn analyze(summary_path: &Path, analysis: &RatioAnalysis, output: &Path) -> Result<()> {
    let records = read_summary(summary_path).map_err(CliError::from)?;
    if records.is_empty() {
        return Err(CliError::EmptySummary(summary_path.display().to_string()).into());
    }

    let (path, rows) = analysis.write(&records, output).map_err(CliError::from)?;
    for row in rows.iter().filter(|row| row.suspect) {
        info!(
            patient = %row.patient,
            ratio = ?row.ratio_percent,
            "Suspect {} loss",
            analysis.loss_marker
        );
    }
    info!("✅ Analysis written to {}", path.display());
    Ok(())
}
