use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use leakscan::{DetectionRecord, DetectorConfig, LeakDetector};

#[derive(Parser)]
#[command(name = "leakscan")]
#[command(about = "Diagnose pipe leaks from an infrastructure photo")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Write the annotated image (JPEG) here
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the full JSON response, including the base64 annotated image
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Read detector settings from a JSON file instead of flags/environment
    #[arg(long, value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Save intermediate heuristic masks to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    #[command(flatten)]
    config: DetectorConfig,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "leakscan=debug" } else { "leakscan=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let bytes = std::fs::read(&args.image_path)
        .with_context(|| format!("Failed to read image {}", args.image_path.display()))?;

    let config = match &args.config_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            DetectorConfig::from_json(&text)?
        }
        None => args.config,
    };

    let mut detector = LeakDetector::new(config)?;
    if let Some(debug_dir) = args.debug_out {
        detector = detector.with_debug(debug_dir)?;
    }

    let result = detector.detect(&bytes)?;

    if let Some(output) = &args.output {
        std::fs::write(output, &result.annotated_image)
            .with_context(|| format!("Failed to write annotated image {}", output.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.to_response())?);
        return Ok(());
    }

    let filename = args
        .image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let record = DetectionRecord::from_result(&filename, &result)?;

    println!("\n=== Leak Detection Result ===");
    println!("File:        {}", record.filename);
    println!("Leak type:   {}", record.leak_type);
    println!("Severity:    {}", record.severity_level);
    println!("Confidence:  {:.4}", record.confidence_score);
    println!("Action:      {}", record.recommended_solution);

    if result.detections.is_empty() {
        println!("No detections.");
    } else {
        println!("\nDetections ({:?}):", result.source);
        for det in &result.detections {
            println!(
                "  {} at ({:.0}, {:.0})-({:.0}, {:.0}) - confidence: {:.2}",
                det.label, det.x1, det.y1, det.x2, det.y2, det.confidence
            );
        }
    }

    Ok(())
}
