//! Recognize command - read the text inside pre-detected boxes of one image.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use textrec_core::{ItemResult, OcrError, Quad, create_engine_from_dir};

use super::load_config;

/// Arguments for the recognize command.
#[derive(Args)]
pub struct RecognizeArgs {
    /// Input image
    #[arg(required = true)]
    image: PathBuf,

    /// JSON file with one box per entry, as four [x, y] points or eight flat values
    #[arg(short, long)]
    boxes: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Model directory (default: models.model_dir from the config)
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Skip the orientation classifier
    #[arg(long)]
    no_classifier: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// One line per box
    Text,
}

/// A box as written in the boxes file.
#[derive(Deserialize)]
#[serde(untagged)]
enum BoxSpec {
    Points(Vec<[f32; 2]>),
    Flat(Vec<f32>),
}

/// One output row per input box.
#[derive(Debug, Serialize, PartialEq)]
struct BoxOutput {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    quad: Option<Quad>,
    text: String,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run(args: RecognizeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if args.no_classifier {
        config.classifier.enabled = false;
    }

    if !args.image.exists() {
        anyhow::bail!("Image not found: {}", args.image.display());
    }

    let content = fs::read_to_string(&args.boxes).map_err(|e| {
        anyhow::anyhow!("Failed to read boxes file {}: {}", args.boxes.display(), e)
    })?;
    let parsed = parse_boxes(&content)?;

    for (index, item) in parsed.iter().enumerate() {
        if let Err(e) = item {
            warn!("Skipping box #{}: {}", index, e);
        }
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));

    pb.set_message("Loading image...");
    let image = image::open(&args.image)?.to_rgb8();
    info!(
        "Processing {} ({}x{}) with {} boxes",
        args.image.display(),
        image.width(),
        image.height(),
        parsed.len()
    );

    let model_dir = args
        .model_dir
        .clone()
        .unwrap_or_else(|| config.models.model_dir.clone());
    let quads: Vec<Quad> = parsed.iter().filter_map(|item| item.as_ref().ok().copied()).collect();

    pb.set_message(format!("Recognizing {} boxes...", quads.len()));

    // Model loading and inference block, keep them off the async runtime
    let results = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<ItemResult>> {
        let engine = create_engine_from_dir(&model_dir, &config).map_err(|e| {
            anyhow::anyhow!("Failed to load models from {}: {}", model_dir.display(), e)
        })?;
        engine
            .run_batch(&quads, &image)
            .map_err(|e| anyhow::anyhow!("Recognition failed: {}", e))
    })
    .await??;

    pb.finish_and_clear();

    let rows = merge_results(&parsed, results);
    let output = format_rows(&rows, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Parse the boxes file. A malformed entry fails only its own slot.
fn parse_boxes(content: &str) -> anyhow::Result<Vec<Result<Quad, OcrError>>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Boxes file must be a JSON list: {}", e))?;

    Ok(entries.into_iter().map(parse_box).collect())
}

fn parse_box(entry: serde_json::Value) -> Result<Quad, OcrError> {
    let spec: BoxSpec =
        serde_json::from_value(entry).map_err(|e| OcrError::InvalidQuad(e.to_string()))?;

    match spec {
        BoxSpec::Points(points) => Quad::from_points(&points),
        BoxSpec::Flat(values) => {
            let bbox: [f32; 8] = values.as_slice().try_into().map_err(|_| {
                OcrError::InvalidQuad(format!("expected 8 values, got {}", values.len()))
            })?;
            Quad::from_bbox(&bbox)
        }
    }
}

/// Interleave engine results back into the positions of the valid boxes.
fn merge_results(parsed: &[Result<Quad, OcrError>], results: Vec<ItemResult>) -> Vec<BoxOutput> {
    let mut results = results.into_iter();

    parsed
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let outcome = match item {
                Ok(_) => results.next().unwrap_or_else(|| {
                    Err(OcrError::Recognition("no result returned".to_string()))
                }),
                Err(e) => Err(e.clone()),
            };
            let quad = item.as_ref().ok().copied();

            match outcome {
                Ok(result) => BoxOutput {
                    index,
                    quad,
                    text: result.text,
                    score: result.score,
                    error: None,
                },
                Err(e) => BoxOutput {
                    index,
                    quad,
                    text: String::new(),
                    score: 0.0,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect()
}

fn format_rows(rows: &[BoxOutput], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rows)?),
        OutputFormat::Csv => format_csv(rows),
        OutputFormat::Text => Ok(format_text(rows)),
    }
}

fn format_csv(rows: &[BoxOutput]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["index", "text", "score", "error"])?;
    for row in rows {
        wtr.write_record([
            row.index.to_string(),
            row.text.clone(),
            format!("{:.4}", row.score),
            row.error.clone().unwrap_or_default(),
        ])?;
    }

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_text(rows: &[BoxOutput]) -> String {
    rows.iter()
        .map(|row| match &row.error {
            Some(error) => format!("#{}\t-\terror: {}", row.index, error),
            None => format!("#{}\t{:.3}\t{}", row.index, row.score, row.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
