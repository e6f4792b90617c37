//! telemetry-forest CLI Module
//!
//! Command-line interface for training, scoring and inspecting bundles.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;

use crate::calibration::ScoreDiagnostics;
use crate::config::TrainingConfig;
use crate::inference::BundleScorer;
use crate::preprocessing::ScalerKind;
use crate::training::TrainingPipeline;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn alert(s: &str) -> ColoredString  { s.truecolor(240, 110, 100) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<22}", key)), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn diagnostics_box(name: &str, diag: &ScoreDiagnostics) {
    line_box(&name.white().bold().to_string());
    line_box(&kv("samples", &diag.n_samples.to_string()));
    line_box(&kv(
        "anomalies",
        &format!("{} ({:.2}%)", diag.n_anomalies, diag.anomaly_ratio * 100.0),
    ));
    line_box(&kv("expected", &format!("{:.2}%", diag.expected_contamination * 100.0)));
    line_box(&kv("score mean ± std", &format!("{:.4} ± {:.4}", diag.score_mean, diag.score_std)));
    line_box(&kv("score range", &format!("[{:.4}, {:.4}]", diag.score_min, diag.score_max)));
    let health = if diag.health.is_healthy() { ok("healthy") } else { alert("check warnings") };
    line_box(&format!("{} {}", muted(&format!("{:<22}", "health")), health));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "telemetry-forest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Isolation forest training and export for system telemetry")]
#[command(long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train an anomaly model and export the bundle
    Train(TrainArgs),

    /// Score one telemetry sample against an exported bundle
    Score {
        /// Bundle directory
        #[arg(short, long, default_value = "model_assets")]
        bundle: PathBuf,

        /// Expected feature order, comma separated; defaults to the bundle's
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Feature values as name=value, absent features use the training median
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Summarize an exported bundle
    Info {
        /// Bundle directory
        #[arg(short, long, default_value = "model_assets")]
        bundle: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Input telemetry file (CSV, JSON, or Parquet)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory for the bundle
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Expected anomaly fraction, in (0, 0.5)
    #[arg(short, long)]
    pub contamination: Option<f64>,

    /// JSON configuration file
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Use standard instead of robust scaling
    #[arg(long)]
    pub no_robust_scaling: bool,

    /// Scaler kind (standard, robust)
    #[arg(long)]
    pub scaler: Option<String>,

    /// Fraction of rows held out for calibration
    #[arg(long)]
    pub validation_split: Option<f64>,

    /// Number of trees
    #[arg(long)]
    pub n_estimators: Option<usize>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads for tree building
    #[arg(long)]
    pub n_jobs: Option<usize>,
}

impl TrainArgs {
    /// Defaults, then the config file, then command-line flags
    pub fn resolve_config(&self) -> anyhow::Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)?,
            None => TrainingConfig::default(),
        };

        if let Some(input) = &self.input {
            config.input_csv = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(c) = self.contamination {
            config.contamination = c;
        }
        if let Some(split) = self.validation_split {
            config.validation_split = split;
        }
        if let Some(n) = self.n_estimators {
            config.n_estimators = n;
        }
        if let Some(seed) = self.seed {
            config.random_state = seed;
        }
        if self.n_jobs.is_some() {
            config.n_jobs = self.n_jobs;
        }
        if self.no_robust_scaling {
            config.scaler = ScalerKind::Standard;
        }
        if let Some(kind) = &self.scaler {
            config.scaler = ScalerKind::parse_or_default(kind);
        }
        Ok(config)
    }
}

/// Parse `name=value` pairs
pub fn parse_feature_values(pairs: &[String]) -> anyhow::Result<HashMap<String, f64>> {
    pairs
        .iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected name=value, got '{}'", pair))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e))?;
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(args: &TrainArgs) -> anyhow::Result<()> {
    section("Train");

    let config = args.resolve_config()?;
    let pipeline = TrainingPipeline::new(config);
    let config = pipeline.config();

    step_run("Loading data");
    let start = Instant::now();
    let df = pipeline.load_input()?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run(&format!("Training {} trees", config.n_estimators.to_string().cyan()));
    let report = pipeline.run_on_frame(&df)?;
    step_done(&format!("{} ms", report.elapsed_ms));

    let model = &report.model;
    println!();
    line_box_top();
    line_box(&kv("features", &model.feature_names().join(", ")));
    line_box(&kv("scaler", &model.scaler.kind.to_string()));
    line_box(&kv("train / validation", &format!("{} / {}", model.n_train, model.n_validation)));
    line_box(&kv("decision offset", &format!("{:.6}", model.decision_offset)));
    for (name, diag) in &model.evaluation {
        line_box_sep();
        diagnostics_box(name, diag);
    }
    line_box_sep();
    line_box(&kv("bundle", &report.export.output_dir.display().to_string()));
    for path in report.export.required.iter().chain(&report.export.optional) {
        let file = path.file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default();
        line_box(&format!("  {} {}", ok("✓"), file));
    }
    for (file, _) in &report.export.skipped {
        line_box(&format!("  {} {}", alert("✗"), file));
    }
    line_box_bottom();
    println!();

    Ok(())
}

pub fn cmd_score(
    bundle: &PathBuf,
    features: Option<&[String]>,
    values: &[String],
) -> anyhow::Result<()> {
    section("Score");

    let scorer = match features {
        Some(expected) => BundleScorer::load(bundle, expected)?,
        None => BundleScorer::load_unchecked(bundle)?,
    };
    let sample = parse_feature_values(values)?;
    let raw: Vec<Option<f64>> = scorer
        .feature_names()
        .iter()
        .map(|name| sample.get(name).copied())
        .collect();
    let missing: Vec<&String> = scorer
        .feature_names()
        .iter()
        .filter(|name| !sample.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        warn!(features = ?missing, "Missing features, using training medians");
    }
    let prediction = scorer.predict_row(&scorer.impute_row(&raw)?)?;

    let label = if prediction.is_anomaly { alert("ANOMALY") } else { ok("normal") };
    println!("  {}", kv("decision score", &format!("{:.6}", prediction.decision_score)));
    println!("  {}", kv("decision offset", &format!("{:.6}", scorer.decision_offset())));
    println!("  {}", kv("confidence", &format!("{:.6}", prediction.confidence)));
    println!("  {} {}", muted(&format!("{:<22}", "label")), label.bold());
    println!();
    Ok(())
}

pub fn cmd_info(bundle: &PathBuf) -> anyhow::Result<()> {
    section("Bundle");

    let scorer = BundleScorer::load_unchecked(bundle)?;
    let bundle = scorer.bundle();
    let meta = &bundle.metadata;

    line_box_top();
    line_box(&kv("model version", &meta.model_version));
    line_box(&kv("trained", &meta.training_timestamp));
    line_box(&kv("features", &meta.feature_names.join(", ")));
    line_box(&kv("feature hash", &meta.feature_order_hash[..16.min(meta.feature_order_hash.len())]));
    line_box(&kv("scaler", &meta.scaler_kind.to_string()));
    line_box(&kv("trees", &bundle.forest.trees.len().to_string()));
    line_box(&kv("max samples", &meta.max_samples.to_string()));
    line_box(&kv("contamination", &format!("{:.3}", meta.contamination)));
    line_box(&kv("decision offset", &format!("{:.6}", meta.decision_offset)));
    for (name, diag) in &meta.evaluation_metrics {
        line_box_sep();
        diagnostics_box(name, diag);
    }
    line_box_bottom();
    println!();
    Ok(())
}
