//! SECOM quality-control CLI
//!
//! Offline pipeline stages (preprocess, train) and the inspection commands
//! built on the inference service (predict, evaluate, metrics, serve).

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::artifacts::ArtifactPaths;
use crate::inference::{InferenceConfig, QualityControlService, UnitStatus};
use crate::preprocessing::{PreprocessingConfig, Preprocessor};
use crate::server::{run_server, ServerConfig};
use crate::training::{ClassificationMetrics, MetricsComparison, Trainer, TrainingConfig};
use crate::utils::{load_csv, split_target, write_csv};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(235, 110, 110) }

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
    format!("{} {}", muted(&format!("{:<18}", key)), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_warn(msg: &str) {
    println!("  {} {}", bad("!"), msg);
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

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "secom-qc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Semiconductor yield quality control: preprocess, train, predict")]
#[command(long_about = None)]
pub struct Cli {
    /// Directory holding the raw and clean tables [env: QC_DATA_DIR]
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding model, metrics and test partition [env: QC_RESULTS_DIR]
    #[arg(long, global = true)]
    pub results_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Artifact layout after applying the directory flags
    pub fn artifact_paths(&self) -> ArtifactPaths {
        let mut paths = ArtifactPaths::default();
        if let Some(dir) = &self.data_dir {
            paths.data_dir = dir.clone();
        }
        if let Some(dir) = &self.results_dir {
            paths.results_dir = dir.clone();
        }
        paths
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean the raw sensor table
    Preprocess {
        /// Raw CSV (default: <data-dir>/uci-secom.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Clean CSV (default: <data-dir>/secom_preprocessed.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Drop columns with a larger missing fraction
        #[arg(long, default_value = "0.5")]
        max_missing: f64,
    },

    /// Train the model and write model, metrics and test partition
    Train {
        /// Clean CSV (default: <data-dir>/secom_preprocessed.csv)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Number of trees
        #[arg(long, default_value = "100")]
        n_estimators: usize,

        /// Random seed for split, oversampling and forest
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Worker threads (default: all cores)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Predict defects for a feature table
    Predict {
        /// Feature CSV; a Target column is ignored
        #[arg(short, long)]
        data: PathBuf,

        /// Defect-probability threshold (default: model decision)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Write per-unit results to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-evaluate the model on a labeled table
    Evaluate {
        /// Labeled CSV (default: <results-dir>/test_dataset.csv)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Show the reference metrics and top features
    Metrics {
        /// Number of features to list
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Start the HTTP server
    Serve {
        /// Server port [env: QC_PORT]
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host [env: QC_HOST]
        #[arg(long)]
        host: Option<String>,
    },
}

// ─── Output helpers ───────────────────────────────────────────────────────────

fn print_metrics(metrics: &ClassificationMetrics) {
    line_box_top();
    for (name, value) in metrics.scalars() {
        line_box(&kv(name, &format!("{:.4}", value)));
    }
    line_box_sep();
    let cm = metrics.confusion_matrix;
    line_box(&format!("{:<18} {:>10} {:>10}", "", muted("Pred OK"), muted("Pred Defect")));
    line_box(&format!("{:<18} {:>10} {:>10}", muted("True OK"), cm[0][0], cm[0][1]));
    line_box(&format!("{:<18} {:>10} {:>10}", muted("True Defect"), cm[1][0], cm[1][1]));
    line_box_bottom();
}

fn print_comparison(comparison: &MetricsComparison) {
    println!(
        "  {:<10} {:>10} {:>10} {:>10}",
        muted("Metric"), muted("Reference"), muted("Current"), muted("Delta")
    );
    for (name, reference, current, delta) in comparison.rows() {
        let delta_str = format!("{:+.4}", delta);
        let delta_col = if delta < 0.0 { bad(&delta_str) } else { ok(&delta_str) };
        println!("  {:<10} {:>10.4} {:>10.4} {:>10}", name, reference, current, delta_col);
    }
}

fn load_service(paths: &ArtifactPaths) -> QualityControlService {
    QualityControlService::new(InferenceConfig::from_paths(paths))
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_preprocess(
    paths: &ArtifactPaths,
    input: Option<&Path>,
    output: Option<&Path>,
    max_missing: f64,
) -> anyhow::Result<()> {
    section("Preprocess");

    let input = input.map(Path::to_path_buf).unwrap_or_else(|| paths.raw_data());
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| paths.clean_data());

    let config = PreprocessingConfig::new().with_max_missing_ratio(max_missing);
    let preprocessor = Preprocessor::with_config(config);

    step_run(&format!("Cleaning {}", input.display()));
    let start = Instant::now();
    let clean = preprocessor.run(&input, &output)?;
    step_done(&format!("{:?}", start.elapsed()));

    let report = &clean.report;
    println!();
    println!("  {}", kv("Rows", &report.n_rows.to_string()));
    println!("  {}", kv("Input columns", &report.n_input_columns.to_string()));
    println!("  {}", kv("Dropped (sparse)", &report.dropped_columns.len().to_string()));
    println!("  {}", kv("Phase indicators", &report.phase_columns.len().to_string()));
    println!("  {}", kv("Imputed cells", &report.imputed_cells.to_string()));
    println!("  {}", kv("Features", &report.n_features.to_string()));
    println!();
    step_ok(&format!("Clean table → {}", output.display()));
    println!();
    Ok(())
}

pub fn cmd_train(
    paths: &ArtifactPaths,
    data: Option<&Path>,
    n_estimators: usize,
    seed: u64,
    jobs: Option<usize>,
) -> anyhow::Result<()> {
    section("Train");

    let data = data.map(Path::to_path_buf).unwrap_or_else(|| paths.clean_data());
    let config = TrainingConfig::new()
        .with_n_estimators(n_estimators)
        .with_random_state(seed)
        .with_n_jobs(jobs);

    step_run(&format!("Training {} trees on {}", n_estimators.to_string().cyan(), data.display()));
    let outcome = Trainer::new(config).train_and_save(&data, paths)?;
    step_done(&format!("{:.2}s", outcome.summary.training_time_secs));

    let s = &outcome.summary;
    let counts = |m: &std::collections::BTreeMap<i64, usize>| {
        format!(
            "OK {} / Defect {}",
            m.get(&0).copied().unwrap_or(0),
            m.get(&1).copied().unwrap_or(0)
        )
    };
    println!();
    println!("  {}", kv("Features", &s.n_features.to_string()));
    println!("  {}", kv("Train (before)", &counts(&s.train_counts)));
    println!("  {}", kv("Train (SMOTE)", &counts(&s.resampled_counts)));
    println!("  {}", kv("Test", &counts(&s.test_counts)));
    println!();
    print_metrics(&outcome.metrics);
    println!();
    step_ok(&format!("Model → {}", paths.model().display()));
    step_ok(&format!("Metrics → {}", paths.metrics().display()));
    step_ok(&format!("Test partition → {}", paths.test_set().display()));
    println!();
    Ok(())
}

pub fn cmd_predict(
    paths: &ArtifactPaths,
    data: &Path,
    threshold: Option<f64>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    let service = load_service(paths);
    if !service.has_model() {
        anyhow::bail!("No model found at {}; run `secom-qc train` first", paths.model().display());
    }

    step_run(&format!("Loading {}", data.display()));
    let df = load_csv(data)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let report = service
        .analyze(&df, threshold)
        .ok_or_else(|| anyhow::anyhow!("Prediction unavailable for this batch (see log)"))?;

    println!();
    println!("  {}", kv("Units", &report.n_units.to_string()));
    println!("  {}", kv("Defective", &bad(&report.n_defective.to_string()).to_string()));
    println!("  {}", kv("Conforming", &ok(&report.n_conforming.to_string()).to_string()));
    println!("  {}", kv("Yield", &format!("{:.2}%", report.yield_pct)));
    if let Some(t) = report.threshold {
        println!("  {}", kv("Threshold", &format!("{:.2}", t)));
    }

    if let Some(output) = output {
        let status: Vec<&str> = report
            .units
            .iter()
            .map(|u| match u.status {
                UnitStatus::Conforming => "Conforming",
                UnitStatus::Defective => "Defective",
            })
            .collect();
        let mut out = df!(
            "unit" => report.units.iter().map(|u| u.index as u64).collect::<Vec<_>>(),
            "status" => status,
            "defect_probability" => report.units.iter().map(|u| u.defect_probability).collect::<Vec<_>>(),
            "confidence" => report.units.iter().map(|u| u.confidence).collect::<Vec<_>>()
        )?;
        write_csv(&mut out, output)?;
        println!();
        step_ok(&format!("Results → {}", output.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_evaluate(paths: &ArtifactPaths, data: Option<&Path>) -> anyhow::Result<()> {
    section("Evaluate");

    let service = load_service(paths);
    if !service.has_model() {
        anyhow::bail!("No model found at {}; run `secom-qc train` first", paths.model().display());
    }

    let data = data.map(Path::to_path_buf).unwrap_or_else(|| paths.test_set());
    step_run(&format!("Loading {}", data.display()));
    let df = load_csv(&data)?;
    let (features, y) = split_target(&df, &service.config().target_column)?;
    step_done(&format!("{} rows", df.height()));

    let metrics = service
        .evaluate_performance(&features, &y)
        .ok_or_else(|| anyhow::anyhow!("Evaluation unavailable for this table (see log)"))?;

    println!();
    print_metrics(&metrics);
    match service.compare_with_reference(&metrics) {
        Some(comparison) => {
            println!();
            print_comparison(&comparison);
        }
        None => step_warn("No reference metrics to compare against"),
    }
    println!();
    Ok(())
}

pub fn cmd_metrics(paths: &ArtifactPaths, top: usize) -> anyhow::Result<()> {
    section("Reference metrics");

    let service = load_service(paths);
    match service.reference_metrics() {
        Some(metrics) => print_metrics(metrics),
        None => step_warn(&format!("No metrics at {}", paths.metrics().display())),
    }

    let features = service.top_features(top);
    if !features.is_empty() {
        section("Top features");
        for (rank, f) in features.iter().enumerate() {
            println!("  {:>3}. {:<20} {}", rank + 1, f.name, format!("{:.4}", f.importance).white());
        }
    }
    println!();
    Ok(())
}

pub async fn cmd_serve(paths: &ArtifactPaths, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if std::env::var("QC_CLEAN_DATA").is_err() {
        config.clean_data_path = paths.clean_data();
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let service = Arc::new(load_service(paths));
    run_server(config, service).await
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = cli.artifact_paths();

    match cli.command {
        Commands::Preprocess { input, output, max_missing } => {
            cmd_preprocess(&paths, input.as_deref(), output.as_deref(), max_missing)
        }
        Commands::Train { data, n_estimators, seed, jobs } => {
            cmd_train(&paths, data.as_deref(), n_estimators, seed, jobs)
        }
        Commands::Predict { data, threshold, output } => {
            cmd_predict(&paths, &data, threshold, output.as_deref())
        }
        Commands::Evaluate { data } => cmd_evaluate(&paths, data.as_deref()),
        Commands::Metrics { top } => cmd_metrics(&paths, top),
        Commands::Serve { host, port } => cmd_serve(&paths, host, port).await,
    }
}
