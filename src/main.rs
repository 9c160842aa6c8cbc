//! equigrade: CLI entry point.
//!
//! Computes final grades for a gradebook CSV and prints the disparity report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use equigrade::analysis::{GroupSummary, Measure, DEFAULT_HISTOGRAM_BINS};
use equigrade::config::GradingConfig;
use equigrade::pipeline::{evaluate_with_bins, Evaluation};
use equigrade::roster::{load_roster, save_final_grades};

#[derive(Parser)]
#[command(name = "equigrade")]
#[command(about = "Weighted final grades with an equity audit")]
#[command(version)]
struct Cli {
    /// Gradebook CSV with a header row.
    #[arg(required_unless_present = "init_config")]
    roster: Option<PathBuf>,

    /// Grading config (YAML). Without it the five default categories are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a policy value, e.g. `quizzes.drop=2` (repeatable).
    #[arg(long = "set", value_name = "CATEGORY.FIELD=VALUE")]
    overrides: Vec<String>,

    /// Print the full evaluation as JSON.
    #[arg(long)]
    json: bool,

    /// Write the final grade table to a CSV file.
    #[arg(long, value_name = "PATH")]
    grades_out: Option<PathBuf>,

    /// Histogram bins per group.
    #[arg(long, default_value_t = DEFAULT_HISTOGRAM_BINS)]
    bins: usize,

    /// Write the default config to PATH and exit.
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "equigrade.yaml"
    )]
    init_config: Option<PathBuf>,

    /// Log more (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(path) = &cli.init_config {
        return write_default_config(path);
    }

    let mut config = match &cli.config {
        Some(path) => GradingConfig::load(path)?,
        None => GradingConfig::default(),
    };
    for setting in &cli.overrides {
        config.apply_override(setting)?;
    }
    debug!(?config, "Grading config");

    let roster_path = cli
        .roster
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("No roster given"))?;
    let roster = load_roster(roster_path, &config)?;
    info!(students = roster.len(), "Loaded roster");

    let evaluation = evaluate_with_bins(&roster, &config, cli.bins)
        .with_context(|| format!("Cannot grade {}", roster_path.display()))?;

    if let Some(path) = &cli.grades_out {
        save_final_grades(path, &evaluation.final_grades)?;
        info!(path = %path.display(), "Wrote final grades");
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        print_report(roster_path, &config, &evaluation);
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("equigrade={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn write_default_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists. Remove it first or edit it.", path.display());
    }
    let yaml = GradingConfig::default().to_yaml()?;
    fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "Created".green(), path.display());
    Ok(())
}

fn print_report(roster_path: &Path, config: &GradingConfig, evaluation: &Evaluation) {
    let report = &evaluation.report;
    let table = &evaluation.final_grades;

    println!("{}", "equigrade".bold());
    println!("  Roster: {}", roster_path.display());
    println!(
        "  Students: {} ({} minoritized)",
        table.len(),
        report.minoritized.total()
    );
    for (category, settings) in evaluation.categories.iter().zip(&config.categories) {
        println!(
            "  {}: {} columns, weight {:.2}, drop {}, floor {:.2}",
            category.name.cyan(),
            category.columns.len(),
            settings.weight,
            settings.drop_count,
            settings.floor
        );
    }
    println!();

    let medians = report.median_comparison();
    let pct = |v: Option<f64>| v.map_or_else(|| "n/a".dimmed().to_string(), |v| format!("{v}%"));
    println!(
        "Minoritized and/or first-gen median: {}",
        pct(medians.minoritized_pct).bold()
    );
    println!("Reference median: {}", pct(medians.reference_pct).bold());
    let difference = pct(medians.difference_pct);
    let difference = match medians.difference_pct {
        Some(d) if d < 0.0 => difference.red(),
        Some(_) => difference.green(),
        None => difference.normal(),
    };
    println!("Median difference: {difference}");
    println!();

    println!("{}", "=".repeat(78));
    println!(
        "  {:<12} {:>4} {:>5} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "group", "n", "excl", "mean", "std", "min", "25%", "50%", "75%", "max", "MAD"
    );
    print_summary_row("minoritized", &report.minoritized);
    print_summary_row("reference", &report.reference);
    println!("{}", "=".repeat(78));
    println!();

    match report.welch {
        Measure::Value(w) => println!(
            "Welch t-test: t = {:.4}, df = {:.2}, p = {}",
            w.t_statistic,
            w.degrees_of_freedom,
            format!("{:.4}", w.p_value).bold()
        ),
        other => println!("Welch t-test: {}", describe(other)),
    }
    match report.glass_delta {
        Measure::Value(d) => println!("Glass's Delta: {}", format!("{d:.4}").bold()),
        other => println!("Glass's Delta: {}", describe(other)),
    }

    let excluded = report.minoritized.excluded + report.reference.excluded;
    if excluded > 0 {
        println!();
        println!(
            "  {} {excluded} students have no final grade and were excluded",
            "!".yellow()
        );
    }
}

fn print_summary_row(label: &str, summary: &GroupSummary) {
    let cell = |m: Measure| m.value().map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
    println!(
        "  {:<12} {:>4} {:>5} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
        label,
        summary.count,
        summary.excluded,
        cell(summary.mean),
        cell(summary.std),
        cell(summary.min),
        cell(summary.q25),
        cell(summary.median),
        cell(summary.q75),
        cell(summary.max),
        cell(summary.mad),
    );
}

fn describe<T>(measure: Measure<T>) -> colored::ColoredString {
    match measure {
        Measure::Value(_) => "computed".normal(),
        Measure::InsufficientData => "insufficient data".yellow(),
        Measure::ZeroSpread => "undefined (zero spread)".yellow(),
    }
}
