//! Retention Analytics CLI
//!
//! Loads a membership export, runs the retention engine as of a reference
//! instant and prints the retention matrix, churn curve and lifetime value table.

use anyhow::{bail, Context};
use chrono::{Datelike, Utc};
use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use retention_analytics::calendar::{local_date, month_start_date, sub_months};
use retention_analytics::cohort::Granularity;
use retention_analytics::membership::{load_members, loader::parse_timestamp};
use retention_analytics::{AnalyticsConfig, RetentionEngine, RetentionReport};

#[derive(Parser)]
#[command(name = "retention_report")]
#[command(version)]
#[command(about = "Cohort retention, churn curve and lifetime value for a membership export")]
struct Cli {
    /// Membership export (CSV)
    #[arg(short, long, default_value = "data/sample_members.csv")]
    members: PathBuf,

    /// Reference instant: epoch seconds, YYYY-MM-DD or RFC 3339 (default: now)
    #[arg(long)]
    as_of: Option<String>,

    /// Number of monthly cohorts to report
    #[arg(long)]
    months_back: Option<u32>,

    /// Reporting timezone as hours east of UTC
    #[arg(long, allow_negative_numbers = true)]
    utc_offset_hours: Option<f64>,

    /// Reporting timezone as an IANA name (e.g. America/New_York); overrides --utc-offset-hours
    #[arg(long)]
    timezone: Option<String>,

    /// Parameter overrides (parameter,value CSV)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Join/end flow over the cohort window at this granularity (day, month, quarter, year)
    #[arg(long)]
    flow: Option<Granularity>,

    /// Write the full report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalyticsConfig::from_csv_path(path)
            .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
        None => AnalyticsConfig::default_dashboard(),
    };
    if let Some(months_back) = cli.months_back {
        config.cohort.months_back = months_back;
    }
    if let Some(hours) = cli.utc_offset_hours {
        config.cohort.utc_offset_seconds = (hours * 3600.0).round() as i32;
    }
    if let Some(name) = &cli.timezone {
        config.cohort.timezone = Some(name.clone());
    }

    let engine = RetentionEngine::new(config)?;
    let tz = *engine.timezone();
    log::info!("Reporting timezone: {}", tz);

    let now = match &cli.as_of {
        Some(raw) => match parse_timestamp(raw, &tz) {
            Some(ts) => ts,
            None => bail!("Unrecognized --as-of value: {}", raw),
        },
        None => Utc::now().timestamp(),
    };

    let start = Instant::now();
    println!("Loading members from {}...", cli.members.display());
    let loaded = load_members(&cli.members, &tz)
        .with_context(|| format!("Failed to load {}", cli.members.display()))?;
    println!(
        "Loaded {} members ({} rows skipped) in {:?}",
        loaded.rows.len(),
        loaded.skipped,
        start.elapsed()
    );

    let snapshot = loaded.into_snapshot(now);
    let run_start = Instant::now();
    let report = engine.run(&snapshot);
    println!("Computed report in {:?}\n", run_start.elapsed());

    print_retention_matrix(&report);
    print_churn_curve(&report);
    print_lifetime_values(&report);

    let summary = &report.tenure_summary;
    println!("\nMembers: {} ({} active)", summary.member_count, summary.active_count);
    println!(
        "Tenure: average {:.2} years, median {:.2} years",
        summary.average_tenure_years, summary.median_tenure_years
    );

    if let Some(today) = local_date(now, &tz) {
        println!("\nAnnual cohorts:");
        println!("{:>6} {:>7} {:>7} {:>10} {:>11}", "Year", "Joined", "Active", "Retained%", "Annualized%");
        for row in engine.annual_cohorts(&snapshot.records, today.year() - 9, today.year(), now) {
            println!(
                "{:>6} {:>7} {:>7} {:>10.2} {:>11.2}",
                row.year, row.joined, row.active, row.retention_percent, row.annualized_retention_percent
            );
        }
    }

    if let Some(granularity) = cli.flow {
        let window_end = local_date(now, &tz);
        let window_start = month_start_date(now, &tz)
            .and_then(|date| sub_months(date, report.months_back));
        if let (Some(from), Some(to)) = (window_start, window_end) {
            let flow = engine.membership_flow(&snapshot.records, from, to, granularity);
            println!("\nMembership flow ({}): {} joined, {} ended", granularity, flow.total_incoming(), flow.total_ending());
            for entry in &flow.incoming {
                println!("  + {:<10} {:<16} {:>5}", entry.period, entry.membership_type, entry.count);
            }
            for entry in &flow.ending {
                println!("  - {:<10} {:<16} {:>5}", entry.period, entry.membership_type, entry.count);
            }
        }
    }

    if let Some(path) = &cli.output {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(serde_json::to_string_pretty(&report)?.as_bytes())?;
        println!("\nReport written to {}", path.display());
    }

    Ok(())
}

fn print_retention_matrix(report: &RetentionReport) {
    let shown = (report.months_back as usize + 1).min(13);

    println!("Retention matrix (% retained by month offset):");
    print!("{:>9} {:>6}", "Cohort", "Joined");
    for offset in 0..shown {
        print!(" {:>6}", format!("M{}", offset));
    }
    println!();
    println!("{}", "-".repeat(17 + shown * 7));

    for row in &report.retention_matrix {
        print!("{:>9} {:>6}", row.label, row.joined);
        for cell in row.retention.iter().take(shown) {
            match cell {
                Some(value) => print!(" {:>6.1}", value),
                None => print!(" {:>6}", "-"),
            }
        }
        println!();
    }
}

fn print_churn_curve(report: &RetentionReport) {
    println!("\nChurn curve:");
    println!("{:>6} {:>8} {:>8} {:>8} {:>10}", "Year", "Entered", "Churned", "Rate", "Exp.Years");
    for (bucket, point) in report.churn_curve.iter() {
        println!(
            "{:>6} {:>8} {:>8} {:>8.3} {:>10.2}",
            bucket.to_string(),
            point.entered_count,
            point.churned_count,
            point.churn_rate,
            point.expected_future_years
        );
    }
}

fn print_lifetime_values(report: &RetentionReport) {
    println!("\nLifetime value by tenure:");
    println!(
        "{:>10} {:>8} {:>12} {:>12} {:>8} {:>12}",
        "Tenure", "Members", "Realized", "Projected", "Months", "Total"
    );
    for bucket in report.lifetime_values.values() {
        println!(
            "{:>10} {:>8} {:>12.2} {:>12.2} {:>8.1} {:>12.2}",
            bucket.label,
            bucket.member_count,
            bucket.average_realized_value,
            bucket.average_projected_value,
            bucket.projected_months,
            bucket.total_value
        );
    }

    if !report.lifetime_value_by_type.is_empty() {
        println!("\nLifetime value by membership type:");
        for (membership_type, value) in &report.lifetime_value_by_type {
            println!("  {:<20} {:>12.2}", membership_type, value);
        }
    }
}
