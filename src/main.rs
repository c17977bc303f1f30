//! failsight - Main CLI Entry Point

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;

use failsight::cli::{Args, Commands, Config};
use failsight::store::EventStore;
use failsight::telemetry;
use failsight::types::now_secs;
use failsight::FailureEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(message) = args.validate() {
        eprintln!("{} {}", "Error:".red().bold(), message);
        std::process::exit(2);
    }

    let mut config = Config::load(args.config.clone())?;
    if let Some(db) = &args.db {
        config.store.db_path = db.display().to_string();
    }
    if let Some(level) = args.verbosity().log_level() {
        config.logging.level = level.to_string();
    }
    if args.json_logs {
        config.logging.json = true;
    }
    telemetry::init(&config.logging);

    match &args.command {
        Commands::Run => run_engine(config).await?,
        Commands::Patterns { limit } => show_patterns(&*open_store(&config)?, *limit)?,
        Commands::Events { since_secs } => show_events(&*open_store(&config)?, *since_secs)?,
        Commands::Predictions { limit } => show_predictions(&*open_store(&config)?, *limit)?,
        Commands::Evolutions { limit } => show_evolutions(&*open_store(&config)?, *limit)?,
        Commands::Reconcile => {
            let resolved = open_store(&config)?.reconcile_predictions(now_secs())?;
            println!("{} {} prediction(s) reconciled", "✓".green(), resolved);
        }
        Commands::Report {
            id,
            attempt,
            success,
            duration,
            ..
        } => {
            let engine = FailureEngine::open(config)?;
            engine.report_recovery(*id, attempt, *success, *duration).await?;
            println!("{} Outcome recorded for event {}", "✓".green(), id);
        }
        Commands::SuccessRate { service, error_type } => {
            let rate = open_store(&config)?.success_rate(service, error_type)?;
            println!("{}:{} success rate: {:.1}%", service, error_type, rate * 100.0);
        }
        Commands::Config => show_config(&config)?,
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<EventStore>> {
    Ok(Arc::new(EventStore::open(config.db_path())?))
}

async fn run_engine(config: Config) -> Result<()> {
    let mut engine = FailureEngine::open(config)?;
    engine.start()?;

    println!(
        "{} Monitoring {} service(s), press Ctrl-C to stop",
        "▶".green().bold(),
        engine.config().recovery.services.len()
    );

    tokio::signal::ctrl_c().await?;
    println!("\n{}", "Shutting down...".yellow());
    engine.shutdown().await;

    Ok(())
}

fn format_time(secs: f64) -> String {
    let dt: Option<DateTime<Utc>> = Utc.timestamp_opt(secs as i64, 0).single();
    dt.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{:.0}", secs))
}

fn show_patterns(store: &EventStore, limit: usize) -> Result<()> {
    let patterns = store.top_patterns(limit)?;
    if patterns.is_empty() {
        println!("{}", "No patterns learned yet".dimmed());
        return Ok(());
    }

    println!("{}", "Learned patterns".bold());
    for p in patterns {
        let rate = p.success_rate().unwrap_or(0.0) * 100.0;
        println!(
            "  {} {}/{} ({:.0}%) confidence {} last seen {}",
            p.pattern_key.cyan(),
            p.success_count,
            p.total(),
            rate,
            p.confidence.map_or("-".to_string(), |c| format!("{:.2}", c)),
            format_time(p.last_seen)
        );
        if let Some(solution) = &p.best_solution {
            println!("      best: {}", solution.green());
        }
    }
    Ok(())
}

fn show_events(store: &EventStore, since_secs: u64) -> Result<()> {
    let events = store.query_recent(now_secs() - since_secs as f64)?;
    if events.is_empty() {
        println!("{}", "No recent failures".dimmed());
        return Ok(());
    }

    for recorded in events {
        let e = &recorded.event;
        let outcome = match &e.recovery {
            Some(r) if r.success => format!("recovered by '{}' in {:.1}s", r.attempt, r.duration_secs).green(),
            Some(r) => format!("'{}' failed after {:.1}s", r.attempt, r.duration_secs).red(),
            None => "no recovery attempt".yellow(),
        };
        println!(
            "  #{} {} {}:{} {} - {}",
            recorded.id,
            format_time(e.timestamp),
            e.service.cyan(),
            e.container_id,
            e.error_type,
            outcome
        );
    }
    Ok(())
}

fn show_predictions(store: &EventStore, limit: usize) -> Result<()> {
    let predictions = store.recent_predictions(limit)?;
    if predictions.is_empty() {
        println!("{}", "No predictions yet".dimmed());
        return Ok(());
    }

    for p in predictions {
        let verdict = match p.was_correct {
            Some(true) => "correct".green(),
            Some(false) => "missed".red(),
            None => "pending".yellow(),
        };
        println!(
            "  {} {}:{} {} confidence {:.2} expected {} [{}]",
            format_time(p.timestamp),
            p.service.cyan(),
            p.container_id,
            p.predicted_error_type,
            p.confidence,
            format_time(p.predicted_time),
            verdict
        );
    }
    Ok(())
}

fn show_evolutions(store: &EventStore, limit: usize) -> Result<()> {
    let evolutions = store.recent_evolutions(limit)?;
    if evolutions.is_empty() {
        println!("{}", "No evolution forecasts yet".dimmed());
        return Ok(());
    }

    for p in evolutions {
        println!(
            "  {} {} confidence {:.2} by {}",
            p.pattern_type.cyan(),
            p.emergence_type.to_string().bold(),
            p.evolution_confidence,
            p.evolution_time.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", "failsight configuration".bold());
    if let Some(path) = Config::default_path() {
        println!("  File: {}", path.display());
    }
    println!("  Store: {}", config.db_path().display());
    println!();
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
