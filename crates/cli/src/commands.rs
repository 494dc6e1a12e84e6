//! Command handlers. Each is a thin wrapper over Store or Crawler.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{info, warn};

use pagewarm_core::warmup::{RunReport, StopReason, WARMUP_JOB};

use crate::app::App;
use crate::args::Commands;
use crate::error::CommandError;
use crate::format::{entry_line, format_bytes, report_line};

pub async fn run(app: &App, command: Commands, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Delete { url } => delete(app, &url, out).await,
        Commands::Flush { full } => flush(app, full, out).await,
        Commands::Size { human_readable, precise } => size(app, human_readable, precise, out).await,
        Commands::Inspect { human_readable, json } => inspect(app, human_readable, json, out).await,
        Commands::Warm { budget_secs } => warm(app, budget_secs.map(Duration::from_secs), out).await,
        Commands::Tick => tick(app, out).await,
        Commands::Daemon => daemon(app, out).await,
        Commands::Status => status(app, out).await,
    }
}

async fn delete(app: &App, url: &str, out: &mut impl Write) -> Result<()> {
    if !app.store.delete(url).await {
        return Err(CommandError::CacheFailed(format!("could not delete {url}")).into());
    }
    writeln!(out, "deleted {url}")?;
    Ok(())
}

async fn flush(app: &App, full: bool, out: &mut impl Write) -> Result<()> {
    if !app.store.flush(full).await {
        return Err(CommandError::CacheFailed(format!("could not flush {}", app.store.root().display())).into());
    }
    writeln!(out, "flushed {}", app.store.root().display())?;

    if !full {
        app.crawler.on_invalidation().await?;
        if app.config.warmup_enabled {
            writeln!(out, "warm-up scheduled in {}s", app.config.warmup_delay_secs)?;
        }
    }
    Ok(())
}

async fn size(app: &App, human_readable: bool, precise: bool, out: &mut impl Write) -> Result<()> {
    let bytes = app.store.get_size(precise).await;
    if human_readable {
        writeln!(out, "{}", format_bytes(bytes))?;
    } else {
        writeln!(out, "{bytes}")?;
    }
    Ok(())
}

async fn inspect(app: &App, human_readable: bool, json: bool, out: &mut impl Write) -> Result<()> {
    let entries = app.store.inspect().await;
    if json {
        serde_json::to_writer_pretty(&mut *out, &entries)?;
        writeln!(out)?;
        return Ok(());
    }
    for entry in &entries {
        writeln!(out, "{}", entry_line(entry, human_readable))?;
    }
    Ok(())
}

async fn warm(app: &App, budget: Option<Duration>, out: &mut impl Write) -> Result<()> {
    let report = app.crawler.run(budget).await;
    print_report(&report, out)
}

async fn tick(app: &App, out: &mut impl Write) -> Result<()> {
    match app.crawler.run_if_due(Some(app.config.tick_interval())).await? {
        Some(report) => print_report(&report, out),
        None => {
            writeln!(out, "warm-up not due")?;
            Ok(())
        }
    }
}

/// Tick until Ctrl-C. A failed run is logged and the loop goes on.
async fn daemon(app: &App, out: &mut impl Write) -> Result<()> {
    let period = app.config.tick_interval().max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(tick_secs = period.as_secs(), "daemon started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("daemon stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                match app.crawler.run_if_due(Some(period)).await {
                    Ok(Some(report)) => writeln!(out, "{}", report_line(&report))?,
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "tick failed"),
                }
                if started.elapsed() > period {
                    warn!(elapsed_ms = started.elapsed().as_millis() as u64, "tick overran its interval");
                }
            }
        }
    }
}

async fn status(app: &App, out: &mut impl Write) -> Result<()> {
    let state = app.crawler.state().await?;
    let remaining = app.crawler.remaining_count().await?;
    let next = app.scheduler.next_scheduled(WARMUP_JOB).await?;

    writeln!(out, "state\t{}", serde_json::to_value(state)?.as_str().unwrap_or("unknown"))?;
    writeln!(out, "remaining\t{remaining}")?;
    writeln!(out, "next_run\t{}", next.map_or_else(|| "-".to_string(), |at| at.to_rfc3339()))?;
    Ok(())
}

fn print_report(report: &RunReport, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", report_line(report))?;
    if report.stop == StopReason::Failed {
        return Err(CommandError::WarmupFailed(format!("stopped with {} items left", report.remaining)).into());
    }
    Ok(())
}
