//! `costbot`: preview, send, or schedule the cloud cost report, or replay an inbound event.

mod event_input;
mod schedule;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{info, warn};

use costbot_clients::Providers;
use costbot_core::{CostbotConfig, Dispatcher, Outcome, Trigger, init_observability};

use crate::event_input::read_event;
use crate::schedule::{normalize_cron, parse_schedule, run_schedule};

#[derive(Debug, Parser)]
#[command(name = "costbot", version, about = "AWS cost report bot for Slack")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the report and print it without delivering.
    Report,
    /// Build the report and push it to the configured channel.
    Send,
    /// Run the inbound entry point on a Lambda-style JSON event and print the result.
    Handle {
        /// Event file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        event: String,
    },
    /// Push the report on every cron tick (5- or 7-field expression).
    Schedule {
        /// Overrides COSTBOT_SCHEDULE.
        #[arg(long)]
        cron: Option<String>,
        /// Stop after the first tick.
        #[arg(long)]
        once: bool,
    },
}

/// Load the nearest `.env` in `dir` or its ancestors. Variables already set win.
fn load_env(dir: &Path) -> Option<PathBuf> {
    let path = dir
        .ancestors()
        .map(|d| d.join(".env"))
        .find(|p| p.is_file())?;
    dotenvy::from_path(&path).ok()?;
    Some(path)
}

/// Stdout carries exactly one JSON line: the invocation result.
fn run_handle(
    dispatcher: &Dispatcher<'_>,
    event: &Value,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = dispatcher.handle(event);
    serde_json::to_writer(&mut *out, &result)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Ok(cwd) = std::env::current_dir() {
        load_env(&cwd);
    }
    init_observability();
    let cli = Cli::parse();

    let config = CostbotConfig::from_env()?;
    let providers = Providers::from_config(&config)?;
    let dispatcher = Dispatcher::new(&config, providers.collaborators());

    match cli.command {
        Command::Report => {
            println!("{}", dispatcher.generate_report()?);
        }
        Command::Send => match dispatcher.dispatch(Trigger::ManualRequest) {
            Outcome::ReportFailed { error, .. } => return Err(error.into()),
            outcome => println!("{}", outcome.into_result().body),
        },
        Command::Handle { event } => {
            let event = read_event(&event)?;
            run_handle(&dispatcher, &event, &mut std::io::stdout().lock())?;
        }
        Command::Schedule { cron, once } => {
            let expr = cron.unwrap_or_else(|| config.report.schedule.clone());
            let schedule = parse_schedule(&expr)?;
            info!(
                event = "schedule.started",
                domain = "schedule",
                cron = %normalize_cron(&expr),
                once = once
            );
            let tick_event = json!({ "source": "aws.events", "detail-type": "Scheduled Event" });
            run_schedule(&schedule, once, |tick| {
                let result = dispatcher.handle(&tick_event);
                if result.status_code == 200 {
                    info!(
                        event = "schedule.tick_completed",
                        domain = "schedule",
                        tick = %tick,
                        body = %result.body
                    );
                } else {
                    warn!(
                        event = "schedule.tick_failed",
                        domain = "schedule",
                        tick = %tick,
                        status = result.status_code,
                        body = %result.body
                    );
                }
            })?;
        }
    }
    Ok(())
}
