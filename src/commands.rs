//! One-shot CLI commands
//!
//! Print queue counters or a page of jobs and exit. These share the gateways
//! with the dashboard but never enter raw mode.

use color_eyre::eyre::{Context, Result};
use crossterm::style::Stylize;
use serde::Serialize;
use tracing::debug;

use crate::gateway::{Gateways, list_all_stats};
use crate::model::{JobSnapshot, QueueSnapshot, StateFilter, format_timestamp};
use crate::style::{BullviewStyle, styled_state};

/// JSON shape of `bullview jobs --json`
#[derive(Serialize)]
struct JobsJson<'a> {
    queue: &'a str,
    filter: &'a str,
    jobs: &'a [JobSnapshot],
}

fn print_queue_table(queues: &[QueueSnapshot]) {
    println!("{}", "QUEUES:".header());
    if queues.is_empty() {
        println!("  {}", "(none)".dim());
        return;
    }

    let width = queues.iter().map(|q| q.name.len()).max().unwrap_or(0).max(5);
    println!(
        "  {:<width$}  {:>8} {:>8} {:>10} {:>8} {:>8}",
        "NAME", "WAITING", "ACTIVE", "COMPLETED", "FAILED", "DELAYED"
    );
    for queue in queues {
        let c = queue.counts;
        let name = format!("{:<width$}", queue.name);
        let failed = format!("{:>8}", c.failed);
        println!(
            "  {}  {:>8} {:>8} {:>10} {} {:>8}{}",
            name.as_str().bold(),
            c.waiting,
            c.active,
            c.completed,
            if c.failed > 0 { failed.as_str().error().to_string() } else { failed },
            c.delayed,
            if queue.paused {
                format!("  {}", "paused".warning())
            } else {
                String::new()
            }
        );
    }
}

/// Print every queue with its counters
///
/// # Errors
/// Returns an error if Redis cannot be queried or JSON serialization fails.
pub async fn queues(gateways: &Gateways, json_output: bool) -> Result<()> {
    let queues = list_all_stats(gateways.queues.as_ref())
        .await
        .wrap_err("Failed to list queues")?;
    debug!(count = queues.len(), "Fetched queue stats");

    if json_output {
        println!("{}", serde_json::to_string_pretty(&queues)?);
    } else {
        print_queue_table(&queues);
    }
    Ok(())
}

fn print_job(job: &JobSnapshot) {
    println!(
        "  {:>8}  {:<10}  {}  {}",
        job.id.as_str().technical(),
        styled_state(job.state),
        format_timestamp(job.created_at).dim(),
        job.name.as_str().bold(),
    );
    if let Some(reason) = &job.failure_reason {
        println!("            {}", reason.as_str().error());
    }
}

/// Print the newest jobs of one queue
///
/// # Errors
/// Returns an error if `state` is not a known filter, Redis cannot be
/// queried, or JSON serialization fails.
pub async fn jobs(
    gateways: &Gateways,
    queue: &str,
    state: &str,
    page_size: usize,
    json_output: bool,
) -> Result<()> {
    let filter: StateFilter = state.parse()?;
    let jobs = gateways
        .jobs
        .list_jobs(queue, filter, 0, page_size.saturating_sub(1))
        .await
        .wrap_err_with(|| format!("Failed to list jobs of '{queue}'"))?;

    if json_output {
        let output = JobsJson {
            queue,
            filter: filter.label(),
            jobs: &jobs,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{} {} {}",
        "JOBS:".header(),
        queue.technical(),
        format!("({filter})").dim()
    );
    if jobs.is_empty() {
        println!("  {}", "(none)".dim());
    }
    for job in &jobs {
        print_job(job);
    }
    Ok(())
}
