// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ringpost ports` and `ringpost jobs` command implementations.
//!
//! These read and write the dialer database directly; no server needs to be
//! running. Output is colored when stdout is a terminal.

use std::io::IsTerminal;

use colored::Colorize;
use ringpost_config::model::RingpostConfig;
use ringpost_core::types::PortStatus;
use ringpost_core::{DialerError, DialerJob, JobStatus, Port};
use ringpost_engine::PortRegistry;
use ringpost_storage::Database;
use ringpost_storage::queries::jobs;

async fn open_registry(config: &RingpostConfig) -> Result<(Database, PortRegistry), DialerError> {
    let db = Database::from_config(&config.storage).await?;
    Ok((db.clone(), PortRegistry::new(db)))
}

/// Run `ringpost ports list`.
pub async fn run_ports_list(
    config: &RingpostConfig,
    owner_id: &str,
    json: bool,
) -> Result<(), DialerError> {
    let (db, registry) = open_registry(config).await?;
    let ports = registry.list_ports(owner_id).await?;
    db.close().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    let use_color = std::io::stdout().is_terminal();
    println!();
    println!("  ports for {owner_id}");
    println!("  {}", "-".repeat(50));
    if ports.is_empty() {
        println!("    (none registered)");
    }
    for port in &ports {
        println!("    {}", port_line(port, use_color));
    }
    println!();
    Ok(())
}

/// Run `ringpost ports register`.
pub async fn run_ports_register(
    config: &RingpostConfig,
    owner_id: &str,
    port_number: u32,
    device_label: &str,
) -> Result<(), DialerError> {
    let (db, registry) = open_registry(config).await?;
    let port = registry
        .register_port(owner_id, port_number, device_label)
        .await?;
    db.close().await?;
    println!("registered port {} ({})", port.port_number, port.device_label);
    Ok(())
}

/// Run `ringpost ports reset`.
pub async fn run_ports_reset(config: &RingpostConfig, owner_id: &str) -> Result<(), DialerError> {
    let (db, registry) = open_registry(config).await?;
    let reset = registry.reset_all(owner_id).await?;
    db.close().await?;
    println!("reset {reset} port(s) to available");
    Ok(())
}

/// Run `ringpost jobs status`.
pub async fn run_job_status(
    config: &RingpostConfig,
    job_id: &str,
    owner_id: &str,
    json: bool,
) -> Result<(), DialerError> {
    let db = Database::from_config(&config.storage).await?;
    let job = jobs::get_job(&db, job_id).await;
    db.close().await?;

    let job = job?.ok_or_else(|| DialerError::NotFound {
        entity: "job",
        id: job_id.to_string(),
    })?;
    if job.owner_id != owner_id {
        return Err(DialerError::NotOwner {
            entity: "job",
            id: job_id.to_string(),
        });
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&job).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_job(&job, std::io::stdout().is_terminal());
    }
    Ok(())
}

fn port_line(port: &Port, use_color: bool) -> String {
    let status = port.status.to_string();
    let status = if use_color {
        match port.status {
            PortStatus::Available => status.green().to_string(),
            PortStatus::Busy => status.yellow().to_string(),
            PortStatus::Error | PortStatus::Offline => status.red().to_string(),
        }
    } else {
        status
    };

    let mut line = format!("#{:<3} {:<16} {}", port.port_number, port.device_label, status);
    if let Some(call_id) = &port.current_call_id {
        line.push_str(&format!("  call={call_id}"));
    }
    if let Some(err) = &port.error_info {
        line.push_str(&format!("  ({err})"));
    }
    line
}

fn progress(job: &DialerJob) -> String {
    if job.total_calls == 0 {
        return "0/0".to_string();
    }
    let pct = u64::from(job.completed_calls) * 100 / u64::from(job.total_calls);
    format!("{}/{} ({pct}%)", job.completed_calls, job.total_calls)
}

fn print_job(job: &DialerJob, use_color: bool) {
    let status = job.status.to_string();
    let status = match (use_color, job.status) {
        (false, _) => status,
        (true, JobStatus::Completed) => status.green().to_string(),
        (true, JobStatus::Failed | JobStatus::Cancelled) => status.red().to_string(),
        (true, _) => status.yellow().to_string(),
    };

    println!();
    println!("  job {}", job.id);
    println!("  {}", "-".repeat(35));
    println!("    Campaign:    {}", job.campaign_id);
    println!("    Status:      {status}");
    println!("    Progress:    {}", progress(job));
    println!(
        "    Outcomes:    {} successful, {} failed",
        job.successful_calls, job.failed_calls
    );
    println!("    Concurrency: {}", job.max_concurrent_calls);
    println!("    Created:     {}", job.created_at);
    if let Some(ended) = &job.ended_at {
        println!("    Ended:       {ended}");
    }
    println!();
}
