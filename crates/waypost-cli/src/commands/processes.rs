//! `waypost processes`, `waypost show` and `waypost events`.

use anyhow::{Result, bail};
use clap::Args;

use waypost_audit::{AuditService, Process, ProcessFilter, ProcessStatus, StoredEvent};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only processes of this organization.
    #[arg(long)]
    pub org: Option<u32>,

    /// Only processes in this status (running, failed, finished).
    #[arg(long)]
    pub status: Option<ProcessStatus>,

    /// Only processes acting on this resource.
    #[arg(long)]
    pub resource: Option<String>,

    /// Only processes of this workflow type.
    #[arg(long = "type")]
    pub process_type: Option<String>,

    /// Only direct children of this process.
    #[arg(long)]
    pub parent: Option<String>,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Print JSON instead of a table.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl ListArgs {
    fn filter(&self) -> ProcessFilter {
        ProcessFilter {
            org_id: self.org,
            parent_id: self.parent.clone(),
            resource_id: self.resource.clone(),
            process_type: self.process_type.clone(),
            status: self.status,
            limit: Some(self.limit),
            ..Default::default()
        }
    }
}

pub async fn run_list(service: &AuditService, args: &ListArgs) -> Result<()> {
    let processes = service.list_processes(&args.filter()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&processes)?);
        return Ok(());
    }

    if processes.is_empty() {
        println!("No processes recorded.");
        return Ok(());
    }

    for process in &processes {
        println!("{}", process_line(process));
    }
    Ok(())
}

pub async fn run_show(service: &AuditService, id: &str) -> Result<()> {
    let Some(details) = service.process_details(id).await? else {
        bail!("process '{}' not found", id);
    };

    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

pub async fn run_events(service: &AuditService, id: &str) -> Result<()> {
    let events = service.list_events(id).await?;
    if events.is_empty() {
        println!("No events recorded for {}.", id);
        return Ok(());
    }

    for event in &events {
        println!("{}", event_line(event));
    }
    Ok(())
}

/// One-line summary of a process.
pub fn process_line(process: &Process) -> String {
    let mut line = format!(
        "{} {:<8} type={} org={} resource={} started={}",
        process.id,
        process.status,
        process.process_type,
        process.org_id,
        process.resource_id,
        process.started_at.format("%Y-%m-%dT%H:%M:%SZ"),
    );

    if !process.parent_id.is_empty() {
        line.push_str(&format!(" parent={}", process.parent_id));
    }
    if let Some(finished_at) = process.finished_at {
        line.push_str(&format!(
            " duration={}s",
            (finished_at - process.started_at).num_seconds()
        ));
    }
    if !process.log.is_empty() {
        line.push_str(&format!(" log=\"{}\"", process.log.replace('"', "'")));
    }

    line
}

/// One-line summary of an event.
pub fn event_line(stored: &StoredEvent) -> String {
    let event = &stored.event;
    let mut line = format!(
        "#{} [{}] {} {}",
        stored.id,
        event.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
        event.event_type,
        event.status,
    );
    if !event.log.is_empty() {
        line.push_str(&format!(" log=\"{}\"", event.log.replace('"', "'")));
    }
    line
}
