use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{CycleReport, ListResult, PollReport, ProgressEvent, ProgressSink, ShowResult};
use crate::discovery::SyncReport;
use crate::download::AdvanceReport;
use crate::reconcile::ReconcileReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_show(result: &ShowResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_sync(result: &SyncReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_advance(result: &AdvanceReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reconcile(result: &ReconcileReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cycle(result: &CycleReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_poll(result: &PollReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
