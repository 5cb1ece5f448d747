//! JsonlEventSink - JSON lines のイベントログ
//!
//! Every event becomes one line. The file is only ever appended to; reading it
//! back is used by the `log` and `report` commands.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::domain::{DomainEvent, ErrorReport, ErrorSeverity, IterationLogEntry, IterationStatus};
use crate::ports::{EventSink, EventSinkError};

#[derive(Debug, thiserror::Error)]
pub enum LogReadError {
    #[error("failed to read event log: {0}")]
    Io(#[from] io::Error),

    #[error("{}:{line}: malformed event: {source}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct JsonlEventSink {
    path: PathBuf,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All events in file order. A missing file reads as empty; blank lines are
    /// skipped.
    pub fn read_events(&self) -> Result<Vec<DomainEvent>, LogReadError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|source| LogReadError::Malformed {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Only the per-iteration entries.
    pub fn iteration_entries(&self) -> Result<Vec<IterationLogEntry>, LogReadError> {
        Ok(self
            .read_events()?
            .into_iter()
            .filter_map(|event| match event {
                DomainEvent::IterationLogged(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// Error reports at or above `min_severity` (all when `None`).
    pub fn error_reports(
        &self,
        min_severity: Option<ErrorSeverity>,
    ) -> Result<Vec<ErrorReport>, LogReadError> {
        Ok(self
            .read_events()?
            .into_iter()
            .filter_map(|event| match event {
                DomainEvent::ErrorReported(report)
                    if min_severity.is_none_or(|min| report.severity >= min) =>
                {
                    Some(report)
                }
                _ => None,
            })
            .collect())
    }

    /// Iteration entries matching `status` (if given) with
    /// `iteration_number >= min_iteration` (if given).
    pub fn filter_entries(
        &self,
        status: Option<IterationStatus>,
        min_iteration: Option<u32>,
    ) -> Result<Vec<IterationLogEntry>, LogReadError> {
        let mut entries = self.iteration_entries()?;
        entries.retain(|entry| {
            status.is_none_or(|s| entry.status == s)
                && min_iteration.is_none_or(|min| entry.iteration_number >= min)
        });
        Ok(entries)
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), EventSinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        tracing::trace!(event = event.name(), path = %self.path.display(), "appended event");
        Ok(())
    }
}
