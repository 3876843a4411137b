use crate::error::ScanError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Navigate,
    Click,
    Fill,
    Submit,
    Error,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "NAVIGATE",
            ActionKind::Click => "CLICK",
            ActionKind::Fill => "FILL",
            ActionKind::Submit => "SUBMIT",
            ActionKind::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NAVIGATE" => Ok(ActionKind::Navigate),
            "CLICK" => Ok(ActionKind::Click),
            "FILL" => Ok(ActionKind::Fill),
            "SUBMIT" => Ok(ActionKind::Submit),
            "ERROR" => Ok(ActionKind::Error),
            other => Err(format!("unknown action kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub target: String,
    pub result_location: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Durable storage for ledger entries. `persist` must not return until the
/// entry would survive a crash.
pub trait LedgerSink: Send {
    fn persist(&mut self, entry: &LedgerEntry) -> io::Result<()>;
}

/// One JSON object per line, synced after every entry.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl LedgerSink for JsonlSink {
    fn persist(&mut self, entry: &LedgerEntry) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

pub type LedgerObserver = Arc<dyn Fn(&LedgerEntry) + Send + Sync>;

/// Append-only record of every action taken during a run.
#[derive(Default)]
pub struct ActionLedger {
    entries: Vec<LedgerEntry>,
    sinks: Vec<Box<dyn LedgerSink>>,
    observer: Option<LedgerObserver>,
}

impl ActionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Box<dyn LedgerSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_observer(mut self, observer: LedgerObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Persists to every sink before the entry becomes part of the ledger.
    pub fn append(
        &mut self,
        kind: ActionKind,
        target: impl Into<String>,
        result_location: Option<String>,
        success: bool,
        detail: Option<String>,
    ) -> Result<&LedgerEntry, ScanError> {
        let entry = LedgerEntry {
            sequence: self.entries.len() as u64 + 1,
            timestamp: Utc::now(),
            kind,
            target: target.into(),
            result_location,
            success,
            detail,
        };

        for sink in self.sinks.iter_mut() {
            sink.persist(&entry)?;
        }
        debug!("[{}] {} {} -> {:?}", entry.sequence, entry.kind, entry.target, entry.result_location);

        if let Some(observer) = &self.observer {
            observer(&entry);
        }
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn into_entries(self) -> Vec<LedgerEntry> {
        self.entries
    }
}

impl std::fmt::Debug for ActionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLedger")
            .field("entries", &self.entries.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Reads back a JSONL ledger, stopping at the first torn line.
pub fn read_jsonl(path: &Path) -> io::Result<Vec<LedgerEntry>> {
    let content = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => break,
        }
    }
    Ok(entries)
}
