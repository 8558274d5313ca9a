// Session transcript: every session event appended to a JSONL file

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::refinement::SessionEvent;

/// One line of the transcript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: SessionEvent,
}

/// Buffered JSONL writer for session events.
pub struct TranscriptLogger {
    path: PathBuf,
    session_id: String,
    buffer: Vec<TranscriptEntry>,
    flush_threshold: usize,
}

impl TranscriptLogger {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create transcript directory {}", parent.display()))?;
        }
        Ok(Self {
            path,
            session_id: session_id.into(),
            buffer: Vec::new(),
            flush_threshold: 10,
        })
    }

    pub fn record(&mut self, event: &SessionEvent) -> Result<()> {
        self.buffer.push(TranscriptEntry {
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            event: event.clone(),
        });
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        debug!(entries = self.buffer.len(), path = %self.path.display(), "Flushing transcript");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open transcript {}", self.path.display()))?;
        for entry in self.buffer.drain(..) {
            let line = serde_json::to_string(&entry).context("Failed to serialize transcript entry")?;
            writeln!(file, "{line}").context("Failed to write transcript entry")?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TranscriptLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("Failed to flush transcript on drop: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Phase;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn test_record_and_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("session.jsonl");
        let id = Uuid::new_v4().to_string();

        let mut logger = TranscriptLogger::new(&path, id.clone()).unwrap();
        logger
            .record(&SessionEvent::StateChange {
                from: Phase::Idle,
                to: Phase::Drafting,
            })
            .unwrap();
        logger.record(&SessionEvent::Progress("working".into())).unwrap();
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"type\":\"state_change\""));
        assert!(lines[0].contains(&id));
        assert!(lines[1].contains("\"data\":\"working\""));
    }

    #[test]
    fn test_drop_flushes_buffer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.jsonl");
        {
            let mut logger = TranscriptLogger::new(&path, Uuid::new_v4().to_string()).unwrap();
            logger.record(&SessionEvent::Error("boom".into())).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("boom"));
    }
}
