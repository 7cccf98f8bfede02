//! Append-only failure log: one timestamped line per case-level failure,
//! rotated by size with numbered backups so long batches don't grow a
//! single unbounded file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

const MAX_LOG_BYTES: u64 = 1_000_000;
const LOG_BACKUPS: u32 = 3;

pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one failure line. Callers treat errors here as non-fatal;
    /// a case must never be skipped because the log could not be written.
    pub fn record(&self, processo: &str, mensagem: &str) -> Result<()> {
        self.rotate_if_needed();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Não foi possível abrir o log {}", self.path.display()))?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(
            file,
            "{timestamp} | ERROR | Falha no processo {processo} | {mensagem}"
        )
        .with_context(|| format!("Não foi possível escrever no log {}", self.path.display()))?;
        Ok(())
    }

    fn rotate_if_needed(&self) {
        let Ok(meta) = fs::metadata(&self.path) else {
            return;
        };
        if meta.len() < MAX_LOG_BYTES {
            return;
        }
        for i in (1..LOG_BACKUPS).rev() {
            let from = self.backup_path(i);
            if from.exists() {
                let _ = fs::rename(&from, self.backup_path(i + 1));
            }
        }
        let _ = fs::rename(&self.path, self.backup_path(1));
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.path.display(), index))
    }
}
