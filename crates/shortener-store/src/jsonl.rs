// ABOUTME: Append-only JSONL log of created records, used by the memory store for durability.
// ABOUTME: Provides batched crash-safe append, sequential replay, and repair for truncated files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shortener_core::{Record, StoreError};
use thiserror::Error;

/// Errors that can occur during JSONL log operations.
#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("log {0} refuses writes after a failed rollback")]
    Poisoned(String),
}

impl From<JsonlError> for StoreError {
    fn from(e: JsonlError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// One persisted creation. Deletion state is deliberately not part of the
/// format; replayed records always come back live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub owner: String,
    pub url: String,
}

impl From<&Record> for LogEntry {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            owner: record.owner.clone(),
            url: record.url.clone(),
        }
    }
}

impl From<LogEntry> for Record {
    fn from(entry: LogEntry) -> Self {
        Record::new(entry.id, entry.owner, entry.url)
    }
}

/// An append-only JSONL record log backed by a file.
/// Each line is a single JSON-serialized LogEntry followed by a newline.
pub struct JsonlLog {
    path: PathBuf,
    file: File,
    /// Set when a failed append could not be truncated away.
    poisoned: bool,
}

impl JsonlLog {
    /// Returns the path to the underlying JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) a JSONL log file at the given path.
    /// Creates parent directories if they do not exist.
    pub fn open(path: &Path) -> Result<Self, JsonlError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            poisoned: false,
        })
    }

    /// True once a failed append left bytes that could not be removed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Append entries as a single buffered write followed by one fsync.
    /// An empty slice writes nothing. On failure the file is truncated back
    /// to its previous length, so a rejected append never reappears on replay.
    pub fn append_all(&mut self, entries: &[LogEntry]) -> Result<(), JsonlError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        self.append_with(&buf, |file, buf| {
            file.write_all(buf)?;
            file.sync_all()
        })
    }

    fn append_with<F>(&mut self, buf: &[u8], write: F) -> Result<(), JsonlError>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        if self.poisoned {
            return Err(JsonlError::Poisoned(self.path.display().to_string()));
        }

        let len = self.file.metadata()?.len();
        if let Err(e) = write(&mut self.file, buf) {
            let rollback = self.file.set_len(len).and_then(|_| self.file.sync_all());
            if let Err(rollback_err) = rollback {
                tracing::error!(
                    "could not roll back failed append to {}: {}",
                    self.path.display(),
                    rollback_err
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Replay all entries from a JSONL file, returning them in order.
    /// Empty lines are skipped. Returns an empty Vec for empty files.
    pub fn replay(path: &Path) -> Result<Vec<LogEntry>, JsonlError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }

    /// Rewrite the file keeping only complete, parseable lines.
    /// Uses temp-file + fsync + rename so a crash mid-repair loses nothing.
    /// Returns the count of entries retained.
    pub fn repair(path: &Path) -> Result<usize, JsonlError> {
        let contents = fs::read_to_string(path)?;
        let mut valid_lines: Vec<&str> = Vec::new();
        let mut dropped = 0usize;

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if serde_json::from_str::<LogEntry>(line).is_ok() {
                valid_lines.push(line);
            } else {
                dropped += 1;
            }
        }

        // A missing final newline would glue the next append onto the last entry.
        if dropped == 0 && (contents.is_empty() || contents.ends_with('\n')) {
            return Ok(valid_lines.len());
        }

        tracing::warn!(
            "dropping {} unreadable line(s) from {}",
            dropped,
            path.display()
        );

        let tmp_path = path.with_extension("jsonl.tmp");
        let mut tmp_file = File::create(&tmp_path)?;
        for line in &valid_lines {
            writeln!(tmp_file, "{}", line)?;
        }
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, path)?;

        // Best-effort: the rename already landed.
        if let Some(parent) = path.parent()
            && let Ok(dir) = File::open(parent)
        {
            let _ = dir.sync_all();
        }

        Ok(valid_lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: u64, url: &str) -> LogEntry {
        LogEntry {
            id,
            owner: "u1".to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn append_and_replay_keep_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        let mut log = JsonlLog::open(&path).unwrap();
        log.append_all(&[entry(1000, "a")]).unwrap();
        log.append_all(&[entry(1001, "b"), entry(1002, "c")]).unwrap();

        let entries = JsonlLog::replay(&path).unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1000, 1001, 1002]);
        assert_eq!(entries[2].url, "c");
    }

    #[test]
    fn line_format_has_no_delete_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        let mut log = JsonlLog::open(&path).unwrap();
        log.append_all(&[entry(1000, "https://a.example")]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{\"id\":1000,\"owner\":\"u1\",\"url\":\"https://a.example\"}\n");
    }

    #[test]
    fn failed_append_is_truncated_away() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        let mut log = JsonlLog::open(&path).unwrap();
        log.append_all(&[entry(1000, "a")]).unwrap();

        // Half the batch reaches the file, then the sync fails.
        let batch = b"{\"id\":1001,\"owner\":\"u1\",\"url\":\"b\"}\n{\"id\":1002,";
        let err = log
            .append_with(batch, |file, buf| {
                file.write_all(buf)?;
                Err(io::Error::other("fsync failed"))
            })
            .unwrap_err();
        assert!(matches!(err, JsonlError::Io(_)));
        assert!(!log.is_poisoned());

        // The next append reuses id 1001 and must be the only 1001 on replay.
        log.append_all(&[entry(1001, "z")]).unwrap();
        let entries = JsonlLog::replay(&path).unwrap();
        assert_eq!(entries, vec![entry(1000, "a"), entry(1001, "z")]);
    }

    #[test]
    fn poisoned_log_refuses_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        let mut log = JsonlLog::open(&path).unwrap();
        log.poisoned = true;

        let err = log.append_all(&[entry(1000, "a")]).unwrap_err();
        assert!(matches!(err, JsonlError::Poisoned(_)));
        assert!(JsonlLog::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("urls.jsonl");

        let log = JsonlLog::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(log.path(), path.as_path());
    }

    #[test]
    fn replay_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.jsonl");
        File::create(&path).unwrap();

        assert!(JsonlLog::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn repair_truncates_partial_last_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("torn.jsonl");

        let mut log = JsonlLog::open(&path).unwrap();
        log.append_all(&[entry(1000, "a"), entry(1001, "b")]).unwrap();
        drop(log);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, r#"{{"id":1002,"owner":"u1","ur"#).unwrap();
        drop(file);

        assert!(JsonlLog::replay(&path).is_err());

        let count = JsonlLog::repair(&path).unwrap();
        assert_eq!(count, 2);

        let entries = JsonlLog::replay(&path).unwrap();
        assert_eq!(entries, vec![entry(1000, "a"), entry(1001, "b")]);
    }

    #[test]
    fn repair_no_op_on_clean_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.jsonl");

        let mut log = JsonlLog::open(&path).unwrap();
        log.append_all(&[entry(1000, "a"), entry(1001, "b")]).unwrap();
        drop(log);

        assert_eq!(JsonlLog::repair(&path).unwrap(), 2);
        assert!(!path.with_extension("jsonl.tmp").exists());
    }
}
