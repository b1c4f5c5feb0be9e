//! Durable storage for flushed batches.
//!
//! Two JSON documents live in the data directory:
//! - the persisted log (`events_data.json`): every batch flushed since the
//!   last successful retrain, as one ordered array;
//! - the scratch buffer (`temp.json`): only the most recent batch.
//!
//! Each append is read-existing, extend, overwrite. A missing or unreadable
//! log is treated as empty so a corrupt file never stops the pipeline.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! failed write leaves the previous document intact.

use super::event_queue::EventQueue;
use super::types::{Batch, Event};
use crate::error::{MonitorError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const LOG_FILE_NAME: &str = "events_data.json";
pub const SCRATCH_FILE_NAME: &str = "temp.json";

/// Outcome of reading a JSON array document.
#[derive(Debug)]
pub enum LogRead<T> {
    /// The file does not exist yet.
    Absent,
    Loaded(Vec<T>),
    /// The file exists but could not be parsed (including an empty file).
    Corrupt(String),
}

impl<T> LogRead<T> {
    /// Contents, with absent and corrupt documents read as empty.
    pub fn into_items(self) -> Vec<T> {
        match self {
            LogRead::Loaded(items) => items,
            LogRead::Absent | LogRead::Corrupt(_) => Vec::new(),
        }
    }
}

/// Reads a JSON array document, distinguishing "absent" from "unreadable".
pub fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<LogRead<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LogRead::Absent),
        Err(e) => return Err(MonitorError::persistence(path, e)),
    };

    match serde_json::from_slice::<Vec<T>>(&bytes) {
        Ok(items) => Ok(LogRead::Loaded(items)),
        Err(e) => Ok(LogRead::Corrupt(e.to_string())),
    }
}

/// Overwrites `path` with `items` as a JSON array.
pub fn write_json_array<T: Serialize>(path: &Path, items: &[T], pretty: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| MonitorError::persistence(parent, e))?;
        }
    }

    let bytes = if pretty {
        serde_json::to_vec_pretty(items)?
    } else {
        serde_json::to_vec(items)?
    };

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, bytes).map_err(|e| MonitorError::persistence(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| MonitorError::persistence(path, e))?;
    Ok(())
}

/// Appends `items` to the array stored at `path`. Returns the new length.
pub fn append_json_array<T>(path: &Path, items: &[T]) -> Result<usize>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let mut existing = match read_json_array::<T>(path)? {
        LogRead::Corrupt(reason) => {
            tracing::warn!(path = ?path, %reason, "Unreadable log document, starting fresh");
            Vec::new()
        }
        read => read.into_items(),
    };

    existing.extend_from_slice(items);
    write_json_array(path, &existing, false)?;
    Ok(existing.len())
}

/// The persisted log plus the scratch buffer for the current cycle.
///
/// Shared between the flush cycle and the survey scheduler; an internal
/// lock serializes their read-modify-write cycles.
#[derive(Debug)]
pub struct PersistenceLog {
    log_path: PathBuf,
    scratch_path: PathBuf,
    /// Write lock. Holds events whose append failed, written ahead of the
    /// next batch.
    unwritten: Mutex<Vec<Event>>,
}

impl PersistenceLog {
    /// Uses the default file names inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self::with_paths(dir.join(LOG_FILE_NAME), dir.join(SCRATCH_FILE_NAME))
    }

    pub fn with_paths(log_path: PathBuf, scratch_path: PathBuf) -> Self {
        Self {
            log_path,
            scratch_path,
            unwritten: Mutex::new(Vec::new()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.unwritten.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a drained batch: overwrites the scratch buffer, then appends to
    /// the persisted log. Returns the log length after the append.
    ///
    /// A scratch write failure is logged and does not prevent the append.
    pub fn persist_batch(&self, batch: &[Event]) -> Result<usize> {
        let mut unwritten = self.lock();
        self.store(&mut unwritten, batch)
    }

    /// Drains `queue` and stores the batch as one step.
    ///
    /// The drain happens under the write lock, so concurrent drainers append
    /// their batches in queue order. The drained batch is returned even when
    /// the append fails; its events are then kept and written ahead of the
    /// next batch.
    pub fn drain_and_persist(&self, queue: &EventQueue) -> (Batch, Result<usize>) {
        let mut unwritten = self.lock();
        let batch = queue.drain_all();
        let persisted = self.store(&mut unwritten, &batch);
        (batch, persisted)
    }

    /// Like [`drain_and_persist`](Self::drain_and_persist), but leaves both
    /// documents untouched when there is nothing to write.
    pub fn drain_pending(&self, queue: &EventQueue) -> (Batch, Result<Option<usize>>) {
        let mut unwritten = self.lock();
        let batch = queue.drain_all();
        if batch.is_empty() && unwritten.is_empty() {
            return (batch, Ok(None));
        }
        let persisted = self.store(&mut unwritten, &batch).map(Some);
        (batch, persisted)
    }

    /// Events held back by a failed append.
    pub fn unwritten_len(&self) -> usize {
        self.lock().len()
    }

    fn store(&self, unwritten: &mut Vec<Event>, batch: &[Event]) -> Result<usize> {
        if let Err(e) = write_json_array(&self.scratch_path, batch, true) {
            tracing::warn!(error = %e, "Failed to write scratch buffer");
        }

        if batch.is_empty() && unwritten.is_empty() {
            return Ok(read_json_array::<Event>(&self.log_path)?.into_items().len());
        }

        let mut pending = std::mem::take(unwritten);
        pending.extend_from_slice(batch);
        match append_json_array(&self.log_path, &pending) {
            Ok(len) => {
                tracing::debug!(appended = pending.len(), total = len, "Batch persisted");
                Ok(len)
            }
            Err(e) => {
                tracing::debug!(held = pending.len(), "Keeping unwritten events for retry");
                *unwritten = pending;
                Err(e)
            }
        }
    }

    /// Reads the persisted log.
    pub fn load(&self) -> Result<LogRead<Event>> {
        let _guard = self.lock();
        read_json_array(&self.log_path)
    }

    /// Reads the persisted log, treating absent or corrupt files as empty.
    pub fn events(&self) -> Result<Vec<Event>> {
        Ok(self.load()?.into_items())
    }

    /// Reads the scratch buffer.
    pub fn scratch(&self) -> Result<LogRead<Event>> {
        read_json_array(&self.scratch_path)
    }

    /// Empties the persisted log (after a successful retrain).
    pub fn truncate(&self) -> Result<()> {
        let _guard = self.lock();
        write_json_array::<Event>(&self.log_path, &[], false)?;
        tracing::info!(path = ?self.log_path, "Persisted log truncated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::EventPayload;
    use chrono::Utc;
    use tempfile::TempDir;

    fn batch(n: usize, tag: &str) -> Vec<Event> {
        (0..n)
            .map(|i| {
                Event::new(
                    Utc::now(),
                    EventPayload::WindowActivity {
                        title: format!("{tag}-{i}"),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_log_length_is_sum_of_batches() {
        let dir = TempDir::new().unwrap();
        let log = PersistenceLog::new(dir.path());

        let sizes = [3usize, 0, 5, 1];
        for (i, size) in sizes.iter().enumerate() {
            log.persist_batch(&batch(*size, &format!("c{i}"))).unwrap();
        }

        let events = log.events().unwrap();
        assert_eq!(events.len(), sizes.iter().sum::<usize>());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        PersistenceLog::new(dir.path())
            .persist_batch(&batch(2, "first"))
            .unwrap();

        let reopened = PersistenceLog::new(dir.path());
        let len = reopened.persist_batch(&batch(3, "second")).unwrap();
        assert_eq!(len, 5);

        let events = reopened.events().unwrap();
        assert_eq!(
            events[0].payload,
            EventPayload::WindowActivity {
                title: "first-0".to_string()
            }
        );
        assert_eq!(
            events[4].payload,
            EventPayload::WindowActivity {
                title: "second-2".to_string()
            }
        );
    }

    #[test]
    fn test_scratch_holds_only_latest_batch() {
        let dir = TempDir::new().unwrap();
        let log = PersistenceLog::new(dir.path());

        log.persist_batch(&batch(4, "a")).unwrap();
        log.persist_batch(&batch(2, "b")).unwrap();

        let scratch = log.scratch().unwrap().into_items();
        assert_eq!(scratch.len(), 2);

        log.persist_batch(&[]).unwrap();
        assert!(matches!(log.scratch().unwrap(), LogRead::Loaded(v) if v.is_empty()));
    }

    #[test]
    fn test_missing_log_reads_absent() {
        let dir = TempDir::new().unwrap();
        let log = PersistenceLog::new(dir.path());
        assert!(matches!(log.load().unwrap(), LogRead::Absent));
        assert!(log.events().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_log_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let log = PersistenceLog::new(dir.path());
        fs::write(log.log_path(), b"[{\"timestamp\": oops").unwrap();

        assert!(matches!(log.load().unwrap(), LogRead::Corrupt(_)));
        assert!(log.events().unwrap().is_empty());

        let len = log.persist_batch(&batch(2, "fresh")).unwrap();
        assert_eq!(len, 2);
        assert_eq!(log.events().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_file_is_corrupt_not_error() {
        let dir = TempDir::new().unwrap();
        let log = PersistenceLog::new(dir.path());
        fs::write(log.log_path(), b"").unwrap();
        assert!(matches!(log.load().unwrap(), LogRead::Corrupt(_)));
    }

    #[test]
    fn test_truncate_empties_log() {
        let dir = TempDir::new().unwrap();
        let log = PersistenceLog::new(dir.path());
        log.persist_batch(&batch(3, "x")).unwrap();

        log.truncate().unwrap();
        assert!(matches!(log.load().unwrap(), LogRead::Loaded(v) if v.is_empty()));
    }

    #[test]
    fn test_failed_append_is_written_with_next_batch() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join(LOG_FILE_NAME);
        let scratch_path = dir.path().join(SCRATCH_FILE_NAME);
        let log = PersistenceLog::with_paths(log_path.clone(), scratch_path);
        let queue = EventQueue::new();

        // A directory in place of the log makes every append fail.
        fs::create_dir(&log_path).unwrap();
        queue.enqueue(EventPayload::WindowActivity {
            title: "first".to_string(),
        });
        let (batch, persisted) = log.drain_and_persist(&queue);
        assert_eq!(batch.len(), 1);
        assert!(persisted.is_err());
        assert_eq!(log.unwritten_len(), 1);

        fs::remove_dir(&log_path).unwrap();
        queue.enqueue(EventPayload::WindowActivity {
            title: "second".to_string(),
        });
        let (batch, persisted) = log.drain_and_persist(&queue);
        assert_eq!(batch.len(), 1);
        assert_eq!(persisted.unwrap(), 2);
        assert_eq!(log.unwritten_len(), 0);

        let titles: Vec<_> = log
            .events()
            .unwrap()
            .into_iter()
            .map(|event| match event.payload {
                EventPayload::WindowActivity { title } => title,
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn test_drain_pending_skips_empty_queue() {
        let dir = TempDir::new().unwrap();
        let log = PersistenceLog::new(dir.path());
        let queue = EventQueue::new();

        let (batch, persisted) = log.drain_pending(&queue);
        assert!(batch.is_empty());
        assert_eq!(persisted.unwrap(), None);
        assert!(matches!(log.scratch().unwrap(), LogRead::Absent));

        queue.enqueue(EventPayload::FocusQuery { level: 3 });
        let (batch, persisted) = log.drain_pending(&queue);
        assert_eq!(batch.len(), 1);
        assert_eq!(persisted.unwrap(), Some(1));
    }

    #[test]
    fn test_creates_missing_data_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let log = PersistenceLog::new(&nested);
        log.persist_batch(&batch(1, "n")).unwrap();
        assert!(nested.join(LOG_FILE_NAME).exists());
    }
}
