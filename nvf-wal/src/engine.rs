//! The WAL engine: validate, journal, buffer, flush.
//!
//! `append` returns only after the blob is durably journaled; the in-memory
//! copy exists purely to feed `flush`. Journal failures never enqueue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::blob::{AuditBlob, WalLine};
use crate::error::WalError;
use crate::journal::WalJournal;
use crate::writer::Writer;

/// Outcome of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// How many buffered blobs the writer accepted. Zero when another flush
    /// was already running.
    pub accepted: usize,
}

pub struct WalEngine {
    journal: Arc<WalJournal>,
    writer: Arc<dyn Writer>,
    queue: Mutex<VecDeque<AuditBlob>>,
    flushing: AtomicBool,
}

impl WalEngine {
    pub fn new(journal: Arc<WalJournal>, writer: Arc<dyn Writer>) -> Self {
        Self {
            journal,
            writer,
            queue: Mutex::new(VecDeque::new()),
            flushing: AtomicBool::new(false),
        }
    }

    pub fn journal(&self) -> &Arc<WalJournal> {
        &self.journal
    }

    /// Validate, serialize and journal one blob, then buffer it for the next
    /// flush. On error nothing is buffered.
    pub fn append(&self, blob: AuditBlob) -> Result<(), WalError> {
        blob.check_contract().map_err(WalError::EntryContractInvalid)?;

        let frame = WalLine::now(blob.clone())
            .to_frame()
            .map_err(|e| WalError::SerializeFailed(e.to_string()))?;
        self.journal.append(&frame)?;

        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(blob);
        Ok(())
    }

    /// Sequential append; the first failure aborts and reports its index.
    pub fn append_batch(&self, blobs: Vec<AuditBlob>) -> Result<(), WalError> {
        for (index, blob) in blobs.into_iter().enumerate() {
            self.append(blob).map_err(|err| WalError::BatchAppendFailed {
                index,
                detail: err.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Hand the currently buffered blobs to the writer. At most one flush
    /// runs at a time; reentrant calls return `accepted: 0`. On success
    /// exactly the flushed items leave the queue; appends that raced in
    /// during the flush stay buffered.
    pub async fn flush(&self) -> Result<FlushOutcome, WalError> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("flush already in progress");
            return Ok(FlushOutcome { accepted: 0 });
        }

        let result = self.flush_inner().await;
        self.flushing.store(false, Ordering::Release);
        result
    }

    async fn flush_inner(&self) -> Result<FlushOutcome, WalError> {
        let snapshot: Vec<AuditBlob> = {
            let queue = self
                .queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.iter().cloned().collect()
        };
        if snapshot.is_empty() {
            return Ok(FlushOutcome { accepted: 0 });
        }

        let count = snapshot.len();
        if let Err(err) = self.writer.write_batch(&snapshot).await {
            warn!(count, error = %err, "flush rejected by writer");
            return Err(WalError::PersistFailed(err.to_string()));
        }

        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        queue.drain(..count);
        debug!(count, remaining = queue.len(), "flush delivered");
        Ok(FlushOutcome { accepted: count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MockWriter;
    use nvf_config::WalConfig;
    use tempfile::tempdir;

    fn blob(rid: &str) -> AuditBlob {
        AuditBlob::new(
            "gateway",
            1_700_000_000_000,
            rid,
            serde_json::json!({"phase": "begin"}),
        )
    }

    fn engine(dir: &std::path::Path, writer: Arc<MockWriter>) -> WalEngine {
        let journal = Arc::new(WalJournal::open(WalConfig::rooted_at(dir)).unwrap());
        WalEngine::new(journal, writer)
    }

    #[tokio::test]
    async fn append_journals_then_buffers() {
        let td = tempdir().unwrap();
        let writer = Arc::new(MockWriter::new());
        let engine = engine(td.path(), writer.clone());

        engine.append(blob("r1")).unwrap();
        engine.append(blob("r2")).unwrap();
        assert_eq!(engine.pending(), 2);

        let content = std::fs::read_to_string(engine.journal().current_segment()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"requestId\":\"r1\""));
    }

    #[tokio::test]
    async fn contract_violations_never_reach_the_journal() {
        let td = tempdir().unwrap();
        let writer = Arc::new(MockWriter::new());
        let engine = engine(td.path(), writer);

        let bad = AuditBlob::new("", 1, "r1", serde_json::json!({"phase": "begin"}));
        assert!(matches!(
            engine.append(bad),
            Err(WalError::EntryContractInvalid(_))
        ));
        assert_eq!(engine.pending(), 0);

        let content = std::fs::read_to_string(engine.journal().current_segment()).unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn batch_append_reports_failing_index() {
        let td = tempdir().unwrap();
        let writer = Arc::new(MockWriter::new());
        let engine = engine(td.path(), writer);

        let bad = AuditBlob::new("svc", 1, "", serde_json::json!({"phase": "end"}));
        let err = engine
            .append_batch(vec![blob("r1"), bad, blob("r3")])
            .expect_err("second element violates the contract");
        assert!(matches!(err, WalError::BatchAppendFailed { index: 1, .. }));
        assert_eq!(engine.pending(), 1, "only the first element was accepted");
    }

    #[tokio::test]
    async fn flush_removes_exactly_what_was_delivered() {
        let td = tempdir().unwrap();
        let writer = Arc::new(MockWriter::new());
        let engine = engine(td.path(), writer.clone());

        engine.append(blob("r1")).unwrap();
        engine.append(blob("r2")).unwrap();

        let outcome = engine.flush().await.unwrap();
        assert_eq!(outcome.accepted, 2);
        assert_eq!(engine.pending(), 0);
        assert_eq!(writer.delivered().len(), 2);
    }

    #[tokio::test]
    async fn failed_flush_keeps_the_queue() {
        let td = tempdir().unwrap();
        let writer = Arc::new(MockWriter::failing_first(1));
        let engine = engine(td.path(), writer.clone());

        engine.append(blob("r1")).unwrap();
        assert!(matches!(
            engine.flush().await,
            Err(WalError::PersistFailed(_))
        ));
        assert_eq!(engine.pending(), 1);

        let outcome = engine.flush().await.unwrap();
        assert_eq!(outcome.accepted, 1);
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test]
    async fn empty_flush_is_a_noop() {
        let td = tempdir().unwrap();
        let writer = Arc::new(MockWriter::new());
        let engine = engine(td.path(), writer);
        assert_eq!(engine.flush().await.unwrap().accepted, 0);
    }
}
