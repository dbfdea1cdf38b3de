//! Database-backed writer over an abstract audit store.
//!
//! The concrete driver lives outside the fabric; this module owns the seam
//! and an in-memory implementation for tests and local development. Entries
//! key on `(requestId, phase)`, so resending a batch upserts the same rows
//! and the writer stays idempotent.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;

use crate::blob::AuditBlob;
use crate::error::WriterError;
use crate::writer::Writer;

/// Bulk-insert seam over the audit destination collection.
pub trait AuditStore: Send + Sync + 'static {
    fn upsert_many<'a>(
        &'a self,
        entries: &'a [AuditBlob],
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>>;
}

fn entry_key(blob: &AuditBlob) -> (String, String) {
    let phase = blob
        .blob
        .get("phase")
        .and_then(|p| p.as_str())
        .unwrap_or("")
        .to_string();
    (blob.meta.request_id.clone(), phase)
}

/// In-memory audit store keyed by `(requestId, phase)`.
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: DashMap<(String, String), AuditBlob>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, request_id: &str, phase: &str) -> Option<AuditBlob> {
        self.entries
            .get(&(request_id.to_string(), phase.to_string()))
            .map(|e| e.value().clone())
    }
}

impl AuditStore for MemoryAuditStore {
    fn upsert_many<'a>(
        &'a self,
        entries: &'a [AuditBlob],
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>> {
        Box::pin(async move {
            for blob in entries {
                self.entries.insert(entry_key(blob), blob.clone());
            }
            Ok(())
        })
    }
}

/// Writer delivering batches into an [`AuditStore`].
pub struct DbWriter {
    store: Arc<dyn AuditStore>,
}

impl DbWriter {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }
}

impl Writer for DbWriter {
    fn write_batch<'a>(
        &'a self,
        batch: &'a [AuditBlob],
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>> {
        Box::pin(async move { self.store.upsert_many(batch).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(rid: &str, phase: &str) -> AuditBlob {
        AuditBlob::new(
            "gateway",
            1_700_000_000_000,
            rid,
            serde_json::json!({"phase": phase}),
        )
    }

    #[tokio::test]
    async fn writes_are_keyed_by_request_and_phase() {
        let store = Arc::new(MemoryAuditStore::new());
        let writer = DbWriter::new(store.clone());

        writer
            .write_batch(&[blob("r1", "begin"), blob("r1", "end"), blob("r2", "begin")])
            .await
            .unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.get("r1", "begin").is_some());
        assert!(store.get("r1", "end").is_some());
    }

    #[tokio::test]
    async fn resending_a_batch_is_idempotent() {
        let store = Arc::new(MemoryAuditStore::new());
        let writer = DbWriter::new(store.clone());
        let batch = vec![blob("r1", "begin"), blob("r1", "end")];

        writer.write_batch(&batch).await.unwrap();
        writer.write_batch(&batch).await.unwrap();

        assert_eq!(store.len(), 2, "duplicates collapse onto the same keys");
    }
}
