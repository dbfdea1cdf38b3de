//! Destination writers and their registry.
//!
//! A writer is a single-method batch sink. Writers MUST be idempotent for
//! identical input: both the engine and the replayer may resend a batch
//! after a crash.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::blob::AuditBlob;
use crate::error::WriterError;

/// Batch sink for audit blobs.
pub trait Writer: Send + Sync + 'static {
    fn write_batch<'a>(
        &'a self,
        batch: &'a [AuditBlob],
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>>;
}

/// Factory producing a writer instance.
pub type WriterFactory = Arc<dyn Fn() -> Arc<dyn Writer> + Send + Sync>;

/// Registry mapping stable short names ("db", "http", "mock") to factories.
/// Registration happens explicitly at bootstrap; nothing is inferred from
/// the environment.
#[derive(Default)]
pub struct WriterRegistry {
    factories: HashMap<String, WriterFactory>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Writer> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Instantiate the writer registered under `name`.
    pub fn create(&self, name: &str) -> Option<Arc<dyn Writer>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Test writer: accepts everything, remembers what it saw, and can be told
/// to fail its first N calls.
#[derive(Default)]
pub struct MockWriter {
    batches: Mutex<Vec<Vec<AuditBlob>>>,
    fail_remaining: Mutex<usize>,
}

impl MockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail_remaining: Mutex::new(n),
        }
    }

    pub fn batches(&self) -> Vec<Vec<AuditBlob>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<AuditBlob> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

impl Writer for MockWriter {
    fn write_batch<'a>(
        &'a self,
        batch: &'a [AuditBlob],
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>> {
        Box::pin(async move {
            {
                let mut remaining = self.fail_remaining.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(WriterError::Transient("mock failure".to_string()));
                }
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        })
    }
}
