/// Durability and replay failures.
///
/// Durability kinds are fatal by default: a service must refuse to ack
/// requests it cannot journal. Replay kinds drive retry/quarantine decisions
/// in the replayer and are never silently swallowed.
#[derive(Debug)]
pub enum WalError {
    /// The WAL directory is unusable (relative, missing and uncreatable,
    /// or not a directory).
    DirInvalid(String),

    /// Synchronous write or fsync of a segment failed.
    AppendFailed(String),

    /// An audit blob could not be serialized to a journal line.
    SerializeFailed(String),

    /// An audit blob violates the entry contract before journaling.
    EntryContractInvalid(String),

    /// Batch append aborted; `index` is the first failing element.
    BatchAppendFailed { index: usize, detail: String },

    /// The destination writer rejected a flushed batch.
    PersistFailed(String),

    /// The replay cursor could not be written atomically.
    CursorWriteFailed(String),

    /// Writer failure during replay, with position context for operators.
    ReplayDeliveryFailed {
        file: String,
        offset: u64,
        count: usize,
        detail: String,
    },

    /// Moving a contract-violating segment into quarantine failed.
    QuarantineFailed(String),
}

impl std::fmt::Display for WalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalError::DirInvalid(msg) => write!(f, "WAL directory invalid: {msg}"),
            WalError::AppendFailed(msg) => write!(f, "WAL append failed: {msg}"),
            WalError::SerializeFailed(msg) => write!(f, "WAL serialization failed: {msg}"),
            WalError::EntryContractInvalid(msg) => {
                write!(f, "audit entry violates contract: {msg}")
            }
            WalError::BatchAppendFailed { index, detail } => {
                write!(f, "WAL batch append failed at index {index}: {detail}")
            }
            WalError::PersistFailed(msg) => write!(f, "WAL flush to writer failed: {msg}"),
            WalError::CursorWriteFailed(msg) => write!(f, "cursor write failed: {msg}"),
            WalError::ReplayDeliveryFailed {
                file,
                offset,
                count,
                detail,
            } => write!(
                f,
                "replay delivery failed at {file}@{offset} ({count} lines): {detail}"
            ),
            WalError::QuarantineFailed(msg) => write!(f, "quarantine failed: {msg}"),
        }
    }
}

impl std::error::Error for WalError {}

/// Failure modes a destination writer can report.
#[derive(Debug)]
pub enum WriterError {
    /// Worth retrying: transport hiccups, 5xx, transient driver errors.
    Transient(String),

    /// Never retried: the destination rejected the batch outright.
    Permanent(String),
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Transient(msg) => write!(f, "transient writer failure: {msg}"),
            WriterError::Permanent(msg) => write!(f, "permanent writer failure: {msg}"),
        }
    }
}

impl std::error::Error for WriterError {}
