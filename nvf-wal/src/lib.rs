pub mod blob;
pub mod cursor;
pub mod db_writer;
pub mod engine;
pub mod error;
pub mod journal;
pub mod replay;
pub mod writer;

pub use blob::{AuditBlob, AuditMeta, WalLine, ENTRY_CONTRACT_CODE};
pub use cursor::WalCursor;
pub use db_writer::{AuditStore, DbWriter, MemoryAuditStore};
pub use engine::{FlushOutcome, WalEngine};
pub use error::{WalError, WriterError};
pub use journal::WalJournal;
pub use replay::{TickProgress, WalReplayer, QUARANTINE_DIR};
pub use writer::{MockWriter, Writer, WriterFactory, WriterRegistry};
