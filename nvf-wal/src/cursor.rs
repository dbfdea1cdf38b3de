//! Replay cursor: `(file, offset)` persisted crash-atomically.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WalError;
use crate::journal::fsync_dir;

/// Replay position. `file` is a segment basename; `None` means replay has
/// never delivered anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WalCursor {
    pub file: Option<String>,
    pub offset: u64,
}

impl WalCursor {
    pub fn at(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: Some(file.into()),
            offset,
        }
    }

    /// Load from disk. A missing file is a fresh cursor; a corrupt file is
    /// an error, never an implicit restart from zero.
    pub fn load(path: &Path) -> Result<Self, WalError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| WalError::CursorWriteFailed(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| WalError::CursorWriteFailed(format!("parse {}: {e}", path.display())))
    }

    /// Persist via write-temp, fsync, rename, fsync-parent. After this
    /// returns, a crash replays from the new position, never an older one.
    pub fn store(&self, path: &Path) -> Result<(), WalError> {
        let data = serde_json::to_vec(self)
            .map_err(|e| WalError::CursorWriteFailed(format!("serialize: {e}")))?;

        let tmp = path.with_extension("tmp");
        {
            let mut f = File::create(&tmp).map_err(|e| {
                WalError::CursorWriteFailed(format!("create {}: {e}", tmp.display()))
            })?;
            f.write_all(&data).map_err(|e| {
                WalError::CursorWriteFailed(format!("write {}: {e}", tmp.display()))
            })?;
            f.sync_all()
                .map_err(|e| WalError::CursorWriteFailed(format!("fsync: {e}")))?;
        }

        fs::rename(&tmp, path).map_err(|e| {
            WalError::CursorWriteFailed(format!(
                "rename {} to {}: {e}",
                tmp.display(),
                path.display()
            ))
        })?;
        if let Some(parent) = path.parent() {
            fsync_dir(parent);
        }
        Ok(())
    }
}
