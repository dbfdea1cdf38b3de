//! Append-only, line-framed, rotating segment store.
//!
//! One journal owns one segment file descriptor per process; appends are
//! serialized through an internal lock. When `append` returns, the bytes are
//! in the file descriptor and fsynced per the configured cadence (cadence 0
//! fsyncs every append). Rotation fsyncs and closes the old segment before
//! opening the next; no line is ever split across segments.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use nvf_config::WalConfig;

use crate::error::WalError;

#[derive(Debug)]
struct Segment {
    file: File,
    path: PathBuf,
    bytes: u64,
    opened_at: Instant,
    dirty: bool,
}

#[derive(Debug)]
pub struct WalJournal {
    inner: Mutex<Segment>,
    config: WalConfig,
}

/// Best-effort fsync of a directory so a rename or create survives a crash.
/// Ignored on platforms that cannot open directories for sync.
pub(crate) fn fsync_dir(path: &Path) {
    if let Ok(dir) = File::open(path) {
        let _ = dir.sync_all();
    }
}

fn segment_name(epoch_ms: i64) -> String {
    format!("wal-{epoch_ms}.ldjson")
}

fn open_segment(dir: &Path) -> Result<Segment, WalError> {
    let mut stamp = chrono::Utc::now().timestamp_millis();
    let path = loop {
        let candidate = dir.join(segment_name(stamp));
        if !candidate.exists() {
            break candidate;
        }
        stamp += 1;
    };

    let file = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(&path)
        .map_err(|e| WalError::AppendFailed(format!("open {}: {e}", path.display())))?;
    file.sync_all().ok();
    fsync_dir(dir);

    Ok(Segment {
        file,
        path,
        bytes: 0,
        opened_at: Instant::now(),
        dirty: false,
    })
}

impl WalJournal {
    /// Open the journal, creating the WAL directory when missing. The
    /// directory must be an absolute path.
    pub fn open(config: WalConfig) -> Result<Self, WalError> {
        if !config.dir.is_absolute() {
            return Err(WalError::DirInvalid(format!(
                "{} is not absolute",
                config.dir.display()
            )));
        }
        fs::create_dir_all(&config.dir)
            .map_err(|e| WalError::DirInvalid(format!("{}: {e}", config.dir.display())))?;

        let segment = open_segment(&config.dir)?;
        info!(segment = %segment.path.display(), "WAL journal opened");
        Ok(Self {
            inner: Mutex::new(segment),
            config,
        })
    }

    /// Append one newline-terminated frame. Durable per the fsync cadence on
    /// return; any I/O error is fatal to the caller.
    pub fn append(&self, frame: &str) -> Result<(), WalError> {
        if !frame.ends_with('\n') || frame[..frame.len() - 1].contains('\n') {
            return Err(WalError::SerializeFailed(
                "frame must be exactly one newline-terminated line".to_string(),
            ));
        }

        let mut segment = self.lock();
        self.maybe_rotate(&mut segment)?;

        segment
            .file
            .write_all(frame.as_bytes())
            .map_err(|e| WalError::AppendFailed(format!("{}: {e}", segment.path.display())))?;
        segment.bytes += frame.len() as u64;

        if self.config.fsync_ms == 0 {
            segment
                .file
                .sync_data()
                .map_err(|e| WalError::AppendFailed(format!("fsync: {e}")))?;
        } else {
            segment.dirty = true;
        }
        Ok(())
    }

    /// Force an fsync of any buffered appends. The group-fsync task calls
    /// this on its cadence; shutdown paths call it directly.
    pub fn sync(&self) -> Result<(), WalError> {
        let mut segment = self.lock();
        if segment.dirty {
            segment
                .file
                .sync_data()
                .map_err(|e| WalError::AppendFailed(format!("fsync: {e}")))?;
            segment.dirty = false;
        }
        Ok(())
    }

    /// Rotate to a fresh segment: fsync and close the current one, open the
    /// next. Only one rotation runs at a time.
    pub fn rotate(&self, reason: &str) -> Result<(), WalError> {
        let mut segment = self.lock();
        self.rotate_locked(&mut segment, reason)
    }

    /// Path of the segment currently receiving appends.
    pub fn current_segment(&self) -> PathBuf {
        self.lock().path.clone()
    }

    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Segment> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn maybe_rotate(&self, segment: &mut Segment) -> Result<(), WalError> {
        let over_bytes = segment.bytes >= self.config.rotate_bytes;
        let over_age = segment.bytes > 0
            && segment.opened_at.elapsed() >= Duration::from_millis(self.config.rotate_ms);
        if over_bytes {
            self.rotate_locked(segment, "bytes-threshold")
        } else if over_age {
            self.rotate_locked(segment, "age-threshold")
        } else {
            Ok(())
        }
    }

    fn rotate_locked(&self, segment: &mut Segment, reason: &str) -> Result<(), WalError> {
        segment
            .file
            .sync_all()
            .map_err(|e| WalError::AppendFailed(format!("rotate fsync: {e}")))?;
        let next = open_segment(&self.config.dir)?;
        info!(
            from = %segment.path.display(),
            to = %next.path.display(),
            reason,
            "WAL segment rotated"
        );
        *segment = next;
        Ok(())
    }

    /// Background group-fsync task for cadence > 0. No-op cadence 0.
    pub fn spawn_fsync(
        self: std::sync::Arc<Self>,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.fsync_ms == 0 {
            return None;
        }
        let journal = self;
        let every = Duration::from_millis(journal.config.fsync_ms);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Err(err) = journal.sync() {
                            error!(error = %err, "final WAL fsync failed");
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = journal.sync() {
                            error!(error = %err, "group fsync failed");
                        }
                    }
                }
            }
        }))
    }
}
