//! Crash-safe replay of journaled segments to a destination writer.
//!
//! The replayer is a background loop with an atomic durable cursor. It
//! guarantees at-least-once delivery: nothing is skipped except by
//! operator-visible quarantine, and the cursor only advances after the
//! writer accepted a batch.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nvf_config::WalConfig;

use crate::blob::{AuditBlob, WalLine, ENTRY_CONTRACT_CODE};
use crate::cursor::WalCursor;
use crate::error::WalError;
use crate::journal::fsync_dir;
use crate::writer::Writer;

pub const QUARANTINE_DIR: &str = "quarantine";

/// What one tick accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickProgress {
    /// Nothing to do: no segments, cursor at end, or only a torn line.
    Idle,
    /// Cursor moved to the next segment; no lines delivered yet.
    SegmentAdvanced,
    /// This many lines were delivered and the cursor advanced.
    Delivered(usize),
    /// The current segment violated the entry contract and was moved aside.
    Quarantined { file: String, at_line: usize },
}

pub struct WalReplayer {
    config: WalConfig,
    writer: Arc<dyn Writer>,
}

impl WalReplayer {
    pub fn new(config: WalConfig, writer: Arc<dyn Writer>) -> Self {
        Self { config, writer }
    }

    /// Run one replay step. See the module docs for the guarantees; the
    /// background loop drives this and applies backoff on errors.
    pub async fn tick(&self) -> Result<TickProgress, WalError> {
        let segments = list_segments(&self.config.dir)?;
        if segments.is_empty() {
            return Ok(TickProgress::Idle);
        }

        let mut cursor = WalCursor::load(&self.config.cursor_file)?;
        let current = match cursor.file.as_deref() {
            Some(file) if segments.iter().any(|s| s == file) => file.to_string(),
            _ => {
                // Fresh start, or the cursor's segment is gone (rotated out
                // or quarantined): restart from the first listed segment.
                cursor = WalCursor::at(segments[0].clone(), 0);
                segments[0].clone()
            }
        };

        let path = self.config.dir.join(&current);
        let size = fs::metadata(&path)
            .map_err(|e| WalError::AppendFailed(format!("stat {}: {e}", path.display())))?
            .len();

        if cursor.offset >= size {
            let next = segments.iter().skip_while(|s| **s != current).nth(1);
            return match next {
                None => Ok(TickProgress::Idle),
                Some(next) => {
                    let advanced = WalCursor::at(next.clone(), 0);
                    advanced.store(&self.config.cursor_file)?;
                    Ok(TickProgress::SegmentAdvanced)
                }
            };
        }

        let chunk = read_chunk(&path, cursor.offset, self.config.replay_batch_bytes)?;
        let lines = split_complete_lines(&chunk, self.config.replay_batch_lines);
        if lines.is_empty() {
            // Torn trailing line; it completes on a later tick.
            return Ok(TickProgress::Idle);
        }

        let mut batch: Vec<AuditBlob> = Vec::with_capacity(lines.len());
        let mut consumed = 0usize;
        for (index, raw) in lines.iter().enumerate() {
            match parse_line(raw) {
                Ok(line) => {
                    consumed += raw.len() + 1;
                    batch.push(line.blob);
                }
                Err(detail) => {
                    let at_line = count_lines_before(&path, cursor.offset)? + index;
                    self.quarantine(&current, at_line, &detail)?;
                    return Ok(TickProgress::Quarantined {
                        file: current,
                        at_line,
                    });
                }
            }
        }

        let count = batch.len();
        self.writer.write_batch(&batch).await.map_err(|err| {
            WalError::ReplayDeliveryFailed {
                file: current.clone(),
                offset: cursor.offset,
                count,
                detail: err.to_string(),
            }
        })?;

        let advanced = WalCursor::at(current, cursor.offset + consumed as u64);
        advanced.store(&self.config.cursor_file)?;
        Ok(TickProgress::Delivered(count))
    }

    /// Move the offending segment to `quarantine/` with a sibling reason
    /// file. The cursor is left untouched; the next tick resets it to the
    /// first remaining segment.
    fn quarantine(&self, file: &str, at_line: usize, detail: &str) -> Result<(), WalError> {
        let qdir = self.config.dir.join(QUARANTINE_DIR);
        fs::create_dir_all(&qdir)
            .map_err(|e| WalError::QuarantineFailed(format!("mkdir {}: {e}", qdir.display())))?;

        let from = self.config.dir.join(file);
        let to = qdir.join(file);
        fs::rename(&from, &to).map_err(|e| {
            WalError::QuarantineFailed(format!(
                "move {} to {}: {e}",
                from.display(),
                to.display()
            ))
        })?;

        let reason = serde_json::json!({
            "code": ENTRY_CONTRACT_CODE,
            "atLine": at_line,
            "detail": detail,
        });
        let reason_path = qdir.join(format!("{file}.reason.json"));
        fs::write(&reason_path, serde_json::to_vec_pretty(&reason).unwrap_or_default())
            .map_err(|e| {
                WalError::QuarantineFailed(format!("write {}: {e}", reason_path.display()))
            })?;
        fsync_dir(&qdir);

        warn!(file, at_line, detail, "segment quarantined");
        Ok(())
    }

    /// Long-running replay loop. Delivers as fast as the writer accepts,
    /// idles on `tickMs`, and applies jittered exponential backoff capped at
    /// 64x the tick on writer failure. Cancelling stops after the in-flight
    /// tick completes.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let tick = Duration::from_millis(self.config.replay_tick_ms.max(1));
            let max_backoff = tick * 64;
            let mut backoff = tick;
            info!(dir = %self.config.dir.display(), "WAL replayer started");

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                match self.tick().await {
                    Ok(TickProgress::Delivered(_)) | Ok(TickProgress::SegmentAdvanced) => {
                        backoff = tick;
                    }
                    Ok(TickProgress::Idle) | Ok(TickProgress::Quarantined { .. }) => {
                        backoff = tick;
                        sleep_or_cancel(tick, &cancel).await;
                    }
                    Err(err) => {
                        let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..=0.25));
                        warn!(error = %err, backoff_ms = backoff.as_millis() as u64, "replay tick failed");
                        sleep_or_cancel(backoff + jitter, &cancel).await;
                        backoff = (backoff * 2).min(max_backoff);
                    }
                }
            }
            info!("WAL replayer stopped");
        })
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

fn list_segments(dir: &Path) -> Result<Vec<String>, WalError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| WalError::DirInvalid(format!("{}: {e}", dir.display())))?;
    let mut segments = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| WalError::DirInvalid(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("wal-") && name.ends_with(".ldjson") {
            segments.push(name);
        }
    }
    segments.sort();
    Ok(segments)
}

fn read_chunk(path: &PathBuf, offset: u64, max_bytes: usize) -> Result<Vec<u8>, WalError> {
    let mut file = File::open(path)
        .map_err(|e| WalError::AppendFailed(format!("open {}: {e}", path.display())))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| WalError::AppendFailed(format!("seek {}: {e}", path.display())))?;
    let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
    file.take(max_bytes as u64)
        .read_to_end(&mut buf)
        .map_err(|e| WalError::AppendFailed(format!("read {}: {e}", path.display())))?;
    Ok(buf)
}

/// Split a chunk into complete (newline-terminated) lines, capped at
/// `max_lines`. A trailing fragment without a newline is left for later.
fn split_complete_lines(chunk: &[u8], max_lines: usize) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    for (i, b) in chunk.iter().enumerate() {
        if *b == b'\n' {
            lines.push(&chunk[start..i]);
            start = i + 1;
            if lines.len() >= max_lines {
                break;
            }
        }
    }
    lines
}

fn parse_line(raw: &[u8]) -> Result<WalLine, String> {
    let text = std::str::from_utf8(raw).map_err(|e| format!("not UTF-8: {e}"))?;
    let line: WalLine =
        serde_json::from_str(text).map_err(|e| format!("unparseable line: {e}"))?;
    line.blob.check_contract()?;
    Ok(line)
}

fn count_lines_before(path: &PathBuf, offset: u64) -> Result<usize, WalError> {
    if offset == 0 {
        return Ok(0);
    }
    let chunk = read_chunk(path, 0, offset as usize)?;
    Ok(chunk.iter().filter(|b| **b == b'\n').count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_stops_at_torn_tail() {
        let chunk = b"{\"a\":1}\n{\"a\":2}\n{\"a\":3";
        let lines = split_complete_lines(chunk, 10);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], b"{\"a\":1}");
        assert_eq!(lines[1], b"{\"a\":2}");
    }

    #[test]
    fn split_honors_line_cap() {
        let chunk = b"a\nb\nc\n";
        let lines = split_complete_lines(chunk, 2);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn parse_rejects_contract_violations() {
        let good = r#"{"appendedAt":1,"blob":{"meta":{"service":"s","ts":1,"requestId":"r"},"blob":{"phase":"begin"}}}"#;
        assert!(parse_line(good.as_bytes()).is_ok());

        let empty_service = r#"{"appendedAt":1,"blob":{"meta":{"service":"","ts":1,"requestId":"r"},"blob":{"phase":"begin"}}}"#;
        assert!(parse_line(empty_service.as_bytes()).is_err());

        assert!(parse_line(b"{garbage").is_err());
    }
}
