//! Durability contract: what was journaled before a crash is exactly what
//! replay delivers after restart.

use std::fs;
use std::sync::Arc;

use nvf_config::WalConfig;
use nvf_wal::{AuditBlob, MockWriter, TickProgress, WalEngine, WalJournal, WalReplayer};
use tempfile::tempdir;

fn blob(rid: &str, phase: &str) -> AuditBlob {
    AuditBlob::new(
        "gateway",
        1_700_000_000_000,
        rid,
        serde_json::json!({"phase": phase, "opId": "createAct"}),
    )
}

#[tokio::test]
async fn fsync_each_append_survives_abrupt_drop() {
    let td = tempdir().unwrap();
    let config = WalConfig::rooted_at(td.path());

    let blobs = vec![blob("r1", "begin"), blob("r2", "begin"), blob("r3", "begin")];
    {
        // fsync_ms = 0: every append is durable before it returns. Dropping
        // the engine without any flush stands in for the process dying.
        let journal = Arc::new(WalJournal::open(config.clone()).unwrap());
        let engine = WalEngine::new(journal, Arc::new(MockWriter::new()));
        for b in &blobs {
            engine.append(b.clone()).unwrap();
        }
    }

    let writer = Arc::new(MockWriter::new());
    let replayer = WalReplayer::new(config, writer.clone());
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(3));
    assert_eq!(writer.delivered(), blobs);
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Idle);
}

#[tokio::test]
async fn replay_until_cursor_reaches_size_preserves_order() {
    let td = tempdir().unwrap();
    let config = WalConfig::rooted_at(td.path());

    let blobs: Vec<AuditBlob> = (0..25).map(|i| blob(&format!("r{i:02}"), "begin")).collect();
    {
        let journal = Arc::new(WalJournal::open(config.clone()).unwrap());
        let engine = WalEngine::new(journal, Arc::new(MockWriter::new()));
        engine.append_batch(blobs.clone()).unwrap();
    }

    let config = WalConfig {
        replay_batch_lines: 7,
        ..config
    };
    let writer = Arc::new(MockWriter::new());
    let replayer = WalReplayer::new(config, writer.clone());

    loop {
        match replayer.tick().await.unwrap() {
            TickProgress::Delivered(_) => continue,
            TickProgress::Idle => break,
            other => panic!("unexpected progress: {other:?}"),
        }
    }

    assert_eq!(writer.delivered(), blobs, "all lines, original order");
}

#[tokio::test]
async fn duplicate_delivery_after_lost_cursor_is_absorbed_by_writers() {
    let td = tempdir().unwrap();
    let config = WalConfig::rooted_at(td.path());

    {
        let journal = Arc::new(WalJournal::open(config.clone()).unwrap());
        let engine = WalEngine::new(journal, Arc::new(MockWriter::new()));
        engine.append(blob("r1", "begin")).unwrap();
        engine.append(blob("r1", "end")).unwrap();
    }

    let store = Arc::new(nvf_wal::MemoryAuditStore::new());
    let writer = Arc::new(nvf_wal::DbWriter::new(store.clone()));

    let replayer = WalReplayer::new(config.clone(), writer.clone());
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(2));

    // Cursor lost: replay starts over and resends the same lines.
    fs::remove_file(&config.cursor_file).unwrap();
    let replayer = WalReplayer::new(config, writer);
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(2));

    assert_eq!(store.len(), 2, "idempotent writer collapses the resend");
}

#[tokio::test]
async fn group_fsync_mode_journals_before_sync() {
    let td = tempdir().unwrap();
    let config = WalConfig::rooted_at(td.path()).with_fsync_ms(5_000);

    let journal = Arc::new(WalJournal::open(config).unwrap());
    let engine = WalEngine::new(journal.clone(), Arc::new(MockWriter::new()));
    engine.append(blob("r1", "begin")).unwrap();

    // Bytes are in the fd even before the cadence fsync fires.
    let content = fs::read_to_string(journal.current_segment()).unwrap();
    assert_eq!(content.lines().count(), 1);
    journal.sync().unwrap();
}
