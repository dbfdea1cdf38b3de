use std::fs;
use std::path::Path;
use std::sync::Arc;

use nvf_config::WalConfig;
use nvf_wal::{
    AuditBlob, MockWriter, TickProgress, WalCursor, WalEngine, WalError, WalJournal, WalReplayer,
    ENTRY_CONTRACT_CODE, QUARANTINE_DIR,
};
use tempfile::tempdir;

fn blob(rid: &str, phase: &str) -> AuditBlob {
    AuditBlob::new(
        "gateway",
        1_700_000_000_000,
        rid,
        serde_json::json!({"phase": phase}),
    )
}

fn write_journal(dir: &Path, blobs: &[AuditBlob]) {
    let journal = Arc::new(WalJournal::open(WalConfig::rooted_at(dir)).unwrap());
    let engine = WalEngine::new(journal, Arc::new(MockWriter::new()));
    for b in blobs {
        engine.append(b.clone()).unwrap();
    }
}

fn segment_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("wal-") && n.ends_with(".ldjson"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn replay_after_restart_delivers_in_order_then_idles() {
    let td = tempdir().unwrap();
    let blobs = vec![blob("r1", "begin"), blob("r1", "end"), blob("r2", "begin")];
    // Journal with fsync-per-append, then drop everything: the restart case.
    write_journal(td.path(), &blobs);

    let writer = Arc::new(MockWriter::new());
    let replayer = WalReplayer::new(WalConfig::rooted_at(td.path()), writer.clone());

    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(3));
    let delivered = writer.delivered();
    assert_eq!(delivered, blobs, "exactly the journaled blobs, in order");

    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Idle);
    assert_eq!(writer.delivered().len(), 3, "idle ticks deliver nothing new");
}

#[tokio::test]
async fn cursor_advances_only_after_delivery() {
    let td = tempdir().unwrap();
    write_journal(td.path(), &[blob("r1", "begin")]);
    let config = WalConfig::rooted_at(td.path());

    let writer = Arc::new(MockWriter::failing_first(1));
    let replayer = WalReplayer::new(config.clone(), writer.clone());

    let err = replayer.tick().await.expect_err("writer fails first");
    match err {
        WalError::ReplayDeliveryFailed { offset, count, .. } => {
            assert_eq!(offset, 0);
            assert_eq!(count, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        WalCursor::load(&config.cursor_file).unwrap(),
        WalCursor::default(),
        "cursor must not move on failure"
    );

    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(1));
    let cursor = WalCursor::load(&config.cursor_file).unwrap();
    assert!(cursor.offset > 0);
}

#[tokio::test]
async fn torn_trailing_line_waits_for_completion() {
    let td = tempdir().unwrap();
    write_journal(td.path(), &[blob("r1", "begin")]);
    let config = WalConfig::rooted_at(td.path());
    let segment = td.path().join(&segment_names(td.path())[0]);

    // Simulate a torn append: a partial line with no terminator.
    let full = fs::read_to_string(&segment).unwrap();
    let torn = full.replace("\n", "") ;
    let torn = &torn[..torn.len() - 10];
    fs::write(&segment, torn).unwrap();

    let writer = Arc::new(MockWriter::new());
    let replayer = WalReplayer::new(config.clone(), writer.clone());
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Idle);
    assert!(writer.delivered().is_empty());

    // The append completes: exactly one blob is delivered.
    fs::write(&segment, &full).unwrap();
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(1));
    assert_eq!(writer.delivered().len(), 1);
}

#[tokio::test]
async fn contract_violation_quarantines_whole_segment() {
    let td = tempdir().unwrap();
    write_journal(td.path(), &[blob("r1", "begin")]);
    let segment_name = segment_names(td.path())[0].clone();
    let segment = td.path().join(&segment_name);

    // Append a second line whose meta.service is empty.
    let mut content = fs::read_to_string(&segment).unwrap();
    content.push_str(
        r#"{"appendedAt":1,"blob":{"meta":{"service":"","ts":1,"requestId":"r2"},"blob":{"phase":"begin"}}}"#,
    );
    content.push('\n');
    fs::write(&segment, content).unwrap();

    let config = WalConfig::rooted_at(td.path());
    let writer = Arc::new(MockWriter::new());
    let replayer = WalReplayer::new(config.clone(), writer.clone());

    match replayer.tick().await.unwrap() {
        TickProgress::Quarantined { file, at_line } => {
            assert_eq!(file, segment_name);
            assert_eq!(at_line, 1);
        }
        other => panic!("expected quarantine, got {other:?}"),
    }

    // Segment moved aside with a machine-readable reason.
    assert!(!segment.exists());
    let qdir = td.path().join(QUARANTINE_DIR);
    assert!(qdir.join(&segment_name).exists());
    let reason: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(qdir.join(format!("{segment_name}.reason.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(reason["code"], ENTRY_CONTRACT_CODE);
    assert_eq!(reason["atLine"], 1);

    // Nothing from the bad segment was delivered, and the cursor never
    // advanced past it.
    assert!(writer.delivered().is_empty());
    let cursor = WalCursor::load(&config.cursor_file).unwrap();
    assert_ne!(cursor.file.as_deref(), Some(segment_name.as_str()));
}

#[tokio::test]
async fn advances_across_segments() {
    let td = tempdir().unwrap();
    let config = WalConfig::rooted_at(td.path());
    {
        let journal = Arc::new(WalJournal::open(config.clone()).unwrap());
        let engine = WalEngine::new(journal.clone(), Arc::new(MockWriter::new()));
        engine.append(blob("r1", "begin")).unwrap();
        journal.rotate("test").unwrap();
        engine.append(blob("r2", "begin")).unwrap();
    }
    assert_eq!(segment_names(td.path()).len(), 2);

    let writer = Arc::new(MockWriter::new());
    let replayer = WalReplayer::new(config.clone(), writer.clone());

    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(1));
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::SegmentAdvanced);
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(1));

    let rids: Vec<String> = writer
        .delivered()
        .iter()
        .map(|b| b.meta.request_id.clone())
        .collect();
    assert_eq!(rids, vec!["r1", "r2"]);
}

#[tokio::test]
async fn batch_line_cap_splits_delivery() {
    let td = tempdir().unwrap();
    write_journal(
        td.path(),
        &[blob("r1", "begin"), blob("r2", "begin"), blob("r3", "begin")],
    );
    let config = WalConfig::rooted_at(td.path());
    let config = WalConfig {
        replay_batch_lines: 2,
        ..config
    };

    let writer = Arc::new(MockWriter::new());
    let replayer = WalReplayer::new(config, writer.clone());

    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(2));
    assert_eq!(replayer.tick().await.unwrap(), TickProgress::Delivered(1));
    assert_eq!(writer.delivered().len(), 3);
}

#[tokio::test]
async fn background_loop_delivers_and_stops() {
    let td = tempdir().unwrap();
    write_journal(td.path(), &[blob("r1", "begin"), blob("r1", "end")]);
    let config = WalConfig::rooted_at(td.path()).with_tick_ms(10);

    let writer = Arc::new(MockWriter::new());
    let replayer = Arc::new(WalReplayer::new(config, writer.clone()));
    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = replayer.spawn(cancel.clone());

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if writer.delivered().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("loop must deliver both blobs");

    cancel.cancel();
    handle.await.unwrap();
}
