use super::*;
use crate::camera::{ImageFormat, ImagePayload};
use crate::config::SinkConfig;
use crate::error::{SinkError, UploadError};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

fn create_test_sink_config() -> SinkConfig {
    SinkConfig {
        database_url: "http://127.0.0.1:9000".to_string(),
        collection: "logs".to_string(),
        auth_token: None,
        request_timeout_ms: 1000,
        skip_when_empty: true,
    }
}

fn payload(bytes: &[u8]) -> ImagePayload {
    ImagePayload::new(bytes.to_vec(), SystemTime::now(), ImageFormat::Jpeg, (640, 480))
}

fn stage_for(sink: &MemorySink, config: &SinkConfig) -> UploadStage {
    UploadStage::new(Arc::new(sink.clone()), config)
}

#[tokio::test]
async fn test_stale_records_are_pruned_before_write() {
    let sink = MemorySink::new("logs").with_records(3);
    let stage = stage_for(&sink, &create_test_sink_config());

    let outcome = stage
        .upload(payload(&[0xFF, 0xD8, 0xFF, 0xD9]), &CancellationToken::new())
        .await
        .unwrap();

    let key = match outcome {
        UploadOutcome::Written { key } => key,
        other => panic!("Unexpected outcome: {:?}", other),
    };

    let journal = sink.journal();
    assert_eq!(journal[0], SinkOp::ChildCount);
    assert_eq!(journal[1], SinkOp::DeleteAll);
    assert_eq!(journal[2], SinkOp::PushChild { key: key.clone() });
    assert_eq!(
        journal.iter().filter(|op| **op == SinkOp::DeleteAll).count(),
        1
    );
    assert_eq!(
        journal
            .iter()
            .filter(|op| matches!(op, SinkOp::PushChild { .. }))
            .count(),
        1
    );
    assert_eq!(sink.field_order(&key), vec!["timestamp", "image"]);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let (stored_key, record) = &records[0];
    assert_eq!(stored_key, &key);
    assert!(record.timestamp.is_some());
    assert_eq!(
        record.image_bytes().unwrap(),
        vec![0xFF, 0xD8, 0xFF, 0xD9]
    );
}

#[tokio::test]
async fn test_second_upload_replaces_first() {
    let sink = MemorySink::new("logs").with_records(1);
    let stage = stage_for(&sink, &create_test_sink_config());
    let cancel = CancellationToken::new();

    let first = stage.upload(payload(&[1]), &cancel).await.unwrap();
    let second = stage.upload(payload(&[2]), &cancel).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_ne!(first, second);
    match second {
        UploadOutcome::Written { key } => assert_eq!(records[0].0, key),
        other => panic!("Unexpected outcome: {:?}", other),
    }
    assert_eq!(records[0].1.image_bytes().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_empty_collection_skips_upload() {
    let sink = MemorySink::new("logs");
    let stage = stage_for(&sink, &create_test_sink_config());

    let outcome = stage
        .upload(payload(&[1, 2, 3]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Skipped);
    assert_eq!(sink.journal(), vec![SinkOp::ChildCount]);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_empty_collection_written_when_skip_disabled() {
    let sink = MemorySink::new("logs");
    let mut config = create_test_sink_config();
    config.skip_when_empty = false;
    let stage = stage_for(&sink, &config);

    let outcome = stage
        .upload(payload(&[1, 2, 3]), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, UploadOutcome::Written { .. }));
    assert!(!sink.journal().contains(&SinkOp::DeleteAll));
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_sink_errors_map_to_upload_steps() {
    let cases = [
        (FailPoint::ChildCount, "query"),
        (FailPoint::DeleteAll, "delete"),
        (FailPoint::PushChild, "write"),
        (FailPoint::SetField, "write"),
    ];

    for (point, step) in cases {
        let sink = MemorySink::new("logs").with_records(2);
        sink.fail_next(
            point,
            SinkError::Status {
                status: 401,
                body: "Permission denied".to_string(),
            },
        );
        let stage = stage_for(&sink, &create_test_sink_config());

        let error = stage
            .upload(payload(&[9]), &CancellationToken::new())
            .await
            .unwrap_err();

        let matched = match (&error, step) {
            (UploadError::Query { .. }, "query") => true,
            (UploadError::Delete { .. }, "delete") => true,
            (UploadError::Write { .. }, "write") => true,
            _ => false,
        };
        assert!(matched, "{:?} mapped to {:?}", point, error);
        assert!(error.cause().unwrap().contains("Permission denied"));
    }
}

#[tokio::test]
async fn test_failed_timestamp_write_never_writes_image() {
    let sink = MemorySink::new("logs").with_records(1);
    sink.fail_next(
        FailPoint::SetField,
        SinkError::Transport {
            details: "connection reset".to_string(),
        },
    );
    let stage = stage_for(&sink, &create_test_sink_config());

    let result = stage.upload(payload(&[5]), &CancellationToken::new()).await;

    assert!(matches!(result, Err(UploadError::Write { .. })));
    assert!(!sink
        .journal()
        .iter()
        .any(|op| matches!(op, SinkOp::SetField { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_slow_sink_times_out() {
    let sink = MemorySink::new("logs")
        .with_records(1)
        .with_delay(Duration::from_secs(30));
    let stage = stage_for(&sink, &create_test_sink_config());

    let result = stage.upload(payload(&[5]), &CancellationToken::new()).await;

    assert_eq!(result, Err(UploadError::Timeout { millis: 1000 }));
    assert!(sink.journal().is_empty());
}

#[tokio::test]
async fn test_upload_cancelled_while_waiting_on_sink() {
    let sink = MemorySink::new("logs").with_records(1);
    let stage = Arc::new(stage_for(&sink, &create_test_sink_config()));
    let gate = sink.hold().await;
    let cancel = CancellationToken::new();

    let task = {
        let stage = Arc::clone(&stage);
        let cancel = cancel.clone();
        tokio::spawn(async move { stage.upload(payload(&[5]), &cancel).await })
    };

    tokio::task::yield_now().await;
    cancel.cancel();
    let result = task.await.unwrap();
    drop(gate);

    assert_eq!(result, Err(UploadError::Cancelled));
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_image_encoding_round_trips() {
    let max_slot = ImageFormat::Jpeg.slot_capacity(640, 480);
    let samples: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0xFB, 0xFF, 0xBF],
        (0..=255u8).collect(),
        (0..max_slot).map(|i| (i * 31 % 251) as u8).collect(),
    ];

    for bytes in samples {
        let encoded = encode_image(&bytes);
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(decode_image(&encoded).unwrap(), bytes);
    }
}

#[test]
fn test_decode_accepts_unpadded_text() {
    assert_eq!(decode_image("-_8").unwrap(), vec![0xFB, 0xFF]);
    assert_eq!(decode_image("-_8=").unwrap(), vec![0xFB, 0xFF]);
    assert!(decode_image("not base64!").is_err());
}

#[test]
fn test_record_wire_shape() {
    let record = LogRecord::new(1_700_000_000_000, &[1, 2, 3]);
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    assert_eq!(json["image"], "AQID");

    let partial: LogRecord = serde_json::from_str(r#"{"timestamp": 5}"#).unwrap();
    assert!(partial.image_bytes().is_none());
}

#[test]
fn test_image_placeholder_cases() {
    let missing: LogRecord = serde_json::from_str(r#"{"timestamp": 5}"#).unwrap();
    assert_eq!(missing.image_bytes(), None);

    let empty: LogRecord = serde_json::from_str(r#"{"timestamp": 5, "image": ""}"#).unwrap();
    assert_eq!(empty.image_bytes(), None);

    let garbled: LogRecord =
        serde_json::from_str(r#"{"timestamp": 5, "image": "not base64!"}"#).unwrap();
    assert_eq!(garbled.image_bytes(), None);

    let unpadded: LogRecord = serde_json::from_str(r#"{"image": "AQI"}"#).unwrap();
    assert_eq!(unpadded.image_bytes(), Some(vec![1, 2]));
}

#[test]
fn test_record_feed_reports_each_change_once() {
    let mut feed = RecordFeed::new();
    let first = LogRecord {
        timestamp: Some(1),
        image: None,
    };
    let first_with_image = LogRecord::new(1, &[9]);

    assert_eq!(feed.observe(None), None);
    assert_eq!(
        feed.observe(Some(("a".to_string(), first.clone()))),
        Some(("a".to_string(), first.clone()))
    );
    assert_eq!(feed.observe(Some(("a".to_string(), first))), None);

    // image written after the timestamp
    assert!(feed
        .observe(Some(("a".to_string(), first_with_image.clone())))
        .is_some());
    assert_eq!(feed.observe(Some(("a".to_string(), first_with_image))), None);

    let next = LogRecord::new(2, &[7]);
    assert_eq!(
        feed.observe(Some(("b".to_string(), next.clone()))),
        Some(("b".to_string(), next))
    );
    // empty collection after a prune keeps the last shown record
    assert_eq!(feed.observe(None), None);
}

#[test]
fn test_timestamp_formatting() {
    let tz: Tz = "UTC".parse().unwrap();
    assert_eq!(
        format_timestamp(0, tz).as_deref(),
        Some("1970 01 01 - 00:00:00")
    );

    let record = LogRecord::new(1_700_000_000_000, &[]);
    let berlin: Tz = "Europe/Berlin".parse().unwrap();
    assert_eq!(
        record.formatted_timestamp(berlin).as_deref(),
        Some("2023 11 14 - 23:13:20")
    );
}

#[test]
fn test_server_timestamp_sentinel() {
    assert_eq!(
        ServerValue::ServerTimestamp.to_json(),
        serde_json::json!({ ".sv": "timestamp" })
    );
    assert_eq!(
        ServerValue::Text("x".to_string()).to_json(),
        serde_json::json!("x")
    );
}

#[test]
fn test_push_ids_sort_in_creation_order() {
    let ids = PushIdGenerator::new();
    let first = ids.next_at(1_700_000_000_000);
    let second = ids.next_at(1_700_000_000_000);
    let third = ids.next_at(1_700_000_000_001);

    assert_eq!(first.len(), 20);
    assert!(first < second);
    assert!(second < third);
    assert_eq!(&first[..8], &second[..8]);
}

#[test]
fn test_firebase_sink_normalizes_paths() {
    let mut config = create_test_sink_config();
    config.database_url = "https://example.firebaseio.com/".to_string();
    config.collection = "/logs/".to_string();

    let sink = FirebaseSink::new(&config).unwrap();
    assert_eq!(sink.collection(), "logs");
    assert_eq!(sink.name(), "firebase");
}
