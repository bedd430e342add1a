use doorbell::camera::{CaptureDevice, MockCameraBackend};
use doorbell::capture::{CaptureOrchestrator, OrchestratorState, TriggerOutcome, TriggerSource};
use doorbell::config::DoorbellConfig;
use doorbell::error::CaptureError;
use doorbell::events::{DoorbellEvent, EventBus, EventFilter, EventReceiver};
use doorbell::motion::{LevelMapping, MotionState, MotionWatcher, ScriptedInput};
use doorbell::upload::{decode_image, MemorySink, SinkOp, UploadStage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct Pipeline {
    orchestrator: CaptureOrchestrator,
    backend: MockCameraBackend,
    sink: MemorySink,
    event_bus: Arc<EventBus>,
}

async fn pipeline(backend: MockCameraBackend, sink: MemorySink) -> Pipeline {
    let config = DoorbellConfig::default();
    let device = Arc::new(CaptureDevice::new(
        config.camera.clone(),
        Box::new(backend.clone()),
    ));
    let _ = device.open().await;
    let uploader = Arc::new(UploadStage::new(Arc::new(sink.clone()), &config.sink));
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

    Pipeline {
        orchestrator: CaptureOrchestrator::new(device, uploader, Arc::clone(&event_bus)),
        backend,
        sink,
        event_bus,
    }
}

#[tokio::test]
async fn motion_sequence_publishes_exactly_one_record() {
    let image = vec![0xFF, 0xD8, 0x10, 0x20, 0x30, 0xFF, 0xD9];
    let p = pipeline(
        MockCameraBackend::new().with_image(image.clone()),
        MemorySink::new("logs").with_records(3),
    )
    .await;
    let mut finished = EventReceiver::new(
        p.event_bus.subscribe(),
        EventFilter::types(vec!["upload_completed", "upload_failed"]),
        "pipeline_test",
    );

    let watcher = MotionWatcher::new("BCM26", LevelMapping::ActiveHigh);
    let orchestrator = p.orchestrator.clone();
    watcher
        .start(
            Box::new(ScriptedInput::new("BCM26", [true, true, false, false])),
            move |state| {
                orchestrator.on_motion(state);
            },
        )
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(2), finished.recv())
        .await
        .expect("upload did not finish")
        .unwrap();
    assert!(matches!(event, DoorbellEvent::UploadCompleted { request_id: 1, .. }));
    p.orchestrator.wait_until_idle().await;
    watcher.stop().await;

    assert_eq!(p.backend.calls().submit_capture, 1);
    assert_eq!(p.orchestrator.status(), MotionState::Still);

    let journal = p.sink.journal();
    let delete_at = journal.iter().position(|op| *op == SinkOp::DeleteAll).unwrap();
    let push_at = journal
        .iter()
        .position(|op| matches!(op, SinkOp::PushChild { .. }))
        .unwrap();
    assert!(delete_at < push_at);

    let records = p.sink.records();
    assert_eq!(records.len(), 1);
    let (key, record) = &records[0];
    assert_eq!(p.sink.field_order(key), vec!["timestamp", "image"]);
    assert_eq!(decode_image(record.image.as_deref().unwrap()).unwrap(), image);
}

#[tokio::test]
async fn trigger_storm_yields_one_capture() {
    let p = pipeline(MockCameraBackend::new(), MemorySink::new("logs").with_records(1)).await;
    let gate = p.backend.hold().await;

    let outcomes: Vec<_> = (0..20)
        .map(|n| {
            let source = if n % 2 == 0 {
                TriggerSource::Motion
            } else {
                TriggerSource::Manual
            };
            p.orchestrator.trigger(source)
        })
        .collect();
    drop(gate);
    timeout(Duration::from_secs(2), p.orchestrator.wait_until_idle())
        .await
        .unwrap();

    let accepted = outcomes
        .iter()
        .filter(|o| matches!(o, TriggerOutcome::Accepted(_)))
        .count();
    assert_eq!(accepted, 1);
    assert!(outcomes[1..].iter().all(|o| *o
        == TriggerOutcome::Dropped {
            state: OrchestratorState::CaptureInFlight
        }));
    assert_eq!(p.backend.calls().configure_session, 1);
    assert_eq!(p.sink.len(), 1);
}

#[tokio::test]
async fn consecutive_uploads_leave_only_the_latest() {
    let p = pipeline(MockCameraBackend::new(), MemorySink::new("logs").with_records(1)).await;

    let mut keys = Vec::new();
    for _ in 0..3 {
        let mut finished = EventReceiver::new(
            p.event_bus.subscribe(),
            EventFilter::types(vec!["upload_completed"]),
            "pipeline_test",
        );
        assert!(matches!(
            p.orchestrator.trigger(TriggerSource::Manual),
            TriggerOutcome::Accepted(_)
        ));
        match timeout(Duration::from_secs(2), finished.recv()).await {
            Ok(Ok(DoorbellEvent::UploadCompleted { key, .. })) => keys.push(key),
            other => panic!("Unexpected result: {:?}", other),
        }
        p.orchestrator.wait_until_idle().await;
    }

    let records = p.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0].0, keys.last().unwrap());
    assert_eq!(p.orchestrator.stats().uploads_completed, 3);
}

#[tokio::test]
async fn missing_camera_rejects_manual_trigger() {
    let p = pipeline(
        MockCameraBackend::new().without_cameras(),
        MemorySink::new("logs").with_records(1),
    )
    .await;

    let outcome = p.orchestrator.trigger(TriggerSource::Manual);

    assert_eq!(outcome, TriggerOutcome::Rejected(CaptureError::NotOpen));
    assert_eq!(p.backend.calls().configure_session, 0);
    assert_eq!(p.sink.journal(), Vec::<SinkOp>::new());
}
