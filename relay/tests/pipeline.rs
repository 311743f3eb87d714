//! End-to-end pipeline tests over the in-process components: MQTT payloads
//! go through validation, the in-memory store and the broadcast hub, and a
//! viewer session consumes the resulting stream.

use rand::Rng;
use relay::hub::{BroadcastHub, ConnectionId, Role};
use relay::model::StoredReading;
use relay::mqtt::process_message;
use relay::session::{SessionCommand, SessionEvent, SessionState, ViewerSession, WINDOW_CAPACITY};
use relay::store::{MemoryReadingStore, ReadingStore};
use serde_json::{json, Value};
use tokio::sync::mpsc;

fn structural_payload(rng: &mut impl Rng, device: &str, danger: bool) -> Vec<u8> {
    let (vx, battery, error_code) = if danger {
        (rng.gen_range(0.4..0.8), rng.gen_range(2.8..3.0), 1)
    } else {
        (rng.gen_range(-0.05..0.05), rng.gen_range(3.6..4.0), 0)
    };
    serde_json::to_vec(&json!({
        "sensor_id": device,
        "location": "bridge-span-central",
        "telemetry": {
            "vibration_x": vx,
            "vibration_y": rng.gen_range(-0.05..0.05),
            "vibration_z": rng.gen_range(0.95..1.05),
            "temperature_c": rng.gen_range(15.0..30.0),
            "humidity_percent": rng.gen_range(40.0..60.0),
        },
        "device_health": {
            "battery_v": battery,
            "error_code": error_code,
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn ingested_readings_reach_all_viewers_in_append_order() {
    let mut rng = rand::thread_rng();
    let store = MemoryReadingStore::new();
    let hub = BroadcastHub::new();

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    hub.register(ConnectionId::new(), Role::Viewer, tx_a);
    hub.register(ConnectionId::new(), Role::Viewer, tx_b);

    let mut seqs = Vec::new();
    for n in 0..20 {
        let payload = structural_payload(&mut rng, &format!("shm-node-{}", n % 3), false);
        seqs.push(process_message(&payload, &store, &hub).await.unwrap());
    }

    for rx in [&mut rx_a, &mut rx_b] {
        for expected in &seqs {
            let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame["seq"], *expected);
        }
        assert!(rx.try_recv().is_err());
    }

    // The store saw the same order.
    let recent = store.recent(20).await.unwrap();
    let stored: Vec<i64> = recent.iter().map(|r| r.seq).collect();
    assert_eq!(stored, seqs);
}

#[tokio::test]
async fn dead_viewer_is_pruned_mid_stream() {
    let mut rng = rand::thread_rng();
    let store = MemoryReadingStore::new();
    let hub = BroadcastHub::new();

    let (tx_ok, mut rx_ok) = mpsc::unbounded_channel();
    let (tx_dead, rx_dead) = mpsc::unbounded_channel();
    hub.register(ConnectionId::new(), Role::Viewer, tx_ok);
    hub.register(ConnectionId::new(), Role::Viewer, tx_dead);

    let payload = structural_payload(&mut rng, "shm-node-alpha-01", false);
    process_message(&payload, &store, &hub).await.unwrap();
    assert_eq!(hub.viewer_count(), 2);

    // One viewer goes away without unregistering.
    drop(rx_dead);
    let payload = structural_payload(&mut rng, "shm-node-alpha-01", false);
    process_message(&payload, &store, &hub).await.unwrap();
    assert_eq!(hub.viewer_count(), 1);

    // The survivor got both frames, and persistence was unaffected.
    assert!(rx_ok.try_recv().is_ok());
    assert!(rx_ok.try_recv().is_ok());
    assert_eq!(store.recent(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn viewer_session_hydrates_then_follows_live_stream() {
    let mut rng = rand::thread_rng();
    let store = MemoryReadingStore::new();
    let hub = BroadcastHub::new();

    // Backfill some history before the viewer arrives.
    for _ in 0..120 {
        let payload = structural_payload(&mut rng, "shm-node-alpha-01", false);
        process_message(&payload, &store, &hub).await.unwrap();
    }

    let mut session = ViewerSession::new();
    let commands = session.handle(SessionEvent::Start {
        token: "tok".to_string(),
    });
    assert_eq!(
        commands,
        vec![SessionCommand::Authorize {
            token: "tok".to_string()
        }]
    );

    let commands = session.handle(SessionEvent::AuthorizationGranted);
    assert!(commands.contains(&SessionCommand::FetchHistory {
        limit: WINDOW_CAPACITY
    }));
    assert!(commands.contains(&SessionCommand::AnnounceViewer));

    // Carry out the commands against the real collaborators.
    let history = store.recent(WINDOW_CAPACITY).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.register(ConnectionId::new(), Role::Viewer, tx);

    session.handle(SessionEvent::HistoryLoaded(history));
    assert_eq!(session.state(), SessionState::Subscribed);
    assert_eq!(session.window().len(), WINDOW_CAPACITY);

    // A dangerous live reading flows hub -> session and raises the alert.
    let payload = structural_payload(&mut rng, "shm-node-beta-02", true);
    let seq = process_message(&payload, &store, &hub).await.unwrap();

    let frame: StoredReading = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame.seq, seq);
    let commands = session.handle(SessionEvent::ReadingReceived(frame));
    assert!(matches!(commands[0], SessionCommand::RaiseAlert(c) if c.danger()));

    // The window stays capped and tracks the newest reading.
    assert_eq!(session.window().len(), WINDOW_CAPACITY);
    assert_eq!(session.window().back().unwrap().seq, seq);
}

#[tokio::test]
async fn raw_relay_frames_skip_validation_and_persistence() {
    let store = MemoryReadingStore::new();
    let hub = BroadcastHub::new();

    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.register(ConnectionId::new(), Role::Viewer, tx);

    let payload = json!({ "anything": "goes", "value": -1 });
    assert_eq!(hub.relay_raw(&payload), 1);

    let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame, payload);
    assert!(store.recent(10).await.unwrap().is_empty());
}
