//! Shared harness: a PatchPump over the mock transport and mock codec,
//! seeded with a persisted pairing record.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pumplink_patch::link::mock::MockLinkTransport;
use pumplink_patch::protocol::mock::MockCodec;
use pumplink_patch::{PatchDriverConfig, PatchPump, PatchRecord, PatchState, PatchStore, Pump};

pub const ADDRESS: &str = "E4:12:9C:00:11:22";
pub const SERIAL: &str = "PL-0042";

pub struct Harness {
    pub pump: Arc<PatchPump>,
    pub transport: Arc<MockLinkTransport>,
    pub codec: Arc<MockCodec>,
    pub store_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

/// A record as the driver would have persisted it after a prior session
pub fn paired_record() -> PatchRecord {
    let mut record = PatchRecord::default();
    record.identity.address = ADDRESS.to_string();
    record.identity.manufacture_number = SERIAL.to_string();
    record.identity.insulin_remaining = 200.0;
    record.booted = true;
    record
}

/// Build a harness, letting the caller script the mocks before the driver
/// starts (and with it, the first reconnect).
pub fn harness_configured(
    record: PatchRecord,
    setup: impl FnOnce(&MockLinkTransport, &MockCodec),
) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().expect("tempdir");
    let store_path = dir.path().join("patch.json");
    PatchStore::new(Some(store_path.clone()))
        .save(&record)
        .expect("seed record");

    let transport = Arc::new(MockLinkTransport::new());
    let codec = Arc::new(MockCodec::new());
    setup(&transport, &codec);

    let config = PatchDriverConfig {
        store_path: Some(store_path.clone()),
        ..Default::default()
    };
    let pump = PatchPump::new(config, transport.clone(), codec.clone());

    Harness {
        pump,
        transport,
        codec,
        store_path,
        _dir: dir,
    }
}

pub fn harness() -> Harness {
    harness_configured(paired_record(), |_, _| {})
}

/// Poll until the condition holds (virtual time auto-advances while polling)
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_for_state(pump: &PatchPump, expected: PatchState) {
    let mut rx = pump.subscribe_patch_state();
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if *rx.borrow_and_update() == expected {
                return;
            }
            rx.changed().await.expect("state channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {expected:?}"));
}

/// Drive the pump to connected-booted through the public flow: the automatic
/// reconnect takes the link to ready, then a status query confirms boot.
pub async fn bring_online(h: &Harness) {
    wait_until(|| h.pump.is_connected()).await;
    let result = h.pump.refresh_status().await;
    assert!(result.success, "status refresh failed: {result:?}");
    wait_for_state(&h.pump, PatchState::ConnectedBooted).await;
}
