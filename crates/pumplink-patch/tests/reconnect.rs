//! Reconnect orchestration against the mock transport

mod common;

use std::time::Duration;

use pumplink_patch::link::mock::TransportCall;
use pumplink_patch::link::LinkEvent;
use pumplink_patch::{PatchDriverConfig, PatchState, Pump, ReconnectPhase};

use common::{bring_online, harness, harness_configured, paired_record, wait_until, ADDRESS};

#[tokio::test(start_paused = true)]
async fn full_sequence_reaches_ready_and_registers_once() {
    let h = harness();

    wait_until(|| h.pump.is_connected()).await;

    assert_eq!(h.pump.reconnect_phase(), ReconnectPhase::Ready);
    assert_eq!(h.transport.registration_count(), 1);

    let notify = PatchDriverConfig::default().reconnect.notify_characteristic;
    assert_eq!(
        h.transport.calls(),
        vec![
            TransportCall::Connect(ADDRESS.to_string()),
            TransportCall::DiscoverServices(ADDRESS.to_string()),
            TransportCall::EnableNotifications(ADDRESS.to_string(), notify),
            TransportCall::RegisterPeripheralInfo(ADDRESS.to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn stall_after_connected_fails_without_further_transport_calls() {
    let h = harness_configured(paired_record(), |transport, _| {
        // Connected arrives, then the patch goes quiet before Discovered
        transport.suppress_discovered_event();
    });

    wait_until(|| h.pump.reconnect_phase() == ReconnectPhase::Failed).await;

    let calls = h.transport.calls();
    assert_eq!(
        calls,
        vec![
            TransportCall::Connect(ADDRESS.to_string()),
            TransportCall::DiscoverServices(ADDRESS.to_string()),
        ]
    );
    assert_eq!(h.transport.registration_count(), 0);
    assert!(!h.pump.is_connected());
    // the patch is still known alive, just out of reach
    assert_eq!(h.pump.patch_state(), PatchState::DisconnectedBooted);
}

#[tokio::test(start_paused = true)]
async fn bond_cleared_aborts_sequence_before_the_budget() {
    let h = harness_configured(paired_record(), |transport, _| {
        transport.suppress_discovered_event();
    });

    // Let the sequence get past connect, then clear the bond mid-discovery
    wait_until(|| h.transport.calls().len() >= 2).await;
    let started = tokio::time::Instant::now();
    h.transport.emit_link(LinkEvent::BondCleared);

    wait_until(|| h.pump.reconnect_phase() == ReconnectPhase::Failed).await;
    assert!(
        started.elapsed() < Duration::from_secs(9),
        "abort should not wait for the sequence budget"
    );
    assert_eq!(h.transport.registration_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_is_a_noop_while_adapter_is_disabled() {
    let h = harness_configured(paired_record(), |transport, _| {
        transport.set_adapter_enabled(false);
    });

    // Give the automatic trigger every chance to misbehave
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.transport.registration_count(), 0);

    // Re-enabling the adapter does not reconnect by itself; an explicit
    // host request while disconnected-booted does.
    h.transport.set_adapter_enabled(true);
    wait_until(|| h.pump.patch_state() == PatchState::DisconnectedBooted).await;
    h.pump.connect("Connection needed");
    wait_until(|| h.pump.is_connected()).await;
    assert_eq!(h.transport.registration_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn link_loss_retriggers_reconnect_event_driven() {
    let h = harness();
    bring_online(&h).await;
    let calls_when_online = h.transport.calls().len();

    // Link drops: projection flips to disconnected-booted, which alone
    // re-triggers the orchestrator
    h.transport.emit_link(LinkEvent::Disconnected);
    wait_until(|| h.pump.is_connected() && h.transport.calls().len() > calls_when_online).await;
    assert_eq!(h.transport.registration_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn notification_enable_failure_fails_the_sequence() {
    let h = harness_configured(paired_record(), |transport, _| {
        transport.fail_notifications();
    });

    wait_until(|| h.pump.reconnect_phase() == ReconnectPhase::Failed).await;
    assert_eq!(h.transport.registration_count(), 0);
    assert!(!h.pump.is_connected());
}
