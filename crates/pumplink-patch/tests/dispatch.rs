//! Command dispatch: preconditions, mutual exclusion, result mapping

mod common;

use std::time::Duration;

use pumplink_patch::protocol::mock::MockReply;
use pumplink_patch::protocol::InfusionInfoPayload;
use pumplink_patch::{
    CodecError, DoseEventKind, ProtocolRequest, Pump, TempBasalRate, TempBasalSpec,
};

use common::{bring_online, harness, wait_until, SERIAL};

fn temp_basal() -> TempBasalSpec {
    TempBasalSpec {
        rate: TempBasalRate::UnitsPerHour(1.5),
        duration_minutes: 30,
    }
}

#[tokio::test(start_paused = true)]
async fn dosing_with_adapter_disabled_is_refused_without_transport_contact() {
    let h = harness();
    bring_online(&h).await;

    h.transport.set_adapter_enabled(false);
    wait_until(|| !h.pump.is_connected()).await;

    let requests_before = h.codec.requests().len();
    let result = h.pump.start_temp_basal(temp_basal()).await;
    assert!(!result.success);
    assert!(!result.enacted);
    assert_eq!(h.codec.requests().len(), requests_before);
}

#[tokio::test(start_paused = true)]
async fn dosing_without_a_booted_patch_is_refused() {
    // A pairing record without a boot acknowledgement: no reconnect fires
    // and no dosing is allowed.
    let mut record = common::paired_record();
    record.booted = false;
    let h = common::harness_configured(record, |_, _| {});

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!h.pump.is_connected());

    let result = h.pump.start_immediate_bolus(1.0).await;
    assert!(!result.enacted);
    assert!(!h
        .codec
        .requests()
        .iter()
        .any(|r| matches!(r, ProtocolRequest::StartBolus { .. })));
}

#[tokio::test(start_paused = true)]
async fn same_category_request_is_rejected_while_one_is_in_flight() {
    let h = harness();
    bring_online(&h).await;

    h.codec.set_latency(Duration::from_secs(1));
    let pump = h.pump.clone();
    let first = tokio::spawn(async move { pump.start_temp_basal(temp_basal()).await });

    // Let the first request claim its category
    wait_until(|| h.pump.is_busy()).await;
    let second = h.pump.start_temp_basal(temp_basal()).await;
    assert!(!second.success);
    assert!(!second.enacted);
    assert_eq!(
        second.comment.as_deref(),
        Some("A temp-basal command is already in flight")
    );

    let first = first.await.unwrap();
    assert!(first.enacted);

    // The rejection never reached the patch and left no trace in the snapshot
    let sent: Vec<_> = h
        .codec
        .requests()
        .into_iter()
        .filter(|r| matches!(r, ProtocolRequest::StartTempBasal { .. }))
        .collect();
    assert_eq!(sent.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cross_category_commands_are_independent() {
    let h = harness();
    bring_online(&h).await;

    h.codec.set_latency(Duration::from_secs(1));
    let pump = h.pump.clone();
    let bolus = tokio::spawn(async move { pump.start_extended_bolus(2.0, 60).await });
    wait_until(|| h.pump.is_busy()).await;

    // A different category is not blocked by the in-flight extended bolus
    let result = h.pump.start_temp_basal(temp_basal()).await;
    assert!(result.enacted);
    assert!(bolus.await.unwrap().enacted);
}

#[tokio::test(start_paused = true)]
async fn each_confirmed_command_emits_exactly_one_dose_event() {
    let h = harness();
    bring_online(&h).await;
    let mut doses = h.pump.subscribe_dose_events();

    let result = h.pump.start_temp_basal(temp_basal()).await;
    assert!(result.enacted);
    assert_eq!(result.rate, Some(TempBasalRate::UnitsPerHour(1.5)));
    assert_eq!(result.duration_minutes, Some(30));

    let event = doses.recv().await.unwrap();
    assert_eq!(event.serial, SERIAL);
    assert_eq!(
        event.kind,
        DoseEventKind::TempBasalStarted {
            rate: TempBasalRate::UnitsPerHour(1.5),
            duration_minutes: 30,
        }
    );

    let result = h.pump.cancel_temp_basal().await;
    assert!(result.enacted);
    assert!(result.temp_cancel);
    let event = doses.recv().await.unwrap();
    assert_eq!(event.kind, DoseEventKind::TempBasalStopped);

    // Nothing else was synchronized
    assert!(doses.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn dose_event_ids_are_monotonic_across_commands() {
    let h = harness();
    bring_online(&h).await;
    let mut doses = h.pump.subscribe_dose_events();

    assert!(h.pump.start_temp_basal(temp_basal()).await.enacted);
    assert!(h.pump.cancel_temp_basal().await.enacted);
    assert!(h.pump.start_extended_bolus(2.0, 60).await.enacted);

    let first = doses.recv().await.unwrap();
    let second = doses.recv().await.unwrap();
    let third = doses.recv().await.unwrap();
    assert!(first.id < second.id);
    assert!(second.id < third.id);
}

#[tokio::test(start_paused = true)]
async fn basal_update_cancels_active_deliveries_first() {
    let h = harness();
    bring_online(&h).await;

    assert!(h.pump.start_extended_bolus(2.0, 60).await.enacted);
    assert!(h.pump.start_temp_basal(temp_basal()).await.enacted);

    let profile = pumplink_patch::BasalProfile::flat(0.8);
    let result = h.pump.update_basal_program(&profile).await;
    assert!(result.enacted);

    // Cancels went out through their own operations, before the program
    let requests = h.codec.requests();
    let cancel_extended = requests
        .iter()
        .position(|r| *r == ProtocolRequest::CancelExtendedBolus)
        .expect("extended bolus cancel sent");
    let cancel_temp = requests
        .iter()
        .position(|r| *r == ProtocolRequest::CancelTempBasal)
        .expect("temp basal cancel sent");
    let update = requests
        .iter()
        .position(|r| matches!(r, ProtocolRequest::UpdateBasalProgram { .. }))
        .expect("program update sent");
    assert!(cancel_extended < update);
    assert!(cancel_temp < update);
    assert!(h.pump.is_profile_set(&profile));
}

#[tokio::test(start_paused = true)]
async fn failed_cancel_abandons_the_basal_update() {
    let h = harness();
    bring_online(&h).await;

    assert!(h.pump.start_extended_bolus(2.0, 60).await.enacted);

    // The extended-bolus cancel is the next request; make the patch refuse it
    h.codec.push_reply(MockReply::Fail(CodecError::Rejected(
        "delivery in progress".to_string(),
    )));
    let profile = pumplink_patch::BasalProfile::flat(0.8);
    let result = h.pump.update_basal_program(&profile).await;
    assert!(!result.success);
    assert!(!result.enacted);

    // No partial state: the program was never sent
    assert!(!h
        .codec
        .requests()
        .iter()
        .any(|r| matches!(r, ProtocolRequest::UpdateBasalProgram { .. })));
    assert!(!h.pump.is_profile_set(&profile));
}

#[tokio::test(start_paused = true)]
async fn timeout_reports_not_enacted_with_hint_only_for_bolus() {
    let h = harness();
    bring_online(&h).await;

    h.codec.push_reply(MockReply::Stall);
    let result = h.pump.start_immediate_bolus(1.0).await;
    assert!(!result.enacted);
    assert_eq!(
        result.comment.as_deref(),
        Some("No response from the patch. Check that it is in range and connected.")
    );

    h.codec.push_reply(MockReply::Stall);
    let result = h.pump.cancel_temp_basal().await;
    assert!(!result.enacted);
    assert_eq!(result.comment, None);
}

#[tokio::test(start_paused = true)]
async fn device_rejection_reports_not_enacted() {
    let h = harness();
    bring_online(&h).await;
    let mut doses = h.pump.subscribe_dose_events();

    h.codec.push_reply(MockReply::Fail(CodecError::Rejected(
        "occlusion".to_string(),
    )));
    let result = h.pump.start_temp_basal(temp_basal()).await;
    assert!(!result.success);
    assert!(!result.enacted);
    // A refused command synchronizes nothing
    assert!(doses.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn settings_apply_and_refresh_updates_the_record() -> anyhow::Result<()> {
    let h = harness();
    bring_online(&h).await;

    let result = h.pump.set_buzzer(true).await;
    assert!(result.enacted);
    assert!(h
        .codec
        .requests()
        .iter()
        .any(|r| *r == ProtocolRequest::SetBuzzer { enabled: true }));

    // A disabled reminder is not pushed to the patch
    let result = h.pump.set_low_insulin_notice(0).await;
    assert!(result.success);
    assert!(!h
        .codec
        .requests()
        .iter()
        .any(|r| matches!(r, ProtocolRequest::SetLowInsulinNotice { .. })));

    // A status refresh stores the reported reservoir level and persists it
    h.codec.push_reply(MockReply::Respond(
        pumplink_patch::ProtocolResponse::InfusionInfo(InfusionInfoPayload {
            snapshot: Default::default(),
            insulin_remaining: 151.5,
            booted: true,
        }),
    ));
    let result = h.pump.refresh_status().await;
    assert!(result.success);
    assert_eq!(h.pump.reservoir_level(), 151.5);

    let persisted = pumplink_patch::PatchStore::new(Some(h.store_path.clone())).load();
    assert!(persisted.booted);
    assert_eq!(persisted.identity.insulin_remaining, 151.5);
    Ok(())
}
