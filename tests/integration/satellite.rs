use std::time::Duration;

use courier_core::wire::MAX_BEARER_ENVELOPE;
use courier_services::{BearerKind, BearerReassembler, DeliveryOutcome};

use crate::*;

#[test]
fn satellite_only_without_service_is_unreachable() {
    let h = Harness::new();
    h.systems.touch("auv-1");

    let handle = h
        .dispatcher
        .submit(payload(16), "auv-1", Duration::from_secs(1), &["Satellite"]);

    assert_eq!(handle.get(), DeliveryOutcome::Unreachable);
    assert_eq!(h.wifi_sent(), 0);
    assert!(h.spooled().is_empty());
}

#[test]
fn envelopes_stay_within_limit_and_reassemble() {
    let h = Harness::new();
    h.systems.set_satellite_available(true);
    let message = payload(600);

    let handle = h
        .dispatcher
        .submit(message.clone(), "auv-1", Duration::from_secs(1), &["satellite"]);
    assert_eq!(handle.get(), DeliveryOutcome::Success);

    let envelopes = h.spooled();
    assert!(envelopes.len() > 1);
    assert_eq!(handle.dispatch_info().unwrap().parts, envelopes.len());
    for env in &envelopes {
        assert!(env.encoded_len() <= MAX_BEARER_ENVELOPE);
        assert_eq!(env.kind, BearerKind::Fragment);
        assert_eq!(env.source, LOCAL_ID);
        assert_eq!(env.destination.0, 0x15);
    }

    let mut reassembler = BearerReassembler::new(Duration::from_secs(60));
    let mut rebuilt = None;
    for env in &envelopes {
        rebuilt = reassembler.push(env).unwrap();
    }
    let rebuilt = rebuilt.expect("last envelope completes the message");
    assert_eq!(rebuilt.request_id, handle.request_id());
    assert_eq!(rebuilt.payload, message.payload);
}

#[test]
fn small_message_is_a_single_envelope() {
    let h = Harness::new();
    h.systems.set_satellite_available(true);

    let handle = h
        .dispatcher
        .submit(payload(32), "auv-1", Duration::from_secs(1), &["Satellite"]);
    assert_eq!(handle.get(), DeliveryOutcome::Success);

    let envelopes = h.spooled();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].kind, BearerKind::Message);
}

#[test]
fn satellite_is_last_resort_after_wifi_and_acoustic() {
    let h = Harness::new();
    h.systems.set_satellite_available(true);
    h.systems.mark_lost("buoy");

    let handle = h
        .dispatcher
        .submit(payload(32), "auv-1", Duration::from_secs(1), &[]);
    assert_eq!(handle.get(), DeliveryOutcome::Success);
    assert_eq!(handle.dispatch_info().unwrap().channel, "Satellite");
    assert_eq!(h.wifi_sent(), 0);
    assert!(h.relay_sent().is_empty());
}
