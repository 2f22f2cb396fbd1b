use std::time::{Duration, Instant};

use courier_services::{DeliveryOutcome, DeliveryRequest, DeliveryStage};

use crate::*;

#[test]
fn unknown_destination_is_unreachable_without_any_send() {
    let h = Harness::new();
    let handle = h
        .dispatcher
        .submit(payload(8), "auv-9", Duration::from_secs(1), &[]);

    assert_eq!(handle.get(), DeliveryOutcome::Unreachable);
    assert_eq!(h.wifi_sent(), 0);
    assert!(h.relay_sent().is_empty());
    assert!(h.spooled().is_empty());
}

#[test]
fn wifi_is_used_first_when_reachable() {
    let h = Harness::new();
    h.systems.touch("auv-1");
    h.systems.set_satellite_available(true);

    let handle = h
        .dispatcher
        .submit(payload(16), "auv-1", Duration::from_secs(1), &[]);

    assert_eq!(handle.get(), DeliveryOutcome::Success);
    assert_eq!(handle.dispatch_info().unwrap().channel, "Wifi");
    assert_eq!(h.wifi_sent(), 1);
    assert!(h.relay_sent().is_empty());
    assert!(h.spooled().is_empty());

    let (dest, sent) = &h.wifi.sent.lock().unwrap()[0];
    assert_eq!(dest, "auv-1");
    assert_eq!(sent.source, LOCAL_ID);
    assert_eq!(sent.destination.0, 0x15);
    assert_eq!(sent.request_id, handle.request_id());
}

#[test]
fn refused_wifi_send_does_not_fall_back() {
    let h = Harness::new();
    h.systems.touch("auv-1");
    h.wifi_mode(WifiMode::Refuse);

    let handle = h
        .dispatcher
        .submit(payload(16), "auv-1", Duration::from_secs(1), &[]);

    assert!(matches!(handle.get(), DeliveryOutcome::Error(_)));
    assert!(h.relay_sent().is_empty());
}

#[test]
fn silent_wifi_hits_the_tracker_deadline() {
    let h = Harness::new();
    h.systems.touch("auv-1");
    h.wifi_mode(WifiMode::Silent);

    let start = Instant::now();
    let handle = h
        .dispatcher
        .submit(payload(4), "auv-1", Duration::from_millis(150), &[]);

    assert_eq!(handle.stage(), DeliveryStage::Sent);
    assert_eq!(handle.get(), DeliveryOutcome::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert_eq!(handle.outcome(), Some(DeliveryOutcome::Timeout));
    assert_eq!(handle.stage(), DeliveryStage::Done);
}

#[test]
fn shorter_wait_returns_timeout_without_settling() {
    let h = Harness::new();
    h.systems.touch("auv-1");
    h.wifi_mode(WifiMode::Silent);

    let handle = h
        .dispatcher
        .submit(payload(4), "auv-1", Duration::from_secs(30), &[]);

    let start = Instant::now();
    assert_eq!(
        handle.get_timeout(Duration::from_millis(100)),
        DeliveryOutcome::Timeout
    );
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(handle.outcome(), None);
}

#[test]
fn request_ids_increase_per_submission() {
    let h = Harness::new();
    h.systems.touch("auv-1");

    let first = h
        .dispatcher
        .submit(payload(1), "auv-1", Duration::from_secs(1), &[]);
    let second = h
        .dispatcher
        .submit(payload(1), "auv-1", Duration::from_secs(1), &[]);
    assert!(second.request_id() > first.request_id());
}

#[test]
fn disabled_channel_is_not_offered() {
    let h = Harness::new();
    h.systems.touch("auv-1");
    assert!(h.dispatcher.registry().set_enabled("wifi", false));

    let handle = h.dispatcher.dispatch(
        DeliveryRequest::new(payload(4), "auv-1")
            .timeout(Duration::from_secs(1))
            .channels(&["Wifi"]),
    );

    assert_eq!(handle.get(), DeliveryOutcome::Unreachable);
    assert_eq!(h.wifi_sent(), 0);
}

#[tokio::test]
async fn async_wait_sees_the_outcome() {
    let h = Harness::new();
    h.systems.touch("auv-1");

    let handle = h
        .dispatcher
        .submit(payload(4), "auv-1", Duration::from_secs(1), &["wifi"]);
    assert_eq!(
        handle.get_async(Duration::from_secs(1)).await,
        DeliveryOutcome::Success
    );
}
