//! Periodic control loops against a live dispatcher.

use std::sync::Arc;
use std::time::Duration;

use courier_services::{ControlError, ControlLoops};

use crate::*;

#[tokio::test]
async fn loop_sends_until_stopped() {
    let h = Harness::new();
    h.systems.touch("auv-1");
    let loops = ControlLoops::new(h.dispatcher.clone());

    loops
        .start(
            "auv-1",
            Duration::from_millis(20),
            vec!["Wifi".into()],
            Arc::new(|| payload(4)),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(loops.stop("auv-1"));
    let sent = h.wifi_sent();
    assert!(sent >= 2, "expected several ticks, got {sent}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.wifi_sent(), sent);
    assert!(loops.active().is_empty());
}

#[tokio::test]
async fn restarting_a_target_replaces_its_loop() {
    let h = Harness::new();
    h.systems.touch("auv-1");
    let loops = ControlLoops::new(h.dispatcher.clone());

    loops
        .start("auv-1", Duration::from_secs(60), vec![], Arc::new(|| payload(1)))
        .unwrap();
    loops
        .start("auv-1", Duration::from_secs(30), vec![], Arc::new(|| payload(1)))
        .unwrap();

    let active = loops.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].period_millis, 30_000);
    loops.stop_all();
    assert!(!loops.is_running("auv-1"));
}

#[tokio::test]
async fn zero_period_is_rejected() {
    let h = Harness::new();
    let loops = ControlLoops::new(h.dispatcher.clone());
    let err = loops
        .start("auv-1", Duration::ZERO, vec![], Arc::new(|| payload(1)))
        .unwrap_err();
    assert_eq!(err, ControlError::ZeroPeriod);
}
