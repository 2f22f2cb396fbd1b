//! Deliveries forwarded through an acoustic relay.

use std::time::Duration;

use courier_core::wire::{ACOUSTIC_TIMEOUT_SECS, MAX_ACOUSTIC_PAYLOAD};
use courier_core::{now_millis, DataKind};
use courier_services::{DeliveryOutcome, DeliveryStage, Fragment, FragmentAssembler};

use crate::*;

#[test]
fn large_payload_is_split_across_relay_requests() {
    let h = Harness::new();
    let message = payload(2000);
    let earliest = now_millis() + ACOUSTIC_TIMEOUT_SECS * 1000;
    let handle = h
        .dispatcher
        .submit(message.clone(), "auv-1", Duration::from_secs(5), &[]);
    let latest = now_millis() + ACOUSTIC_TIMEOUT_SECS * 1000;

    let sent = h.relay_sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|(relay, _)| relay == "buoy"));

    let requests: Vec<TransmissionRequest> = sent.into_iter().map(|(_, req)| req).collect();
    for req in &requests {
        assert_eq!(req.data_kind, DataKind::Fragment);
        assert_eq!(req.destination.0, 0x15);
        assert_eq!(req.parent_id, handle.request_id());
        assert_eq!(req.total, 3);
        assert!(req.data.len() <= MAX_ACOUSTIC_PAYLOAD);
        assert!(
            (earliest..=latest).contains(&req.deadline_millis),
            "deadline {} outside [{earliest}, {latest}]",
            req.deadline_millis
        );
    }
    assert!(requests
        .iter()
        .all(|r| r.deadline_millis == requests[0].deadline_millis));

    let sizes: Vec<usize> = requests.iter().map(|r| r.data.len()).collect();
    assert_eq!(sizes, vec![998, 998, 4]);
    let indices: Vec<u16> = requests.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    let ids: Vec<u32> = requests.iter().map(|r| r.request_id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let mut assembler = FragmentAssembler::new(Duration::from_secs(60));
    let mut joined = None;
    for req in &requests {
        joined = assembler
            .push(Fragment {
                parent_id: req.parent_id,
                index: req.index,
                total: req.total,
                payload: req.data.clone(),
            })
            .unwrap();
    }
    assert_eq!(joined.expect("all parts delivered"), message.payload);

    let info = handle.dispatch_info().unwrap();
    assert_eq!(info.channel, "Acoustic");
    assert_eq!(info.relay.as_deref(), Some("buoy"));
    assert_eq!(info.parts, 3);
    assert_eq!(handle.stage(), DeliveryStage::Sent);

    h.relay.report_all_uncertain();
    assert!(matches!(handle.get(), DeliveryOutcome::Uncertain(_)));
}

#[test]
fn payload_at_the_limit_is_one_request_within_limit() {
    let h = Harness::new();
    let message = payload(MAX_ACOUSTIC_PAYLOAD);
    let handle = h
        .dispatcher
        .submit(message.clone(), "auv-1", Duration::from_secs(5), &["Acoustic"]);

    let sent = h.relay_sent();
    assert_eq!(sent.len(), 1);
    let req = &sent[0].1;
    assert_eq!(req.data_kind, DataKind::Message);
    assert_eq!(req.data.len(), MAX_ACOUSTIC_PAYLOAD);
    assert_eq!(req.data, message.payload);
    assert_eq!((req.parent_id, req.index, req.total), (handle.request_id(), 0, 1));
}

#[test]
fn small_payload_is_one_message_request() {
    let h = Harness::new();
    let handle = h
        .dispatcher
        .submit(payload(40), "auv-1", Duration::from_secs(5), &["Acoustic"]);

    let sent = h.relay_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.data_kind, DataKind::Message);
    assert_eq!(sent[0].1.parent_id, handle.request_id());
    assert_eq!(sent[0].1.data.len(), 40);
}

#[test]
fn refused_first_request_moves_on_to_satellite() {
    let h = Harness::new();
    h.systems.set_satellite_available(true);
    *h.relay.refuse_from.lock().unwrap() = Some(0);

    let handle = h
        .dispatcher
        .submit(payload(40), "auv-1", Duration::from_secs(5), &[]);

    assert_eq!(handle.get(), DeliveryOutcome::Success);
    assert_eq!(handle.dispatch_info().unwrap().channel, "Satellite");
    assert_eq!(h.spooled().len(), 1);
}

#[test]
fn refused_later_part_is_an_error() {
    let h = Harness::new();
    h.systems.set_satellite_available(true);
    *h.relay.refuse_from.lock().unwrap() = Some(1);

    let handle = h
        .dispatcher
        .submit(payload(2000), "auv-1", Duration::from_secs(5), &[]);

    assert!(matches!(handle.get(), DeliveryOutcome::Error(_)));
    assert_eq!(h.relay_sent().len(), 1);
    assert!(h.spooled().is_empty());
}

#[test]
fn silent_relay_means_no_acoustic_route() {
    let h = Harness::new();
    h.systems.mark_lost("buoy");

    let handle = h
        .dispatcher
        .submit(payload(40), "auv-1", Duration::from_secs(1), &["Acoustic"]);
    assert_eq!(handle.get(), DeliveryOutcome::Unreachable);
    assert!(h.relay_sent().is_empty());
}

#[test]
fn relay_that_cannot_reach_destination_is_not_used() {
    let h = Harness::new();
    h.systems.insert(SystemInfo::new("auv-2", 0x16), None);

    let handle = h
        .dispatcher
        .submit(payload(40), "auv-2", Duration::from_secs(1), &["Acoustic"]);
    assert_eq!(handle.get(), DeliveryOutcome::Unreachable);
    assert!(h.relay_sent().is_empty());
}
