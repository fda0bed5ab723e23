#![expect(missing_docs, clippy::unwrap_used, reason = "testing")]

mod common;

use {
    assert_matches::assert_matches,
    common::{Loopback, Pair, expected_tags, tagged, tags},
    core::time::Duration,
    octs::Bytes,
    reliable_netcode::{
        channel::QosType,
        condition::ConditionerConfig,
        endpoint::{Callbacks, Endpoint, EndpointConfig, EndpointStats, SendError},
        seq::MessageSeq,
    },
};

const RUNS: u64 = 20;

fn lossy(loss_rate: f32, reorder_rate: f32) -> ConditionerConfig {
    ConditionerConfig {
        loss_rate,
        reorder_rate,
    }
}

#[test]
fn basic_sending() {
    let mut lo = Loopback::perfect();
    for tag in 0..100 {
        lo.send(tagged(256, tag), QosType::ReliableOrdered);
        lo.deliver();
    }
    lo.run_until_received(100, 5000.0);

    assert_eq!(expected_tags(100), lo.tags());
    assert_eq!(0, lo.endpoint.stats().packets_invalid.0);
}

#[test]
fn sequences_wrap_around() {
    const COUNT: usize = 68_000;

    let mut lo = Loopback::perfect();
    for tag in (0..=u8::MAX).cycle().take(COUNT) {
        lo.send(tagged(256, tag), QosType::ReliableOrdered);
        lo.deliver();
        lo.run_for(0.1);
    }
    lo.run_until_received(COUNT, 5000.0);

    assert_eq!(expected_tags(COUNT), lo.tags());
}

#[test]
fn delivered_in_order_under_heavy_loss() {
    for seed in 0..RUNS {
        let mut lo = Loopback::new(EndpointConfig::default(), lossy(0.5, 0.0), seed);
        for tag in 0..100 {
            lo.send(tagged(256, tag), QosType::ReliableOrdered);
            lo.deliver();
            lo.run_for(0.1);
        }
        lo.run_until_received(100, 5000.0);

        assert_eq!(expected_tags(100), lo.tags(), "seed {seed}");
        assert!(lo.in_transit.dropped() > 0);
        assert!(lo.endpoint.stats().frags_retransmitted.0 > 0);
    }
}

#[test]
fn fragmented_under_loss_and_reordering() {
    for seed in 0..RUNS {
        let mut lo = Loopback::new(EndpointConfig::default(), lossy(0.2, 0.5), seed);
        for tag in 0..20 {
            lo.send(tagged(3333, tag), QosType::ReliableOrdered);
        }
        lo.deliver();
        lo.run_until_received(20, 5000.0);

        assert_eq!(expected_tags(20), lo.tags(), "seed {seed}");
        assert!(lo.received.iter().all(|msg| msg.len() == 3333));
    }
}

#[test]
fn duplicate_packets_are_ignored() {
    let mut lo = Loopback::perfect();
    for tag in 0..5 {
        lo.send(tagged(2000, tag), QosType::ReliableOrdered);
    }
    let packets = lo.in_transit.flush().collect::<Vec<_>>();
    assert_eq!(10, packets.len());

    for packet in packets.iter().chain(&packets) {
        lo.receive(packet.clone());
    }

    assert_eq!(expected_tags(5), lo.tags());
    let stats = lo.endpoint.stats();
    assert_eq!(10, stats.packets_duplicate.0);
    assert_eq!(5, stats.msgs_delivered.0);

    lo.send(tagged(10, 5), QosType::ReliableOrdered);
    lo.deliver();
    assert_eq!(expected_tags(6), lo.tags());
}

#[test]
fn acked_messages_leave_flight() {
    let mut lo = Loopback::perfect();
    lo.send(tagged(256, 0), QosType::ReliableOrdered);
    assert_eq!(1, lo.endpoint.in_flight());

    lo.deliver();
    lo.run_for(0.1);

    assert_eq!(0, lo.endpoint.in_flight());
    let stats = lo.endpoint.stats();
    assert_eq!(1, stats.msgs_acked.0);
    assert_eq!(0, stats.frags_retransmitted.0);
    assert!(lo.endpoint.rtt().samples() > 0);
}

#[test]
fn unacked_messages_are_retransmitted() {
    let mut endpoint = Endpoint::new(EndpointConfig::default()).unwrap();
    let mut sent = Vec::new();
    let mut handler = Callbacks::new(|packet| sent.push(packet), |_| {});

    endpoint
        .send_message(tagged(256, 0), QosType::ReliableOrdered, &mut handler)
        .unwrap();
    endpoint.update(endpoint.config().max_rto, &mut handler);

    assert_eq!(2, sent.len());
    assert_eq!(1, endpoint.stats().frags_retransmitted.0);
    assert_eq!(1, endpoint.in_flight());
}

#[test]
fn bursts_wait_for_the_send_window() {
    const COUNT: usize = 300;

    let mut lo = Loopback::perfect();
    for tag in expected_tags(COUNT) {
        lo.send(tagged(16, tag), QosType::ReliableOrdered);
    }
    assert_eq!(256, lo.transmitted.len());
    assert_eq!(256, lo.endpoint.in_flight());
    assert_eq!(COUNT - 256, lo.endpoint.queued());

    lo.deliver();
    lo.run_until_received(COUNT, 5000.0);

    assert_eq!(expected_tags(COUNT), lo.tags());
    assert_eq!(0, lo.endpoint.queued());
}

#[test]
fn full_send_queue() {
    let config = EndpointConfig::default().with_send_queue_len(4);
    let mut endpoint = Endpoint::new(config).unwrap();
    let mut in_transit = Vec::new();
    let mut handler = Callbacks::new(|packet| in_transit.push(packet), |_| {});

    for tag in expected_tags(260) {
        endpoint
            .send_message(tagged(16, tag), QosType::ReliableOrdered, &mut handler)
            .unwrap();
    }
    assert_matches!(
        endpoint.send_message(tagged(16, 0), QosType::ReliableOrdered, &mut handler),
        Err(SendError::QueueFull { cap: 4 })
    );
    assert_eq!(256, endpoint.in_flight());
    assert_eq!(4, endpoint.queued());
    assert_eq!(260, endpoint.stats().msgs_sent.0);

    // other channels are unaffected
    endpoint
        .send_message(tagged(16, 0), QosType::Unreliable, &mut handler)
        .unwrap();
    assert_eq!(257, in_transit.len());
}

#[test]
fn in_flight_drains_after_acks() {
    let mut lo = Loopback::perfect();
    for tag in 0..=u8::MAX {
        lo.send(tagged(16, tag), QosType::ReliableOrdered);
    }
    lo.deliver();
    assert_eq!(256, lo.received.len());

    for _ in 0..60 {
        if lo.endpoint.in_flight() == 0 {
            break;
        }
        lo.run_for(1.0);
    }
    assert_eq!(0, lo.endpoint.in_flight());
    assert_eq!(
        MessageSeq::new(256),
        lo.send(tagged(16, 0), QosType::ReliableOrdered)
    );
}

#[test]
fn both_directions_under_loss() {
    const COUNT: usize = 200;

    for seed in 0..RUNS {
        let mut pair = Pair::new(EndpointConfig::default(), lossy(0.3, 0.3), seed);
        for tag in (0..=u8::MAX).cycle().take(COUNT) {
            pair.a.send(tagged(600, tag), QosType::ReliableOrdered);
            pair.b.send(tagged(1500, tag), QosType::ReliableOrdered);
            pair.tick();
        }

        let mut ticks = 0;
        while pair.a.endpoint.in_flight() > 0 || pair.b.endpoint.in_flight() > 0 {
            assert!(ticks < 10_000, "seed {seed}: messages never acked");
            pair.tick();
            ticks += 1;
        }

        assert_eq!(expected_tags(COUNT), tags(&pair.b.received), "seed {seed}");
        assert_eq!(expected_tags(COUNT), tags(&pair.a.received), "seed {seed}");
        assert!(pair.a.endpoint.rtt().samples() > 0);
    }
}

#[test]
fn reset_forgets_everything() {
    let mut lo = Loopback::perfect();
    lo.send(tagged(4000, 0), QosType::ReliableOrdered);
    lo.run_for(0.5);
    assert_ne!(Duration::ZERO, lo.endpoint.now());

    lo.endpoint.reset();

    assert_eq!(Duration::ZERO, lo.endpoint.now());
    assert_eq!(0, lo.endpoint.in_flight());
    assert_eq!(EndpointStats::default(), lo.endpoint.stats());
    assert_eq!(
        MessageSeq::new(0),
        lo.send(Bytes::from_static(&[0, 1]), QosType::ReliableOrdered)
    );
}
