#![expect(missing_docs, reason = "testing")]

mod common;

use {
    common::{Loopback, expected_tags, tagged},
    reliable_netcode::{channel::QosType, condition::ConditionerConfig, endpoint::EndpointConfig},
};

const RUNS: u64 = 20;

#[test]
fn basic_unreliable() {
    let mut lo = Loopback::perfect();
    for tag in 0..100 {
        lo.send(tagged(256, tag), QosType::Unreliable);
        lo.deliver();
    }

    assert_eq!(expected_tags(100), lo.tags());
    assert_eq!(0, lo.endpoint.in_flight());
}

#[test]
fn basic_unreliable_ordered() {
    let mut lo = Loopback::perfect();
    for tag in 0..100 {
        lo.send(tagged(256, tag), QosType::UnreliableOrdered);
        lo.deliver();
    }

    assert_eq!(expected_tags(100), lo.tags());
}

#[test]
fn large_unreliable() {
    let mut lo = Loopback::perfect();
    for tag in 0..100 {
        lo.send(tagged(4096, tag), QosType::Unreliable);
        lo.deliver();
    }

    assert_eq!(expected_tags(100), lo.tags());
    assert!(lo.received.iter().all(|msg| msg.len() == 4096));
    assert_eq!(400, lo.endpoint.stats().packets_sent.0);
}

#[test]
fn unreliable_never_retransmits() {
    let config = ConditionerConfig {
        loss_rate: 1.0,
        reorder_rate: 0.0,
    };
    let mut lo = Loopback::new(EndpointConfig::default(), config, 0);
    lo.send(tagged(3000, 0), QosType::Unreliable);
    lo.send(tagged(3000, 1), QosType::UnreliableOrdered);
    lo.run_for(10.0);

    assert!(lo.received.is_empty());
    assert_eq!(6, lo.transmitted.len());
    assert_eq!(0, lo.endpoint.stats().frags_retransmitted.0);
}

#[test]
fn unreliable_ordered_never_goes_back() {
    let config = ConditionerConfig {
        loss_rate: 0.0,
        reorder_rate: 0.5,
    };
    for seed in 0..RUNS {
        let mut lo = Loopback::new(EndpointConfig::default(), config.clone(), seed);
        for tag in 0..10 {
            lo.send(tagged(256, tag), QosType::UnreliableOrdered);
        }
        lo.deliver();

        let tags = lo.tags();
        assert!(!tags.is_empty());
        assert!(
            tags.is_sorted_by(|a, b| a < b),
            "seed {seed}: delivered out of order: {tags:?}"
        );
        assert_eq!(0, lo.endpoint.stats().packets_rejected.0);
    }
}

#[test]
fn unreliable_ordered_fragments_never_go_back() {
    let config = ConditionerConfig {
        loss_rate: 0.1,
        reorder_rate: 0.5,
    };
    for seed in 0..RUNS {
        let mut lo = Loopback::new(EndpointConfig::default(), config.clone(), seed);
        for tag in 0..10 {
            lo.send(tagged(3333, tag), QosType::UnreliableOrdered);
        }
        lo.deliver();

        let tags = lo.tags();
        assert!(
            tags.is_sorted_by(|a, b| a < b),
            "seed {seed}: delivered out of order: {tags:?}"
        );
    }
}

/// Sends fragmented messages over a lossy reordering link, returning the tags
/// received in order, and for every packet transmitted whether it was kept.
fn fragmented_lossy_run(seed: u64) -> (Vec<u8>, Vec<bool>) {
    let config = ConditionerConfig {
        loss_rate: 0.1,
        reorder_rate: 0.5,
    };
    let mut lo = Loopback::new(EndpointConfig::default(), config, seed);
    for tag in 0..10 {
        lo.send(tagged(3333, tag), QosType::Unreliable);
    }
    lo.deliver();
    (lo.tags(), lo.transmitted)
}

#[test]
fn fragmented_loss_and_reordering_is_deterministic() {
    const SEED: u64 = 0x1337_1337;

    let (tags, transmitted) = fragmented_lossy_run(SEED);
    assert_eq!((tags.clone(), transmitted.clone()), fragmented_lossy_run(SEED));

    // 3333 bytes split into 1024 byte fragments
    assert_eq!(40, transmitted.len());
    let mut expected = transmitted
        .chunks(4)
        .zip(0..)
        .filter(|(kept, _)| kept.iter().all(|&kept| kept))
        .map(|(_, tag)| tag)
        .collect::<Vec<u8>>();
    expected.sort_unstable();

    let mut received = tags;
    received.sort_unstable();
    assert_eq!(expected, received);
}

#[test]
fn incomplete_messages_expire() {
    let mut lo = Loopback::perfect();
    lo.send(tagged(3000, 0), QosType::Unreliable);
    // lose the last fragment
    let first_frags = lo.in_transit.flush().take(2).collect::<Vec<_>>();
    for packet in first_frags {
        lo.receive(packet);
    }
    assert!(lo.received.is_empty());

    let timeout = lo.endpoint.config().reassembly_timeout;
    lo.run_for(timeout.as_secs_f64() + 1.0);

    assert!(lo.received.is_empty());
    assert_eq!(1, lo.endpoint.stats().reassemblies_expired.0);
}
