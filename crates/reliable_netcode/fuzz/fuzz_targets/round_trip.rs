#![no_main]

use {
    libfuzzer_sys::fuzz_target,
    reliable_netcode::{
        channel::QosType,
        endpoint::{Callbacks, Endpoint, EndpointConfig},
        octs::Bytes,
    },
};

fuzz_target!(|input: (QosType, &[u8])| {
    let (qos, msg) = input;

    let config = EndpointConfig::default()
        .with_fragment_size(32)
        .with_max_fragments(255);
    let mut sender = Endpoint::new(config.clone()).unwrap();
    let mut receiver = Endpoint::new(config).unwrap();

    let mut packets = Vec::new();
    let sent = sender.send_message(
        Bytes::copy_from_slice(msg),
        qos,
        &mut Callbacks::new(|packet| packets.push(packet), |_| {}),
    );
    if sent.is_err() {
        assert!(packets.is_empty());
        return;
    }

    let mut received = Vec::new();
    let mut handler = Callbacks::new(|_| {}, |msg| received.push(msg));
    for packet in packets {
        receiver.receive_packet(packet, &mut handler);
    }
    assert_eq!(1, received.len());
    assert_eq!(msg, &received[0][..]);
});
