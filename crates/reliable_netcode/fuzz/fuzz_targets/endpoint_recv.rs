#![no_main]

use {
    core::time::Duration,
    libfuzzer_sys::fuzz_target,
    reliable_netcode::{
        endpoint::{Callbacks, Endpoint, EndpointConfig},
        octs::Bytes,
    },
};

fuzz_target!(|packets: Vec<&[u8]>| {
    let config = EndpointConfig::default()
        .with_fragment_size(32)
        .with_max_fragments(8);
    let mut endpoint = Endpoint::new(config).unwrap();
    let mut handler = Callbacks::new(|_| {}, |msg: Bytes| assert!(!msg.is_empty()));

    for packet in packets {
        endpoint.receive_packet(Bytes::copy_from_slice(packet), &mut handler);
        endpoint.update(Duration::from_millis(10), &mut handler);
    }
});
