#![no_main]

use {
    libfuzzer_sys::fuzz_target,
    reliable_netcode::{octs::Bytes, packet::Packet},
};

fuzz_target!(|packet: &[u8]| {
    let Ok(decoded) = Packet::decode_from(Bytes::copy_from_slice(packet)) else {
        return;
    };
    // ack fields are ignored without `HAS_ACK`, so compare decoded forms
    let encoded = decoded.encode_to_bytes().unwrap();
    assert_eq!(encoded.len(), packet.len());
    assert_eq!(decoded, Packet::decode_from(encoded).unwrap());
});
