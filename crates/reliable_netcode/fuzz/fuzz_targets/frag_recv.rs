#![no_main]

use {
    core::time::Duration,
    libfuzzer_sys::fuzz_target,
    reliable_netcode::{
        frag::FragmentReceiver,
        octs::Bytes,
        packet::FragmentPosition,
        seq::MessageSeq,
    },
};

fuzz_target!(|input: Vec<(MessageSeq, FragmentPosition, &[u8])>| {
    const MAX_FRAG_LEN: usize = 32;
    const MAX_FRAGS: u8 = 16;

    let mut recv = FragmentReceiver::new(MAX_FRAG_LEN, MAX_FRAGS);
    for (msg_seq, position, payload) in input {
        let payload = Bytes::copy_from_slice(payload);
        if let Ok(Some(msg)) = recv.reassemble(Duration::ZERO, msg_seq, position, payload) {
            assert!(msg.len() <= MAX_FRAG_LEN * usize::from(MAX_FRAGS));
        }
    }
});
