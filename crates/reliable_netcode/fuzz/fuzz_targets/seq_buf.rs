#![no_main]

use {arbitrary::Arbitrary, libfuzzer_sys::fuzz_target, reliable_netcode::seq_buf::SeqBuf};

#[derive(Debug, Arbitrary)]
enum OpKind {
    Insert,
    Remove,
    ClearRange { len: u8 },
}

#[derive(Debug, Arbitrary)]
struct Op {
    kind: OpKind,
    key: u16,
    value: u16,
}

fuzz_target!(|input: Box<[Op]>| {
    let mut buf = SeqBuf::<u16, 256>::new();

    for op in input {
        match op.kind {
            OpKind::Insert => {
                buf.insert(op.key, op.value);
                assert_eq!(Some(&op.value), buf.get(op.key));
                assert_eq!(Some(op.key), buf.occupant(op.key));
            }
            OpKind::Remove => {
                buf.remove(op.key);
                assert!(!buf.contains(op.key));
            }
            OpKind::ClearRange { len } => {
                let end = op.key.wrapping_add(u16::from(len) + 1);
                buf.clear_range(op.key, end);
                assert!(!buf.contains(op.key));
            }
        }
    }
});
