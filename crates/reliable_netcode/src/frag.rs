//! Splitting messages into fragments and reassembling them.
//!
//! A message longer than the fragment size is sent as several fragments, each
//! carried in its own packet. The receiver collects the fragments of each
//! message in a [`FragmentReceiver`] until all of them have arrived.
//!
//! # Memory management
//!
//! Fragments may be lost in transport, so a receiver may be left with a
//! message which will never be completed. Reassembly buffers live in a
//! fixed-size [`SeqBuf`] keyed by message sequence, so a new message evicts any
//! partial message which maps to the same slot, and
//! [`FragmentReceiver::clean_up`] drops partial messages which are older than
//! a timeout.

use {
    crate::{
        packet::FragmentPosition,
        seq::MessageSeq,
        seq_buf::SeqBuf,
    },
    bitvec::array::BitArray,
    core::{fmt, time::Duration},
    octs::{Bytes, chunks::ByteChunksExt},
    thiserror::Error,
    tracing::debug,
};

/// Maximum number of fragments a single message may be split into.
pub const MAX_FRAGS: usize = u8::MAX as usize;

/// Number of messages which a [`FragmentReceiver`] can reassemble at once.
pub const REASSEMBLY_CAP: usize = 256;

/// Single piece of a message produced by [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Position of this fragment within the message.
    pub position: FragmentPosition,
    /// Bytes of the message in this fragment.
    pub payload: Bytes,
}

/// Message was too large to split into fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("message of {len} bytes needs more than {MAX_FRAGS} fragments of {max_frag_len} bytes")]
pub struct TooManyFragments {
    /// Length of the message.
    pub len: usize,
    /// Maximum length of a single fragment.
    pub max_frag_len: usize,
}

/// Splits a message up into fragments of at most `max_frag_len` bytes, ready
/// to be reassembled by a [`FragmentReceiver`].
///
/// Fragments are returned in ascending index order. A message no longer than
/// `max_frag_len` is returned unmodified as a single fragment with
/// [`FragmentPosition::SINGLE`].
///
/// # Errors
///
/// Errors if the message would need more than [`MAX_FRAGS`] fragments.
///
/// # Panics
///
/// Panics if `max_frag_len` is 0.
///
/// # Examples
///
/// ```
/// # use {reliable_netcode::frag::split, octs::Bytes};
/// let frags = split(4, Bytes::from_static(b"hello world")).unwrap().collect::<Vec<_>>();
/// assert_eq!(3, frags.len());
/// assert_eq!(b"hell".as_slice(), frags[0].payload);
/// assert_eq!(b"o wo".as_slice(), frags[1].payload);
/// assert_eq!(b"rld".as_slice(), frags[2].payload);
/// assert!(frags[2].position.is_last());
/// ```
pub fn split(
    max_frag_len: usize,
    msg: Bytes,
) -> Result<impl ExactSizeIterator<Item = Fragment> + core::fmt::Debug, TooManyFragments> {
    assert!(max_frag_len > 0);

    let len = msg.len();
    let iter = msg.byte_chunks(max_frag_len);
    let count = u8::try_from(iter.len().max(1))
        .map_err(|_| TooManyFragments { len, max_frag_len })?;

    Ok(iter.enumerate().map(move |(index, payload)| {
        let index = u8::try_from(index).expect("`index < count`, so it should fit in a `u8`");
        let position = FragmentPosition::new(index, count)
            .expect("`index < count`, so it should be a valid position");
        Fragment { position, payload }
    }))
}

/// Failed to reassemble a fragment with [`FragmentReceiver::reassemble`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassembleError {
    /// This fragment of the message was already received.
    #[error("already received fragment {index}")]
    AlreadyReceived {
        /// Index of the fragment.
        index: u8,
    },
    /// Fragment disagrees with previous fragments of the same message about
    /// how many fragments the message has.
    #[error("fragment count {count} does not match previous count {expected}")]
    CountMismatch {
        /// Count sent with this fragment.
        count: u8,
        /// Count sent with previous fragments.
        expected: u8,
    },
    /// Message has more fragments than this receiver accepts.
    #[error("message has {count} fragments, but only up to {max} are allowed")]
    TooManyFragments {
        /// Count sent with this fragment.
        count: u8,
        /// Maximum count allowed.
        max: u8,
    },
    /// Fragment payload has an invalid length.
    ///
    /// Every fragment other than the last must be exactly `max_frag_len` bytes
    /// long, and the last fragment must be at most that long.
    #[error("fragment {index} has invalid length {len}, expected {expected}")]
    InvalidPayloadLength {
        /// Index of the fragment.
        index: u8,
        /// Length of the payload received.
        len: usize,
        /// Length that the payload was expected to be, or the maximum length
        /// for the last fragment.
        expected: usize,
    },
}

/// Reassembles fragments produced by [`split`] back into messages.
#[derive(Clone)]
pub struct FragmentReceiver {
    max_frag_len: usize,
    max_frags: u8,
    msgs: SeqBuf<MessageBuf, REASSEMBLY_CAP>,
}

#[derive(Debug, Clone, Default)]
struct MessageBuf {
    /// Total number of fragments, learned from the first fragment received.
    count: u8,
    num_frags_recv: u8,
    /// Bit array tracking which fragment indices we have already received.
    recv_frags: BitArray<[u64; 4]>,
    /// All fragment payloads copied into a single buffer at
    /// `index * max_frag_len`.
    payload: Vec<u8>,
    /// Length of the last fragment, once it has been received.
    last_len: Option<usize>,
    created_at: Duration,
}

impl fmt::Debug for FragmentReceiver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut seqs = self.msgs.iter().map(|(seq, _)| seq).collect::<Vec<_>>();
        seqs.sort_unstable();
        f.debug_struct("FragmentReceiver")
            .field("max_frag_len", &self.max_frag_len)
            .field("max_frags", &self.max_frags)
            .field("msgs", &seqs)
            .finish()
    }
}

impl FragmentReceiver {
    /// Creates a new receiver for fragments of at most `max_frag_len` bytes,
    /// for messages of at most `max_frags` fragments.
    ///
    /// # Panics
    ///
    /// Panics if `max_frag_len` or `max_frags` is 0.
    #[must_use]
    pub fn new(max_frag_len: usize, max_frags: u8) -> Self {
        assert!(max_frag_len > 0);
        assert!(max_frags > 0);
        Self {
            max_frag_len,
            max_frags,
            msgs: SeqBuf::new(),
        }
    }

    /// Gets the number of messages which are partially reassembled.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.msgs.len()
    }

    /// Returns `true` if there are no partially reassembled messages.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    /// Returns `true` if some, but not all, fragments of `msg_seq` have been
    /// received.
    #[must_use]
    pub fn is_pending(&self, msg_seq: MessageSeq) -> bool {
        self.msgs.contains(msg_seq.get())
    }

    /// Receives a fragment of a message, returning the full message once all
    /// of its fragments have been received.
    ///
    /// A fragment with [`FragmentPosition::SINGLE`] is returned immediately
    /// without being buffered.
    ///
    /// If another message is being reassembled in the slot that `msg_seq` maps
    /// to, that message is dropped.
    ///
    /// # Errors
    ///
    /// Errors if the fragment is a duplicate or is not consistent with the
    /// other fragments of this message. The fragment is then ignored, and the
    /// rest of the message can still be reassembled.
    pub fn reassemble(
        &mut self,
        now: Duration,
        msg_seq: MessageSeq,
        position: FragmentPosition,
        payload: Bytes,
    ) -> Result<Option<Bytes>, ReassembleError> {
        let index = position.index();
        let count = position.count();
        if count > self.max_frags {
            return Err(ReassembleError::TooManyFragments {
                count,
                max: self.max_frags,
            });
        }

        let len = payload.len();
        let valid_len = if position.is_last() {
            len > 0 && len <= self.max_frag_len
        } else {
            len == self.max_frag_len
        };
        if !valid_len {
            return Err(ReassembleError::InvalidPayloadLength {
                index,
                len,
                expected: self.max_frag_len,
            });
        }

        if !position.is_fragmented() {
            return Ok(Some(payload));
        }

        let key = msg_seq.get();
        let buf = if let Some(buf) = self.msgs.get_mut(key) {
            if buf.count != count {
                return Err(ReassembleError::CountMismatch {
                    count,
                    expected: buf.count,
                });
            }
            buf
        } else {
            if let Some(evicted) = self.msgs.occupant(key) {
                debug!(
                    evicted = evicted,
                    msg_seq = key,
                    "Dropping partially reassembled message to make room"
                );
            }
            self.msgs.insert(
                key,
                MessageBuf {
                    count,
                    num_frags_recv: 0,
                    recv_frags: BitArray::ZERO,
                    payload: vec![0; usize::from(count) * self.max_frag_len],
                    last_len: None,
                    created_at: now,
                },
            )
        };

        let index_u = usize::from(index);
        if buf.recv_frags[index_u] {
            return Err(ReassembleError::AlreadyReceived { index });
        }

        let start = index_u * self.max_frag_len;
        buf.payload[start..start + len].copy_from_slice(&payload);
        buf.recv_frags.set(index_u, true);
        buf.num_frags_recv += 1;
        if position.is_last() {
            buf.last_len = Some(len);
        }

        if buf.num_frags_recv < buf.count {
            return Ok(None);
        }

        let buf = self
            .msgs
            .remove(key)
            .expect("we already have a mut ref to the buffer at this key, so it should exist");
        let last_len = buf
            .last_len
            .expect("all fragments were received, so the last one should have been too");
        let mut msg = buf.payload;
        msg.truncate((usize::from(buf.count) - 1) * self.max_frag_len + last_len);
        Ok(Some(Bytes::from(msg)))
    }

    /// Drops all partially reassembled messages whose first fragment was
    /// received `timeout` or longer before `now`.
    ///
    /// Returns how many messages were dropped.
    pub fn clean_up(&mut self, now: Duration, timeout: Duration) -> usize {
        let mut removed = 0;
        self.msgs.retain(|msg_seq, buf| {
            let keep = now.saturating_sub(buf.created_at) < timeout;
            if !keep {
                debug!(
                    msg_seq,
                    recv = buf.num_frags_recv,
                    count = buf.count,
                    "Dropping partially reassembled message after timeout"
                );
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Drops all partially reassembled messages.
    pub fn clear(&mut self) {
        self.msgs.clear();
    }
}
