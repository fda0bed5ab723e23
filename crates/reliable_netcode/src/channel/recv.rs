use {
    super::QosType,
    crate::{
        frag::{FragmentReceiver, REASSEMBLY_CAP, ReassembleError},
        packet::Frame,
        seq::MessageSeq,
        seq_buf::SeqBuf,
    },
    core::{iter, time::Duration},
    either::Either,
    octs::Bytes,
    thiserror::Error,
    tracing::trace,
};

/// Number of messages past the next expected one which a reliable channel
/// accepts and buffers.
pub const RECV_WINDOW: usize = REASSEMBLY_CAP;

/// Frame was rejected by a [`RecvChannel`].
///
/// The packet carrying a rejected frame is not acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Failed to reassemble the fragment.
    #[error("failed to reassemble fragment")]
    Reassemble(#[from] ReassembleError),
    /// Message is too far ahead of the next message expected on a reliable
    /// channel to be buffered.
    #[error("message {msg_seq:?} is outside the receive window starting at {next:?}")]
    OutsideWindow {
        /// Sequence of the message received.
        msg_seq: MessageSeq,
        /// Sequence of the next message expected.
        next: MessageSeq,
    },
}

/// Receiving half of a channel.
///
/// Reassembles fragments into messages, and decides which of those messages
/// are delivered to the application, and in what order.
#[derive(Debug, Clone)]
pub struct RecvChannel {
    qos: QosType,
    frags: FragmentReceiver,
    kind: RecvChannelKind,
}

#[derive(Debug, Clone)]
enum RecvChannelKind {
    Unreliable,
    UnreliableOrdered {
        last_delivered: Option<MessageSeq>,
    },
    ReliableOrdered {
        next_expected: MessageSeq,
        /// Messages which were completed before `next_expected` arrived.
        completed: SeqBuf<Bytes, RECV_WINDOW>,
    },
}

impl RecvChannel {
    /// Creates the receiving half of a channel for `qos`.
    ///
    /// See [`FragmentReceiver::new`] for `max_frag_len` and `max_frags`.
    #[must_use]
    pub fn new(qos: QosType, max_frag_len: usize, max_frags: u8) -> Self {
        let kind = match qos {
            QosType::ReliableOrdered => RecvChannelKind::ReliableOrdered {
                next_expected: MessageSeq::default(),
                completed: SeqBuf::new(),
            },
            QosType::Unreliable => RecvChannelKind::Unreliable,
            QosType::UnreliableOrdered => RecvChannelKind::UnreliableOrdered {
                last_delivered: None,
            },
        };
        Self {
            qos,
            frags: FragmentReceiver::new(max_frag_len, max_frags),
            kind,
        }
    }

    /// Gets what kind of channel this is.
    #[must_use]
    pub const fn qos(&self) -> QosType {
        self.qos
    }

    /// Gets the reassembly state of this channel.
    #[must_use]
    pub const fn frags(&self) -> &FragmentReceiver {
        &self.frags
    }

    /// Receives a frame, returning the messages which are now ready to be
    /// delivered, in delivery order.
    ///
    /// Frames which are duplicates of ones already received, or which belong
    /// to a message that this channel has already delivered or dropped, are
    /// accepted but produce no messages.
    ///
    /// # Errors
    ///
    /// Errors if the frame is invalid for this channel. The frame is then
    /// ignored.
    pub fn recv(
        &mut self,
        now: Duration,
        frame: Frame,
    ) -> Result<impl Iterator<Item = Bytes> + '_, FrameError> {
        let Frame {
            msg_seq,
            position,
            payload,
        } = frame;

        match &self.kind {
            RecvChannelKind::Unreliable => {}
            RecvChannelKind::UnreliableOrdered { last_delivered } => {
                if last_delivered.is_some_and(|last| msg_seq <= last) {
                    // a newer message was delivered already, so this one can
                    // never be delivered
                    trace!(msg_seq = msg_seq.get(), "Dropping frame of old message");
                    return Ok(Either::Left(None.into_iter()));
                }
            }
            RecvChannelKind::ReliableOrdered {
                next_expected,
                completed,
            } => {
                let dist = next_expected.dist_to(*msg_seq);
                if dist < 0 || completed.contains(msg_seq.get()) {
                    // retransmission of a message we already have
                    return Ok(Either::Left(None.into_iter()));
                }
                if usize::try_from(dist).is_ok_and(|dist| dist >= RECV_WINDOW) {
                    return Err(FrameError::OutsideWindow {
                        msg_seq,
                        next: *next_expected,
                    });
                }
            }
        }

        let msg = match self.frags.reassemble(now, msg_seq, position, payload) {
            Ok(Some(msg)) => msg,
            Ok(None) | Err(ReassembleError::AlreadyReceived { .. }) => {
                return Ok(Either::Left(None.into_iter()));
            }
            Err(err) => return Err(err.into()),
        };

        Ok(match &mut self.kind {
            RecvChannelKind::Unreliable => Either::Left(Some(msg).into_iter()),
            RecvChannelKind::UnreliableOrdered { last_delivered } => {
                // fragments of an older message may complete after a newer
                // message was delivered
                if last_delivered.is_some_and(|last| msg_seq <= last) {
                    trace!(msg_seq = msg_seq.get(), "Dropping old message");
                    Either::Left(None.into_iter())
                } else {
                    *last_delivered = Some(msg_seq);
                    Either::Left(Some(msg).into_iter())
                }
            }
            RecvChannelKind::ReliableOrdered {
                next_expected,
                completed,
            } => {
                // here's an example to visualize what this does:
                // msg_seq: 40
                // next_expected: 40, completed: [41, 45]
                completed.insert(msg_seq.get(), msg);
                // next_expected: 40, completed: [40, 41, 45]
                Either::Right(iter::from_fn(move || {
                    let msg = completed.remove(next_expected.get())?;
                    next_expected.advance();
                    // iter 1: next_expected: 41, completed: [41, 45]
                    // iter 2: next_expected: 42, completed: [45]
                    Some(msg)
                }))
            }
        })
    }

    /// Drops partially reassembled messages which are older than `timeout`.
    ///
    /// Reliable channels never drop partial messages, since the sender keeps
    /// resending their fragments until they are acked.
    ///
    /// Returns how many messages were dropped.
    pub fn clean_up(&mut self, now: Duration, timeout: Duration) -> usize {
        match self.kind {
            RecvChannelKind::ReliableOrdered { .. } => 0,
            RecvChannelKind::Unreliable | RecvChannelKind::UnreliableOrdered { .. } => {
                self.frags.clean_up(now, timeout)
            }
        }
    }

    /// Forgets all received messages, as if this channel was just created.
    pub fn clear(&mut self) {
        self.frags.clear();
        match &mut self.kind {
            RecvChannelKind::Unreliable => {}
            RecvChannelKind::UnreliableOrdered { last_delivered } => *last_delivered = None,
            RecvChannelKind::ReliableOrdered {
                next_expected,
                completed,
            } => {
                *next_expected = MessageSeq::default();
                completed.clear();
            }
        }
    }
}
