use {
    super::QosType,
    crate::{
        frag::Fragment,
        packet::{FragmentPosition, Frame},
        seq::MessageSeq,
        seq_buf::SeqBuf,
    },
    alloc::collections::VecDeque,
    core::time::Duration,
    octs::Bytes,
    thiserror::Error,
};

/// Maximum number of reliable messages which may be unacknowledged at once.
pub const SEND_WINDOW: usize = 256;

/// Largest allowed capacity of the queue of reliable messages waiting for
/// room in the [`SEND_WINDOW`].
///
/// Every queued or in-flight message must have a sequence which is less than
/// half of the sequence space away from the oldest, so that their order is
/// still well defined.
pub const MAX_SEND_QUEUE_LEN: usize = (u16::MAX as usize + 1) / 2 - SEND_WINDOW;

/// Identifies a single fragment of a sent message on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct FragmentPath {
    /// Sequence of the message.
    pub msg_seq: MessageSeq,
    /// Index of the fragment within the message.
    pub index: u8,
}

/// Attempted to send a reliable message while the queue of messages waiting
/// for room in the [`SEND_WINDOW`] is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("send queue full - {cap} messages already waiting")]
pub struct SendQueueFull {
    /// Capacity of the queue.
    pub cap: usize,
}

/// Sending half of a channel.
///
/// Assigns message sequences and, for reliable channels, keeps every fragment
/// which has not been acknowledged yet so that it can be sent again.
///
/// A reliable message is only sent once the [`SEND_WINDOW`] slot for its
/// sequence is free. Until then it waits in a bounded queue, and queued
/// messages leave the queue strictly in sequence order.
#[derive(Debug, Clone)]
pub struct SendChannel {
    qos: QosType,
    next_msg_seq: MessageSeq,
    kind: SendChannelKind,
}

#[derive(Debug, Clone)]
enum SendChannelKind {
    Unreliable,
    Reliable {
        queued: VecDeque<QueuedMessage>,
        queue_cap: usize,
        sent_msgs: SeqBuf<SentMessage, SEND_WINDOW>,
    },
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    msg_seq: MessageSeq,
    frags: Vec<Fragment>,
}

#[derive(Debug, Clone, Default)]
struct SentMessage {
    /// [`None`] once the fragment has been acked.
    frags: Box<[Option<SentFragment>]>,
}

#[derive(Debug, Clone)]
struct SentFragment {
    position: FragmentPosition,
    payload: Bytes,
    last_sent_at: Duration,
}

impl SendChannel {
    /// Creates the sending half of a channel for `qos`.
    ///
    /// On a reliable channel, up to `queue_cap` messages may wait for room in
    /// the [`SEND_WINDOW`].
    ///
    /// # Panics
    ///
    /// Panics if `queue_cap` is greater than [`MAX_SEND_QUEUE_LEN`].
    #[must_use]
    pub fn new(qos: QosType, queue_cap: usize) -> Self {
        assert!(
            queue_cap <= MAX_SEND_QUEUE_LEN,
            "send queue capacity should be at most {MAX_SEND_QUEUE_LEN}"
        );
        let kind = if qos.is_reliable() {
            SendChannelKind::Reliable {
                queued: VecDeque::new(),
                queue_cap,
                sent_msgs: SeqBuf::new(),
            }
        } else {
            SendChannelKind::Unreliable
        };
        Self {
            qos,
            next_msg_seq: MessageSeq::default(),
            kind,
        }
    }

    /// Gets what kind of channel this is.
    #[must_use]
    pub const fn qos(&self) -> QosType {
        self.qos
    }

    /// Gets the sequence which the next message pushed will be given.
    #[must_use]
    pub const fn next_msg_seq(&self) -> MessageSeq {
        self.next_msg_seq
    }

    /// Gets how many messages have been sent on this channel but not yet fully
    /// acknowledged.
    ///
    /// This is always 0 for unreliable channels.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        match &self.kind {
            SendChannelKind::Unreliable => 0,
            SendChannelKind::Reliable { sent_msgs, .. } => sent_msgs.len(),
        }
    }

    /// Gets how many messages are waiting for room in the [`SEND_WINDOW`]
    /// before they can be sent.
    ///
    /// This is always 0 for unreliable channels.
    #[must_use]
    pub fn queued(&self) -> usize {
        match &self.kind {
            SendChannelKind::Unreliable => 0,
            SendChannelKind::Reliable { queued, .. } => queued.len(),
        }
    }

    /// Assigns a sequence to a new message made of `frags`.
    ///
    /// On an unreliable channel, the caller sends the fragments right away. On
    /// a reliable channel, the message is queued, and is sent once
    /// [`SendChannel::take_ready`] finds room for it.
    ///
    /// # Errors
    ///
    /// Errors if this is a reliable channel and its queue is full. Nothing is
    /// changed in this case.
    pub fn push(&mut self, frags: &[Fragment]) -> Result<MessageSeq, SendQueueFull> {
        let msg_seq = self.next_msg_seq;
        if let SendChannelKind::Reliable {
            queued, queue_cap, ..
        } = &mut self.kind
        {
            if queued.len() >= *queue_cap {
                return Err(SendQueueFull { cap: *queue_cap });
            }
            queued.push_back(QueuedMessage {
                msg_seq,
                frags: frags.to_vec(),
            });
        }

        self.next_msg_seq.advance();
        Ok(msg_seq)
    }

    /// Moves queued messages into the [`SEND_WINDOW`] while the slot of the
    /// oldest one is free, returning the frames to send for the first time at
    /// `now`.
    ///
    /// Always empty for unreliable channels.
    pub fn take_ready(&mut self, now: Duration) -> Vec<Frame> {
        let SendChannelKind::Reliable {
            queued, sent_msgs, ..
        } = &mut self.kind
        else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        while queued
            .front()
            .is_some_and(|msg| sent_msgs.occupant(msg.msg_seq.get()).is_none())
        {
            let Some(QueuedMessage { msg_seq, frags }) = queued.pop_front() else {
                break;
            };
            let sent = frags
                .iter()
                .map(|frag| {
                    Some(SentFragment {
                        position: frag.position,
                        payload: frag.payload.clone(),
                        last_sent_at: now,
                    })
                })
                .collect();
            sent_msgs.insert(msg_seq.get(), SentMessage { frags: sent });
            ready.extend(frags.into_iter().map(|frag| Frame {
                msg_seq,
                position: frag.position,
                payload: frag.payload,
            }));
        }
        ready
    }

    /// Marks a fragment as acknowledged by the peer, so it will not be sent
    /// again.
    ///
    /// Returns `true` if this was the last unacked fragment of its message,
    /// meaning that the whole message has now been acked. Acking a fragment
    /// which was already acked, or which this channel never kept, returns
    /// `false`.
    pub fn ack_fragment(&mut self, path: FragmentPath) -> bool {
        let SendChannelKind::Reliable { sent_msgs, .. } = &mut self.kind else {
            return false;
        };
        let Some(msg) = sent_msgs.get_mut(path.msg_seq.get()) else {
            return false;
        };
        let Some(frag) = msg.frags.get_mut(usize::from(path.index)) else {
            return false;
        };
        if frag.take().is_none() {
            return false;
        }

        if msg.frags.iter().all(Option::is_none) {
            sent_msgs.remove(path.msg_seq.get());
            true
        } else {
            false
        }
    }

    /// Gets every unacked fragment which was last sent `rto` or longer before
    /// `now`, and marks them as sent at `now`.
    ///
    /// Frames are returned oldest send time first. Always empty for unreliable
    /// channels.
    pub fn take_due(&mut self, now: Duration, rto: Duration) -> Vec<Frame> {
        let SendChannelKind::Reliable { sent_msgs, .. } = &mut self.kind else {
            return Vec::new();
        };

        let mut due = sent_msgs
            .iter_mut()
            .flat_map(|(msg_seq, msg)| {
                msg.frags
                    .iter_mut()
                    .flatten()
                    .filter(move |frag| now.saturating_sub(frag.last_sent_at) >= rto)
                    .map(move |frag| {
                        let sent_at = frag.last_sent_at;
                        frag.last_sent_at = now;
                        (
                            sent_at,
                            Frame {
                                msg_seq: MessageSeq::new(msg_seq),
                                position: frag.position,
                                payload: frag.payload.clone(),
                            },
                        )
                    })
            })
            .collect::<Vec<_>>();

        // oldest sent first, then in send order for fragments sent together
        due.sort_by(|(sent_at_a, frame_a), (sent_at_b, frame_b)| {
            sent_at_a
                .cmp(sent_at_b)
                .then(frame_a.msg_seq.cmp(&frame_b.msg_seq))
                .then(frame_a.position.index().cmp(&frame_b.position.index()))
        });
        due.into_iter().map(|(_, frame)| frame).collect()
    }

    /// Forgets all queued and sent messages, and restarts message sequences
    /// from 0.
    pub fn clear(&mut self) {
        self.next_msg_seq = MessageSeq::default();
        if let SendChannelKind::Reliable {
            queued, sent_msgs, ..
        } = &mut self.kind
        {
            queued.clear();
            sent_msgs.clear();
        }
    }
}
