use {
    super::{Endpoint, EndpointHandler, SendError, SentPacket},
    crate::{
        channel::{FragmentPath, QosType, SendQueueFull},
        frag,
        packet::{Frame, Packet, PacketHeader},
        seq::MessageSeq,
    },
    octs::Bytes,
    tracing::trace,
};

impl Endpoint {
    /// Sends a message to the peer with the given delivery guarantees.
    ///
    /// The message is split into fragments if it is longer than
    /// [`EndpointConfig::fragment_size`], and every fragment is passed to
    /// [`EndpointHandler::transmit`] in its own packet.
    ///
    /// Unreliable messages are always transmitted before this returns. A
    /// reliable message is transmitted right away if the send window has room
    /// for it. Otherwise it is queued, and transmitted once the peer has
    /// acknowledged enough older messages.
    ///
    /// Returns the sequence assigned to the message on its channel.
    ///
    /// # Errors
    ///
    /// Errors if the message is empty or too large, or if the queue of
    /// reliable messages waiting to be sent is full. See [`SendError`].
    ///
    /// [`EndpointConfig::fragment_size`]: crate::endpoint::EndpointConfig::fragment_size
    pub fn send_message(
        &mut self,
        msg: impl Into<Bytes>,
        qos: QosType,
        handler: &mut impl EndpointHandler,
    ) -> Result<MessageSeq, SendError> {
        let msg = msg.into();
        let len = msg.len();
        if len == 0 {
            return Err(SendError::EmptyMessage);
        }
        let max = self.config.max_message_len();
        if len > max {
            return Err(SendError::MessageTooLarge { len, max });
        }

        let frags = frag::split(self.config.fragment_size, msg)
            .map_err(|_| SendError::MessageTooLarge { len, max })?
            .collect::<Vec<_>>();
        let msg_seq = self.send_channels[qos.index()]
            .push(&frags)
            .map_err(|SendQueueFull { cap }| SendError::QueueFull { cap })?;

        self.stats.msgs_sent += 1;
        trace!(
            %qos,
            msg_seq = msg_seq.get(),
            len,
            num_frags = frags.len(),
            "Sending message"
        );

        if qos.is_reliable() {
            self.flush_queued(handler);
            let queued = self.send_channels[qos.index()].queued();
            if queued > 0 {
                trace!(%qos, queued, "Send window full, message queued");
            }
        } else {
            for frag in frags {
                let frame = Frame {
                    msg_seq,
                    position: frag.position,
                    payload: frag.payload,
                };
                self.flush_packet(qos, Some(frame), handler);
            }
        }
        Ok(msg_seq)
    }

    /// Sends a message on the channel with the raw ID `channel_id`.
    ///
    /// See [`Endpoint::send_message`].
    ///
    /// # Errors
    ///
    /// Errors if `channel_id` is not the ID of a [`QosType`], or if
    /// [`Endpoint::send_message`] fails.
    pub fn send_message_on(
        &mut self,
        msg: impl Into<Bytes>,
        channel_id: u8,
        handler: &mut impl EndpointHandler,
    ) -> Result<MessageSeq, SendError> {
        let qos = QosType::try_from(channel_id)?;
        self.send_message(msg, qos, handler)
    }

    /// Transmits every queued reliable message which now has room in the send
    /// window.
    pub(super) fn flush_queued(&mut self, handler: &mut impl EndpointHandler) {
        for qos in QosType::ALL {
            let ready = self.send_channels[qos.index()].take_ready(self.now);
            for frame in ready {
                self.flush_packet(qos, Some(frame), handler);
            }
        }
    }

    /// Builds a packet with a new sequence carrying `frame` (or nothing, for an
    /// ack-only packet) along with our latest acknowledgement, and transmits it.
    pub(super) fn flush_packet(
        &mut self,
        channel: QosType,
        frame: Option<Frame>,
        handler: &mut impl EndpointHandler,
    ) {
        let seq = self.next_packet_seq.advance();
        let frag = frame
            .as_ref()
            .filter(|_| channel.is_reliable())
            .map(|frame| {
                (
                    channel,
                    FragmentPath {
                        msg_seq: frame.msg_seq,
                        index: frame.position.index(),
                    },
                )
            });
        self.sent_packets.insert(
            seq.get(),
            SentPacket {
                sent_at: self.now,
                frag,
            },
        );

        let packet = Packet {
            header: PacketHeader {
                seq,
                ack: self.recv_packets.generate_ack(),
                channel,
            },
            frame,
        };
        let bytes = packet
            .encode_to_bytes()
            .expect("fragments are no longer than the max payload length, so should be encodable");
        self.ack_pending = false;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes.len();
        trace!(
            seq = seq.get(),
            %channel,
            ack_only = packet.frame.is_none(),
            len = bytes.len(),
            "Transmitting packet"
        );
        handler.transmit(bytes);
    }
}
