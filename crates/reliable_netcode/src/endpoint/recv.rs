use {
    super::{Endpoint, EndpointHandler},
    crate::{
        ack::Acknowledge,
        packet::{Packet, PacketHeader},
    },
    octs::Bytes,
    tracing::{debug, trace},
};

impl Endpoint {
    /// Receives a raw packet from the peer, passing any messages which are now
    /// ready to [`EndpointHandler::receive`].
    ///
    /// This never fails. Packets which are malformed, duplicated, too old or
    /// rejected by their channel are dropped and counted in [`EndpointStats`].
    /// A dropped packet is not acknowledged.
    ///
    /// [`EndpointStats`]: crate::endpoint::EndpointStats
    pub fn receive_packet(&mut self, packet: Bytes, handler: &mut impl EndpointHandler) {
        self.stats.packets_recv += 1;
        self.stats.bytes_recv += packet.len();

        let len = packet.len();
        let Packet { header, frame } = match Packet::decode_from(packet) {
            Ok(packet) => packet,
            Err(err) => {
                self.stats.packets_invalid += 1;
                debug!(len, "Received invalid packet: {err}");
                return;
            }
        };
        let PacketHeader { seq, ack, channel } = header;

        if ack.is_some_and(|ack| self.process_ack(ack)) {
            self.flush_queued(handler);
        }

        if self.recv_packets.is_stale(seq) {
            self.stats.packets_stale += 1;
            trace!(seq = seq.get(), "Dropping stale packet");
            return;
        }
        if self.recv_packets.exists(seq) {
            self.stats.packets_duplicate += 1;
            trace!(seq = seq.get(), "Dropping duplicate packet");
            return;
        }

        let Some(frame) = frame else {
            // nothing to acknowledge, so we don't reply to an ack-only packet
            self.recv_packets.insert(seq, self.now);
            return;
        };

        let msg_seq = frame.msg_seq;
        let position = frame.position;
        match self.recv_channels[channel.index()].recv(self.now, frame) {
            Ok(msgs) => {
                for msg in msgs {
                    self.stats.msgs_delivered += 1;
                    trace!(%channel, len = msg.len(), "Delivering message");
                    handler.receive(msg);
                }
            }
            Err(err) => {
                self.stats.packets_rejected += 1;
                debug!(
                    seq = seq.get(),
                    %channel,
                    msg_seq = msg_seq.get(),
                    index = position.index(),
                    count = position.count(),
                    "Rejected frame: {err}"
                );
                return;
            }
        }

        self.recv_packets.insert(seq, self.now);
        self.ack_pending = true;
    }

    /// Returns `true` if any reliable message was fully acked, which may have
    /// made room for queued messages.
    fn process_ack(&mut self, ack: Acknowledge) -> bool {
        let mut msgs_acked = false;
        for seq in ack.seqs() {
            let Some(sent) = self.sent_packets.remove(seq.get()) else {
                continue;
            };
            self.stats.packets_acked += 1;

            // only the newest packet in the ack is acked with little delay
            if seq == ack.last_recv {
                self.rtt.update(self.now.saturating_sub(sent.sent_at));
            }

            let Some((qos, path)) = sent.frag else {
                continue;
            };
            if self.send_channels[qos.index()].ack_fragment(path) {
                self.stats.msgs_acked += 1;
                msgs_acked = true;
                trace!(%qos, msg_seq = path.msg_seq.get(), "Message acked");
            }
        }
        msgs_acked
    }
}
