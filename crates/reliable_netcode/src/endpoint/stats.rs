use {
    core::num::Saturating,
    derive_more::{Add, AddAssign, Sub, SubAssign},
};

/// Running totals of what an [`Endpoint`] has sent and received.
///
/// Counters saturate instead of overflowing. Subtract two snapshots to get
/// the activity between them.
///
/// [`Endpoint`]: crate::endpoint::Endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)] // force `#[derive]` on multiple lines
#[derive(Add, AddAssign, Sub, SubAssign)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointStats {
    /// Number of packets passed to the transmit callback, including
    /// retransmissions and ack-only packets.
    pub packets_sent: Saturating<usize>,
    /// Number of packets passed to [`Endpoint::receive_packet`], whether or
    /// not they were valid.
    ///
    /// [`Endpoint::receive_packet`]: crate::endpoint::Endpoint::receive_packet
    pub packets_recv: Saturating<usize>,
    /// Number of our packets which the peer has acknowledged.
    pub packets_acked: Saturating<usize>,
    /// Number of received packets which could not be decoded.
    pub packets_invalid: Saturating<usize>,
    /// Number of received packets with a sequence we had already received.
    pub packets_duplicate: Saturating<usize>,
    /// Number of received packets which were too old to tell if they were
    /// duplicates.
    pub packets_stale: Saturating<usize>,
    /// Number of received packets whose frame was rejected by its channel.
    pub packets_rejected: Saturating<usize>,
    /// Sum of the byte lengths of packets sent.
    pub bytes_sent: Saturating<usize>,
    /// Sum of the byte lengths of packets received.
    pub bytes_recv: Saturating<usize>,
    /// Number of messages passed to [`Endpoint::send_message`] successfully.
    ///
    /// [`Endpoint::send_message`]: crate::endpoint::Endpoint::send_message
    pub msgs_sent: Saturating<usize>,
    /// Number of messages passed to the receive callback.
    pub msgs_delivered: Saturating<usize>,
    /// Number of reliable messages which the peer has fully acknowledged.
    pub msgs_acked: Saturating<usize>,
    /// Number of fragments which were sent again after not being acked in
    /// time.
    pub frags_retransmitted: Saturating<usize>,
    /// Number of partially reassembled messages dropped after timing out.
    pub reassemblies_expired: Saturating<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_and_diffs() {
        let before = EndpointStats {
            packets_sent: Saturating(usize::MAX - 1),
            ..Default::default()
        };
        let mut after = before;
        after.packets_sent += 5;
        after.msgs_sent += 2;

        assert_eq!(usize::MAX, after.packets_sent.0);
        let diff = after - before;
        assert_eq!(1, diff.packets_sent.0);
        assert_eq!(2, diff.msgs_sent.0);
    }
}
