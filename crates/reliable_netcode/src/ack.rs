//! Acknowledgement of received packets.
//!
//! Every packet an endpoint sends carries an [`Acknowledge`] describing which
//! of the peer's packets it has recently received. Since the same window of
//! packets is re-announced on every outgoing packet, losing the packet that
//! carried an ack does not lose the ack itself.

use {
    crate::{seq::PacketSeq, seq_buf::SeqBuf},
    core::{convert::Infallible, fmt, time::Duration},
    octs::{BufTooShortOr, Decode, Encode, FixedEncodeLen, Read, Write},
};

/// Window of received packet sequences, sent alongside every outgoing packet.
///
/// `last_recv` is the newest packet sequence received, and is always
/// considered acknowledged. Bit `k` of `bits` is set if `last_recv - k - 1`
/// was also received, so a single header acknowledges up to 33 packets.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Acknowledge {
    /// Newest packet sequence received.
    pub last_recv: PacketSeq,
    /// Receipt of the 32 packet sequences before [`Acknowledge::last_recv`].
    pub bits: u32,
}

impl Acknowledge {
    /// Creates an acknowledgement of a single packet sequence.
    #[must_use]
    pub const fn new(last_recv: PacketSeq) -> Self {
        Self { last_recv, bits: 0 }
    }

    /// Marks a packet sequence as acknowledged.
    ///
    /// If `seq` is newer than [`Acknowledge::last_recv`], the window slides
    /// forward and packets which fall off the end of the window are forgotten.
    ///
    /// # Example
    ///
    /// ```
    /// # use reliable_netcode::{ack::Acknowledge, seq::PacketSeq};
    /// let mut acks = Acknowledge::new(PacketSeq::new(0));
    /// assert!(acks.is_acked(PacketSeq::new(0)));
    /// assert!(!acks.is_acked(PacketSeq::new(1)));
    ///
    /// acks.ack(PacketSeq::new(1));
    /// acks.ack(PacketSeq::new(5));
    /// assert!(acks.is_acked(PacketSeq::new(0)));
    /// assert!(acks.is_acked(PacketSeq::new(1)));
    /// assert!(!acks.is_acked(PacketSeq::new(2)));
    /// assert!(acks.is_acked(PacketSeq::new(5)));
    ///
    /// // acknowledgement is an idempotent operation
    /// let acks_clone = acks;
    /// acks.ack(PacketSeq::new(1));
    /// assert_eq!(acks, acks_clone);
    /// ```
    pub fn ack(&mut self, seq: PacketSeq) {
        let dist = self.last_recv.dist_to(*seq);
        if dist > 0 {
            // `seq` is after `last_recv`, make that the new `last_recv`
            //    last_recv: 3, seq: 8 -> shift_by: 5
            //    the old `last_recv` ends up at bit 4 (`8 - 3 - 1`)
            let shift_by = u32::from(dist.unsigned_abs());
            self.bits = shl(self.bits, shift_by) | shl(1, shift_by - 1);
            self.last_recv = seq;
        } else if dist < 0 {
            // `seq` is before `last_recv`, only set a bit in the window
            let bit = u32::from(dist.unsigned_abs()) - 1;
            self.bits |= shl(1, bit);
        }
    }

    /// Gets if a certain sequence has been marked as acknowledged.
    ///
    /// # Example
    ///
    /// ```
    /// # use reliable_netcode::{ack::Acknowledge, seq::PacketSeq};
    /// let acks = Acknowledge {
    ///     last_recv: PacketSeq::new(50),
    ///     bits: 0b101,
    /// };
    /// assert!(acks.is_acked(PacketSeq::new(50)));
    /// assert!(acks.is_acked(PacketSeq::new(49)));
    /// assert!(!acks.is_acked(PacketSeq::new(48)));
    /// assert!(acks.is_acked(PacketSeq::new(47)));
    /// assert!(!acks.is_acked(PacketSeq::new(51)));
    /// assert!(!acks.is_acked(PacketSeq::new(10)));
    /// ```
    #[must_use]
    pub fn is_acked(&self, seq: PacketSeq) -> bool {
        let dist = seq.dist_to(*self.last_recv);
        match u32::try_from(dist) {
            Ok(0) => true,
            Ok(dist) => self.bits & shl(1, dist - 1) != 0,
            // `seq` is after `last_recv`, there's no way it could have been set
            Err(_) => false,
        }
    }

    /// Converts this into an iterator over all [`PacketSeq`]s this
    /// acknowledgement covers, newest first.
    ///
    /// # Example
    ///
    /// ```
    /// # use reliable_netcode::{ack::Acknowledge, seq::PacketSeq};
    /// let acks = Acknowledge {
    ///     last_recv: PacketSeq::new(50),
    ///     bits: 0b0010010,
    /// };
    /// let mut iter = acks.seqs();
    /// assert_eq!(Some(PacketSeq::new(50)), iter.next());
    /// assert_eq!(Some(PacketSeq::new(48)), iter.next());
    /// assert_eq!(Some(PacketSeq::new(45)), iter.next());
    /// assert_eq!(None, iter.next());
    /// ```
    pub fn seqs(self) -> impl Iterator<Item = PacketSeq> {
        let older = (0..32u16).filter_map(move |bit_index| {
            if self.bits & shl(1, u32::from(bit_index)) == 0 {
                None
            } else {
                Some(self.last_recv - PacketSeq::new(bit_index + 1))
            }
        });
        core::iter::once(self.last_recv).chain(older)
    }
}

fn shl(n: u32, by: u32) -> u32 {
    // if None, then `rhs >= 32`
    // so all the bits get moved out anyway
    // so the result ends up just being 0
    n.checked_shl(by).unwrap_or_default()
}

impl fmt::Debug for Acknowledge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Acknowledge")
            .field("last_recv", &self.last_recv)
            .field("bits", &format_args!("{:032b}", self.bits))
            .finish()
    }
}

impl FixedEncodeLen for Acknowledge {
    const ENCODE_LEN: usize = PacketSeq::ENCODE_LEN + u32::ENCODE_LEN;
}

impl Encode for Acknowledge {
    type Error = Infallible;

    fn encode(&self, mut dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        dst.write(&self.last_recv)?;
        dst.write(&self.bits)?;
        Ok(())
    }
}

impl Decode for Acknowledge {
    type Error = Infallible;

    fn decode(mut src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        Ok(Self {
            last_recv: src.read()?,
            bits: src.read()?,
        })
    }
}

/// Number of received packet sequences remembered by [`ReceivedPackets`].
///
/// Packets older than this, relative to the newest one received, are treated
/// as stale and dropped.
pub const RECV_PACKETS_CAP: usize = 256;

/// Tracks which packet sequences have been received from the peer, to build
/// outgoing [`Acknowledge`]s and reject duplicate packets.
#[derive(Debug, Clone, Default)]
pub struct ReceivedPackets {
    recv_at: SeqBuf<Duration, RECV_PACKETS_CAP>,
    latest: Option<PacketSeq>,
}

impl ReceivedPackets {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the newest packet sequence received so far.
    #[must_use]
    pub const fn latest(&self) -> Option<PacketSeq> {
        self.latest
    }

    /// Returns `true` if this exact packet sequence was already received.
    #[must_use]
    pub fn exists(&self, seq: PacketSeq) -> bool {
        self.recv_at.contains(seq.get())
    }

    /// Gets when the packet with this sequence was received, if it is still
    /// being tracked.
    #[must_use]
    pub fn recv_at(&self, seq: PacketSeq) -> Option<Duration> {
        self.recv_at.get(seq.get()).copied()
    }

    /// Returns `true` if `seq` is too old to be tracked any more.
    ///
    /// We can no longer tell if such a packet is a duplicate, so it must be
    /// dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// # use {reliable_netcode::{ack::ReceivedPackets, seq::PacketSeq}, core::time::Duration};
    /// let mut recv = ReceivedPackets::new();
    /// recv.insert(PacketSeq::new(1000), Duration::ZERO);
    ///
    /// assert!(!recv.is_stale(PacketSeq::new(1000 - 255)));
    /// assert!(recv.is_stale(PacketSeq::new(1000 - 256)));
    /// assert!(!recv.is_stale(PacketSeq::new(2000)));
    /// ```
    #[must_use]
    pub fn is_stale(&self, seq: PacketSeq) -> bool {
        self.latest.is_some_and(|latest| {
            let dist = i32::from(latest.dist_to(*seq));
            #[expect(clippy::cast_possible_wrap, reason = "capacity is a small constant")]
            let cap = RECV_PACKETS_CAP as i32;
            dist <= -cap
        })
    }

    /// Records that the packet `seq` was received at `now`.
    ///
    /// If `seq` is newer than any packet received so far, every slot between
    /// the previous newest sequence and `seq` is cleared, so that packets from
    /// a previous trip around the sequence space are not reported as received.
    pub fn insert(&mut self, seq: PacketSeq, now: Duration) {
        match self.latest {
            Some(latest) if seq > latest => {
                self.recv_at.clear_range(latest.get().wrapping_add(1), seq.get());
                self.latest = Some(seq);
            }
            Some(_) => {}
            None => self.latest = Some(seq),
        }
        self.recv_at.insert(seq.get(), now);
    }

    /// Builds the acknowledgement to attach to the next outgoing packet.
    ///
    /// Returns [`None`] if no packets have been received yet.
    ///
    /// # Examples
    ///
    /// ```
    /// # use {reliable_netcode::{ack::ReceivedPackets, seq::PacketSeq}, core::time::Duration};
    /// let mut recv = ReceivedPackets::new();
    /// assert_eq!(None, recv.generate_ack());
    ///
    /// recv.insert(PacketSeq::new(10), Duration::ZERO);
    /// recv.insert(PacketSeq::new(8), Duration::ZERO);
    /// recv.insert(PacketSeq::new(9), Duration::ZERO);
    /// recv.insert(PacketSeq::new(5), Duration::ZERO);
    ///
    /// let ack = recv.generate_ack().unwrap();
    /// assert_eq!(PacketSeq::new(10), ack.last_recv);
    /// assert_eq!(0b10011, ack.bits);
    /// ```
    #[must_use]
    pub fn generate_ack(&self) -> Option<Acknowledge> {
        let last_recv = self.latest?;
        let bits = (0..32u16)
            .filter(|&k| self.exists(last_recv - PacketSeq::new(k + 1)))
            .fold(0, |bits, k| bits | (1 << k));
        Some(Acknowledge { last_recv, bits })
    }

    /// Forgets all received packets.
    pub fn clear(&mut self) {
        self.recv_at.clear();
        self.latest = None;
    }
}

#[cfg(test)]
#[expect(
    clippy::unreadable_literal,
    reason = "no separators shows the shift logic more clearly"
)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "testing")]

    use {super::*, octs::test::*};

    #[test]
    fn shl_in_range() {
        assert_eq!(0b1_0, shl(0b01, 1));
        assert_eq!(0b1010, shl(0b101, 1));
        assert_eq!(0b10100000, shl(0b101, 5));
    }

    #[test]
    fn shl_out_of_range() {
        assert_eq!(0b0, shl(0b10101, 32));
        assert_eq!(0b0, shl(0b11111, 40));
    }

    #[test]
    fn ack_slides_window() {
        let mut acks = Acknowledge::new(PacketSeq::new(3));
        acks.ack(PacketSeq::new(8));
        assert_eq!(PacketSeq::new(8), acks.last_recv);
        assert_eq!(0b10000, acks.bits);

        acks.ack(PacketSeq::new(100));
        assert_eq!(PacketSeq::new(100), acks.last_recv);
        assert_eq!(0, acks.bits);
    }

    #[test]
    fn ack_across_wraparound() {
        let mut acks = Acknowledge::new(PacketSeq::new(u16::MAX));
        acks.ack(PacketSeq::new(1));
        assert_eq!(PacketSeq::new(1), acks.last_recv);
        assert!(acks.is_acked(PacketSeq::new(u16::MAX)));
        assert!(!acks.is_acked(PacketSeq::new(0)));
        assert_eq!(
            vec![PacketSeq::new(1), PacketSeq::new(u16::MAX)],
            acks.seqs().collect::<Vec<_>>()
        );
    }

    #[test]
    fn seqs_matches_is_acked() {
        let acks = Acknowledge {
            last_recv: PacketSeq::new(40),
            bits: 0b10000000000000000000000000000001,
        };
        let seqs = acks.seqs().collect::<Vec<_>>();
        assert_eq!(
            vec![PacketSeq::new(40), PacketSeq::new(39), PacketSeq::new(8)],
            seqs
        );
        assert!(seqs.iter().all(|seq| acks.is_acked(*seq)));
    }

    #[test]
    fn encode_decode() {
        hint_round_trip(&Acknowledge {
            last_recv: PacketSeq::new(0),
            bits: 0,
        });
        hint_round_trip(&Acknowledge {
            last_recv: PacketSeq::new(u16::MAX),
            bits: u32::MAX,
        });
    }

    #[test]
    fn received_duplicates() {
        let mut recv = ReceivedPackets::new();
        assert!(!recv.exists(PacketSeq::new(0)));

        recv.insert(PacketSeq::new(0), Duration::from_secs(1));
        assert!(recv.exists(PacketSeq::new(0)));
        assert_eq!(Some(Duration::from_secs(1)), recv.recv_at(PacketSeq::new(0)));
        assert!(!recv.exists(PacketSeq::new(256)));
    }

    #[test]
    fn jump_clears_previous_lap() {
        let mut recv = ReceivedPackets::new();
        recv.insert(PacketSeq::new(5), Duration::ZERO);
        recv.insert(PacketSeq::new(6), Duration::ZERO);

        // jumping a whole buffer ahead forgets everything before the jump
        recv.insert(PacketSeq::new(600), Duration::ZERO);
        assert!(!recv.exists(PacketSeq::new(5)));
        assert!(!recv.exists(PacketSeq::new(6)));

        let ack = recv.generate_ack().unwrap();
        assert_eq!(PacketSeq::new(600), ack.last_recv);
        assert_eq!(0, ack.bits);
    }

    #[test]
    fn generate_ack_across_wraparound() {
        let mut recv = ReceivedPackets::new();
        recv.insert(PacketSeq::new(u16::MAX - 1), Duration::ZERO);
        recv.insert(PacketSeq::new(u16::MAX), Duration::ZERO);
        recv.insert(PacketSeq::new(1), Duration::ZERO);

        let ack = recv.generate_ack().unwrap();
        assert_eq!(PacketSeq::new(1), ack.last_recv);
        assert_eq!(0b110, ack.bits);
        assert!(!recv.is_stale(PacketSeq::new(u16::MAX - 1)));
    }
}
