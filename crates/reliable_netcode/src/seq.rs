//! Wrapping 16-bit sequence numbers.
//!
//! Both packets and messages are identified by a number which increases by one
//! for every new item, and wraps around to 0 after [`u16::MAX`]. Comparing
//! these numbers must take the wraparound into account, so that `65535` is
//! treated as *older* than `0` - see [`Seq::cmp`].

use {
    core::{cmp::Ordering, convert::Infallible, fmt, ops},
    derive_more::{Add, AddAssign, Deref, DerefMut, Sub, SubAssign},
    octs::{BufTooShortOr, Decode, Encode, FixedEncodeLen, Read, Write},
};

/// Sequence number uniquely identifying an item sent across a network.
///
/// Note that the sequence number may wrap around very quickly. See [`Seq::cmp`]
/// for how this is handled.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Seq(pub u16);

/// Sequence number of a packet in transit.
///
/// Every packet an endpoint sends, including retransmissions and ack-only
/// packets, is given a new sequence number.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] // force `#[derive]` on multiple lines
#[derive(Deref, DerefMut, Add, AddAssign, Sub, SubAssign)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketSeq(pub Seq);

/// Sequence number of a message sent on a channel.
///
/// This stays the same for every fragment of the message, and for every
/// retransmission of those fragments.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] // force `#[derive]` on multiple lines
#[derive(Deref, DerefMut, Add, AddAssign, Sub, SubAssign)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageSeq(pub Seq);

impl Seq {
    /// Counts the steps from `self` forward to `rhs`, going whichever way
    /// round the ring of sequence numbers is shorter.
    ///
    /// The result is positive if `rhs` is ahead of `self`, and negative if it
    /// is behind. Sequences `32768` apart are treated as `rhs` being behind.
    ///
    /// # Examples
    ///
    /// ```
    /// # use reliable_netcode::seq::Seq;
    /// assert_eq!(Seq(7).dist_to(Seq(7)), 0);
    /// assert_eq!(Seq(10).dist_to(Seq(14)), 4);
    /// assert_eq!(Seq(14).dist_to(Seq(10)), -4);
    ///
    /// // across the wraparound point
    /// assert_eq!(Seq(u16::MAX).dist_to(Seq(0)), 1);
    /// assert_eq!(Seq(0).dist_to(Seq(u16::MAX)), -1);
    /// assert_eq!(Seq(u16::MAX - 2).dist_to(Seq(2)), 5);
    ///
    /// // half way round
    /// assert_eq!(Seq(0).dist_to(Seq(32768)), i16::MIN);
    /// ```
    #[must_use]
    pub const fn dist_to(self, rhs: Self) -> i16 {
        #[expect(clippy::cast_possible_wrap, reason = "wrapping is the point")]
        (rhs.0.wrapping_sub(self.0) as i16)
    }

    /// Returns `true` if `self` comes after `other`, taking wraparound into
    /// account.
    ///
    /// # Examples
    ///
    /// ```
    /// # use reliable_netcode::seq::Seq;
    /// assert!(Seq(1).is_newer_than(Seq(0)));
    /// assert!(Seq(0).is_newer_than(Seq(u16::MAX)));
    /// assert!(!Seq(5).is_newer_than(Seq(5)));
    /// assert!(!Seq(u16::MAX).is_newer_than(Seq(2)));
    /// ```
    #[must_use]
    pub const fn is_newer_than(self, other: Self) -> bool {
        other.dist_to(self) > 0
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Seq").field(&self.0).finish()
    }
}

impl Ord for Seq {
    /// `self` is greater than `other` if it is less than half of the sequence
    /// space ahead of it, see [`Seq::dist_to`].
    ///
    /// So `1 > 0`, but also `0 > 65535`. This is only a total order over
    /// sequences which all lie within half of the space of each other, which
    /// is what every buffer in this crate keeps to.
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist_to(*self).cmp(&0)
    }
}

impl PartialOrd for Seq {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

macro_rules! impl_wrapping_op {
    ($op:ident, $op_fn:ident, $assign:ident, $assign_fn:ident, $wrapping_fn:ident) => {
        impl ops::$op for Seq {
            type Output = Self;

            fn $op_fn(self, rhs: Self) -> Self {
                Self(self.0.$wrapping_fn(rhs.0))
            }
        }

        impl ops::$assign for Seq {
            fn $assign_fn(&mut self, rhs: Self) {
                self.0 = self.0.$wrapping_fn(rhs.0);
            }
        }
    };
}

impl_wrapping_op!(Add, add, AddAssign, add_assign, wrapping_add);
impl_wrapping_op!(Sub, sub, SubAssign, sub_assign, wrapping_sub);

// big-endian `u16` on the wire
impl FixedEncodeLen for Seq {
    const ENCODE_LEN: usize = u16::ENCODE_LEN;
}

impl Encode for Seq {
    type Error = Infallible;

    fn encode(&self, dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        self.0.encode(dst)
    }
}

impl Decode for Seq {
    type Error = Infallible;

    fn decode(src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        u16::decode(src).map(Self)
    }
}

macro_rules! impl_seq_newtype {
    ($ty:ident) => {
        impl $ty {
            /// Wraps a raw sequence number.
            #[must_use]
            pub const fn new(n: u16) -> Self {
                Self(Seq(n))
            }

            /// Gets the raw sequence number.
            #[must_use]
            pub const fn get(self) -> u16 {
                self.0.0
            }

            /// Returns this sequence number, and advances `self` to the next
            /// one, wrapping around after [`u16::MAX`].
            pub const fn advance(&mut self) -> Self {
                let current = *self;
                self.0.0 = self.0.0.wrapping_add(1);
                current
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.debug_tuple(stringify!($ty)).field(&self.0.0).finish()
            }
        }

        impl FixedEncodeLen for $ty {
            const ENCODE_LEN: usize = Seq::ENCODE_LEN;
        }

        impl Encode for $ty {
            type Error = <Seq as Encode>::Error;

            fn encode(&self, dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
                self.0.encode(dst)
            }
        }

        impl Decode for $ty {
            type Error = <Seq as Decode>::Error;

            fn decode(src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
                Seq::decode(src).map(Self)
            }
        }
    };
}

impl_seq_newtype!(PacketSeq);
impl_seq_newtype!(MessageSeq);

#[cfg(test)]
mod tests {
    use {super::*, octs::test::*};

    #[test]
    fn encode_decode_all_seqs() {
        for seq in 0..u16::MAX {
            hint_round_trip(&Seq(seq));
        }
    }

    #[test]
    fn increasing_wraparound() {
        assert!(Seq(0) < Seq(1));
        assert!(Seq(1) < Seq(2));
        assert!(Seq(u16::MAX - 3) < Seq(u16::MAX));
        assert!(Seq(u16::MAX - 1) < Seq(u16::MAX));

        assert!(Seq(u16::MAX) < Seq(0));
        assert!(Seq(u16::MAX) < Seq(1));
        assert!(Seq(u16::MAX - 3) < Seq(2));

        // sequences half the space apart have no defined order
    }

    #[test]
    fn newtypes_order_like_seq() {
        assert!(MessageSeq::new(u16::MAX) < MessageSeq::new(0));
        assert!(PacketSeq::new(10) > PacketSeq::new(u16::MAX - 10));
    }

    #[test]
    fn advance_wraps() {
        let mut seq = MessageSeq::new(u16::MAX - 1);
        assert_eq!(MessageSeq::new(u16::MAX - 1), seq.advance());
        assert_eq!(MessageSeq::new(u16::MAX), seq.advance());
        assert_eq!(MessageSeq::new(0), seq.advance());
        assert_eq!(MessageSeq::new(1), seq);
    }

    #[test]
    fn sub_wraps() {
        assert_eq!(PacketSeq::new(u16::MAX), PacketSeq::new(0) - PacketSeq::new(1));
        assert_eq!(PacketSeq::new(2), PacketSeq::new(u16::MAX) + PacketSeq::new(3));
    }
}
