//! Delivery guarantees which messages can be sent with.
//!
//! Each [`QosType`] has its own message sequence space, with one sending half
//! ([`SendChannel`]) and one receiving half ([`RecvChannel`]) per endpoint.

mod recv;
mod send;

pub use {recv::*, send::*};
use {derive_more::Display, thiserror::Error};

/// Quality of service class which a message is sent with.
///
/// | Class | Retransmits unacked? | Ordering |
/// |---|---|---|
/// | [`QosType::ReliableOrdered`] | yes, until acked | send order |
/// | [`QosType::Unreliable`] | no | none |
/// | [`QosType::UnreliableOrdered`] | no | only newer messages are delivered |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum QosType {
    /// Messages are guaranteed to be delivered, and are delivered in the order
    /// they were sent.
    ///
    /// Messages are retransmitted until the peer acknowledges every one of
    /// their fragments. Messages which arrive early are buffered until the
    /// messages before them arrive.
    #[display("reliable ordered")]
    ReliableOrdered = 0,
    /// Messages are sent once, and may be lost or delivered in any order.
    #[display("unreliable")]
    Unreliable = 1,
    /// Messages are sent once and may be lost, but a message is never
    /// delivered after a newer message on the same channel has been.
    ///
    /// Messages which arrive later than a newer message are dropped.
    #[display("unreliable ordered")]
    UnreliableOrdered = 2,
}

impl QosType {
    /// Number of [`QosType`] variants.
    pub const COUNT: usize = 3;

    /// All [`QosType`] variants, ordered by channel ID.
    pub const ALL: [Self; Self::COUNT] = [
        Self::ReliableOrdered,
        Self::Unreliable,
        Self::UnreliableOrdered,
    ];

    /// Gets the channel ID which this class is encoded as on the wire.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Gets the index of this class into an array of [`QosType::COUNT`]
    /// elements.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` if messages of this class are retransmitted until they
    /// are acknowledged.
    #[must_use]
    pub const fn is_reliable(self) -> bool {
        matches!(self, Self::ReliableOrdered)
    }

    /// Returns `true` if messages of this class are never delivered out of
    /// order.
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::ReliableOrdered | Self::UnreliableOrdered)
    }
}

/// Channel ID does not correspond to any [`QosType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown channel id {0}")]
pub struct UnknownChannel(pub u8);

impl TryFrom<u8> for QosType {
    type Error = UnknownChannel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ReliableOrdered),
            1 => Ok(Self::Unreliable),
            2 => Ok(Self::UnreliableOrdered),
            other => Err(UnknownChannel(other)),
        }
    }
}

impl From<QosType> for u8 {
    fn from(value: QosType) -> Self {
        value.id()
    }
}
