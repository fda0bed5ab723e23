//! Wire format of the packets which endpoints exchange.
//!
//! All integers are big-endian.
//!
//! ```text
//! [2] sequence
//! [2] ack (last received)
//! [4] ack bitfield
//! [1] channel id
//! [1] flags
//! -- unless ACK_ONLY --
//! [2] message sequence
//! [1] fragment index  \ only if FRAGMENTED
//! [1] fragment count  /
//! [2] payload length
//! [N] payload
//! ```
//!
//! Packets are built by an [`Endpoint`] and should not usually be created by
//! hand; these types are public for testing and fuzzing.
//!
//! [`Endpoint`]: crate::endpoint::Endpoint

use {
    crate::{
        ack::Acknowledge,
        channel::QosType,
        seq::{MessageSeq, PacketSeq},
    },
    bitflags::bitflags,
    octs::{
        Buf, BufError, BufTooShortOr, Bytes, BytesMut, Decode, Encode, EncodeLen, FixedEncodeLen,
        Read, Write,
    },
    thiserror::Error,
};

/// Length of the header which every packet starts with.
pub const HEADER_LEN: usize =
    PacketSeq::ENCODE_LEN + Acknowledge::ENCODE_LEN + u8::ENCODE_LEN + u8::ENCODE_LEN;

/// Maximum number of bytes of frame metadata which follow the header.
pub const MAX_FRAME_OVERHEAD: usize =
    MessageSeq::ENCODE_LEN + FragmentPosition::ENCODE_LEN + u16::ENCODE_LEN;

/// Maximum length of the payload of a single packet.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

bitflags! {
    /// Flags byte of a [`Packet`], describing which optional parts follow the
    /// header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct PacketFlags: u8 {
        /// The frame carries a fragment index and count.
        const FRAGMENTED = 0x01;
        /// The ack fields hold a real [`Acknowledge`].
        ///
        /// Unset until the sender has received at least one packet.
        const HAS_ACK = 0x02;
        /// Only the header is present, and there is no frame.
        const ACK_ONLY = 0x04;
    }
}

/// Fixed-size header at the start of every [`Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct PacketHeader {
    /// Sequence number of this packet.
    pub seq: PacketSeq,
    /// Which of the receiver's packets the sender has received.
    pub ack: Option<Acknowledge>,
    /// Channel which the frame of this packet belongs to.
    ///
    /// Meaningless for ack-only packets, which always use
    /// [`QosType::ReliableOrdered`].
    pub channel: QosType,
}

/// Position of a fragment within its message.
///
/// A message which was not split up has a single fragment, see
/// [`FragmentPosition::SINGLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentPosition {
    index: u8,
    count: u8,
}

impl FragmentPosition {
    /// Position of the only fragment of a message which was not split up.
    pub const SINGLE: Self = Self { index: 0, count: 1 };

    /// Creates a position of fragment `index` out of `count`.
    ///
    /// Returns [`None`] if `index` is not less than `count`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use reliable_netcode::packet::FragmentPosition;
    /// assert!(FragmentPosition::new(0, 1).is_some());
    /// assert!(FragmentPosition::new(3, 4).is_some());
    /// assert!(FragmentPosition::new(4, 4).is_none());
    /// assert!(FragmentPosition::new(0, 0).is_none());
    /// ```
    #[must_use]
    pub const fn new(index: u8, count: u8) -> Option<Self> {
        if index < count {
            Some(Self { index, count })
        } else {
            None
        }
    }

    /// Index of this fragment.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.index
    }

    /// Total number of fragments in the message.
    #[must_use]
    pub const fn count(self) -> u8 {
        self.count
    }

    /// Returns `true` if the message is made of more than one fragment.
    #[must_use]
    pub const fn is_fragmented(self) -> bool {
        self.count > 1
    }

    /// Returns `true` if this is the last fragment of the message.
    #[must_use]
    pub const fn is_last(self) -> bool {
        self.index + 1 == self.count
    }
}

#[cfg(feature = "arbitrary")]
impl<'a> arbitrary::Arbitrary<'a> for FragmentPosition {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let count = u.int_in_range(1..=u8::MAX)?;
        let index = u.int_in_range(0..=count - 1)?;
        Ok(Self { index, count })
    }
}

impl FixedEncodeLen for FragmentPosition {
    const ENCODE_LEN: usize = u8::ENCODE_LEN + u8::ENCODE_LEN;
}

/// Message, or fragment of a message, carried by a [`Packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence of the message this belongs to.
    pub msg_seq: MessageSeq,
    /// Which fragment of the message this is.
    pub position: FragmentPosition,
    /// Bytes of this fragment.
    pub payload: Bytes,
}

/// Single datagram exchanged between endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// See [`PacketHeader`].
    pub header: PacketHeader,
    /// Frame carried by this packet, or [`None`] if this packet only carries
    /// acknowledgements.
    pub frame: Option<Frame>,
}

/// Failed to decode a [`Packet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer ended before all declared fields and payload were read.
    #[error("buffer too short")]
    TooShort,
    /// Channel ID does not map to a [`QosType`].
    #[error("unknown channel id {0}")]
    UnknownChannel(u8),
    /// Flags byte has unknown bits, or an invalid combination of bits.
    #[error("invalid flags {0:#010b}")]
    InvalidFlags(u8),
    /// Fragment index is not less than the fragment count, or a fragmented
    /// frame declares fewer than 2 fragments.
    #[error("invalid fragment {index} of {count}")]
    InvalidFragment {
        /// Fragment index read.
        index: u8,
        /// Fragment count read.
        count: u8,
    },
    /// Frame declares a payload of 0 bytes.
    #[error("empty payload")]
    EmptyPayload,
    /// Bytes were left in the buffer after the payload.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}

impl BufError for PacketError {}

/// Attempted to [`Encode`] a [`Frame`] whose payload is longer than
/// [`MAX_PAYLOAD_LEN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payload too large - {len} / {MAX_PAYLOAD_LEN} bytes")]
pub struct PayloadTooLarge {
    /// Length of the payload.
    pub len: usize,
}

impl BufError for PayloadTooLarge {}

impl Packet {
    /// Flags which this packet is encoded with.
    #[must_use]
    pub fn flags(&self) -> PacketFlags {
        let mut flags = PacketFlags::empty();
        flags.set(PacketFlags::HAS_ACK, self.header.ack.is_some());
        match &self.frame {
            None => flags.insert(PacketFlags::ACK_ONLY),
            Some(frame) => flags.set(PacketFlags::FRAGMENTED, frame.position.is_fragmented()),
        }
        flags
    }

    /// Encodes this packet into a new buffer.
    ///
    /// # Errors
    ///
    /// Errors if the frame payload is longer than [`MAX_PAYLOAD_LEN`].
    pub fn encode_to_bytes(&self) -> Result<Bytes, PayloadTooLarge> {
        let mut buf = BytesMut::with_capacity(self.encode_len());
        buf.write(self).map_err(|err| match err {
            BufTooShortOr::TooShort => unreachable!("`BytesMut` should grow to fit any write"),
            BufTooShortOr::Or(err) => err,
        })?;
        Ok(buf.freeze())
    }

    /// Decodes a packet which takes up the whole of `buf`.
    ///
    /// # Errors
    ///
    /// Errors if the packet is malformed, see [`PacketError`].
    pub fn decode_from(mut buf: Bytes) -> Result<Self, PacketError> {
        let packet = buf.read::<Self>().map_err(|err| match err {
            BufTooShortOr::TooShort => PacketError::TooShort,
            BufTooShortOr::Or(err) => err,
        })?;
        if buf.has_remaining() {
            return Err(PacketError::TrailingBytes(buf.remaining()));
        }
        Ok(packet)
    }
}

impl EncodeLen for Packet {
    fn encode_len(&self) -> usize {
        HEADER_LEN
            + self.frame.as_ref().map_or(0, |frame| {
                let position_len = if frame.position.is_fragmented() {
                    FragmentPosition::ENCODE_LEN
                } else {
                    0
                };
                MessageSeq::ENCODE_LEN + position_len + u16::ENCODE_LEN + frame.payload.len()
            })
    }
}

impl Encode for Packet {
    type Error = PayloadTooLarge;

    fn encode(&self, mut dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        dst.write(&self.header.seq)?;
        dst.write(&self.header.ack.unwrap_or_default())?;
        dst.write(&self.header.channel.id())?;
        dst.write(&self.flags().bits())?;

        if let Some(frame) = &self.frame {
            let len = frame.payload.len();
            let len = u16::try_from(len).map_err(|_| PayloadTooLarge { len })?;

            dst.write(&frame.msg_seq)?;
            if frame.position.is_fragmented() {
                dst.write(&frame.position.index)?;
                dst.write(&frame.position.count)?;
            }
            dst.write(&len)?;
            dst.write_from(frame.payload.clone())?;
        }
        Ok(())
    }
}

impl Decode for Packet {
    type Error = PacketError;

    fn decode(mut src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        let seq = src.read::<PacketSeq>()?;
        let ack = src.read::<Acknowledge>()?;
        let channel = src.read::<u8>()?;
        let channel =
            QosType::try_from(channel).map_err(|_| PacketError::UnknownChannel(channel))?;
        let flags = src.read::<u8>()?;
        let flags = PacketFlags::from_bits(flags)
            .filter(|flags| {
                !flags.contains(PacketFlags::ACK_ONLY | PacketFlags::FRAGMENTED)
            })
            .ok_or(PacketError::InvalidFlags(flags))?;

        let header = PacketHeader {
            seq,
            ack: flags.contains(PacketFlags::HAS_ACK).then_some(ack),
            channel,
        };
        if flags.contains(PacketFlags::ACK_ONLY) {
            return Ok(Self {
                header,
                frame: None,
            });
        }

        let msg_seq = src.read::<MessageSeq>()?;
        let position = if flags.contains(PacketFlags::FRAGMENTED) {
            let index = src.read::<u8>()?;
            let count = src.read::<u8>()?;
            FragmentPosition::new(index, count)
                .filter(|position| position.is_fragmented())
                .ok_or(PacketError::InvalidFragment { index, count })?
        } else {
            FragmentPosition::SINGLE
        };
        let len = usize::from(src.read::<u16>()?);
        if len == 0 {
            return Err(PacketError::EmptyPayload.into());
        }
        let payload = src.read_next(len)?;

        Ok(Self {
            header,
            frame: Some(Frame {
                msg_seq,
                position,
                payload,
            }),
        })
    }
}
