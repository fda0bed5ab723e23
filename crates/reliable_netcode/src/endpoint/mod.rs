//! See [`Endpoint`].

mod config;
mod recv;
mod send;
mod stats;

pub use {config::*, stats::*};
use {
    crate::{
        ack::ReceivedPackets,
        channel::{FragmentPath, QosType, RecvChannel, SendChannel},
        rtt::RttEstimator,
        seq::PacketSeq,
        seq_buf::SeqBuf,
    },
    core::time::Duration,
    octs::Bytes,
    thiserror::Error,
    tracing::debug,
};

/// Number of sent packets which an [`Endpoint`] remembers while waiting for
/// them to be acknowledged.
///
/// A packet which is not acknowledged before this many newer packets are sent
/// is forgotten. Any reliable fragment it carried is still sent again.
pub const SENT_PACKETS_CAP: usize = 1024;

/// Receives packets and messages produced by an [`Endpoint`].
///
/// Both functions are called synchronously from inside the [`Endpoint`]
/// function which produced the data.
pub trait EndpointHandler {
    /// Called when a packet must be sent to the peer.
    ///
    /// The endpoint does not care if the packet is actually delivered.
    fn transmit(&mut self, packet: Bytes);

    /// Called when a message is ready to be given to the application.
    fn receive(&mut self, msg: Bytes);
}

/// [`EndpointHandler`] made of two closures.
///
/// # Examples
///
/// ```
/// # use reliable_netcode::{channel::QosType, endpoint::{Callbacks, Endpoint, EndpointConfig}};
/// let mut endpoint = Endpoint::new(EndpointConfig::default()).unwrap();
/// let mut sent = 0;
/// endpoint
///     .send_message(b"hi".as_slice(), QosType::Unreliable, &mut Callbacks::new(|_| sent += 1, |_| {}))
///     .unwrap();
/// assert_eq!(1, sent);
/// ```
#[derive(Debug, Clone)]
pub struct Callbacks<T, R> {
    /// Called by [`EndpointHandler::transmit`].
    pub on_transmit: T,
    /// Called by [`EndpointHandler::receive`].
    pub on_receive: R,
}

impl<T: FnMut(Bytes), R: FnMut(Bytes)> Callbacks<T, R> {
    /// Creates a handler from a transmit and a receive callback.
    pub const fn new(on_transmit: T, on_receive: R) -> Self {
        Self {
            on_transmit,
            on_receive,
        }
    }
}

impl<T: FnMut(Bytes), R: FnMut(Bytes)> EndpointHandler for Callbacks<T, R> {
    fn transmit(&mut self, packet: Bytes) {
        (self.on_transmit)(packet);
    }

    fn receive(&mut self, msg: Bytes) {
        (self.on_receive)(msg);
    }
}

/// Failed to send a message with [`Endpoint::send_message`].
///
/// Nothing was sent, and the endpoint is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Message has no bytes.
    #[error("message is empty")]
    EmptyMessage,
    /// Message is longer than [`EndpointConfig::max_message_len`].
    #[error("message too large - {len} / {max} bytes")]
    MessageTooLarge {
        /// Length of the message.
        len: usize,
        /// Maximum length of a message.
        max: usize,
    },
    /// Too many reliable messages are already queued, waiting for the peer to
    /// acknowledge older ones.
    ///
    /// Try again after the peer has acknowledged more messages.
    #[error("send queue full - {cap} reliable messages already waiting")]
    QueueFull {
        /// Capacity of the queue, [`EndpointConfig::send_queue_len`].
        cap: usize,
    },
    /// Channel ID does not correspond to any [`QosType`].
    #[error(transparent)]
    UnknownChannel(#[from] crate::channel::UnknownChannel),
}

/// One side of a connection, turning messages into packets and packets back
/// into messages.
///
/// An endpoint does no IO and does not read the system clock. Packets to send
/// and messages received are handed to an [`EndpointHandler`], and time only
/// advances in [`Endpoint::update`].
///
/// Every packet carries an acknowledgement of the most recent packets received
/// from the peer. Reliable fragments which are not acknowledged within the
/// retransmission timeout are sent again in a new packet.
#[derive(Debug, Clone)]
pub struct Endpoint {
    config: EndpointConfig,
    now: Duration,
    next_packet_seq: PacketSeq,
    sent_packets: SeqBuf<SentPacket, SENT_PACKETS_CAP>,
    recv_packets: ReceivedPackets,
    rtt: RttEstimator,
    send_channels: [SendChannel; QosType::COUNT],
    recv_channels: [RecvChannel; QosType::COUNT],
    ack_pending: bool,
    stats: EndpointStats,
}

#[derive(Debug, Clone, Default)]
struct SentPacket {
    sent_at: Duration,
    /// Reliable fragment carried by this packet.
    frag: Option<(QosType, FragmentPath)>,
}

impl Endpoint {
    /// Creates a new endpoint with no packets sent or received.
    ///
    /// # Errors
    ///
    /// Errors if the config is invalid, see [`EndpointConfig::validate`].
    pub fn new(config: EndpointConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: EndpointConfig) -> Self {
        let max_frags = u8::try_from(config.max_fragments)
            .expect("config was validated, so max fragments should fit in a `u8`");
        Self {
            now: Duration::ZERO,
            next_packet_seq: PacketSeq::default(),
            sent_packets: SeqBuf::new(),
            recv_packets: ReceivedPackets::new(),
            rtt: RttEstimator::new(config.initial_rtt),
            send_channels: QosType::ALL.map(|qos| SendChannel::new(qos, config.send_queue_len)),
            recv_channels: QosType::ALL
                .map(|qos| RecvChannel::new(qos, config.fragment_size, max_frags)),
            ack_pending: false,
            stats: EndpointStats::default(),
            config,
        }
    }

    /// Gets the configuration this endpoint was created with.
    #[must_use]
    pub const fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Gets the total time passed to [`Endpoint::update`] so far.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Gets the RTT estimate for the path to the peer.
    #[must_use]
    pub const fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Gets the running totals of this endpoint's activity.
    #[must_use]
    pub const fn stats(&self) -> EndpointStats {
        self.stats
    }

    /// Gets how many reliable messages have been sent but not fully
    /// acknowledged yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.send_channels.iter().map(SendChannel::in_flight).sum()
    }

    /// Gets how many reliable messages are waiting to be sent for the first
    /// time, because the peer has not yet acknowledged enough older messages.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.send_channels.iter().map(SendChannel::queued).sum()
    }

    /// Returns this endpoint to the state it was in right after
    /// [`Endpoint::new`].
    ///
    /// All buffered messages, sequence counters and statistics are dropped.
    pub fn reset(&mut self) {
        debug!("Resetting endpoint");
        *self = Self::from_valid_config(self.config.clone());
    }

    /// Advances the clock of this endpoint by `dt`.
    ///
    /// This sends any queued reliable messages which now fit in the send
    /// window, sends again any reliable fragments which have not been
    /// acknowledged within the retransmission timeout, sends an ack-only packet
    /// if we have received packets that we have not acknowledged yet, and drops
    /// stale partially reassembled messages on unreliable channels.
    pub fn update(&mut self, dt: Duration, handler: &mut impl EndpointHandler) {
        self.now += dt;

        self.flush_queued(handler);

        let rto = self.rtt.rto(self.config.min_rto, self.config.max_rto);
        for qos in QosType::ALL {
            let due = self.send_channels[qos.index()].take_due(self.now, rto);
            for frame in due {
                self.stats.frags_retransmitted += 1;
                self.flush_packet(qos, Some(frame), handler);
            }
        }

        if self.ack_pending {
            self.flush_packet(QosType::ReliableOrdered, None, handler);
        }

        let timeout = self.config.reassembly_timeout;
        for channel in &mut self.recv_channels {
            self.stats.reassemblies_expired += channel.clean_up(self.now, timeout);
        }
    }

    /// Advances the clock by `secs` seconds, in steps of
    /// [`EndpointConfig::fast_forward_step`].
    ///
    /// This is the same as calling [`Endpoint::update`] once per step, with the
    /// last step being whatever time is left over. Values of `secs` which are
    /// not positive do nothing.
    pub fn update_fast_forward(&mut self, secs: f64, handler: &mut impl EndpointHandler) {
        let Ok(mut left) = Duration::try_from_secs_f64(secs) else {
            debug!(secs, "Ignoring invalid fast forward duration");
            return;
        };

        let step = self.config.fast_forward_step;
        while !left.is_zero() {
            let dt = step.min(left);
            self.update(dt, handler);
            left -= dt;
        }
    }
}
