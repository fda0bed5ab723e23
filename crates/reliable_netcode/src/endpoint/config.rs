use {
    crate::{
        channel::MAX_SEND_QUEUE_LEN,
        frag::MAX_FRAGS,
        packet::{HEADER_LEN, MAX_FRAME_OVERHEAD, MAX_PAYLOAD_LEN},
        rtt::DEFAULT_INITIAL_RTT,
    },
    core::time::Duration,
    thiserror::Error,
};

/// Configuration for an [`Endpoint`].
///
/// Both peers should use the same [`EndpointConfig::fragment_size`] and
/// [`EndpointConfig::max_fragments`], since the receiver validates incoming
/// fragments against its own values.
///
/// [`Endpoint`]: crate::endpoint::Endpoint
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointConfig {
    /// Maximum number of message bytes carried by a single packet.
    ///
    /// Messages longer than this are split into fragments of exactly this
    /// length, except for the last one. Keep this plus the header overhead
    /// below the path MTU.
    ///
    /// By default, this is 1024.
    pub fragment_size: usize,
    /// Maximum number of fragments a message may be split into.
    ///
    /// This, multiplied by [`EndpointConfig::fragment_size`], is the maximum
    /// length of a message. Must be between 1 and 255.
    ///
    /// By default, this is 64.
    pub max_fragments: usize,
    /// How many reliable messages may wait to be sent while the send window
    /// of [`SEND_WINDOW`] unacknowledged messages is full.
    ///
    /// Sending a reliable message while this many are already waiting fails.
    /// Must be at most [`MAX_SEND_QUEUE_LEN`].
    ///
    /// By default, this is 1024.
    ///
    /// [`SEND_WINDOW`]: crate::channel::SEND_WINDOW
    pub send_queue_len: usize,
    /// RTT estimate to use before any packets have been acknowledged.
    ///
    /// By default, this is [`DEFAULT_INITIAL_RTT`].
    pub initial_rtt: Duration,
    /// Lower bound on how long to wait before sending an unacknowledged
    /// reliable fragment again.
    ///
    /// By default, this is 50ms.
    pub min_rto: Duration,
    /// Upper bound on how long to wait before sending an unacknowledged
    /// reliable fragment again.
    ///
    /// By default, this is 1s.
    pub max_rto: Duration,
    /// How long to keep a partially received message on an unreliable channel
    /// before dropping it.
    ///
    /// By default, this is 5s.
    pub reassembly_timeout: Duration,
    /// Size of the steps taken by [`Endpoint::update_fast_forward`].
    ///
    /// By default, this is 100ms.
    ///
    /// [`Endpoint::update_fast_forward`]: crate::endpoint::Endpoint::update_fast_forward
    pub fast_forward_step: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            fragment_size: 1024,
            max_fragments: 64,
            send_queue_len: 1024,
            initial_rtt: DEFAULT_INITIAL_RTT,
            min_rto: Duration::from_millis(50),
            max_rto: Duration::from_secs(1),
            reassembly_timeout: Duration::from_secs(5),
            fast_forward_step: Duration::from_millis(100),
        }
    }
}

/// [`EndpointConfig`] has invalid values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// [`EndpointConfig::fragment_size`] is 0.
    #[error("fragment size must be greater than 0")]
    ZeroFragmentSize,
    /// [`EndpointConfig::fragment_size`] does not fit in a packet's payload
    /// length field.
    #[error("fragment size {0} is larger than the maximum of {MAX_PAYLOAD_LEN}")]
    FragmentSizeTooLarge(usize),
    /// [`EndpointConfig::max_fragments`] is 0 or larger than [`MAX_FRAGS`].
    #[error("max fragments {0} must be between 1 and {MAX_FRAGS}")]
    InvalidMaxFragments(usize),
    /// [`EndpointConfig::send_queue_len`] is larger than
    /// [`MAX_SEND_QUEUE_LEN`].
    #[error("send queue length {0} is larger than the maximum of {MAX_SEND_QUEUE_LEN}")]
    SendQueueTooLarge(usize),
    /// [`EndpointConfig::min_rto`] is greater than
    /// [`EndpointConfig::max_rto`].
    #[error("min RTO {min:?} is greater than max RTO {max:?}")]
    RtoBounds {
        /// Configured minimum.
        min: Duration,
        /// Configured maximum.
        max: Duration,
    },
    /// [`EndpointConfig::fast_forward_step`] is 0.
    #[error("fast forward step must be greater than 0")]
    ZeroFastForwardStep,
}

impl EndpointConfig {
    /// Sets [`EndpointConfig::fragment_size`].
    #[must_use]
    pub const fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size;
        self
    }

    /// Sets [`EndpointConfig::max_fragments`].
    #[must_use]
    pub const fn with_max_fragments(mut self, max_fragments: usize) -> Self {
        self.max_fragments = max_fragments;
        self
    }

    /// Sets [`EndpointConfig::send_queue_len`].
    #[must_use]
    pub const fn with_send_queue_len(mut self, send_queue_len: usize) -> Self {
        self.send_queue_len = send_queue_len;
        self
    }

    /// Sets [`EndpointConfig::initial_rtt`].
    #[must_use]
    pub const fn with_initial_rtt(mut self, initial_rtt: Duration) -> Self {
        self.initial_rtt = initial_rtt;
        self
    }

    /// Sets [`EndpointConfig::min_rto`] and [`EndpointConfig::max_rto`].
    #[must_use]
    pub const fn with_rto_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_rto = min;
        self.max_rto = max;
        self
    }

    /// Sets [`EndpointConfig::reassembly_timeout`].
    #[must_use]
    pub const fn with_reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.reassembly_timeout = timeout;
        self
    }

    /// Sets [`EndpointConfig::fast_forward_step`].
    #[must_use]
    pub const fn with_fast_forward_step(mut self, step: Duration) -> Self {
        self.fast_forward_step = step;
        self
    }

    /// Gets the length of the longest message which can be sent.
    #[must_use]
    pub const fn max_message_len(&self) -> usize {
        self.fragment_size.saturating_mul(self.max_fragments)
    }

    /// Gets the length of the longest packet which will be transmitted.
    #[must_use]
    pub const fn max_packet_len(&self) -> usize {
        (HEADER_LEN + MAX_FRAME_OVERHEAD).saturating_add(self.fragment_size)
    }

    /// Checks that all values in this configuration are usable.
    ///
    /// # Errors
    ///
    /// Errors if any value is invalid, see [`ConfigError`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use reliable_netcode::endpoint::{EndpointConfig, ConfigError};
    /// assert_eq!(Ok(()), EndpointConfig::default().validate());
    /// assert_eq!(
    ///     Err(ConfigError::InvalidMaxFragments(256)),
    ///     EndpointConfig::default().with_max_fragments(256).validate(),
    /// );
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fragment_size == 0 {
            return Err(ConfigError::ZeroFragmentSize);
        }
        if self.fragment_size > MAX_PAYLOAD_LEN {
            return Err(ConfigError::FragmentSizeTooLarge(self.fragment_size));
        }
        if self.max_fragments == 0 || self.max_fragments > MAX_FRAGS {
            return Err(ConfigError::InvalidMaxFragments(self.max_fragments));
        }
        if self.send_queue_len > MAX_SEND_QUEUE_LEN {
            return Err(ConfigError::SendQueueTooLarge(self.send_queue_len));
        }
        if self.min_rto > self.max_rto {
            return Err(ConfigError::RtoBounds {
                min: self.min_rto,
                max: self.max_rto,
            });
        }
        if self.fast_forward_step.is_zero() {
            return Err(ConfigError::ZeroFastForwardStep);
        }
        Ok(())
    }
}
