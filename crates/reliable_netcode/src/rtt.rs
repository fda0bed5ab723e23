//! Round-trip time estimation, used to decide when to retransmit.

use core::time::Duration;

/// Default initial RTT to use for [`RttEstimator`] before any RTT samples have
/// been provided.
///
/// This value is based on [RFC 9002 Section 6.2.2].
///
/// [RFC 9002 Section 6.2.2]: https://www.rfc-editor.org/rfc/rfc9002.html#section-6.2.2-1
pub const DEFAULT_INITIAL_RTT: Duration = Duration::from_millis(333);

const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// Computes an RTT estimation for the path to a peer.
///
/// Samples are taken when a packet is acknowledged, as the time between
/// sending that packet and receiving the ack. Only the first acknowledgement
/// of a packet produces a sample.
///
/// This is based on [`quinn-proto`'s `RttEstimator`](https://github.com/quinn-rs/quinn/blob/411abe9/quinn-proto/src/connection/paths.rs#L151).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RttEstimator {
    latest: Duration,
    smoothed: Duration,
    var: Duration,
    min: Duration,
    samples: usize,
}

impl RttEstimator {
    /// Creates a new estimator from a given initial RTT.
    #[must_use]
    pub fn new(initial_rtt: Duration) -> Self {
        Self {
            latest: initial_rtt,
            smoothed: initial_rtt,
            var: initial_rtt / 2,
            min: initial_rtt,
            samples: 0,
        }
    }

    /// Gets the current best RTT estimation.
    #[must_use]
    pub const fn get(&self) -> Duration {
        self.smoothed
    }

    /// Gets the most recent RTT sample, or the initial RTT if there have been
    /// no samples yet.
    #[must_use]
    pub const fn latest(&self) -> Duration {
        self.latest
    }

    /// Gets a conservative estimate of RTT.
    ///
    /// Takes the maximum of smoothed and latest RTT, as recommended
    /// in 6.1.2 of the recovery spec (draft 29).
    #[must_use]
    pub fn conservative(&self) -> Duration {
        self.get().max(self.latest)
    }

    /// Gets the minimum RTT registered so far for this estimator.
    ///
    /// # Examples
    ///
    /// ```
    /// # use {reliable_netcode::rtt::RttEstimator, core::time::Duration};
    /// let mut rtt = RttEstimator::new(Duration::from_millis(500));
    /// assert_eq!(Duration::from_millis(500), rtt.min());
    ///
    /// rtt.update(Duration::from_millis(750));
    /// assert_eq!(Duration::from_millis(500), rtt.min());
    ///
    /// rtt.update(Duration::from_millis(250));
    /// assert_eq!(Duration::from_millis(250), rtt.min());
    /// ```
    #[must_use]
    pub const fn min(&self) -> Duration {
        self.min
    }

    /// Gets how many samples have been added with [`RttEstimator::update`].
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Computes the probe timeout duration (PTO) as described in
    /// [RFC 9002 Section 6.2.1].
    ///
    /// [RFC 9002 Section 6.2.1]: https://www.rfc-editor.org/rfc/rfc9002.html#section-6.2.1
    #[must_use]
    pub fn pto(&self) -> Duration {
        self.get() + (self.var * 4).max(TIMER_GRANULARITY)
    }

    /// Gets how long to wait after sending a packet before it is considered
    /// lost and its contents are sent again.
    ///
    /// This is the [PTO], clamped between `min` and `max`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use {reliable_netcode::rtt::RttEstimator, core::time::Duration};
    /// let rtt = RttEstimator::new(Duration::from_millis(100));
    /// // 100 + 4 * 50
    /// assert_eq!(Duration::from_millis(300), rtt.pto());
    ///
    /// let min = Duration::from_millis(50);
    /// assert_eq!(Duration::from_millis(300), rtt.rto(min, Duration::from_secs(1)));
    /// assert_eq!(Duration::from_millis(200), rtt.rto(min, Duration::from_millis(200)));
    /// ```
    ///
    /// [PTO]: RttEstimator::pto
    #[must_use]
    pub fn rto(&self, min: Duration, max: Duration) -> Duration {
        self.pto().clamp(min, max)
    }

    /// Adds an RTT sample to this estimation.
    pub fn update(&mut self, rtt: Duration) {
        self.latest = rtt;
        self.min = self.min.min(rtt);
        self.samples = self.samples.saturating_add(1);

        let var_sample = self.smoothed.abs_diff(rtt);
        self.var = (3 * self.var + var_sample) / 4;
        self.smoothed = (7 * self.smoothed + rtt) / 8;
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_RTT)
    }
}
