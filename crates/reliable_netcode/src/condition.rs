//! Packet queue which randomly drops and reorders packets.
//!
//! **This is for testing purposes only!** You should never be using a
//! conditioner in the release build of your app.
//!
//! A useful strategy for testing networking code is to induce artificial packet
//! loss and reordering, and see how your app copes with it. Put a
//! [`Conditioner`] between one [`Endpoint`]'s transmit callback and another
//! endpoint's [`Endpoint::receive_packet`] to simulate a poor network.
//!
//! The conditioner is driven by its own seeded RNG, so the same seed and the
//! same sequence of calls always drop and reorder the same packets.
//!
//! [`Endpoint`]: crate::endpoint::Endpoint
//! [`Endpoint::receive_packet`]: crate::endpoint::Endpoint::receive_packet

use {
    alloc::collections::VecDeque,
    octs::Bytes,
    rand::{Rng, SeedableRng, rngs::StdRng},
    tracing::trace,
};

/// Configuration for a [`Conditioner`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConditionerConfig {
    /// Chance of a packet being dropped when it is pushed.
    ///
    /// Represented by a percentage value in the range `0.0..=1.0`. Values
    /// outside this range are clamped.
    pub loss_rate: f32,
    /// Chance of a packet which is not dropped being inserted at a random
    /// position in the queue, instead of at the back.
    ///
    /// Represented by a percentage value in the range `0.0..=1.0`. Values
    /// outside this range are clamped.
    pub reorder_rate: f32,
}

/// Queue of packets in transit, which drops and reorders packets pushed into
/// it.
///
/// See the [module-level docs](self).
///
/// # Examples
///
/// ```
/// # use {reliable_netcode::condition::{Conditioner, ConditionerConfig}, octs::Bytes};
/// let mut conditioner = Conditioner::new(
///     ConditionerConfig {
///         loss_rate: 1.0,
///         reorder_rate: 0.0,
///     },
///     0,
/// );
/// assert!(!conditioner.push(Bytes::from_static(b"lost")));
/// assert_eq!(1, conditioner.dropped());
/// assert!(conditioner.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Conditioner<T = Bytes> {
    loss_rate: f32,
    reorder_rate: f32,
    rng: StdRng,
    queue: VecDeque<T>,
    dropped: usize,
}

impl<T> Conditioner<T> {
    /// Creates an empty conditioner with an RNG seeded from `seed`.
    #[must_use]
    pub fn new(config: ConditionerConfig, seed: u64) -> Self {
        Self {
            loss_rate: config.loss_rate.clamp(0.0, 1.0),
            reorder_rate: config.reorder_rate.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
            queue: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Gets how many packets have been dropped so far.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    /// Gets how many packets are waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if there are no packets waiting in the queue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pushes a packet into the queue, possibly dropping it or putting it
    /// ahead of packets pushed earlier.
    ///
    /// Returns `false` if the packet was dropped.
    pub fn push(&mut self, packet: T) -> bool {
        if self.rng.random::<f32>() < self.loss_rate {
            self.dropped += 1;
            trace!(dropped = self.dropped, "Dropping packet");
            return false;
        }

        if !self.queue.is_empty() && self.rng.random::<f32>() < self.reorder_rate {
            let index = self.rng.random_range(0..self.queue.len());
            self.queue.insert(index, packet);
        } else {
            self.queue.push_back(packet);
        }
        true
    }

    /// Takes the packet at the front of the queue.
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Takes all packets in the queue, in the order they should be delivered.
    pub fn flush(&mut self) -> impl Iterator<Item = T> + '_ {
        self.queue.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(loss_rate: f32, reorder_rate: f32) -> ConditionerConfig {
        ConditionerConfig {
            loss_rate,
            reorder_rate,
        }
    }

    #[test]
    fn passthrough() {
        let mut conditioner = Conditioner::new(ConditionerConfig::default(), 0);
        for i in 0..100 {
            assert!(conditioner.push(i));
        }
        assert_eq!((0..100).collect::<Vec<_>>(), conditioner.flush().collect::<Vec<_>>());
        assert_eq!(0, conditioner.dropped());
    }

    #[test]
    fn reorders_without_losing() {
        let mut conditioner = Conditioner::new(config(0.0, 1.0), 1234);
        for i in 0..100 {
            conditioner.push(i);
        }
        let mut out = conditioner.flush().collect::<Vec<_>>();
        assert_ne!((0..100).collect::<Vec<_>>(), out);
        out.sort_unstable();
        assert_eq!((0..100).collect::<Vec<_>>(), out);
    }

    #[test]
    fn same_seed_same_result() {
        let run = |seed| {
            let mut conditioner = Conditioner::new(config(0.3, 0.5), seed);
            for i in 0..1000 {
                conditioner.push(i);
            }
            let out = conditioner.flush().collect::<Vec<_>>();
            (conditioner.dropped(), out)
        };
        let (dropped, out) = run(42);
        assert_eq!((dropped, out.clone()), run(42));
        assert_eq!(1000, dropped + out.len());
        assert!(dropped > 0);
    }
}
