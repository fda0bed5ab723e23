#![allow(dead_code, reason = "not every test uses every helper")]

use {
    core::time::Duration,
    octs::Bytes,
    reliable_netcode::{
        channel::QosType,
        condition::{Conditioner, ConditionerConfig},
        endpoint::{Endpoint, EndpointConfig, EndpointHandler},
        seq::MessageSeq,
    },
    tracing_subscriber::EnvFilter,
};

/// Installs a subscriber printing logs filtered by `RUST_LOG`, if one is not
/// installed already.
pub fn init_tracing() {
    _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Message of `len` bytes whose second byte is `tag`.
///
/// # Panics
///
/// Panics if `len < 2`.
#[must_use]
pub fn tagged(len: usize, tag: u8) -> Bytes {
    assert!(len >= 2);
    let mut msg = vec![0; len];
    msg[1] = tag;
    Bytes::from(msg)
}

/// Sends packets into a [`Conditioner`] and collects received messages.
struct Handler<'a> {
    in_transit: &'a mut Conditioner,
    transmitted: &'a mut Vec<bool>,
    received: &'a mut Vec<Bytes>,
}

impl EndpointHandler for Handler<'_> {
    fn transmit(&mut self, packet: Bytes) {
        let kept = self.in_transit.push(packet);
        self.transmitted.push(kept);
    }

    fn receive(&mut self, msg: Bytes) {
        self.received.push(msg);
    }
}

/// Single endpoint whose transmitted packets are fed back into itself, through
/// a conditioner.
pub struct Loopback {
    pub endpoint: Endpoint,
    pub in_transit: Conditioner,
    /// For every packet transmitted, `false` if the conditioner dropped it.
    pub transmitted: Vec<bool>,
    pub received: Vec<Bytes>,
}

impl Loopback {
    #[must_use]
    pub fn new(config: EndpointConfig, conditioner: ConditionerConfig, seed: u64) -> Self {
        init_tracing();
        Self {
            endpoint: Endpoint::new(config).expect("config should be valid"),
            in_transit: Conditioner::new(conditioner, seed),
            transmitted: Vec::new(),
            received: Vec::new(),
        }
    }

    /// Loopback with the default config which never drops or reorders.
    #[must_use]
    pub fn perfect() -> Self {
        Self::new(EndpointConfig::default(), ConditionerConfig::default(), 0)
    }

    fn split(&mut self) -> (&mut Endpoint, Handler<'_>) {
        (
            &mut self.endpoint,
            Handler {
                in_transit: &mut self.in_transit,
                transmitted: &mut self.transmitted,
                received: &mut self.received,
            },
        )
    }

    pub fn send(&mut self, msg: Bytes, qos: QosType) -> MessageSeq {
        let (endpoint, mut handler) = self.split();
        endpoint
            .send_message(msg, qos, &mut handler)
            .expect("message should be sent")
    }

    pub fn update_fast_forward(&mut self, secs: f64) {
        let (endpoint, mut handler) = self.split();
        endpoint.update_fast_forward(secs, &mut handler);
    }

    /// Advances by `secs` one fast forward step at a time, delivering packets
    /// in transit after every step.
    pub fn run_for(&mut self, secs: f64) {
        let step = self.endpoint.config().fast_forward_step;
        let mut left = Duration::from_secs_f64(secs);
        while !left.is_zero() {
            let dt = step.min(left);
            self.update_fast_forward(dt.as_secs_f64());
            self.deliver();
            left -= dt;
        }
    }

    /// Runs until `count` messages have been received, giving up after
    /// `max_secs`.
    ///
    /// # Panics
    ///
    /// Panics if the messages were not all received in time.
    pub fn run_until_received(&mut self, count: usize, max_secs: f64) {
        let mut elapsed = 0.0;
        while self.received.len() < count {
            assert!(
                elapsed < max_secs,
                "only received {} / {count} messages after {max_secs}s",
                self.received.len()
            );
            self.run_for(1.0);
            elapsed += 1.0;
        }
    }

    pub fn receive(&mut self, packet: Bytes) {
        let (endpoint, mut handler) = self.split();
        endpoint.receive_packet(packet, &mut handler);
    }

    /// Feeds every packet in transit back into the endpoint, in the order the
    /// conditioner gives them.
    pub fn deliver(&mut self) {
        while let Some(packet) = self.in_transit.pop() {
            self.receive(packet);
        }
    }

    /// Tags of all messages received so far, as made by [`tagged`].
    #[must_use]
    pub fn tags(&self) -> Vec<u8> {
        tags(&self.received)
    }
}

#[must_use]
pub fn tags(msgs: &[Bytes]) -> Vec<u8> {
    msgs.iter()
        .filter(|msg| msg[0] == 0)
        .map(|msg| msg[1])
        .collect()
}

/// Tags `0, 1, 2, ...` for `count` messages, wrapping around after
/// [`u8::MAX`].
#[must_use]
pub fn expected_tags(count: usize) -> Vec<u8> {
    (0..=u8::MAX).cycle().take(count).collect()
}

/// Two endpoints connected to each other through a conditioner in each
/// direction.
pub struct Pair {
    pub a: Peer,
    pub b: Peer,
}

pub struct Peer {
    pub endpoint: Endpoint,
    /// Packets sent by this peer, waiting to be received by the other.
    pub outgoing: Conditioner,
    pub transmitted: Vec<bool>,
    pub received: Vec<Bytes>,
}

impl Peer {
    fn new(config: EndpointConfig, conditioner: ConditionerConfig, seed: u64) -> Self {
        Self {
            endpoint: Endpoint::new(config).expect("config should be valid"),
            outgoing: Conditioner::new(conditioner, seed),
            transmitted: Vec::new(),
            received: Vec::new(),
        }
    }

    fn split(&mut self) -> (&mut Endpoint, Handler<'_>) {
        (
            &mut self.endpoint,
            Handler {
                in_transit: &mut self.outgoing,
                transmitted: &mut self.transmitted,
                received: &mut self.received,
            },
        )
    }

    pub fn send(&mut self, msg: Bytes, qos: QosType) -> MessageSeq {
        let (endpoint, mut handler) = self.split();
        endpoint
            .send_message(msg, qos, &mut handler)
            .expect("message should be sent")
    }

    pub fn update(&mut self, secs: f64) {
        let (endpoint, mut handler) = self.split();
        endpoint.update_fast_forward(secs, &mut handler);
    }

    fn receive(&mut self, packet: Bytes) {
        let (endpoint, mut handler) = self.split();
        endpoint.receive_packet(packet, &mut handler);
    }
}

impl Pair {
    #[must_use]
    pub fn new(config: EndpointConfig, conditioner: ConditionerConfig, seed: u64) -> Self {
        init_tracing();
        Self {
            a: Peer::new(config.clone(), conditioner.clone(), seed),
            b: Peer::new(config, conditioner, seed.wrapping_add(1)),
        }
    }

    /// Delivers every packet in transit in both directions.
    pub fn deliver(&mut self) {
        while let Some(packet) = self.a.outgoing.pop() {
            self.b.receive(packet);
        }
        while let Some(packet) = self.b.outgoing.pop() {
            self.a.receive(packet);
        }
    }

    /// Advances both peers by one fast forward step and delivers what they
    /// sent.
    pub fn tick(&mut self) {
        let step = self.a.endpoint.config().fast_forward_step.as_secs_f64();
        self.a.update(step);
        self.b.update(step);
        self.deliver();
    }
}
