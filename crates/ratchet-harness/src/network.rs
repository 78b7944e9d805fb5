//! Simulated two-party network.
//!
//! Two directional queues with a delivery policy deciding which queued
//! message goes next. Nothing is ever dropped: a message leaves its queue
//! only when it is handed to the receiver.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ratchet_core::Role;

/// Order in which queued messages are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Oldest first
    InOrder,
    /// Newest first
    Reverse,
    /// Uniformly random, from the given seed
    Shuffled(u64),
    /// Nothing is delivered until the queues are flushed, then oldest first
    Deferred,
}

impl DeliveryPolicy {
    /// Whether this policy can hand messages over out of send order.
    pub fn reorders(self) -> bool {
        matches!(self, DeliveryPolicy::Reverse | DeliveryPolicy::Shuffled(_))
    }
}

/// Message in flight.
#[derive(Debug, Clone)]
pub struct Envelope<C> {
    /// Sequence number across both directions
    pub id: u64,
    /// Recipient
    pub to: Role,
    /// Protocol ciphertext
    pub ciphertext: C,
    /// Plaintext the sender encrypted
    pub plaintext: Vec<u8>,
}

/// Two directional queues under one delivery policy.
#[derive(Debug)]
pub struct SimNetwork<C> {
    policy: DeliveryPolicy,
    to_alice: VecDeque<Envelope<C>>,
    to_bob: VecDeque<Envelope<C>>,
    rng: ChaCha8Rng,
    next_id: u64,
}

impl<C> SimNetwork<C> {
    /// Empty network.
    pub fn new(policy: DeliveryPolicy) -> Self {
        let seed = match policy {
            DeliveryPolicy::Shuffled(seed) => seed,
            _ => 0,
        };
        Self {
            policy,
            to_alice: VecDeque::new(),
            to_bob: VecDeque::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
        }
    }

    /// Delivery policy in force.
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Queue a message for `to`, returning its id.
    pub fn submit(&mut self, to: Role, ciphertext: C, plaintext: Vec<u8>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.queue_mut(to).push_back(Envelope { id, to, ciphertext, plaintext });
        id
    }

    /// Messages waiting for `to`.
    pub fn pending(&self, to: Role) -> usize {
        self.queue(to).len()
    }

    /// Total messages in flight.
    pub fn in_flight(&self) -> usize {
        self.to_alice.len() + self.to_bob.len()
    }

    /// Ids of every queued message, to Alice first.
    pub fn queued_ids(&self) -> Vec<u64> {
        self.to_alice.iter().chain(&self.to_bob).map(|e| e.id).collect()
    }

    /// Message the policy would deliver to `to` next, without removing it.
    ///
    /// A `Shuffled` network draws the position here; a following `pop`
    /// takes the message drawn by the last `peek`.
    pub fn peek(&mut self, to: Role) -> Option<&Envelope<C>> {
        let position = self.position(to)?;
        self.queue(to).get(position)
    }

    /// Remove and return the message the policy delivers to `to` next.
    ///
    /// Returns `None` when the queue is empty or the policy is `Deferred`.
    pub fn pop(&mut self, to: Role) -> Option<Envelope<C>> {
        let position = self.position(to)?;
        let envelope = self.queue_mut(to).remove(position);
        self.reshuffle();
        envelope
    }

    /// Drain every queued message for `to`, oldest first, regardless of
    /// policy.
    pub fn flush(&mut self, to: Role) -> Vec<Envelope<C>> {
        self.queue_mut(to).drain(..).collect()
    }

    fn position(&mut self, to: Role) -> Option<usize> {
        let len = self.queue(to).len();
        if len == 0 {
            return None;
        }
        match self.policy {
            DeliveryPolicy::InOrder => Some(0),
            DeliveryPolicy::Reverse => Some(len - 1),
            DeliveryPolicy::Shuffled(_) => {
                // Stable until the queue changes, so peek and pop agree.
                let draw = self.rng.clone().gen_range(0..len);
                Some(draw)
            },
            DeliveryPolicy::Deferred => None,
        }
    }

    fn reshuffle(&mut self) {
        if matches!(self.policy, DeliveryPolicy::Shuffled(_)) {
            let _: u64 = self.rng.r#gen();
        }
    }

    fn queue(&self, to: Role) -> &VecDeque<Envelope<C>> {
        match to {
            Role::Alice => &self.to_alice,
            Role::Bob => &self.to_bob,
        }
    }

    fn queue_mut(&mut self, to: Role) -> &mut VecDeque<Envelope<C>> {
        match to {
            Role::Alice => &mut self.to_alice,
            Role::Bob => &mut self.to_bob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(policy: DeliveryPolicy) -> SimNetwork<u8> {
        let mut network = SimNetwork::new(policy);
        for i in 0..5u8 {
            network.submit(Role::Bob, i, vec![i]);
        }
        network
    }

    fn drain(network: &mut SimNetwork<u8>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(envelope) = network.pop(Role::Bob) {
            out.push(envelope.ciphertext);
        }
        out
    }

    #[test]
    fn in_order_is_fifo() {
        assert_eq!(drain(&mut loaded(DeliveryPolicy::InOrder)), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn reverse_is_lifo() {
        assert_eq!(drain(&mut loaded(DeliveryPolicy::Reverse)), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn shuffled_is_a_permutation_and_deterministic() {
        let first = drain(&mut loaded(DeliveryPolicy::Shuffled(9)));
        let second = drain(&mut loaded(DeliveryPolicy::Shuffled(9)));
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn peek_agrees_with_pop() {
        let mut network = loaded(DeliveryPolicy::Shuffled(3));
        let peeked = network.peek(Role::Bob).map(|e| e.id);
        let popped = network.pop(Role::Bob).map(|e| e.id);
        assert_eq!(peeked, popped);
    }

    #[test]
    fn deferred_holds_until_flush() {
        let mut network = loaded(DeliveryPolicy::Deferred);
        assert!(network.pop(Role::Bob).is_none());
        assert_eq!(network.pending(Role::Bob), 5);

        let flushed: Vec<u8> = network.flush(Role::Bob).into_iter().map(|e| e.ciphertext).collect();
        assert_eq!(flushed, vec![0, 1, 2, 3, 4]);
        assert_eq!(network.in_flight(), 0);
    }
}
