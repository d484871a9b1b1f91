use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageKind};

/// A message in transit, exposed for visualization. Derived from the
/// delivery heaps and kept consistent on every send and pop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InFlightMessage {
    pub message_id: u64,
    pub sender: u64,
    pub target: u64,
    pub kind: MessageKind,
    pub delivery_time: u64,
    seq: u64,
}

struct QueuedMessage {
    delivery_time: u64,
    seq: u64,
    message: Message,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.delivery_time == other.delivery_time && self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    // reversed so the BinaryHeap pops the earliest (time, seq) first
    fn cmp(&self, other: &Self) -> Ordering {
        (other.delivery_time, other.seq).cmp(&(self.delivery_time, self.seq))
    }
}

/// Simulated network with seeded uniform delivery delays.
///
/// All randomness affecting delivery order comes from the network's own
/// PRNG, seeded once at construction, so equal seeds give equal traces.
/// Blocked replicas (crash faults) drop messages silently on both sides.
pub struct SimulatedNetwork {
    delay_min_ms: u64,
    delay_max_ms: u64,
    rng: ChaCha8Rng,
    registered: BTreeSet<u64>,
    blocked: HashSet<u64>,
    queues: HashMap<u64, BinaryHeap<QueuedMessage>>,
    in_flight: Vec<InFlightMessage>,
    seq: u64,
}

impl SimulatedNetwork {
    pub fn new(delay_min_ms: u64, delay_max_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            delay_min_ms,
            delay_max_ms,
            rng,
            registered: BTreeSet::new(),
            blocked: HashSet::new(),
            queues: HashMap::new(),
            in_flight: Vec::new(),
            seq: 0,
        }
    }

    pub fn register_replica(&mut self, replica_id: u64) {
        self.registered.insert(replica_id);
        self.queues.entry(replica_id).or_default();
    }

    pub fn block_replica(&mut self, replica_id: u64) {
        self.blocked.insert(replica_id);
        debug!("blocked replica {}", replica_id);
    }

    pub fn unblock_replica(&mut self, replica_id: u64) {
        self.blocked.remove(&replica_id);
        debug!("unblocked replica {}", replica_id);
    }

    /// Send a message to one replica; returns the delivery time, or None
    /// when the target is blocked (the drop is silent, not an error).
    pub fn send(&mut self, message: Message, target: u64, now: u64) -> Option<u64> {
        if self.blocked.contains(&target) {
            debug!("message {} to blocked replica {} dropped", message.id, target);
            return None;
        }

        let delay = self.rng.random_range(self.delay_min_ms..=self.delay_max_ms);
        let delivery_time = now + delay;
        self.seq += 1;

        self.in_flight.push(InFlightMessage {
            message_id: message.id,
            sender: message.sender,
            target,
            kind: message.kind(),
            delivery_time,
            seq: self.seq,
        });

        debug!(
            "{} from {} to {} scheduled for delivery at {}",
            message.kind(),
            message.sender,
            target,
            delivery_time
        );

        self.queues.entry(target).or_default().push(QueuedMessage {
            delivery_time,
            seq: self.seq,
            message,
        });

        Some(delivery_time)
    }

    /// Broadcast to all registered replicas in ascending id order. Each
    /// recipient draws its own delay.
    pub fn broadcast(
        &mut self,
        message: Message,
        sender: u64,
        now: u64,
        include_sender: bool,
    ) -> Vec<u64> {
        let targets: Vec<u64> = self
            .registered
            .iter()
            .copied()
            .filter(|&id| include_sender || id != sender)
            .collect();

        let mut delivery_times = Vec::new();
        for target in targets {
            if let Some(time) = self.send(message.clone(), target, now) {
                delivery_times.push(time);
            }
        }
        delivery_times
    }

    /// Pop every message due for `replica_id` at `now`, earliest first.
    pub fn pending(&mut self, replica_id: u64, now: u64) -> Vec<Message> {
        if self.blocked.contains(&replica_id) {
            return Vec::new();
        }

        let mut delivered = Vec::new();
        if let Some(queue) = self.queues.get_mut(&replica_id) {
            while queue
                .peek()
                .is_some_and(|queued| queued.delivery_time <= now)
            {
                let queued = queue.pop().expect("peeked entry");
                self.in_flight.retain(|entry| entry.seq != queued.seq);
                delivered.push(queued.message);
            }
        }
        delivered
    }

    /// Earliest delivery time across non-blocked replicas.
    pub fn next_delivery_time(&self) -> Option<u64> {
        self.registered
            .iter()
            .filter(|id| !self.blocked.contains(id))
            .filter_map(|id| self.queues.get(id))
            .filter_map(|queue| queue.peek())
            .map(|queued| queued.delivery_time)
            .min()
    }

    pub fn in_flight_messages(&self) -> &[InFlightMessage] {
        &self.in_flight
    }

    pub fn total_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn reset(&mut self) {
        self.queues.values_mut().for_each(BinaryHeap::clear);
        self.in_flight.clear();
        self.blocked.clear();
        self.seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;

    fn network(seed: u64) -> SimulatedNetwork {
        let mut net = SimulatedNetwork::new(10, 100, Some(seed));
        for id in 0..4 {
            net.register_replica(id);
        }
        net
    }

    fn new_view(id: u64, sender: u64) -> Message {
        Message {
            id,
            sender,
            view: 1,
            timestamp: 0,
            target: None,
            payload: Payload::NewView { justify_qc: None },
        }
    }

    #[test]
    fn test_delay_within_bounds() {
        let mut net = network(42);
        for i in 0..50 {
            let time = net.send(new_view(i, 0), 1, 1000).unwrap();
            assert!((1010..=1100).contains(&time));
        }
    }

    #[test]
    fn test_same_seed_same_delays() {
        let mut a = network(7);
        let mut b = network(7);
        for i in 0..20 {
            assert_eq!(
                a.send(new_view(i, 0), 1, 0),
                b.send(new_view(i, 0), 1, 0)
            );
        }
    }

    #[test]
    fn test_blocked_target_drops() {
        let mut net = network(42);
        net.block_replica(2);
        assert_eq!(net.send(new_view(1, 0), 2, 0), None);
        assert_eq!(net.total_in_flight(), 0);
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let mut net = network(42);
        let times = net.broadcast(new_view(1, 0), 0, 0, false);
        assert_eq!(times.len(), 3);
        assert_eq!(net.total_in_flight(), 3);
    }

    #[test]
    fn test_pending_in_delivery_order() {
        let mut net = network(42);
        for i in 0..10 {
            net.send(new_view(i, 0), 1, 0);
        }
        let deadline = net.next_delivery_time().unwrap();
        let early = net.pending(1, deadline);
        assert!(!early.is_empty());

        let rest = net.pending(1, 100);
        assert_eq!(early.len() + rest.len(), 10);
        assert_eq!(net.total_in_flight(), 0);
    }

    #[test]
    fn test_no_duplicate_delivery() {
        let mut net = network(42);
        net.send(new_view(1, 0), 1, 0);
        let first = net.pending(1, 100);
        assert_eq!(first.len(), 1);
        assert!(net.pending(1, 100).is_empty());
    }

    #[test]
    fn test_next_delivery_skips_blocked() {
        let mut net = network(42);
        net.send(new_view(1, 0), 1, 0);
        net.send(new_view(2, 0), 2, 0);
        net.block_replica(1);
        let next = net.next_delivery_time().unwrap();
        // only replica 2's queue is considered
        let delivered = net.pending(2, next);
        assert_eq!(delivered.len(), 1);
    }
}
