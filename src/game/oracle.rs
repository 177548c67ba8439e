//! Pending Decryption Requests
//!
//! Every reveal leaves an encrypted result behind. Turning it into a winner
//! needs an asynchronous decryption oracle that does not exist yet; until it
//! does, reveals are parked here for whoever drains the queue. The queue is
//! bounded: when full, the oldest request is evicted. Its result handle stays
//! on the match record.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};

use crate::core::address::Address;
use crate::fhe::handle::Euint8;
use super::state::MatchId;

/// A settled match waiting for its result to be decrypted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealRequest {
    /// Settled match.
    pub match_id: MatchId,
    /// Initiator of the match.
    pub initiator: Address,
    /// Opponent of the match.
    pub opponent: Address,
    /// Encrypted outcome (0 draw, 1 initiator wins, 2 opponent wins).
    pub result: Euint8,
}

/// Default number of parked requests.
pub const DEFAULT_REVEAL_CAPACITY: usize = 1024;

/// Bounded FIFO of reveal requests.
#[derive(Clone, Debug)]
pub struct RevealQueue {
    requests: VecDeque<RevealRequest>,
    capacity: usize,
}

impl Default for RevealQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_REVEAL_CAPACITY)
    }
}

impl RevealQueue {
    /// Create an empty queue with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue holding at most `capacity` requests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            requests: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Park a request, returning the evicted oldest one if the queue was full.
    pub fn push(&mut self, request: RevealRequest) -> Option<RevealRequest> {
        let evicted = if self.requests.len() >= self.capacity {
            self.requests.pop_front()
        } else {
            None
        };
        self.requests.push_back(request);
        evicted
    }

    /// Maximum number of parked requests.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove and return all parked requests, oldest first.
    pub fn drain(&mut self) -> Vec<RevealRequest> {
        self.requests.drain(..).collect()
    }

    /// Number of parked requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// No parked requests.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhe::handle::CiphertextHandle;

    fn request(match_id: MatchId) -> RevealRequest {
        RevealRequest {
            match_id,
            initiator: Address::new([1; 20]),
            opponent: Address::new([2; 20]),
            result: Euint8(CiphertextHandle::new([match_id as u8; 32])),
        }
    }

    #[test]
    fn test_drain_is_fifo_and_empties() {
        let mut queue = RevealQueue::new();
        queue.push(request(1));
        queue.push(request(2));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.iter().map(|r| r.match_id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_evicts_oldest() {
        let mut queue = RevealQueue::with_capacity(2);
        assert_eq!(queue.push(request(1)), None);
        assert_eq!(queue.push(request(2)), None);
        assert_eq!(queue.push(request(3)).map(|r| r.match_id), Some(1));

        assert_eq!(queue.len(), 2);
        let ids: Vec<MatchId> = queue.drain().iter().map(|r| r.match_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_zero_capacity_still_holds_one() {
        let mut queue = RevealQueue::with_capacity(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(request(1));
        assert_eq!(queue.push(request(2)).map(|r| r.match_id), Some(1));
    }
}
