//! Settled transaction cache
//!
//! Remembers mainnet transaction hashes a task has already settled so a
//! rescan of the same blocks skips them without a gateway round trip.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use transfer_gateway::TxHash;

/// Insertion-ordered set of settled hashes, bounded by size and age.
///
/// Entries leave from the front of `order`: expired ones on every insert,
/// then the oldest while the cache is over capacity. A re-inserted hash
/// leaves a stale queue entry behind, skipped when it reaches the front.
pub struct SettledCache {
    order: VecDeque<(TxHash, u64)>,
    /// hash -> (insert sequence, insert time)
    members: HashMap<TxHash, (u64, Instant)>,
    next_seq: u64,
    max_size: usize,
    ttl: Duration,
}

impl SettledCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashMap::new(),
            next_seq: 0,
            max_size: max_size.max(1),
            ttl,
        }
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.members
            .get(hash)
            .is_some_and(|(_, at)| at.elapsed() < self.ttl)
    }

    pub fn insert(&mut self, hash: TxHash) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.members.insert(hash, (seq, Instant::now()));
        self.order.push_back((hash, seq));
        self.evict();
    }

    fn evict(&mut self) {
        while let Some(&(front, seq)) = self.order.front() {
            let live = match self.members.get(&front) {
                Some((s, at)) if *s == seq => Some(*at),
                _ => None,
            };
            if let Some(at) = live {
                if at.elapsed() < self.ttl && self.members.len() <= self.max_size {
                    break;
                }
            }
            self.order.pop_front();
            if live.is_some() {
                self.members.remove(&front);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for SettledCache {
    /// 10k hashes for a day
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(86_400))
    }
}
