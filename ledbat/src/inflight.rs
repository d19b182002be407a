// Tracks sent-but-unacknowledged segments by sequence number.
//
// Backed by a BTreeMap rather than the paired deque+dict the reference
// implementation uses: the tree's ordering gives earliest-peek and
// resendable-before for free, and keyed removal is O(log n) whether or not
// the ACK arrives in order.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct InflightRecord {
    pub send_time: Instant,
    pub resent: bool,
    pub payload: Bytes,
}

#[derive(Clone, Debug, Default)]
pub struct InflightTracker {
    records: BTreeMap<u32, InflightRecord>,
}

impl InflightTracker {
    pub fn new() -> Self {
        InflightTracker {
            records: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, seq: u32, send_time: Instant, payload: Bytes) {
        debug_assert!(self.records.keys().next_back().map_or(true, |&last| seq > last));
        self.records.insert(
            seq,
            InflightRecord {
                send_time,
                resent: false,
                payload,
            },
        );
    }

    pub fn peek_earliest(&self) -> Option<u32> {
        self.records.keys().next().copied()
    }

    pub fn pop_earliest(&mut self) -> Option<(u32, InflightRecord)> {
        let seq = self.peek_earliest()?;
        self.records.remove(&seq).map(|r| (seq, r))
    }

    pub fn pop(&mut self, seq: u32) -> Option<InflightRecord> {
        self.records.remove(&seq)
    }

    pub fn get(&self, seq: u32) -> Option<&InflightRecord> {
        self.records.get(&seq)
    }

    pub fn mark_resent(&mut self, seq: u32) {
        if let Some(record) = self.records.get_mut(&seq) {
            record.resent = true;
        }
    }

    /// All live sequence numbers strictly less than `n`, ascending.
    pub fn resendable_before(&self, n: u32) -> Vec<u32> {
        self.records.range(..n).map(|(&seq, _)| seq).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
