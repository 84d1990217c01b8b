//! Commit watermarks
//!
//! Messages of one partition are handled concurrently and may finish in any
//! order, but a committed offset covers everything below it. The tracker
//! only lets a partition's commit move up to the lowest offset still in
//! flight.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::broker::MessagePosition;

#[derive(Debug)]
struct PartitionOffsets {
    /// Dispatched but not finished
    in_flight: BTreeSet<i64>,
    /// Highest finished offset seen so far
    highest_done: Option<i64>,
    /// Last commit issued (next offset to consume)
    committed: i64,
}

impl PartitionOffsets {
    fn starting_at(offset: i64) -> Self {
        Self {
            in_flight: BTreeSet::new(),
            highest_done: None,
            committed: offset,
        }
    }

    fn watermark(&self) -> Option<i64> {
        match self.in_flight.first() {
            Some(&lowest) => Some(lowest),
            None => self.highest_done.map(|done| done + 1),
        }
    }
}

/// Per-partition bookkeeping of dispatched and finished offsets
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: Mutex<HashMap<(String, i32), PartitionOffsets>>,
}

impl OffsetTracker {
    /// Records that the message at `position` has been dispatched
    ///
    /// Must be called in consumption order, before the message can finish.
    pub fn track(&self, position: &MessagePosition) {
        let mut partitions = self.lock();
        let key = (position.topic.clone(), position.partition);

        let state = partitions
            .entry(key)
            .or_insert_with(|| PartitionOffsets::starting_at(position.offset));

        // Rewound after a rebalance or a seek: nothing before it is owed
        if position.offset < state.committed && state.in_flight.is_empty() {
            *state = PartitionOffsets::starting_at(position.offset);
        }

        state.in_flight.insert(position.offset);
    }

    /// Records that the message at `position` is done
    ///
    /// Returns the offset to commit when the partition's watermark moved.
    /// An untracked position commits its own next offset.
    pub fn complete(&self, position: &MessagePosition) -> Option<i64> {
        let mut partitions = self.lock();

        let Some(state) = partitions.get_mut(&(position.topic.clone(), position.partition)) else {
            return Some(position.offset + 1);
        };

        state.in_flight.remove(&position.offset);
        state.highest_done = state.highest_done.max(Some(position.offset));

        let watermark = state.watermark()?;
        if watermark <= state.committed {
            return None;
        }

        state.committed = watermark;
        Some(watermark)
    }

    /// Last commit issued for every partition that moved past its start
    pub fn committed(&self) -> Vec<MessagePosition> {
        self.lock()
            .iter()
            .filter(|(_, state)| state.highest_done.is_some())
            .map(|((topic, partition), state)| MessagePosition {
                topic: topic.clone(),
                partition: *partition,
                offset: state.committed,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, i32), PartitionOffsets>> {
        self.partitions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
