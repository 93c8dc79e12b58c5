//! Functional reference model of the generated queue.
//!
//! [`HffsQueue`] keeps the same state as the hardware (subtree occupancy counters, the bitmap tree, the free list,
//! the heap entries and the doubly linked bucket lists) and updates it the same way, one operation at a time. It has
//! no notion of cycles; its results are what the pipelined design must produce for the same sequence of admitted
//! operations.

mod stoc;

use std::collections::VecDeque;

use thiserror::Error;

pub use stoc::Stoc;

use crate::config::{Config, ConfigError};
use crate::utils::{clog2, is_pow2};

/// Largest number of priority buckets the model allocates state for.
pub const MAX_MODEL_PRIORITIES: usize = 1 << 20;

/// Model error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The entry capacity must be of the form `2^k - 1`, with `k >= 2`.
    #[error("the number of entries must be of the form 2^k - 1 with k >= 2, got {max_entries}")]
    InvalidCapacity {
        /// Requested capacity.
        max_entries: usize,
    },

    /// The configuration has more buckets than the model supports.
    #[error("{num_priorities} priority buckets exceed the model limit")]
    TooManyPriorities {
        /// Number of buckets of the configuration.
        num_priorities: usize,
    },

    /// The priority does not address a bucket.
    #[error("priority {priority} is out of range (0..{num_priorities})")]
    PriorityOutOfRange {
        /// Requested priority.
        priority: usize,
        /// Number of buckets.
        num_priorities: usize,
    },

    /// The logical partition does not exist.
    #[error("logical partition {lp} is out of range (0..{num_lps})")]
    PartitionOutOfRange {
        /// Requested partition.
        lp: usize,
        /// Number of partitions.
        num_lps: usize,
    },
}

/// Entry stored in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Priority (bucket index).
    pub priority: usize,
    /// Payload.
    pub data: u64,
}

/// Which end of the priority range a dequeue takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    /// Lowest non-empty priority (LSB of every bitmap).
    Min,
    /// Highest non-empty priority (MSB of every bitmap).
    Max,
}

/// Doubly linked list of heap entries in one bucket. Enqueues insert at the head, dequeues remove the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct List {
    head: usize,
    tail: usize,
}

/// One bitmap level: `width^(id-1)` bitmaps and `width^id` counters, one per bitmap bit.
#[derive(Debug, Clone)]
struct TreeLevel {
    bits: Vec<bool>,
    counters: Vec<Stoc>,
}

/// Functional model of the queue.
#[derive(Debug, Clone)]
pub struct HffsQueue {
    config: Config,
    max_entries: usize,
    counter_width: usize,
    log_width: usize,

    /// Levels below the steering depth, indexed by `id - steering_depth - 1`.
    levels: Vec<TreeLevel>,
    occupancy: Vec<Stoc>,

    free_list: VecDeque<usize>,
    entries: Vec<u64>,
    next: Vec<usize>,
    prev: Vec<usize>,
    buckets: Vec<Option<List>>,
}

impl HffsQueue {
    /// Creates new, initialized (empty) queue with room for `max_entries` entries.
    pub fn new(config: Config, max_entries: usize) -> Result<Self, ModelError> {
        let config = config.validate()?;
        // A one-entry queue gets a 1-bit counter: the waterlevel alone, with no count bits.
        if max_entries < 3 || !max_entries.checked_add(1).map_or(false, is_pow2) {
            return Err(ModelError::InvalidCapacity { max_entries });
        }
        let num_priorities = config.num_priorities();
        if num_priorities > MAX_MODEL_PRIORITIES {
            return Err(ModelError::TooManyPriorities { num_priorities });
        }

        let width = config.bitmap_width();
        let counter_width = clog2(max_entries) + 1;
        let levels = (config.steering_depth() + 1..=config.num_bitmap_levels())
            .map(|id| {
                let num_bits = width.pow(id as u32);
                TreeLevel { bits: vec![false; num_bits], counters: vec![Stoc::new(counter_width); num_bits] }
            })
            .collect();

        Ok(Self {
            config,
            max_entries,
            counter_width,
            log_width: clog2(width),
            levels,
            occupancy: vec![Stoc::new(counter_width); config.num_lps()],
            free_list: (0..max_entries).collect(),
            entries: vec![0; max_entries],
            next: vec![0; max_entries],
            prev: vec![0; max_entries],
            buckets: vec![None; num_priorities],
        })
    }

    /// The configuration.
    pub fn config(&self) -> &Config { &self.config }

    /// Entry capacity.
    pub fn capacity(&self) -> usize { self.max_entries }

    /// Width of every occupancy counter, `COUNTER_T_WIDTH` of the generated module.
    pub fn counter_width(&self) -> usize { self.counter_width }

    /// Logical partition owning `priority`.
    pub fn partition_of(&self, priority: usize) -> usize { priority / self.config.num_priorities_per_lp() }

    /// Number of entries in partition `lp`.
    pub fn len(&self, lp: usize) -> usize { self.occupancy.get(lp).map_or(0, Stoc::count) }

    /// Number of entries in all partitions.
    pub fn total_len(&self) -> usize { self.occupancy.iter().map(Stoc::count).sum() }

    /// Whether partition `lp` is empty, as the ingress stage decides it.
    pub fn is_empty(&self, lp: usize) -> bool { self.occupancy.get(lp).map_or(true, |stoc| !stoc.is_nonzero()) }

    fn check_priority(&self, priority: usize) -> Result<(), ModelError> {
        let num_priorities = self.config.num_priorities();
        if priority >= num_priorities {
            return Err(ModelError::PriorityOutOfRange { priority, num_priorities });
        }
        Ok(())
    }

    fn check_partition(&self, lp: usize) -> Result<(), ModelError> {
        let num_lps = self.config.num_lps();
        if lp >= num_lps {
            return Err(ModelError::PartitionOutOfRange { lp, num_lps });
        }
        Ok(())
    }

    /// Bitmap index and bit of `priority` at bitmap level `id`.
    fn address(&self, priority: usize, id: usize) -> (usize, usize) {
        let shift = (self.config.num_bitmap_levels() - id) * self.log_width;
        let mask = self.config.bitmap_width() - 1;
        (priority >> (shift + self.log_width), (priority >> shift) & mask)
    }

    fn first_id(&self) -> usize { self.config.steering_depth() + 1 }

    /// Enqueues `data` with `priority`. Returns `false` if the operation is rejected because the free list is empty.
    pub fn enqueue(&mut self, priority: usize, data: u64) -> Result<bool, ModelError> {
        self.check_priority(priority)?;
        let lp = self.partition_of(priority);
        let entry = match self.free_list.pop_front() {
            Some(entry) => entry,
            None => {
                tracing::trace!(priority, "enqueue rejected: free list empty");
                return Ok(false);
            }
        };
        self.occupancy[lp].increment();

        for id in self.first_id()..=self.config.num_bitmap_levels() {
            let (index, bit) = self.address(priority, id);
            let (slot, depth) = (index * self.config.bitmap_width() + bit, id - self.first_id());
            let level = &mut self.levels[depth];
            level.counters[slot].increment();
            level.bits[slot] = true;
        }

        self.entries[entry] = data;
        let bucket = self.buckets[priority];
        self.buckets[priority] = Some(match bucket {
            Some(list) => {
                self.next[entry] = list.head;
                self.prev[list.head] = entry;
                List { head: entry, tail: list.tail }
            }
            None => List { head: entry, tail: entry },
        });
        tracing::trace!(priority, data, entry, "enqueued");
        Ok(true)
    }

    /// Priority a dequeue from partition `lp` would take, found by FFS from the partition's subtree root.
    fn find(&self, lp: usize, extreme: Extreme) -> Option<usize> {
        if self.is_empty(lp) {
            return None;
        }
        let width = self.config.bitmap_width();
        let mut index = lp;
        for level in &self.levels {
            let bitmap = &level.bits[index * width..(index + 1) * width];
            let bit = match extreme {
                Extreme::Min => bitmap.iter().position(|&set| set),
                Extreme::Max => bitmap.iter().rposition(|&set| set),
            }?;
            index = index * width + bit;
        }
        Some(index)
    }

    /// Returns the entry a dequeue of `extreme` from partition `lp` would return, without removing it.
    pub fn peek(&self, lp: usize, extreme: Extreme) -> Result<Option<Entry>, ModelError> {
        self.check_partition(lp)?;
        Ok(self.find(lp, extreme).and_then(|priority| {
            self.buckets[priority].map(|list| Entry { priority, data: self.entries[list.tail] })
        }))
    }

    /// Dequeues the entry with the lowest or highest priority of partition `lp`. Returns `None` if the operation is
    /// rejected because the partition is empty; the state is then unchanged.
    pub fn dequeue(&mut self, lp: usize, extreme: Extreme) -> Result<Option<Entry>, ModelError> {
        self.check_partition(lp)?;
        let priority = match self.find(lp, extreme) {
            Some(priority) => priority,
            None => {
                tracing::trace!(lp, ?extreme, "dequeue rejected: partition empty");
                return Ok(None);
            }
        };
        let list = match self.buckets[priority] {
            Some(list) => list,
            None => return Ok(None),
        };
        self.occupancy[lp].decrement();

        // Bottom-up, so a bit is cleared only once its child counter drops to zero.
        for id in (self.first_id()..=self.config.num_bitmap_levels()).rev() {
            let (index, bit) = self.address(priority, id);
            let (slot, depth) = (index * self.config.bitmap_width() + bit, id - self.first_id());
            let level = &mut self.levels[depth];
            level.counters[slot].decrement();
            if !level.counters[slot].is_nonzero() {
                level.bits[slot] = false;
            }
        }

        let entry = list.tail;
        self.buckets[priority] =
            if list.head == entry { None } else { Some(List { head: list.head, tail: self.prev[entry] }) };
        self.free_list.push_back(entry);

        let data = self.entries[entry];
        tracing::trace!(priority, data, entry, "dequeued");
        Ok(Some(Entry { priority, data }))
    }

    /// Dequeues the lowest-priority entry of partition `lp`.
    pub fn dequeue_min(&mut self, lp: usize) -> Result<Option<Entry>, ModelError> { self.dequeue(lp, Extreme::Min) }

    /// Dequeues the highest-priority entry of partition `lp`.
    pub fn dequeue_max(&mut self, lp: usize) -> Result<Option<Entry>, ModelError> { self.dequeue(lp, Extreme::Max) }

    /// Checks the structural invariants: every bitmap bit mirrors its counter, every counter equals the sum of its
    /// children (or its bucket length at the leaf), partition occupancy matches, and every entry is either free or in
    /// exactly one bucket.
    pub fn is_consistent(&self) -> bool {
        let width = self.config.bitmap_width();
        let lengths = self.buckets.iter().map(|list| list.map_or(0, |list| self.list_len(list))).collect::<Vec<_>>();

        for (depth, level) in self.levels.iter().enumerate() {
            for (slot, counter) in level.counters.iter().enumerate() {
                if level.bits[slot] != counter.is_nonzero() {
                    return false;
                }
                let expected = match self.levels.get(depth + 1) {
                    Some(child) => child.counters[slot * width..(slot + 1) * width].iter().map(Stoc::count).sum(),
                    None => lengths[slot],
                };
                if counter.count() != expected {
                    return false;
                }
            }
        }

        let per_lp = self.config.num_priorities_per_lp();
        for (lp, occupancy) in self.occupancy.iter().enumerate() {
            if occupancy.count() != lengths[lp * per_lp..(lp + 1) * per_lp].iter().sum::<usize>() {
                return false;
            }
        }

        let mut seen = vec![false; self.max_entries];
        let listed = self.buckets.iter().flatten().flat_map(|list| self.list_entries(*list));
        for entry in self.free_list.iter().copied().chain(listed) {
            if std::mem::replace(&mut seen[entry], true) {
                return false;
            }
        }
        seen.into_iter().all(|seen| seen)
    }

    fn list_entries(&self, list: List) -> Vec<usize> {
        let mut entries = vec![list.head];
        let mut entry = list.head;
        while entry != list.tail && entries.len() <= self.max_entries {
            entry = self.next[entry];
            entries.push(entry);
        }
        entries
    }

    fn list_len(&self, list: List) -> usize { self.list_entries(list).len() }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn queue(config: Config) -> HffsQueue { HffsQueue::new(config, 15).unwrap() }

    #[test]
    fn single_level_scenario() {
        let mut q = queue(Config::new(1));
        assert_eq!(q.config().num_priorities(), 4);
        assert!(q.enqueue(2, 0xa).unwrap());
        assert!(q.enqueue(0, 0xb).unwrap());
        assert_eq!(q.dequeue_min(0).unwrap(), Some(Entry { priority: 0, data: 0xb }));
        assert_eq!(q.dequeue_min(0).unwrap(), Some(Entry { priority: 2, data: 0xa }));
        assert_eq!(q.dequeue_min(0).unwrap(), None);
        assert!(q.is_consistent());
    }

    #[test]
    fn bucket_is_fifo() {
        let mut q = queue(Config::new(2));
        for data in 0..3 {
            assert!(q.enqueue(5, data).unwrap());
        }
        let out = (0..3).map(|_| q.dequeue_max(0).unwrap().map(|e| e.data)).collect::<Vec<_>>();
        assert_eq!(out, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn peek_does_not_remove() {
        let mut q = queue(Config::new(2));
        assert!(q.enqueue(9, 1).unwrap());
        assert!(q.enqueue(3, 2).unwrap());
        assert_eq!(q.peek(0, Extreme::Max).unwrap(), Some(Entry { priority: 9, data: 1 }));
        assert_eq!(q.peek(0, Extreme::Min).unwrap(), Some(Entry { priority: 3, data: 2 }));
        assert_eq!(q.total_len(), 2);
    }

    #[test]
    fn full_free_list_rejects() {
        let mut q = HffsQueue::new(Config::new(1), 3).unwrap();
        for data in 0..3 {
            assert!(q.enqueue(1, data).unwrap());
        }
        assert!(!q.enqueue(1, 3).unwrap());
        assert_eq!(q.len(0), q.capacity());
        assert!(q.is_consistent());
    }

    #[test]
    fn partitions_are_independent() {
        let config = Config::new(2).with_bitmap_width(2).with_num_lps(2);
        let mut q = queue(config);
        assert_eq!(q.partition_of(3), 1);
        assert!(q.enqueue(3, 7).unwrap());
        assert_eq!(q.dequeue_min(0).unwrap(), None);
        assert_eq!(q.dequeue_min(1).unwrap(), Some(Entry { priority: 3, data: 7 }));
        assert_eq!(
            q.dequeue_min(2),
            Err(ModelError::PartitionOutOfRange { lp: 2, num_lps: 2 })
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            HffsQueue::new(Config::new(1), 16).unwrap_err(),
            ModelError::InvalidCapacity { max_entries: 16 }
        );
        assert_eq!(HffsQueue::new(Config::new(1), 1).unwrap_err(), ModelError::InvalidCapacity { max_entries: 1 });
        assert!(matches!(HffsQueue::new(Config::new(0), 15), Err(ModelError::Config(_))));
        assert_eq!(
            queue(Config::new(1)).enqueue(4, 0),
            Err(ModelError::PriorityOutOfRange { priority: 4, num_priorities: 4 })
        );
    }

    #[test]
    fn counter_width_follows_capacity() {
        // `$clog2(HEAP_MAX_NUM_ENTRIES) + 1`
        for (max_entries, width) in [(3, 3), (7, 4), (15, 5), ((1 << 17) - 1, 18)] {
            assert_eq!(HffsQueue::new(Config::new(1), max_entries).unwrap().counter_width(), width);
        }
    }
}
