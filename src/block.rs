//! In-memory block builder.

use std::cmp::Ordering;

/// Bounded buffer of decoded records, filled from the input stream and sorted in memory
/// before being distributed onto a tape.
pub(crate) struct BlockBuilder<T> {
    capacity: usize,
    records: Vec<T>,
}

impl<T> BlockBuilder<T> {
    /// Creates an empty builder holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        BlockBuilder {
            capacity,
            records: Vec::with_capacity(capacity),
        }
    }

    /// Adds a record to the block.
    pub fn push(&mut self, record: T) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Checks if the block reached its capacity.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Sorts the accumulated records. Records comparing equal keep no particular order.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.records.sort_unstable_by(compare);
    }

    /// Removes and returns all accumulated records, keeping the allocation for the next block.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.records.drain(..)
    }
}

#[cfg(test)]
mod test {
    use super::BlockBuilder;

    #[test]
    fn test_block_builder() {
        let mut block = BlockBuilder::new(3);
        assert!(block.is_empty());

        block.push(5);
        block.push(1);
        assert!(!block.is_full());
        block.push(3);
        assert!(block.is_full());

        block.sort_by(|a, b| a.cmp(b));
        let records = Vec::from_iter(block.drain());
        assert_eq!(records, vec![1, 3, 5]);
        assert!(block.is_empty());
    }
}
