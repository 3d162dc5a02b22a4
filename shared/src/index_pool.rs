//! Allocator for the small integer identities handed to peers

use log::debug;
use std::collections::BTreeSet;

/// Fixed-capacity allocator of small integers in `[0, capacity)`
///
/// `allocate` always hands out the lowest free index so that identities stay
/// small and a freed index is the first one to be reused.
#[derive(Debug, Clone)]
pub struct IndexPool {
    capacity: u32,
    available: BTreeSet<u32>,
}

impl IndexPool {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            available: (0..capacity).collect(),
        }
    }

    /// Returns an unused index, or `None` once every index is held
    pub fn allocate(&mut self) -> Option<u32> {
        self.available.pop_first()
    }

    /// Returns `index` to the pool
    ///
    /// Freeing an index that is out of range or not currently held is a caller
    /// error; it is reported as `false` and otherwise ignored.
    pub fn free(&mut self, index: u32) -> bool {
        if index >= self.capacity {
            debug!("Ignoring free of out-of-range index {}", index);
            return false;
        }
        if !self.available.insert(index) {
            debug!("Ignoring double free of index {}", index);
            return false;
        }
        true
    }

    pub fn is_allocated(&self, index: u32) -> bool {
        index < self.capacity && !self.available.contains(&index)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of indices that can still be allocated
    pub fn available(&self) -> usize {
        self.available.len()
    }

    pub fn allocated(&self) -> usize {
        self.capacity as usize - self.available.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn test_exhaustion_yields_single_failure() {
        let capacity = 8;
        let mut pool = IndexPool::new(capacity);

        let mut ids = HashSet::new();
        let mut failures = 0;
        for _ in 0..=capacity {
            match pool.allocate() {
                Some(id) => {
                    assert!(id < capacity);
                    assert!(ids.insert(id), "index {} handed out twice", id);
                }
                None => failures += 1,
            }
        }

        assert_eq!(ids.len(), capacity as usize);
        assert_eq!(failures, 1);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_lowest_index_first() {
        let mut pool = IndexPool::new(3);
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));

        assert!(pool.free(1));
        assert!(pool.free(0));
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn test_zero_capacity() {
        let mut pool = IndexPool::new(0);
        assert_eq!(pool.allocate(), None);
        assert!(!pool.free(0));
    }

    #[test]
    fn test_invalid_free_is_ignored() {
        let mut pool = IndexPool::new(2);
        assert!(!pool.free(5));
        assert!(!pool.free(0));
        assert_eq!(pool.available(), 2);

        let id = pool.allocate().unwrap();
        assert!(pool.is_allocated(id));
        assert!(pool.free(id));
        assert!(!pool.free(id));
        assert!(!pool.is_allocated(id));
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn test_interleaved_allocations_never_duplicate() {
        let capacity = 16;
        let mut pool = IndexPool::new(capacity);
        let mut live: Vec<u32> = Vec::new();
        let mut rng = StdRng::seed_from_u64(0x6805);

        for _ in 0..10_000 {
            if rng.gen_bool(0.55) {
                match pool.allocate() {
                    Some(id) => {
                        assert!(!live.contains(&id), "index {} is already live", id);
                        live.push(id);
                    }
                    None => assert_eq!(live.len(), capacity as usize),
                }
            } else if !live.is_empty() {
                let victim = live.swap_remove(rng.gen_range(0..live.len()));
                assert!(pool.free(victim));
            }

            assert_eq!(pool.allocated(), live.len());
        }
    }
}
