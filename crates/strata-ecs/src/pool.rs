//! Fixed-capacity, pointer-stable slot pool.
//!
//! A [`Pool`] reserves storage for its full capacity up front and never grows
//! past it, so a value stays at the same address from the moment it is
//! allocated until its slot is freed. Slots are addressed by [`SlotIndex`].

use crate::EcsError;

// ---------------------------------------------------------------------------
// SlotIndex
// ---------------------------------------------------------------------------

/// Index of a slot inside a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub(crate) u32);

impl SlotIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// A bounded pool of `T` with stable slot addresses.
///
/// Freed slots are reused last-in-first-out; untouched slots are handed out in
/// ascending order once the free list is empty.
#[derive(Debug)]
pub struct Pool<T> {
    /// Touched slots. `len()` is the high-water mark; the capacity is reserved
    /// at construction so pushing never reallocates.
    slots: Vec<Option<T>>,
    /// Free-list of reusable slot indices (LIFO).
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl<T> Pool<T> {
    /// Create a pool holding at most `capacity` live values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit in a `u32`.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity <= u32::MAX as usize,
            "pool capacity must be in 1..=u32::MAX, got {capacity}"
        );
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    /// Place `value` in a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExhausted`] if every slot is live. The pool
    /// is left unchanged and `value` is dropped.
    pub fn allocate(&mut self, value: T) -> Result<SlotIndex, EcsError> {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(value);
            self.live += 1;
            return Ok(SlotIndex(index));
        }

        if self.slots.len() >= self.capacity {
            return Err(EcsError::CapacityExhausted {
                pool: std::any::type_name::<T>(),
                capacity: self.capacity,
            });
        }

        // Within the reserved capacity: no reallocation, existing slots stay put.
        let index = self.slots.len() as u32;
        self.slots.push(Some(value));
        self.live += 1;
        Ok(SlotIndex(index))
    }

    /// Free a slot, returning its value. Returns `None` if the slot was not
    /// live.
    pub fn free(&mut self, slot: SlotIndex) -> Option<T> {
        let value = self.slots.get_mut(slot.index())?.take()?;
        self.free.push(slot.0);
        self.live -= 1;
        Some(value)
    }

    #[inline]
    pub fn get(&self, slot: SlotIndex) -> Option<&T> {
        self.slots.get(slot.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, slot: SlotIndex) -> Option<&mut T> {
        self.slots.get_mut(slot.index())?.as_mut()
    }

    /// Whether `slot` currently holds a value.
    pub fn is_live(&self, slot: SlotIndex) -> bool {
        self.get(slot).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Maximum number of live values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the next [`allocate`](Self::allocate) would fail.
    pub fn is_full(&self) -> bool {
        self.live == self.capacity
    }

    /// Slots touched so far, live or not, in slot order.
    pub(crate) fn slots(&self) -> &[Option<T>] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Option<T>] {
        &mut self.slots
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Particle {
        x: f32,
        life: u32,
    }

    #[test]
    fn allocate_and_get() {
        let mut pool = Pool::new(4);
        let a = pool.allocate(Particle { x: 1.0, life: 3 }).unwrap();
        assert_eq!(pool.get(a), Some(&Particle { x: 1.0, life: 3 }));
        assert_eq!(pool.len(), 1);
        assert!(pool.is_live(a));
    }

    #[test]
    fn fresh_slots_are_ascending() {
        let mut pool = Pool::new(4);
        let ids: Vec<_> = (0..4).map(|i| pool.allocate(i).unwrap().index()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(pool.is_full());
    }

    #[test]
    fn exhaustion_is_an_error_and_leaves_pool_unchanged() {
        let mut pool = Pool::new(2);
        pool.allocate(1u32).unwrap();
        pool.allocate(2u32).unwrap();
        let err = pool.allocate(3u32).unwrap_err();
        assert!(matches!(err, EcsError::CapacityExhausted { capacity: 2, .. }));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn freed_slot_is_reused_lifo() {
        let mut pool = Pool::new(8);
        let a = pool.allocate('a').unwrap();
        let b = pool.allocate('b').unwrap();
        let _c = pool.allocate('c').unwrap();
        assert_eq!(pool.free(a), Some('a'));
        assert_eq!(pool.free(b), Some('b'));
        assert_eq!(pool.allocate('d').unwrap(), b);
        assert_eq!(pool.allocate('e').unwrap(), a);
        assert_eq!(pool.get(a), Some(&'e'));
    }

    #[test]
    fn double_free_returns_none() {
        let mut pool = Pool::new(2);
        let a = pool.allocate(5u8).unwrap();
        assert_eq!(pool.free(a), Some(5));
        assert_eq!(pool.free(a), None);
        assert_eq!(pool.len(), 0);
        assert!(pool.get(a).is_none());
    }

    #[test]
    fn addresses_survive_sibling_churn() {
        let mut pool = Pool::new(1024);
        let keep = pool.allocate(Particle { x: 7.0, life: 1 }).unwrap();
        let before = pool.get(keep).unwrap() as *const Particle;

        let mut others = Vec::new();
        for i in 0..1000 {
            others.push(pool.allocate(Particle { x: i as f32, life: i }).unwrap());
        }
        for slot in others.drain(..500) {
            pool.free(slot);
        }
        for i in 0..400 {
            pool.allocate(Particle { x: 0.0, life: i }).unwrap();
        }

        let after = pool.get(keep).unwrap() as *const Particle;
        assert_eq!(before, after);
        assert_eq!(pool.get(keep), Some(&Particle { x: 7.0, life: 1 }));
    }

    #[test]
    #[should_panic(expected = "pool capacity must be")]
    fn zero_capacity_panics() {
        let _pool: Pool<u8> = Pool::new(0);
    }
}
