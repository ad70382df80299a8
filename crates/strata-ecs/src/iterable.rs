//! A [`Pool`] that can be walked in slot order.
//!
//! Two ways to traverse:
//!
//! * [`Cursor`]s are detached slot positions. They hold no borrow, so the pool
//!   may be mutated between steps; a cursor never revisits a slot it has
//!   passed and will reach slots allocated ahead of it.
//! * [`Iter`] / [`IterMut`] borrow the pool for their whole lifetime and are
//!   double-ended.
//!
//! Both visit live slots only, in ascending slot order (descending backwards).

use std::any::Any;
use std::iter::FusedIterator;

use crate::pool::{Pool, SlotIndex};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// A position in an [`IterablePool`]. Equal iff both name the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cursor(usize);

impl Cursor {
    /// The slot this cursor points at. For the end cursor this is the pool's
    /// capacity, which is never a valid slot.
    pub fn position(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// IterablePool
// ---------------------------------------------------------------------------

/// Fixed-capacity pool with liveness-aware bidirectional iteration.
#[derive(Debug)]
pub struct IterablePool<T> {
    pool: Pool<T>,
}

impl<T> IterablePool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Pool::new(capacity),
        }
    }

    pub fn allocate(&mut self, value: T) -> Result<SlotIndex, EcsError> {
        self.pool.allocate(value)
    }

    pub fn free(&mut self, slot: SlotIndex) -> Option<T> {
        self.pool.free(slot)
    }

    #[inline]
    pub fn get(&self, slot: SlotIndex) -> Option<&T> {
        self.pool.get(slot)
    }

    #[inline]
    pub fn get_mut(&mut self, slot: SlotIndex) -> Option<&mut T> {
        self.pool.get_mut(slot)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    // -- cursors ------------------------------------------------------------

    /// Cursor at the first live slot, or [`end`](Self::end) if there is none.
    pub fn begin(&self) -> Cursor {
        Cursor(self.next_live_from(0))
    }

    /// The one-past-the-last cursor.
    pub fn end(&self) -> Cursor {
        Cursor(self.pool.capacity())
    }

    /// Move `cursor` to the next live slot, or to the end. Advancing the end
    /// cursor leaves it at the end.
    pub fn advance(&self, cursor: &mut Cursor) {
        if cursor.0 >= self.pool.capacity() {
            return;
        }
        cursor.0 = self.next_live_from(cursor.0 + 1);
    }

    /// Move `cursor` to the previous live slot. Returns `false` and leaves the
    /// cursor untouched if no live slot precedes it.
    pub fn retreat(&self, cursor: &mut Cursor) -> bool {
        let slots = self.pool.slots();
        let upper = cursor.0.min(slots.len());
        match slots[..upper].iter().rposition(Option::is_some) {
            Some(index) => {
                cursor.0 = index;
                true
            }
            None => false,
        }
    }

    /// The value under `cursor`. `None` at the end or if the slot has since
    /// been freed.
    pub fn at(&self, cursor: Cursor) -> Option<&T> {
        self.pool.slots().get(cursor.0)?.as_ref()
    }

    pub fn at_mut(&mut self, cursor: Cursor) -> Option<&mut T> {
        self.pool.slots_mut().get_mut(cursor.0)?.as_mut()
    }

    fn next_live_from(&self, start: usize) -> usize {
        let slots = self.pool.slots();
        slots
            .get(start..)
            .and_then(|rest| rest.iter().position(Option::is_some))
            .map_or(self.pool.capacity(), |offset| start + offset)
    }

    // -- borrowing iterators ------------------------------------------------

    /// Live values in slot order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.pool.slots().iter(),
            remaining: self.pool.len(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        let remaining = self.pool.len();
        IterMut {
            inner: self.pool.slots_mut().iter_mut(),
            remaining,
        }
    }

    /// Raw slot view for callers that need split borrows across pools.
    pub(crate) fn slots(&self) -> &[Option<T>] {
        self.pool.slots()
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Option<T>] {
        self.pool.slots_mut()
    }
}

impl<'a, T> IntoIterator for &'a IterablePool<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut IterablePool<T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

// ---------------------------------------------------------------------------
// Iter / IterMut
// ---------------------------------------------------------------------------

/// Shared iterator over the live values of an [`IterablePool`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    inner: std::slice::Iter<'a, Option<T>>,
    remaining: usize,
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.inner.by_ref().find_map(Option::as_ref)?;
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let value = self.inner.by_ref().rev().find_map(Option::as_ref)?;
        self.remaining -= 1;
        Some(value)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Mutable iterator over the live values of an [`IterablePool`].
#[derive(Debug)]
pub struct IterMut<'a, T> {
    inner: std::slice::IterMut<'a, Option<T>>,
    remaining: usize,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.inner.by_ref().find_map(Option::as_mut)?;
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let value = self.inner.by_ref().rev().find_map(Option::as_mut)?;
        self.remaining -= 1;
        Some(value)
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

// ---------------------------------------------------------------------------
// ErasedPool
// ---------------------------------------------------------------------------

/// Type-erased handle the world keeps per component type.
///
/// Lets the world free a slot without knowing the component type, and
/// downcast back to the typed pool on typed access.
pub(crate) trait ErasedPool: Any + Send {
    /// Free `slot`, dropping its value. Returns `false` if it was not live.
    fn release(&mut self, slot: SlotIndex) -> bool;

    fn live_count(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + 'static> ErasedPool for IterablePool<T> {
    fn release(&mut self, slot: SlotIndex) -> bool {
        self.free(slot).is_some()
    }

    fn live_count(&self) -> usize {
        self.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
