//! Multi-type iteration.
//!
//! A [`ComponentSet`] is a tuple of one to four component types. The first
//! type is the *primary*: iteration walks the primary's pool in slot order and
//! yields one item per live instance. The remaining types are *secondaries*,
//! resolved through the primary's owner and yielded as `Option<&T>` so that
//! entities missing one are still visited.
//!
//! ## Borrowing
//!
//! [`World::iterate`] borrows the world shared and yields `&Primary`.
//! [`World::iterate_mut`] borrows it exclusively and yields `&mut Primary`;
//! the pool table is split around the primary's entry so secondaries stay
//! shared borrows of the other pools. A set that names one type twice would
//! alias that pool, so building an iterator for it panics.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::component::{Component, ComponentTypeId};
use crate::entity::{Entity, EntityId};
use crate::iterable::{ErasedPool, IterablePool};
use crate::pool::Pool;
use crate::world::{Attached, World};

type PoolEntry = Option<Box<dyn ErasedPool>>;

// ---------------------------------------------------------------------------
// SiblingView
// ---------------------------------------------------------------------------

/// Shared access to every component pool except (possibly) the primary's.
#[derive(Clone, Copy)]
pub struct SiblingView<'w> {
    head: &'w [PoolEntry],
    tail: &'w [PoolEntry],
    tail_start: usize,
}

impl<'w> SiblingView<'w> {
    fn all(pools: &'w [PoolEntry]) -> Self {
        Self {
            head: pools,
            tail: &pools[pools.len()..],
            tail_start: pools.len(),
        }
    }

    fn pool(&self, id: ComponentTypeId) -> Option<&'w dyn ErasedPool> {
        let index = id.index();
        let entry = if index < self.head.len() {
            self.head.get(index)
        } else {
            index
                .checked_sub(self.tail_start)
                .and_then(|offset| self.tail.get(offset))
        };
        entry?.as_deref()
    }

    /// The `T` attached to `owner`, if any.
    pub fn get<T: Component>(&self, owner: &Entity, id: ComponentTypeId) -> Option<&'w T> {
        let slot = owner.component_slot(id)?;
        self.pool(id)?
            .as_any()
            .downcast_ref::<IterablePool<Attached<T>>>()?
            .get(slot)
            .map(|attached| &attached.value)
    }
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A tuple of component types usable with [`World::iterate`].
///
/// Implemented for `(A,)`, `(A, B)`, `(A, B, C)` and `(A, B, C, D)`.
pub trait ComponentSet: 'static {
    /// The type whose pool drives iteration.
    type Primary: Component;
    /// Item of [`World::iterate`].
    type Item<'w>;
    /// Item of [`World::iterate_mut`].
    type ItemMut<'w>;

    /// Ids of every type in the set, primary first.
    fn component_ids() -> Vec<ComponentTypeId>;

    fn fetch<'w>(
        primary: &'w Self::Primary,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::Item<'w>;

    fn fetch_mut<'w>(
        primary: &'w mut Self::Primary,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::ItemMut<'w>;
}

/// Component ids of `S`, checked for repeats.
fn validated_ids<S: ComponentSet>() -> Vec<ComponentTypeId> {
    let ids = S::component_ids();
    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            panic!(
                "component set contains duplicate component type {}",
                id.name().unwrap_or("<unknown>")
            );
        }
    }
    ids
}

// -- ComponentSet impls for tuples of 1..4 ----------------------------------

impl<A: Component> ComponentSet for (A,) {
    type Primary = A;
    type Item<'w> = &'w A;
    type ItemMut<'w> = &'w mut A;

    fn component_ids() -> Vec<ComponentTypeId> {
        vec![ComponentTypeId::of::<A>()]
    }

    fn fetch<'w>(
        primary: &'w A,
        _owner: &Entity,
        _siblings: &SiblingView<'w>,
        _ids: &[ComponentTypeId],
    ) -> Self::Item<'w> {
        primary
    }

    fn fetch_mut<'w>(
        primary: &'w mut A,
        _owner: &Entity,
        _siblings: &SiblingView<'w>,
        _ids: &[ComponentTypeId],
    ) -> Self::ItemMut<'w> {
        primary
    }
}

impl<A: Component, B: Component> ComponentSet for (A, B) {
    type Primary = A;
    type Item<'w> = (&'w A, Option<&'w B>);
    type ItemMut<'w> = (&'w mut A, Option<&'w B>);

    fn component_ids() -> Vec<ComponentTypeId> {
        vec![ComponentTypeId::of::<A>(), ComponentTypeId::of::<B>()]
    }

    fn fetch<'w>(
        primary: &'w A,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::Item<'w> {
        (primary, siblings.get::<B>(owner, ids[1]))
    }

    fn fetch_mut<'w>(
        primary: &'w mut A,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::ItemMut<'w> {
        (primary, siblings.get::<B>(owner, ids[1]))
    }
}

impl<A: Component, B: Component, C: Component> ComponentSet for (A, B, C) {
    type Primary = A;
    type Item<'w> = (&'w A, Option<&'w B>, Option<&'w C>);
    type ItemMut<'w> = (&'w mut A, Option<&'w B>, Option<&'w C>);

    fn component_ids() -> Vec<ComponentTypeId> {
        vec![
            ComponentTypeId::of::<A>(),
            ComponentTypeId::of::<B>(),
            ComponentTypeId::of::<C>(),
        ]
    }

    fn fetch<'w>(
        primary: &'w A,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::Item<'w> {
        (
            primary,
            siblings.get::<B>(owner, ids[1]),
            siblings.get::<C>(owner, ids[2]),
        )
    }

    fn fetch_mut<'w>(
        primary: &'w mut A,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::ItemMut<'w> {
        (
            primary,
            siblings.get::<B>(owner, ids[1]),
            siblings.get::<C>(owner, ids[2]),
        )
    }
}

impl<A: Component, B: Component, C: Component, D: Component> ComponentSet for (A, B, C, D) {
    type Primary = A;
    type Item<'w> = (&'w A, Option<&'w B>, Option<&'w C>, Option<&'w D>);
    type ItemMut<'w> = (&'w mut A, Option<&'w B>, Option<&'w C>, Option<&'w D>);

    fn component_ids() -> Vec<ComponentTypeId> {
        vec![
            ComponentTypeId::of::<A>(),
            ComponentTypeId::of::<B>(),
            ComponentTypeId::of::<C>(),
            ComponentTypeId::of::<D>(),
        ]
    }

    fn fetch<'w>(
        primary: &'w A,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::Item<'w> {
        (
            primary,
            siblings.get::<B>(owner, ids[1]),
            siblings.get::<C>(owner, ids[2]),
            siblings.get::<D>(owner, ids[3]),
        )
    }

    fn fetch_mut<'w>(
        primary: &'w mut A,
        owner: &Entity,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
    ) -> Self::ItemMut<'w> {
        (
            primary,
            siblings.get::<B>(owner, ids[1]),
            siblings.get::<C>(owner, ids[2]),
            siblings.get::<D>(owner, ids[3]),
        )
    }
}

// ---------------------------------------------------------------------------
// ComponentIter (shared)
// ---------------------------------------------------------------------------

/// Iterator returned by [`World::iterate`].
pub struct ComponentIter<'w, S: ComponentSet> {
    slots: std::slice::Iter<'w, Option<Attached<S::Primary>>>,
    entities: &'w Pool<Entity>,
    siblings: SiblingView<'w>,
    ids: Vec<ComponentTypeId>,
    _marker: PhantomData<fn() -> S>,
}

impl<'w, S: ComponentSet> ComponentIter<'w, S> {
    pub(crate) fn new(world: &'w World) -> Self {
        let ids = validated_ids::<S>();
        let slots = world.pools[ids[0].index()]
            .as_deref()
            .and_then(|pool| {
                pool.as_any()
                    .downcast_ref::<IterablePool<Attached<S::Primary>>>()
            })
            .map(IterablePool::slots)
            .unwrap_or_default();
        Self {
            slots: slots.iter(),
            entities: &world.entities,
            siblings: SiblingView::all(&world.pools),
            ids,
            _marker: PhantomData,
        }
    }

    /// Next item together with the id of the entity that owns it.
    pub fn next_with_owner(&mut self) -> Option<(EntityId, S::Item<'w>)> {
        loop {
            let attached = self.slots.by_ref().find_map(Option::as_ref)?;
            if let Some(item) = self.fetch(attached) {
                return Some(item);
            }
        }
    }

    fn next_back_with_owner(&mut self) -> Option<(EntityId, S::Item<'w>)> {
        loop {
            let attached = self.slots.by_ref().rev().find_map(Option::as_ref)?;
            if let Some(item) = self.fetch(attached) {
                return Some(item);
            }
        }
    }

    fn fetch(&self, attached: &'w Attached<S::Primary>) -> Option<(EntityId, S::Item<'w>)> {
        let owner = self.entities.get(attached.owner_slot)?;
        Some((
            attached.owner,
            S::fetch(&attached.value, owner, &self.siblings, &self.ids),
        ))
    }

    /// Yield `(EntityId, item)` pairs instead of bare items.
    pub fn with_owner(self) -> WithOwner<'w, S> {
        WithOwner { inner: self }
    }
}

impl<S: ComponentSet> Clone for ComponentIter<'_, S> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            entities: self.entities,
            siblings: self.siblings,
            ids: self.ids.clone(),
            _marker: PhantomData,
        }
    }
}

impl<'w, S: ComponentSet> Iterator for ComponentIter<'w, S> {
    type Item = S::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_owner().map(|(_, item)| item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.slots.len()))
    }
}

impl<S: ComponentSet> DoubleEndedIterator for ComponentIter<'_, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.next_back_with_owner().map(|(_, item)| item)
    }
}

impl<S: ComponentSet> FusedIterator for ComponentIter<'_, S> {}

/// Adapter from [`ComponentIter::with_owner`].
pub struct WithOwner<'w, S: ComponentSet> {
    inner: ComponentIter<'w, S>,
}

impl<'w, S: ComponentSet> Iterator for WithOwner<'w, S> {
    type Item = (EntityId, S::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next_with_owner()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S: ComponentSet> DoubleEndedIterator for WithOwner<'_, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back_with_owner()
    }
}

// ---------------------------------------------------------------------------
// ComponentIterMut (exclusive)
// ---------------------------------------------------------------------------

/// Iterator returned by [`World::iterate_mut`].
pub struct ComponentIterMut<'w, S: ComponentSet> {
    slots: std::slice::IterMut<'w, Option<Attached<S::Primary>>>,
    entities: &'w Pool<Entity>,
    siblings: SiblingView<'w>,
    ids: Vec<ComponentTypeId>,
    _marker: PhantomData<fn() -> S>,
}

impl<'w, S: ComponentSet> ComponentIterMut<'w, S> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        let ids = validated_ids::<S>();
        let primary = ids[0].index();

        let World { entities, pools, .. } = world;
        let (head, rest) = pools.split_at_mut(primary);
        let (primary_entry, tail) = match rest.split_first_mut() {
            Some((first, tail)) => (first.as_deref_mut(), &*tail),
            None => (None, Default::default()),
        };

        let slots = primary_entry
            .and_then(|pool| {
                pool.as_any_mut()
                    .downcast_mut::<IterablePool<Attached<S::Primary>>>()
            })
            .map(IterablePool::slots_mut)
            .unwrap_or_default();

        Self {
            slots: slots.iter_mut(),
            entities,
            siblings: SiblingView {
                head,
                tail,
                tail_start: primary + 1,
            },
            ids,
            _marker: PhantomData,
        }
    }

    /// Next item together with the id of the entity that owns it.
    pub fn next_with_owner(&mut self) -> Option<(EntityId, S::ItemMut<'w>)> {
        loop {
            let attached = self.slots.by_ref().find_map(Option::as_mut)?;
            if let Some(item) = Self::fetch(self.entities, &self.siblings, &self.ids, attached) {
                return Some(item);
            }
        }
    }

    fn next_back_with_owner(&mut self) -> Option<(EntityId, S::ItemMut<'w>)> {
        loop {
            let attached = self.slots.by_ref().rev().find_map(Option::as_mut)?;
            if let Some(item) = Self::fetch(self.entities, &self.siblings, &self.ids, attached) {
                return Some(item);
            }
        }
    }

    fn fetch(
        entities: &'w Pool<Entity>,
        siblings: &SiblingView<'w>,
        ids: &[ComponentTypeId],
        attached: &'w mut Attached<S::Primary>,
    ) -> Option<(EntityId, S::ItemMut<'w>)> {
        let owner = entities.get(attached.owner_slot)?;
        Some((
            attached.owner,
            S::fetch_mut(&mut attached.value, owner, siblings, ids),
        ))
    }

    /// Yield `(EntityId, item)` pairs instead of bare items.
    pub fn with_owner(self) -> WithOwnerMut<'w, S> {
        WithOwnerMut { inner: self }
    }
}

impl<'w, S: ComponentSet> Iterator for ComponentIterMut<'w, S> {
    type Item = S::ItemMut<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_owner().map(|(_, item)| item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.slots.len()))
    }
}

impl<S: ComponentSet> DoubleEndedIterator for ComponentIterMut<'_, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.next_back_with_owner().map(|(_, item)| item)
    }
}

impl<S: ComponentSet> FusedIterator for ComponentIterMut<'_, S> {}

/// Adapter from [`ComponentIterMut::with_owner`].
pub struct WithOwnerMut<'w, S: ComponentSet> {
    inner: ComponentIterMut<'w, S>,
}

impl<'w, S: ComponentSet> Iterator for WithOwnerMut<'w, S> {
    type Item = (EntityId, S::ItemMut<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next_with_owner()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S: ComponentSet> DoubleEndedIterator for WithOwnerMut<'_, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back_with_owner()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Transform {
        x: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Speed(f32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Layer(u8);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tint(u32);

    fn world() -> World {
        World::with_config(WorldConfig::with_max_entities(32))
    }

    #[test]
    fn empty_world_yields_nothing() {
        let world = world();
        assert_eq!(world.iterate::<(Transform,)>().count(), 0);
        assert_eq!(world.iterate::<(Transform, Speed)>().count(), 0);
    }

    #[test]
    fn visits_primary_in_slot_order_with_optional_secondaries() {
        let mut world = world();
        let mut ids = Vec::new();
        for i in 0..4 {
            let e = world.spawn_entity().unwrap();
            world.add_component(e, Transform { x: i as f32 }).unwrap();
            if i % 2 == 1 {
                world.add_component(e, Speed(i as f32 * 10.0)).unwrap();
            }
            ids.push(e);
        }

        let seen: Vec<_> = world
            .iterate::<(Transform, Speed)>()
            .with_owner()
            .map(|(e, (t, s))| (e, t.x, s.copied()))
            .collect();
        assert_eq!(
            seen,
            vec![
                (ids[0], 0.0, None),
                (ids[1], 1.0, Some(Speed(10.0))),
                (ids[2], 2.0, None),
                (ids[3], 3.0, Some(Speed(30.0))),
            ]
        );
    }

    #[test]
    fn entities_without_the_primary_are_skipped() {
        let mut world = world();
        let a = world.spawn_entity().unwrap();
        let b = world.spawn_entity().unwrap();
        world.add_component(a, Speed(1.0)).unwrap();
        world.add_component(b, Speed(2.0)).unwrap();
        world.add_component(b, Transform { x: 5.0 }).unwrap();

        let owners: Vec<_> = world
            .iterate::<(Transform, Speed)>()
            .with_owner()
            .map(|(e, _)| e)
            .collect();
        assert_eq!(owners, vec![b]);
    }

    #[test]
    fn iteration_is_restartable_and_reversible() {
        let mut world = world();
        for i in 0..3 {
            let e = world.spawn_entity().unwrap();
            world.add_component(e, Layer(i)).unwrap();
        }
        let iter = world.iterate::<(Layer,)>();
        let forward: Vec<_> = iter.clone().map(|l| l.0).collect();
        let backward: Vec<_> = iter.rev().map(|l| l.0).collect();
        assert_eq!(forward, vec![0, 1, 2]);
        assert_eq!(backward, vec![2, 1, 0]);
        assert_eq!(world.iterate::<(Layer,)>().count(), 3);
    }

    #[test]
    fn iterate_mut_writes_primary_and_reads_secondaries() {
        let mut world = world();
        let moving = world.spawn_entity().unwrap();
        let still = world.spawn_entity().unwrap();
        world.add_component(moving, Transform { x: 0.0 }).unwrap();
        world.add_component(moving, Speed(2.5)).unwrap();
        world.add_component(still, Transform { x: 7.0 }).unwrap();

        for (transform, speed) in world.iterate_mut::<(Transform, Speed)>() {
            if let Some(speed) = speed {
                transform.x += speed.0;
            }
        }

        assert_eq!(world.get_component::<Transform>(moving), Some(&Transform { x: 2.5 }));
        assert_eq!(world.get_component::<Transform>(still), Some(&Transform { x: 7.0 }));
    }

    #[test]
    fn iterate_mut_secondary_below_primary_id() {
        // Both orders, so one run has the secondary below the primary's id and
        // the other above it.
        let mut world = world();
        let e = world.spawn_entity().unwrap();
        world.add_component(e, Tint(0xff)).unwrap();
        world.add_component(e, Layer(1)).unwrap();

        for (_, (tint, layer)) in world.iterate_mut::<(Tint, Layer)>().with_owner() {
            tint.0 += u32::from(layer.map_or(0, |l| l.0));
        }
        for (_, (layer, tint)) in world.iterate_mut::<(Layer, Tint)>().with_owner() {
            layer.0 += u8::from(tint.is_some());
        }

        assert_eq!(world.get_component::<Tint>(e), Some(&Tint(0x100)));
        assert_eq!(world.get_component::<Layer>(e), Some(&Layer(2)));
    }

    #[test]
    fn four_type_sets_resolve_each_secondary() {
        let mut world = world();
        let e = world.spawn_entity().unwrap();
        world.add_component(e, Transform { x: 1.0 }).unwrap();
        world.add_component(e, Layer(3)).unwrap();
        world.add_component(e, Tint(9)).unwrap();

        let items: Vec<_> = world
            .iterate::<(Transform, Speed, Layer, Tint)>()
            .map(|(t, s, l, c)| (t.x, s.is_some(), l.copied(), c.copied()))
            .collect();
        assert_eq!(items, vec![(1.0, false, Some(Layer(3)), Some(Tint(9)))]);
    }

    #[test]
    #[should_panic(expected = "duplicate component type")]
    fn repeated_type_in_set_panics() {
        let world = world();
        let _ = world.iterate::<(Speed, Speed)>();
    }

    #[test]
    #[should_panic(expected = "duplicate component type")]
    fn repeated_type_in_mutable_set_panics() {
        let mut world = world();
        let _ = world.iterate_mut::<(Speed, Layer, Speed)>();
    }
}
