//! Entity identifiers and the per-entity component record.
//!
//! An [`EntityId`] is an opaque 64-bit handle drawn from a per-world counter.
//! Ids are never reused while the world that issued them is alive, so a
//! destroyed entity's id can never alias a newer one. Ids are *not* unique
//! across worlds.
//!
//! An [`Entity`] holds one optional slot reference per component type plus a
//! possession bitset mirroring which references are present.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::component::{Component, ComponentTypeId, MAX_COMPONENTS_COUNT};
use crate::pool::SlotIndex;
use crate::world::World;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentMask
// ---------------------------------------------------------------------------

/// Possession bitset, one bit per [`ComponentTypeId`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ComponentMask(u64);

const _: () = assert!(MAX_COMPONENTS_COUNT <= u64::BITS as usize);

impl ComponentMask {
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub fn contains(self, id: ComponentTypeId) -> bool {
        self.0 & (1 << id.0) != 0
    }

    #[inline]
    pub(crate) fn insert(&mut self, id: ComponentTypeId) {
        self.0 |= 1 << id.0;
    }

    #[inline]
    pub(crate) fn remove(&mut self, id: ComponentTypeId) {
        self.0 &= !(1 << id.0);
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set ids in ascending order.
    pub fn iter(self) -> impl Iterator<Item = ComponentTypeId> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros();
            bits &= bits - 1;
            Some(ComponentTypeId(index))
        })
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.0)).finish()
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// The world's record for one live entity.
///
/// `mask.contains(id)` holds exactly when `slots[id]` is `Some`. The record is
/// only changed through [`World`]; nothing here allocates or frees.
#[derive(Clone)]
pub struct Entity {
    id: EntityId,
    mask: ComponentMask,
    slots: [Option<SlotIndex>; MAX_COMPONENTS_COUNT],
}

impl Entity {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            mask: ComponentMask::EMPTY,
            slots: [None; MAX_COMPONENTS_COUNT],
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    #[inline]
    pub fn has_component(&self, id: ComponentTypeId) -> bool {
        self.mask.contains(id)
    }

    /// Pool slot of the attached component `id`, if any.
    #[inline]
    pub fn component_slot(&self, id: ComponentTypeId) -> Option<SlotIndex> {
        self.slots[id.index()]
    }

    pub fn component_count(&self) -> usize {
        self.mask.len()
    }

    pub(crate) fn attach(&mut self, id: ComponentTypeId, slot: SlotIndex) {
        debug_assert!(!self.mask.contains(id));
        self.mask.insert(id);
        self.slots[id.index()] = Some(slot);
    }

    /// Clear bit and slot for `id`, returning the slot it referenced.
    pub(crate) fn detach(&mut self, id: ComponentTypeId) -> Option<SlotIndex> {
        self.mask.remove(id);
        self.slots[id.index()].take()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("components", &self.mask)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// Read-only view of a live entity, resolving components through its world.
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w World,
    entity: &'w Entity,
}

impl<'w> EntityRef<'w> {
    pub(crate) fn new(world: &'w World, entity: &'w Entity) -> Self {
        Self { world, entity }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id
    }

    pub fn has_component<T: Component>(&self) -> bool {
        self.world
            .component_id::<T>()
            .is_some_and(|id| self.entity.has_component(id))
    }

    pub fn has_component_id(&self, id: ComponentTypeId) -> bool {
        self.entity.has_component(id)
    }

    /// The attached `T`, or `None` if this entity does not possess one.
    pub fn get<T: Component>(&self) -> Option<&'w T> {
        let slot = self.entity.component_slot(self.world.component_id::<T>()?)?;
        self.world.component_at::<T>(slot)
    }

    /// Same as [`get`](Self::get); reads as "the `T` next to the component I
    /// am looking at" inside multi-type iteration.
    pub fn sibling<T: Component>(&self) -> Option<&'w T> {
        self.get::<T>()
    }

    pub fn component_count(&self) -> usize {
        self.entity.component_count()
    }

    pub fn record(&self) -> &'w Entity {
        self.entity
    }
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_tracks_bits_in_ascending_order() {
        let mut mask = ComponentMask::EMPTY;
        mask.insert(ComponentTypeId(5));
        mask.insert(ComponentTypeId(0));
        mask.insert(ComponentTypeId(63));
        assert_eq!(mask.len(), 3);
        let ids: Vec<u32> = mask.iter().map(|id| id.0).collect();
        assert_eq!(ids, vec![0, 5, 63]);

        mask.remove(ComponentTypeId(5));
        assert!(!mask.contains(ComponentTypeId(5)));
        assert!(mask.contains(ComponentTypeId(63)));
    }

    #[test]
    fn attach_and_detach_keep_bit_and_slot_in_step() {
        let mut entity = Entity::new(EntityId::new(1));
        let id = ComponentTypeId(3);
        assert!(!entity.has_component(id));

        entity.attach(id, SlotIndex(9));
        assert!(entity.has_component(id));
        assert_eq!(entity.component_slot(id), Some(SlotIndex(9)));
        assert_eq!(entity.component_count(), 1);

        assert_eq!(entity.detach(id), Some(SlotIndex(9)));
        assert!(!entity.has_component(id));
        assert_eq!(entity.component_slot(id), None);
        assert!(entity.mask().is_empty());
    }

    #[test]
    fn entity_id_roundtrip() {
        let id = EntityId::new(42);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
        assert_eq!(format!("{id}"), "e42");
        assert_eq!(format!("{id:?}"), "EntityId(42)");
    }

    #[test]
    fn entity_id_serde_is_transparent_number() {
        let id = EntityId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
