//! The [`World`]: entity pool, per-type component pools, and world components.
//!
//! Each component type gets one [`IterablePool`] the first time an instance is
//! attached, sized to the world's entity capacity. Pools are kept for the
//! lifetime of the world. Entities reference their components by slot index,
//! so a component never moves while it stays attached.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::component::{
    Component, ComponentTypeId, WorldComponentTypeId, MAX_COMPONENTS_COUNT,
    MAX_WORLD_COMPONENTS_COUNT,
};
use crate::entity::{Entity, EntityId, EntityRef};
use crate::iterable::{ErasedPool, IterablePool};
use crate::pool::{Pool, SlotIndex};
use crate::query::{ComponentIter, ComponentIterMut, ComponentSet};
use crate::EcsError;

/// Upper bound on live entities in one world.
pub const MAX_ENTITY_COUNT: usize = 65_536;

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Construction-time settings for a [`World`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Capacity of the entity pool and of every component pool.
    pub max_entities: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_entities: MAX_ENTITY_COUNT,
        }
    }
}

impl WorldConfig {
    pub fn with_max_entities(max_entities: usize) -> Self {
        Self { max_entities }
    }

    /// Whether `max_entities` is in `1..=MAX_ENTITY_COUNT`.
    pub fn is_valid(&self) -> bool {
        (1..=MAX_ENTITY_COUNT).contains(&self.max_entities)
    }
}

// ---------------------------------------------------------------------------
// Attached
// ---------------------------------------------------------------------------

/// A component value as stored in its pool, tagged with its owner.
#[derive(Debug)]
pub(crate) struct Attached<T> {
    pub(crate) owner: EntityId,
    /// Slot of the owner in the world's entity pool.
    pub(crate) owner_slot: SlotIndex,
    pub(crate) value: T,
}

pub(crate) type PoolTable = Vec<Option<Box<dyn ErasedPool>>>;

/// Type-erased add/remove entry points for a component bound to a name.
#[derive(Clone, Copy)]
struct ComponentBinding {
    id: ComponentTypeId,
    add: fn(&mut World, EntityId, &str, &serde_json::Value) -> Result<(), EcsError>,
    remove: fn(&mut World, EntityId) -> Result<(), EcsError>,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level container: entities, their components, and world-level
/// singletons.
///
/// Structural calls ([`spawn_entity`](Self::spawn_entity),
/// [`destroy_entity`](Self::destroy_entity), component and world-component
/// add/remove) take `&mut self`, so they cannot run while an iterator or a
/// component reference borrowed from the world is alive. Every failing call
/// returns an [`EcsError`] before touching any state.
pub struct World {
    config: WorldConfig,
    /// Next id to hand out. Starts at 1 and only grows.
    next_entity: u64,
    pub(crate) entities: Pool<Entity>,
    lookup: HashMap<EntityId, SlotIndex>,
    /// Indexed by [`ComponentTypeId`]. Each present entry is an
    /// `IterablePool<Attached<T>>` for the type with that id.
    pub(crate) pools: PoolTable,
    /// Indexed by [`WorldComponentTypeId`].
    world_components: Vec<Option<Box<dyn Any + Send>>>,
    bindings: HashMap<String, ComponentBinding>,
    /// Ids of the component types this world has attached or bound. Typed
    /// reads consult this instead of the process-wide registry; a type missing
    /// here has never been stored in this world.
    type_ids: HashMap<TypeId, ComponentTypeId>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.lookup.len())
            .field("max_entities", &self.config.max_entities)
            .field(
                "component_pools",
                &self.pools.iter().filter(|p| p.is_some()).count(),
            )
            .field(
                "attached_components",
                &self.pools.iter().flatten().map(|p| p.live_count()).sum::<usize>(),
            )
            .field(
                "world_components",
                &self.world_components.iter().filter(|c| c.is_some()).count(),
            )
            .finish()
    }
}

impl World {
    /// Create an empty world with room for [`MAX_ENTITY_COUNT`] entities.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_entities` is outside `1..=MAX_ENTITY_COUNT`.
    pub fn with_config(config: WorldConfig) -> Self {
        assert!(
            config.is_valid(),
            "max_entities must be in 1..={MAX_ENTITY_COUNT}, got {}",
            config.max_entities
        );
        let entities = Pool::new(config.max_entities);
        Self {
            config,
            next_entity: 1,
            entities,
            lookup: HashMap::new(),
            pools: std::iter::repeat_with(|| None)
                .take(MAX_COMPONENTS_COUNT)
                .collect(),
            world_components: std::iter::repeat_with(|| None)
                .take(MAX_WORLD_COMPONENTS_COUNT)
                .collect(),
            bindings: HashMap::new(),
            type_ids: HashMap::new(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Allocate a new entity with no components.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExhausted`] if the world already holds
    /// `max_entities` live entities.
    pub fn spawn_entity(&mut self) -> Result<EntityId, EcsError> {
        let id = EntityId::new(self.next_entity);
        let slot = self.entities.allocate(Entity::new(id))?;
        self.next_entity += 1;
        self.lookup.insert(id, slot);
        trace!(entity = %id, slot = slot.index(), "spawned entity");
        Ok(id)
    }

    /// Detach every component of `id` in ascending type-id order, then free
    /// the entity.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<(), EcsError> {
        let slot = self.entity_slot(id)?;
        let entity = self
            .entities
            .get_mut(slot)
            .ok_or(EcsError::UnknownEntity { entity: id })?;

        for component in entity.mask().iter() {
            let Some(component_slot) = entity.detach(component) else {
                continue;
            };
            if let Some(pool) = self.pools[component.index()].as_mut() {
                pool.release(component_slot);
            }
        }

        self.lookup.remove(&id);
        self.entities.free(slot);
        trace!(entity = %id, "destroyed entity");
        Ok(())
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.lookup.contains_key(&id)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.lookup.len()
    }

    /// Read-only view of a live entity.
    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'_>> {
        let entity = self.entity_record(id)?;
        Some(EntityRef::new(self, entity))
    }

    /// Live entities in entity-pool slot order.
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> + '_ {
        self.entities
            .slots()
            .iter()
            .filter_map(Option::as_ref)
            .map(move |entity| EntityRef::new(self, entity))
    }

    // -- components ---------------------------------------------------------

    /// Attach `value` to `id`.
    ///
    /// # Errors
    ///
    /// * [`EcsError::UnknownEntity`] if `id` is not alive.
    /// * [`EcsError::DuplicateComponent`] if `id` already has a `T`.
    pub fn add_component<T: Component>(&mut self, id: EntityId, value: T) -> Result<(), EcsError> {
        let component = self.component_id_or_assign::<T>();
        let owner_slot = self.entity_slot(id)?;
        if self
            .entities
            .get(owner_slot)
            .is_some_and(|entity| entity.has_component(component))
        {
            return Err(EcsError::DuplicateComponent {
                entity: id,
                component: std::any::type_name::<T>(),
            });
        }

        let slot = self.pool_or_create::<T>(component).allocate(Attached {
            owner: id,
            owner_slot,
            value,
        })?;
        if let Some(entity) = self.entities.get_mut(owner_slot) {
            entity.attach(component, slot);
        }
        Ok(())
    }

    /// Detach and return the `T` attached to `id`.
    ///
    /// # Errors
    ///
    /// * [`EcsError::UnknownEntity`] if `id` is not alive.
    /// * [`EcsError::MissingComponent`] if `id` has no `T`.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Result<T, EcsError> {
        let missing = || EcsError::MissingComponent {
            entity: id,
            component: std::any::type_name::<T>(),
        };
        let owner_slot = self.entity_slot(id)?;
        let component = self.component_id::<T>().ok_or_else(missing)?;
        let entity = self
            .entities
            .get_mut(owner_slot)
            .ok_or(EcsError::UnknownEntity { entity: id })?;
        let slot = entity.component_slot(component).ok_or_else(missing)?;
        entity.detach(component);

        let attached = self
            .typed_pool_mut::<T>(component)
            .and_then(|pool| pool.free(slot))
            .ok_or_else(missing)?;
        Ok(attached.value)
    }

    pub fn get_component<T: Component>(&self, id: EntityId) -> Option<&T> {
        let component = self.component_id::<T>()?;
        let slot = self.entity_record(id)?.component_slot(component)?;
        self.component_at::<T>(slot)
    }

    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        let component = self.component_id::<T>()?;
        let slot = self.entity_record(id)?.component_slot(component)?;
        self.typed_pool_mut::<T>(component)?
            .get_mut(slot)
            .map(|attached| &mut attached.value)
    }

    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        let Some(component) = self.component_id::<T>() else {
            return false;
        };
        self.entity_record(id)
            .is_some_and(|entity| entity.has_component(component))
    }

    /// Number of live `T` instances across all entities.
    pub fn component_count<T: Component>(&self) -> usize {
        self.component_id::<T>()
            .and_then(|component| self.typed_pool::<T>(component))
            .map_or(0, IterablePool::len)
    }

    // -- iteration ----------------------------------------------------------

    /// Iterate every live instance of the set's first type, in pool slot
    /// order, with the owner's other listed components resolved alongside
    /// (`None` where the owner lacks one).
    ///
    /// ```
    /// use strata_ecs::prelude::*;
    ///
    /// struct Position(f32);
    /// struct Velocity(f32);
    ///
    /// let mut world = World::with_config(WorldConfig::with_max_entities(16));
    /// let a = world.spawn_entity().unwrap();
    /// let b = world.spawn_entity().unwrap();
    /// world.add_component(a, Position(0.0)).unwrap();
    /// world.add_component(b, Position(1.0)).unwrap();
    /// world.add_component(b, Velocity(2.0)).unwrap();
    ///
    /// let with_velocity = world
    ///     .iterate::<(Position, Velocity)>()
    ///     .filter(|(_, vel)| vel.is_some())
    ///     .count();
    /// assert_eq!(with_velocity, 1);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the set names the same type twice.
    pub fn iterate<S: ComponentSet>(&self) -> ComponentIter<'_, S> {
        ComponentIter::new(self)
    }

    /// Like [`iterate`](Self::iterate), but the first type is yielded mutably.
    pub fn iterate_mut<S: ComponentSet>(&mut self) -> ComponentIterMut<'_, S> {
        ComponentIterMut::new(self)
    }

    // -- world components ---------------------------------------------------

    /// Install the world's single `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateWorldComponent`] if a `T` is already
    /// installed.
    pub fn add_world_component<T: Component>(&mut self, value: T) -> Result<(), EcsError> {
        let id = WorldComponentTypeId::of::<T>();
        let entry = &mut self.world_components[id.index()];
        if entry.is_some() {
            return Err(EcsError::DuplicateWorldComponent {
                component: std::any::type_name::<T>(),
            });
        }
        *entry = Some(Box::new(value));
        debug!(component = std::any::type_name::<T>(), "added world component");
        Ok(())
    }

    /// Take the world's `T` out.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingWorldComponent`] if no `T` is installed.
    pub fn remove_world_component<T: Component>(&mut self) -> Result<T, EcsError> {
        let id = WorldComponentTypeId::of::<T>();
        let missing = || EcsError::MissingWorldComponent {
            component: std::any::type_name::<T>(),
        };
        let entry = &mut self.world_components[id.index()];
        let boxed = entry.take().ok_or_else(missing)?;
        match boxed.downcast::<T>() {
            Ok(value) => {
                debug!(
                    component = std::any::type_name::<T>(),
                    "removed world component"
                );
                Ok(*value)
            }
            Err(other) => {
                *entry = Some(other);
                Err(missing())
            }
        }
    }

    pub fn get_world_component<T: Component>(&self) -> Option<&T> {
        self.world_components[WorldComponentTypeId::of::<T>().index()]
            .as_deref()?
            .downcast_ref()
    }

    pub fn get_world_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.world_components[WorldComponentTypeId::of::<T>().index()]
            .as_deref_mut()?
            .downcast_mut()
    }

    pub fn has_world_component<T: Component>(&self) -> bool {
        self.has_world_component_id(WorldComponentTypeId::of::<T>())
    }

    pub fn has_world_component_id(&self, id: WorldComponentTypeId) -> bool {
        self.world_components
            .get(id.index())
            .is_some_and(Option::is_some)
    }

    // -- name-bound components ----------------------------------------------

    /// Bind `name` to component type `T` so it can be attached from JSON.
    ///
    /// Re-binding a name to the type it already names is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already bound to a different type.
    pub fn register_component<T>(&mut self, name: &str) -> ComponentTypeId
    where
        T: Component + DeserializeOwned,
    {
        let id = self.component_id_or_assign::<T>();
        if let Some(existing) = self.bindings.get(name) {
            assert!(
                existing.id == id,
                "component name '{name}' is already bound to {}",
                existing.id.name().unwrap_or("another type")
            );
            return id;
        }

        self.bindings.insert(
            name.to_owned(),
            ComponentBinding {
                id,
                add: |world, entity, name, value| {
                    let component = T::deserialize(value).map_err(|e| {
                        EcsError::ComponentDeserialization {
                            component: name.to_owned(),
                            details: e.to_string(),
                        }
                    })?;
                    world.add_component(entity, component)
                },
                remove: |world, entity| world.remove_component::<T>(entity).map(drop),
            },
        );
        debug!(component = name, type_name = std::any::type_name::<T>(), "registered component name");
        id
    }

    /// Deserialize `value` as the component bound to `name` and attach it.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponentName`] and
    /// [`EcsError::ComponentDeserialization`] in addition to the errors of
    /// [`add_component`](Self::add_component).
    pub fn add_component_by_name(
        &mut self,
        id: EntityId,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<(), EcsError> {
        let binding = self.binding(name)?;
        (binding.add)(self, id, name, value)
    }

    /// Detach and drop the component bound to `name`.
    pub fn remove_component_by_name(&mut self, id: EntityId, name: &str) -> Result<(), EcsError> {
        let binding = self.binding(name)?;
        (binding.remove)(self, id)
    }

    /// The type id bound to `name`.
    pub fn component_id_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.bindings.get(name).map(|binding| binding.id)
    }

    /// Bound component names, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn binding(&self, name: &str) -> Result<ComponentBinding, EcsError> {
        self.bindings
            .get(name)
            .copied()
            .ok_or_else(|| EcsError::UnknownComponentName {
                name: name.to_owned(),
                registered: self.registered_names().join(", "),
            })
    }

    // -- internal helpers ---------------------------------------------------

    fn entity_slot(&self, id: EntityId) -> Result<SlotIndex, EcsError> {
        self.lookup
            .get(&id)
            .copied()
            .ok_or(EcsError::UnknownEntity { entity: id })
    }

    pub(crate) fn entity_record(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(*self.lookup.get(&id)?)
    }

    pub(crate) fn component_at<T: Component>(&self, slot: SlotIndex) -> Option<&T> {
        self.typed_pool::<T>(self.component_id::<T>()?)?
            .get(slot)
            .map(|attached| &attached.value)
    }

    /// The id of `T` if this world has ever attached or bound it.
    pub(crate) fn component_id<T: Component>(&self) -> Option<ComponentTypeId> {
        self.type_ids.get(&TypeId::of::<T>()).copied()
    }

    fn component_id_or_assign<T: Component>(&mut self) -> ComponentTypeId {
        *self
            .type_ids
            .entry(TypeId::of::<T>())
            .or_insert_with(ComponentTypeId::of::<T>)
    }

    fn typed_pool<T: Component>(&self, id: ComponentTypeId) -> Option<&IterablePool<Attached<T>>> {
        self.pools[id.index()].as_ref()?.as_any().downcast_ref()
    }

    fn typed_pool_mut<T: Component>(
        &mut self,
        id: ComponentTypeId,
    ) -> Option<&mut IterablePool<Attached<T>>> {
        self.pools[id.index()].as_mut()?.as_any_mut().downcast_mut()
    }

    fn pool_or_create<T: Component>(
        &mut self,
        id: ComponentTypeId,
    ) -> &mut IterablePool<Attached<T>> {
        let capacity = self.config.max_entities;
        self.pools[id.index()]
            .get_or_insert_with(|| {
                debug!(
                    component = std::any::type_name::<T>(),
                    capacity, "created component pool"
                );
                Box::new(IterablePool::<Attached<T>>::new(capacity))
            })
            .as_any_mut()
            .downcast_mut()
            .expect("component pool is keyed by its own type id")
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
