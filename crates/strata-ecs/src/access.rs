//! Non-structural view of a [`World`].
//!
//! Systems receive a [`WorldAccess`] instead of the world itself. It allows
//! reading and writing existing components and world components, and
//! iterating, but exposes nothing that spawns, destroys, attaches or detaches.
//! Structural requests go through a
//! [`CommandBuffer`](crate::command::CommandBuffer) and are applied between
//! passes.

use crate::component::{Component, WorldComponentTypeId};
use crate::entity::{EntityId, EntityRef};
use crate::query::{ComponentIter, ComponentIterMut, ComponentSet};
use crate::world::World;

/// Restricted handle over `&mut World`.
#[derive(Debug)]
pub struct WorldAccess<'w> {
    world: &'w mut World,
}

impl<'w> WorldAccess<'w> {
    pub fn new(world: &'w mut World) -> Self {
        Self { world }
    }

    /// Shared access to the whole world.
    pub fn world(&self) -> &World {
        &*self.world
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.world.is_alive(id)
    }

    pub fn entity_count(&self) -> usize {
        self.world.entity_count()
    }

    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'_>> {
        self.world.entity(id)
    }

    pub fn get<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.world.get_component(id)
    }

    pub fn get_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.world.get_component_mut(id)
    }

    pub fn has<T: Component>(&self, id: EntityId) -> bool {
        self.world.has_component::<T>(id)
    }

    pub fn component_count<T: Component>(&self) -> usize {
        self.world.component_count::<T>()
    }

    pub fn iterate<S: ComponentSet>(&self) -> ComponentIter<'_, S> {
        self.world.iterate()
    }

    pub fn iterate_mut<S: ComponentSet>(&mut self) -> ComponentIterMut<'_, S> {
        self.world.iterate_mut()
    }

    pub fn world_component<T: Component>(&self) -> Option<&T> {
        self.world.get_world_component()
    }

    pub fn world_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.world.get_world_component_mut()
    }

    pub fn has_world_component<T: Component>(&self) -> bool {
        self.world.has_world_component::<T>()
    }

    pub fn has_world_component_id(&self, id: WorldComponentTypeId) -> bool {
        self.world.has_world_component_id(id)
    }
}
