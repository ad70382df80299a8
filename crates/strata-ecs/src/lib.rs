//! Strata ECS -- pooled entity/component storage with deferred structural
//! mutation.
//!
//! Every component type lives in its own fixed-capacity pool. A component's
//! address never changes while it stays attached, entities hold slot indices
//! into those pools, and multi-type iteration walks one pool in slot order
//! while resolving the other types through each owner (`None` where absent).
//! Structural changes requested mid-pass go through a
//! [`CommandBuffer`](command::CommandBuffer) and are applied between passes.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::with_config(WorldConfig::with_max_entities(1024));
//! let entity = world.spawn_entity().unwrap();
//! world.add_component(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//! world.add_component(entity, Velocity { dx: 1.0, dy: 0.5 }).unwrap();
//!
//! for (pos, vel) in world.iterate_mut::<(Position, Velocity)>() {
//!     if let Some(vel) = vel {
//!         pos.x += vel.dx;
//!         pos.y += vel.dy;
//!     }
//! }
//!
//! assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 1.0, y: 0.5 }));
//! ```

#![deny(unsafe_code)]

pub mod access;
pub mod command;
pub mod component;
pub mod entity;
pub mod iterable;
pub mod pool;
pub mod query;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Every operation that returns one of these leaves the world unchanged.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (destroyed or never spawned by this world).
    #[error("entity {entity} does not exist")]
    UnknownEntity { entity: entity::EntityId },

    /// The entity already has a component of this type.
    #[error("entity {entity} already has a {component}")]
    DuplicateComponent {
        entity: entity::EntityId,
        component: &'static str,
    },

    /// The entity has no component of this type.
    #[error("entity {entity} has no {component}")]
    MissingComponent {
        entity: entity::EntityId,
        component: &'static str,
    },

    /// A world component of this type is already installed.
    #[error("world component {component} is already present")]
    DuplicateWorldComponent { component: &'static str },

    /// No world component of this type is installed.
    #[error("world component {component} is not present")]
    MissingWorldComponent { component: &'static str },

    /// A fixed-capacity pool has no free slot left.
    #[error("pool of {pool} is full (capacity {capacity})")]
    CapacityExhausted { pool: &'static str, capacity: usize },

    /// No component type is bound to this name.
    #[error("component '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponentName { name: String, registered: String },

    /// Deserialization of a component value failed.
    #[error("failed to deserialize component '{component}': {details}")]
    ComponentDeserialization { component: String, details: String },

    /// A command targeted a pending entity that was not spawned in the same
    /// batch.
    #[error("pending entity {pending:?} was not spawned in this batch")]
    UnresolvedPendingEntity { pending: command::PendingEntity },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::access::WorldAccess;
    pub use crate::command::{
        ApplyReport, Command, CommandBuffer, CommandKind, CommandTarget, PendingEntity,
    };
    pub use crate::component::{
        Component, ComponentTypeId, WorldComponentTypeId, MAX_COMPONENTS_COUNT,
        MAX_WORLD_COMPONENTS_COUNT,
    };
    pub use crate::entity::{EntityId, EntityRef};
    pub use crate::iterable::{Cursor, IterablePool};
    pub use crate::pool::{Pool, SlotIndex};
    pub use crate::query::{ComponentIter, ComponentIterMut, ComponentSet};
    pub use crate::world::{World, WorldConfig, MAX_ENTITY_COUNT};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
