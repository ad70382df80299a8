//! Command buffer for deferred structural mutations.
//!
//! Systems cannot spawn, destroy, attach or detach while they iterate. They
//! queue those requests in a [`CommandBuffer`] instead, and the buffer is
//! applied to the [`World`] between passes, in strict FIFO order.
//!
//! Entities spawned through the buffer do not exist until it is applied, so
//! [`CommandBuffer::spawn_entity`] returns a [`PendingEntity`] token. Later
//! commands in the same buffer may target the token; it is resolved to the
//! real [`EntityId`] at apply time.
//!
//! # Example
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Health(u32);
//!
//! let mut world = World::with_config(WorldConfig::with_max_entities(8));
//! let mut cmds = CommandBuffer::new();
//! let pending = cmds.spawn_entity();
//! cmds.add_component(pending, Health(100));
//!
//! let applied = cmds.apply(&mut world);
//! let entity = applied[0].spawned_entity.unwrap();
//! assert!(applied.iter().all(|cmd| cmd.applied_successfully));
//! assert_eq!(world.get_component::<Health>(entity), Some(&Health(100)));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// PendingEntity / CommandTarget
// ---------------------------------------------------------------------------

/// Placeholder for an entity that a [`CommandBuffer`] will spawn.
///
/// Only valid in the buffer that issued it and only until that buffer is next
/// applied or cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingEntity {
    batch: u32,
    index: u32,
}

/// What an entity command acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandTarget {
    /// An entity that already exists.
    Entity(EntityId),
    /// An entity spawned earlier in the same buffer.
    Pending(PendingEntity),
}

impl From<EntityId> for CommandTarget {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<PendingEntity> for CommandTarget {
    fn from(pending: PendingEntity) -> Self {
        Self::Pending(pending)
    }
}

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// What mutation a command performs.
///
/// Typed variants record the Rust type name of the component for logging;
/// the value itself travels with the buffer, not with the [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Spawn an entity and bind it to `pending`.
    SpawnEntity { pending: PendingEntity },
    /// Destroy the target entity and everything attached to it.
    DestroyEntity,
    /// Attach a typed component.
    AddComponent { component: String },
    /// Detach a typed component.
    RemoveComponent { component: String },
    /// Attach a name-bound component from JSON.
    AddComponentJson {
        component_name: String,
        value: serde_json::Value,
    },
    /// Detach a name-bound component.
    RemoveComponentByName { component_name: String },
    /// Install a world component.
    AddWorldComponent { component: String },
    /// Remove a world component.
    RemoveWorldComponent { component: String },
}

impl CommandKind {
    /// Bound name of the component this kind touches, for name-bound kinds.
    fn component_name(&self) -> Option<&str> {
        match self {
            Self::AddComponentJson { component_name, .. }
            | Self::RemoveComponentByName { component_name } => Some(component_name.as_str()),
            _ => None,
        }
    }
}

/// Which component a queued entity command touches.
///
/// Typed and name-bound commands on the same type share a key once the name
/// resolves in the world. Names the world does not know stay keyed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ConflictKey<'a> {
    Component(ComponentTypeId),
    Unbound(&'a str),
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One queued mutation and, after [`CommandBuffer::apply`], its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Entity the command acts on. `None` for spawns and world components.
    pub target: Option<CommandTarget>,
    pub kind: CommandKind,
    /// Sequential index within the buffer (set on insertion).
    pub command_index: u32,
    /// For spawn commands: the entity created on application.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub spawned_entity: Option<EntityId>,
    /// `false` until applied; stays `false` if application failed.
    #[serde(default)]
    pub applied_successfully: bool,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of the last [`CommandBuffer::apply`] call.
///
/// `conflict_count` counts (target, component) pairs named by more than one
/// command in the batch. Conflicts are warnings: every command still runs in
/// order, and a later one may fail (e.g. a second add of the same type).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Number of (target, component) pairs targeted by multiple commands.
    pub conflict_count: usize,
    /// Number of commands that failed to apply.
    pub failed_count: usize,
    /// Number of commands that applied successfully.
    pub success_count: usize,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

type EntityMutation = Box<dyn FnOnce(&mut World, EntityId) -> Result<(), EcsError> + Send>;
type WorldMutation = Box<dyn FnOnce(&mut World) -> Result<(), EcsError> + Send>;

/// The payload that actually performs a command.
enum Mutation {
    /// Fully described by the command's [`CommandKind`].
    Described,
    /// Typed entity mutation, run against the resolved target.
    Entity(EntityMutation),
    /// Typed world-component mutation.
    World(WorldMutation),
}

/// Collects structural requests during a tick and applies them in FIFO order.
///
/// After [`apply`](Self::apply) the buffer is empty and the applied commands
/// are returned so callers can inspect what happened.
pub struct CommandBuffer {
    commands: Vec<Command>,
    mutations: Vec<Mutation>,
    /// Component touched by each typed entity command, parallel to `commands`.
    component_ids: Vec<Option<ComponentTypeId>>,
    next_index: u32,
    /// Spawns queued in the current batch.
    pending_spawns: u32,
    /// Bumped on every apply/clear so stale [`PendingEntity`] tokens fail.
    batch: u32,
    last_apply_report: ApplyReport,
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("commands", &self.commands)
            .field("batch", &self.batch)
            .field("last_apply_report", &self.last_apply_report)
            .finish()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            mutations: Vec::new(),
            component_ids: Vec::new(),
            next_index: 0,
            pending_spawns: 0,
            batch: 0,
            last_apply_report: ApplyReport::default(),
        }
    }

    /// Queue a spawn. The returned token can be targeted by later commands in
    /// this buffer.
    pub fn spawn_entity(&mut self) -> PendingEntity {
        let pending = PendingEntity {
            batch: self.batch,
            index: self.pending_spawns,
        };
        self.pending_spawns += 1;
        self.push(None, CommandKind::SpawnEntity { pending }, Mutation::Described);
        pending
    }

    /// Queue destruction of `target`.
    pub fn destroy_entity(&mut self, target: impl Into<CommandTarget>) {
        self.push(
            Some(target.into()),
            CommandKind::DestroyEntity,
            Mutation::Described,
        );
    }

    /// Queue attaching `value` to `target`.
    pub fn add_component<T: Component>(&mut self, target: impl Into<CommandTarget>, value: T) {
        self.push_typed(
            Some(target.into()),
            CommandKind::AddComponent {
                component: std::any::type_name::<T>().to_owned(),
            },
            Mutation::Entity(Box::new(move |world, id| world.add_component(id, value))),
            Some(ComponentTypeId::of::<T>()),
        );
    }

    /// Queue detaching (and dropping) `target`'s `T`.
    pub fn remove_component<T: Component>(&mut self, target: impl Into<CommandTarget>) {
        self.push_typed(
            Some(target.into()),
            CommandKind::RemoveComponent {
                component: std::any::type_name::<T>().to_owned(),
            },
            Mutation::Entity(Box::new(|world, id| {
                world.remove_component::<T>(id).map(drop)
            })),
            Some(ComponentTypeId::of::<T>()),
        );
    }

    /// Queue attaching the component bound to `component_name`, deserialized
    /// from `value` at apply time.
    pub fn add_component_json(
        &mut self,
        target: impl Into<CommandTarget>,
        component_name: &str,
        value: serde_json::Value,
    ) {
        self.push(
            Some(target.into()),
            CommandKind::AddComponentJson {
                component_name: component_name.to_owned(),
                value,
            },
            Mutation::Described,
        );
    }

    /// Queue detaching the component bound to `component_name`.
    pub fn remove_component_by_name(
        &mut self,
        target: impl Into<CommandTarget>,
        component_name: &str,
    ) {
        self.push(
            Some(target.into()),
            CommandKind::RemoveComponentByName {
                component_name: component_name.to_owned(),
            },
            Mutation::Described,
        );
    }

    pub fn add_world_component<T: Component>(&mut self, value: T) {
        self.push(
            None,
            CommandKind::AddWorldComponent {
                component: std::any::type_name::<T>().to_owned(),
            },
            Mutation::World(Box::new(move |world| world.add_world_component(value))),
        );
    }

    pub fn remove_world_component<T: Component>(&mut self) {
        self.push(
            None,
            CommandKind::RemoveWorldComponent {
                component: std::any::type_name::<T>().to_owned(),
            },
            Mutation::World(Box::new(|world| {
                world.remove_world_component::<T>().map(drop)
            })),
        );
    }

    /// Queued commands in insertion order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Report from the last [`apply`](Self::apply) call (all zero before the
    /// first).
    pub fn last_apply_report(&self) -> &ApplyReport {
        &self.last_apply_report
    }

    /// Apply every queued command to `world` in insertion order.
    ///
    /// A failing command is logged with `warn!` and skipped; the rest still
    /// run. Every command is returned, with
    /// [`applied_successfully`](Command::applied_successfully) and, for
    /// spawns, [`spawned_entity`](Command::spawned_entity) filled in.
    pub fn apply(&mut self, world: &mut World) -> Vec<Command> {
        let mut commands = std::mem::take(&mut self.commands);
        let mutations = std::mem::take(&mut self.mutations);
        let component_ids = std::mem::take(&mut self.component_ids);
        let mut resolved: Vec<Option<EntityId>> = vec![None; self.pending_spawns as usize];
        let batch = self.batch;
        self.reset_batch();

        let conflict_count = Self::detect_conflicts(world, &commands, &component_ids);

        let mut success_count: usize = 0;
        let mut failed_count: usize = 0;

        for (cmd, mutation) in commands.iter_mut().zip(mutations) {
            match Self::apply_one(world, cmd, mutation, batch, &mut resolved) {
                Ok(()) => {
                    cmd.applied_successfully = true;
                    success_count += 1;
                }
                Err(e) => {
                    failed_count += 1;
                    warn!(
                        command_index = cmd.command_index,
                        target = ?cmd.target,
                        error = %e,
                        "command application failed"
                    );
                }
            }
        }

        self.last_apply_report = ApplyReport {
            conflict_count,
            failed_count,
            success_count,
        };

        commands
    }

    /// Drop every queued command without applying it.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.mutations.clear();
        self.component_ids.clear();
        self.reset_batch();
    }

    // -- internal helpers ---------------------------------------------------

    fn push(&mut self, target: Option<CommandTarget>, kind: CommandKind, mutation: Mutation) {
        self.push_typed(target, kind, mutation, None);
    }

    fn push_typed(
        &mut self,
        target: Option<CommandTarget>,
        kind: CommandKind,
        mutation: Mutation,
        component_id: Option<ComponentTypeId>,
    ) {
        let index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            target,
            kind,
            command_index: index,
            spawned_entity: None,
            applied_successfully: false,
        });
        self.mutations.push(mutation);
        self.component_ids.push(component_id);
    }

    fn reset_batch(&mut self) {
        self.next_index = 0;
        self.pending_spawns = 0;
        self.batch = self.batch.wrapping_add(1);
    }

    fn detect_conflicts(
        world: &World,
        commands: &[Command],
        component_ids: &[Option<ComponentTypeId>],
    ) -> usize {
        let mut seen: BTreeMap<(CommandTarget, ConflictKey<'_>), Vec<u32>> = BTreeMap::new();
        for (cmd, component_id) in commands.iter().zip(component_ids) {
            let Some(target) = cmd.target else { continue };
            let key = match (component_id, cmd.kind.component_name()) {
                (Some(id), _) => ConflictKey::Component(*id),
                (None, Some(name)) => match world.component_id_by_name(name) {
                    Some(id) => ConflictKey::Component(id),
                    None => ConflictKey::Unbound(name),
                },
                (None, None) => continue,
            };
            seen.entry((target, key))
                .or_default()
                .push(cmd.command_index);
        }

        let mut conflict_count = 0;
        for ((target, component), indices) in &seen {
            if indices.len() > 1 {
                conflict_count += 1;
                warn!(
                    target = ?target,
                    component = ?component,
                    command_indices = ?indices,
                    "conflict: {} commands target the same entity+component in this batch",
                    indices.len()
                );
            }
        }
        conflict_count
    }

    fn apply_one(
        world: &mut World,
        cmd: &mut Command,
        mutation: Mutation,
        batch: u32,
        resolved: &mut [Option<EntityId>],
    ) -> Result<(), EcsError> {
        match mutation {
            Mutation::World(apply) => apply(world),
            Mutation::Entity(apply) => {
                let id = Self::resolve(cmd.target, batch, resolved)?;
                apply(world, id)
            }
            Mutation::Described => match &cmd.kind {
                CommandKind::SpawnEntity { pending } => {
                    let id = world.spawn_entity()?;
                    if let Some(slot) = resolved.get_mut(pending.index as usize) {
                        *slot = Some(id);
                    }
                    cmd.spawned_entity = Some(id);
                    Ok(())
                }
                CommandKind::DestroyEntity => {
                    let id = Self::resolve(cmd.target, batch, resolved)?;
                    world.destroy_entity(id)
                }
                CommandKind::AddComponentJson {
                    component_name,
                    value,
                } => {
                    let id = Self::resolve(cmd.target, batch, resolved)?;
                    world.add_component_by_name(id, component_name, value)
                }
                CommandKind::RemoveComponentByName { component_name } => {
                    let id = Self::resolve(cmd.target, batch, resolved)?;
                    world.remove_component_by_name(id, component_name)
                }
                CommandKind::AddComponent { .. }
                | CommandKind::RemoveComponent { .. }
                | CommandKind::AddWorldComponent { .. }
                | CommandKind::RemoveWorldComponent { .. } => {
                    unreachable!("typed commands are always queued with their mutation")
                }
            },
        }
    }

    fn resolve(
        target: Option<CommandTarget>,
        batch: u32,
        resolved: &[Option<EntityId>],
    ) -> Result<EntityId, EcsError> {
        match target.expect("entity commands are always queued with a target") {
            CommandTarget::Entity(id) => Ok(id),
            CommandTarget::Pending(pending) => {
                let id = if pending.batch == batch {
                    resolved.get(pending.index as usize).copied().flatten()
                } else {
                    None
                };
                id.ok_or(EcsError::UnresolvedPendingEntity { pending })
            }
        }
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
