//! Fixed-timestep tick loop.
//!
//! The [`TickLoop`] owns a [`World`] and drives it forward. Each tick:
//!
//! 1. All registered systems run in registration order. Each receives a
//!    [`WorldAccess`] (read and write existing components, iterate) and the
//!    shared [`CommandBuffer`] for structural requests.
//! 2. The command buffer is applied to the world in FIFO order.
//! 3. The tick counter advances.
//!
//! Structural changes therefore never happen while a system is iterating.
//!
//! # Example
//!
//! ```
//! use strata_engine::tick::{TickConfig, TickLoop};
//! use strata_ecs::prelude::*;
//!
//! struct Age(u32);
//!
//! let mut tick_loop = TickLoop::new(World::new(), TickConfig::default());
//!
//! tick_loop.add_system("spawner", |access, cmds| {
//!     if access.entity_count() == 0 {
//!         let e = cmds.spawn_entity();
//!         cmds.add_component(e, Age(0));
//!     }
//! });
//! tick_loop.add_system_after("aging", &["spawner"], |access, _cmds| {
//!     for age in access.iterate_mut::<(Age,)>() {
//!         age.0 += 1;
//!     }
//! });
//!
//! tick_loop.run_ticks(3);
//!
//! assert_eq!(tick_loop.tick_count(), 3);
//! assert_eq!(tick_loop.world().entity_count(), 1);
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strata_ecs::access::WorldAccess;
use strata_ecs::command::{Command, CommandBuffer};
use strata_ecs::world::World;
use tracing::trace;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
}

impl Default for TickConfig {
    /// Defaults to 60 Hz.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
        }
    }
}

impl TickConfig {
    pub fn is_valid(&self) -> bool {
        self.fixed_dt > 0.0 && self.fixed_dt.is_finite()
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick (systems + command apply).
    pub total_time: Duration,
    /// Time spent applying commands.
    pub command_apply_time: Duration,
    /// Number of commands applied at the end of the tick.
    pub command_count: usize,
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// A boxed system. Systems may keep state between ticks.
pub type SystemFn = Box<dyn FnMut(&mut WorldAccess<'_>, &mut CommandBuffer) + Send>;

struct RegisteredSystem {
    name: String,
    func: SystemFn,
    /// Names of systems that must execute before this one.
    after: Vec<String>,
}

impl fmt::Debug for RegisteredSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSystem")
            .field("name", &self.name)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// The fixed-timestep tick loop.
///
/// Simulation time is `tick_count * fixed_dt`, computed by multiplication so
/// it does not drift from repeated addition.
#[derive(Debug)]
pub struct TickLoop {
    world: World,
    command_buffer: CommandBuffer,
    systems: Vec<RegisteredSystem>,
    tick_counter: u64,
    config: TickConfig,
    last_diagnostics: TickDiagnostics,
}

impl TickLoop {
    /// Create a new tick loop around `world`.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(world: World, config: TickConfig) -> Self {
        assert!(
            config.is_valid(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            world,
            command_buffer: CommandBuffer::new(),
            systems: Vec::new(),
            tick_counter: 0,
            config,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Register a system to run each tick, after every system registered
    /// before it.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system<F>(&mut self, name: &str, func: F)
    where
        F: FnMut(&mut WorldAccess<'_>, &mut CommandBuffer) + Send + 'static,
    {
        self.add_system_after(name, &[], func);
    }

    /// Register a system with explicit execution dependencies.
    ///
    /// `after` lists system names that must execute before this one.
    ///
    /// # Panics
    ///
    /// - If any system in `after` is not already registered.
    /// - If a system with this name already exists.
    /// - If adding this system would create a dependency cycle.
    pub fn add_system_after<F>(&mut self, name: &str, after: &[&str], func: F)
    where
        F: FnMut(&mut WorldAccess<'_>, &mut CommandBuffer) + Send + 'static,
    {
        for dep in after {
            assert!(
                self.systems.iter().any(|s| s.name == *dep),
                "system '{name}' declares dependency on '{dep}', but '{dep}' is not registered"
            );
        }

        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );

        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            func: Box::new(func),
            after: after.iter().map(|s| s.to_string()).collect(),
        });

        self.validate_system_order();
    }

    /// Depth-first search over the `after` edges, failing on a back edge.
    ///
    /// # Panics
    ///
    /// Panics if a cycle is detected.
    fn validate_system_order(&self) {
        fn visit(
            systems: &[RegisteredSystem],
            idx: usize,
            visited: &mut [bool],
            in_stack: &mut [bool],
        ) -> bool {
            if in_stack[idx] {
                return false;
            }
            if visited[idx] {
                return true;
            }
            visited[idx] = true;
            in_stack[idx] = true;
            for dep in &systems[idx].after {
                if let Some(dep_idx) = systems.iter().position(|s| s.name == *dep) {
                    if !visit(systems, dep_idx, visited, in_stack) {
                        return false;
                    }
                }
            }
            in_stack[idx] = false;
            true
        }

        let mut visited = vec![false; self.systems.len()];
        let mut in_stack = vec![false; self.systems.len()];
        for i in 0..self.systems.len() {
            assert!(
                visit(&self.systems, i, &mut visited, &mut in_stack),
                "cycle detected in system dependencies"
            );
        }
    }

    /// Execute one tick: run every system, then apply the queued commands.
    ///
    /// Returns the processed commands. Check
    /// [`Command::applied_successfully`] to tell real mutations from failed
    /// attempts.
    pub fn tick(&mut self) -> Vec<Command> {
        let tick_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.systems.len());

        for system in &mut self.systems {
            let sys_start = Instant::now();
            let mut access = WorldAccess::new(&mut self.world);
            (system.func)(&mut access, &mut self.command_buffer);
            system_times.push((system.name.clone(), sys_start.elapsed()));
        }

        let apply_start = Instant::now();
        let applied = self.command_buffer.apply(&mut self.world);
        let command_apply_time = apply_start.elapsed();

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            command_apply_time,
            command_count: applied.len(),
        };

        trace!(
            tick = self.tick_counter,
            commands = applied.len(),
            entities = self.world.entity_count(),
            "tick complete"
        );

        applied
    }

    /// Run `count` ticks. Returns the total number of commands processed,
    /// failed ones included.
    pub fn run_ticks(&mut self, count: u64) -> u64 {
        let mut total_commands = 0u64;
        for _ in 0..count {
            total_commands += self.tick().len() as u64;
        }
        total_commands
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Current simulation time in seconds.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.config.fixed_dt
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access, for setup and tests. Between ticks no iteration
    /// is in progress, so structural calls are allowed here.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Commands queued outside a tick are applied at the end of the next one.
    pub fn command_buffer(&mut self) -> &mut CommandBuffer {
        &mut self.command_buffer
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// The names of all registered systems, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    /// Consume the loop and hand back the world.
    pub fn into_world(self) -> World {
        self.world
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
