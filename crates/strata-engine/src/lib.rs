//! Strata Engine -- runtime collaborators around [`strata_ecs`].
//!
//! Provides the fixed-timestep [`TickLoop`](tick::TickLoop) that runs systems
//! and applies their queued structural commands between passes, a
//! reference-counted [`ResourceCache`](resource::ResourceCache), JSON engine
//! configuration and `tracing` subscriber setup.
//!
//! # Quick Start
//!
//! ```
//! use strata_engine::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Score(u32);
//!
//! let config = EngineConfig::default();
//! let mut tick_loop = config.build().unwrap();
//! let player = tick_loop.world_mut().spawn_entity().unwrap();
//! tick_loop.world_mut().add_component(player, Score(0)).unwrap();
//!
//! tick_loop.add_system("scoring", |access, _cmds| {
//!     for score in access.iterate_mut::<(Score,)>() {
//!         score.0 += 1;
//!     }
//! });
//!
//! tick_loop.run_ticks(100);
//! assert_eq!(tick_loop.world().get_component::<Score>(player), Some(&Score(100)));
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod resource;
pub mod tick;

/// Re-export the ECS crate for convenience.
pub use strata_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use strata_ecs::prelude::*;

    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::resource::{
        AssetsPathConfig, JsonResource, Resource, ResourceCache, ResourceError, ResourceHandle,
        ResourceSource, TextResource,
    };
    pub use crate::tick::{SystemFn, TickConfig, TickDiagnostics, TickLoop};
}
