//! Engine configuration.
//!
//! Every section defaults sensibly, so a config file only needs the fields it
//! overrides:
//!
//! ```
//! use strata_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "world": { "max_entities": 4096 } }"#).unwrap();
//! assert_eq!(config.world.max_entities, 4096);
//! assert_eq!(config.log_filter, "info");
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use strata_ecs::world::{World, WorldConfig, MAX_ENTITY_COUNT};

use crate::resource::AssetsPathConfig;
use crate::tick::{TickConfig, TickLoop};

/// Errors from parsing or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("tick.fixed_dt must be positive and finite, got {value}")]
    InvalidFixedDt { value: f64 },

    #[error("world.max_entities must be in 1..={max}, got {value}")]
    InvalidMaxEntities { value: usize, max: usize },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick: TickConfig,
    pub world: WorldConfig,
    pub assets: AssetsPathConfig,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            world: WorldConfig::default(),
            assets: AssetsPathConfig::default(),
            log_filter: "info".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the JSON config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick.is_valid() {
            return Err(ConfigError::InvalidFixedDt {
                value: self.tick.fixed_dt,
            });
        }
        if !self.world.is_valid() {
            return Err(ConfigError::InvalidMaxEntities {
                value: self.world.max_entities,
                max: MAX_ENTITY_COUNT,
            });
        }
        Ok(())
    }

    /// Build an empty world and a tick loop around it.
    pub fn build(&self) -> Result<TickLoop, ConfigError> {
        self.validate()?;
        let world = World::with_config(self.world.clone());
        Ok(TickLoop::new(world, self.tick.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceSource;
    use std::path::PathBuf;

    #[test]
    fn empty_object_gives_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = EngineConfig::from_json_str(
            r#"{
                "tick": { "fixed_dt": 0.02 },
                "assets": { "game_assets_path": "/srv/game" },
                "log_filter": "strata_ecs=debug"
            }"#,
        )
        .unwrap();
        assert_eq!(config.tick.fixed_dt, 0.02);
        assert_eq!(config.world, WorldConfig::default());
        assert_eq!(
            config.assets.assets_path(ResourceSource::Game),
            PathBuf::from("/srv/game")
        );
        assert_eq!(
            config.assets.engine_assets_path,
            AssetsPathConfig::default().engine_assets_path
        );
        assert_eq!(config.log_filter, "strata_ecs=debug");
    }

    #[test]
    fn rejects_non_positive_dt() {
        let err = EngineConfig::from_json_str(r#"{ "tick": { "fixed_dt": -1.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFixedDt { .. }));
    }

    #[test]
    fn rejects_oversized_world() {
        let json = format!(r#"{{ "world": {{ "max_entities": {} }} }}"#, MAX_ENTITY_COUNT + 1);
        let err = EngineConfig::from_json_str(&json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxEntities { .. }));
        assert!(err.to_string().contains("world.max_entities"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = EngineConfig::from_json_str("{ tick: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn build_uses_world_capacity() {
        let mut config = EngineConfig::default();
        config.world.max_entities = 2;
        let mut tick_loop = config.build().unwrap();
        let world = tick_loop.world_mut();
        world.spawn_entity().unwrap();
        world.spawn_entity().unwrap();
        assert!(world.spawn_entity().is_err());
    }
}
