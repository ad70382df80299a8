//! Resource cache reference counting and config file loading against real
//! files in a temporary directory.

use std::fs;
use std::path::Path;

use strata_engine::prelude::*;

// -- Helpers ----------------------------------------------------------------

/// A vertex count stored as text.
#[derive(Debug)]
struct Mesh {
    vertex_count: usize,
}

impl Resource for Mesh {
    fn load(path: &Path) -> Result<Self, ResourceError> {
        let text = TextResource::load(path)?.0;
        let vertex_count = text
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| ResourceError::Parse {
                path: path.to_owned(),
                details: e.to_string(),
            })?;
        Ok(Mesh { vertex_count })
    }
}

struct Assets {
    _dir: tempfile::TempDir,
    config: AssetsPathConfig,
}

fn assets_with(files: &[(&str, &str)]) -> Assets {
    let dir = tempfile::tempdir().unwrap();
    let engine = dir.path().join("engine");
    let game = dir.path().join("game");
    fs::create_dir_all(&engine).unwrap();
    fs::create_dir_all(&game).unwrap();
    for (name, contents) in files {
        let root = if name.starts_with("shaders/") { &engine } else { &game };
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    Assets {
        config: AssetsPathConfig {
            engine_assets_path: engine,
            game_assets_path: game,
        },
        _dir: dir,
    }
}

// -- Resource cache ---------------------------------------------------------

#[test]
fn second_load_shares_the_first() {
    let assets = assets_with(&[("cube.mesh", "24")]);
    let mut cache = ResourceCache::<Mesh>::new(assets.config.clone());

    let a = cache.load("cube.mesh", ResourceSource::Game).unwrap();
    let b = cache.load("cube.mesh", ResourceSource::Game).unwrap();

    assert!(a.ptr_eq(&b));
    assert_eq!(a.vertex_count, 24);
    assert_eq!(cache.ref_count("cube.mesh"), 2);

    // Overwriting the file does not affect the cached instance.
    fs::write(assets.config.resolve(ResourceSource::Game, "cube.mesh"), "36").unwrap();
    let c = cache.load("cube.mesh", ResourceSource::Game).unwrap();
    assert_eq!(c.vertex_count, 24);
}

#[test]
fn release_evicts_on_last_reference() {
    let assets = assets_with(&[("shaders/basic.vert", "void main() {}")]);
    let mut cache = ResourceCache::<TextResource>::new(assets.config.clone());

    let a = cache.load("shaders/basic.vert", ResourceSource::Engine).unwrap();
    let b = a.clone();
    assert_eq!(cache.ref_count("shaders/basic.vert"), 2);

    cache.release(a);
    assert!(cache.is_loaded("shaders/basic.vert"));
    cache.release(b);
    assert!(!cache.is_loaded("shaders/basic.vert"));
    assert!(cache.is_empty());
}

#[test]
fn dropped_handles_are_evicted_lazily() {
    let assets = assets_with(&[("notes.txt", "hello")]);
    let mut cache = ResourceCache::<TextResource>::new(assets.config.clone());

    let handle = cache.load("notes.txt", ResourceSource::Game).unwrap();
    assert_eq!(handle.0, "hello");
    drop(handle);

    assert_eq!(cache.len(), 0);
}

#[test]
fn reload_after_eviction_reads_the_file_again() {
    let assets = assets_with(&[("notes.txt", "v1")]);
    let mut cache = ResourceCache::<TextResource>::new(assets.config.clone());

    let first = cache.load("notes.txt", ResourceSource::Game).unwrap();
    cache.release(first);
    fs::write(assets.config.resolve(ResourceSource::Game, "notes.txt"), "v2").unwrap();

    let second = cache.load("notes.txt", ResourceSource::Game).unwrap();
    assert_eq!(second.0, "v2");
}

#[test]
fn failed_load_returns_none() {
    let assets = assets_with(&[("broken.mesh", "not a number")]);
    let mut cache = ResourceCache::<Mesh>::new(assets.config.clone());

    assert!(cache.load("broken.mesh", ResourceSource::Game).is_none());
    assert!(cache.load("absent.mesh", ResourceSource::Game).is_none());
    assert!(cache.is_empty());
}

#[test]
fn handles_attached_as_components_release_on_destroy() {
    struct MeshRenderer {
        mesh: ResourceHandle<Mesh>,
    }

    let assets = assets_with(&[("cube.mesh", "8")]);
    let mut cache = ResourceCache::<Mesh>::new(assets.config.clone());
    let mut world = World::with_config(WorldConfig::with_max_entities(16));

    let a = world.spawn_entity().unwrap();
    let b = world.spawn_entity().unwrap();
    for e in [a, b] {
        let mesh = cache.load("cube.mesh", ResourceSource::Game).unwrap();
        world.add_component(e, MeshRenderer { mesh }).unwrap();
    }
    assert_eq!(cache.ref_count("cube.mesh"), 2);
    assert_eq!(
        world.get_component::<MeshRenderer>(a).map(|r| r.mesh.vertex_count),
        Some(8)
    );

    world.destroy_entity(a).unwrap();
    assert_eq!(cache.ref_count("cube.mesh"), 1);

    let renderer = world.remove_component::<MeshRenderer>(b).unwrap();
    cache.release(renderer.mesh);
    assert!(cache.is_empty());
}

// -- Config files -----------------------------------------------------------

#[test]
fn engine_config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    fs::write(
        &path,
        r#"{ "tick": { "fixed_dt": 0.01 }, "world": { "max_entities": 32 } }"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.tick.fixed_dt, 0.01);
    assert_eq!(config.world.max_entities, 32);

    let tick_loop = config.build().unwrap();
    assert_eq!(tick_loop.fixed_dt(), 0.01);
}

#[test]
fn missing_config_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = EngineConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{ "world": { "max_entities": 0 } }"#).unwrap();

    let err = EngineConfig::load(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidMaxEntities { value: 0, .. })
    ));
}
