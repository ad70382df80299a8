//! Reference-counted, path-keyed resource cache.
//!
//! A [`ResourceCache`] constructs each resource at most once per path and
//! hands out [`ResourceHandle`]s that share it. The entry is evicted when the
//! last handle is released or dropped, so a component that stores a handle
//! acquires the resource on attach and gives it back on detach.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to construct a resource from its file.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to read resource {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse resource {path}: {details}")]
    Parse { path: PathBuf, details: String },
}

// ---------------------------------------------------------------------------
// Asset roots
// ---------------------------------------------------------------------------

/// Where a resource path is resolved from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSource {
    Engine,
    Game,
    /// The path is used as given.
    #[default]
    None,
}

/// Root directories for engine and game assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsPathConfig {
    pub engine_assets_path: PathBuf,
    pub game_assets_path: PathBuf,
}

impl Default for AssetsPathConfig {
    fn default() -> Self {
        Self {
            engine_assets_path: PathBuf::from("assets/engine"),
            game_assets_path: PathBuf::from("assets/game"),
        }
    }
}

impl AssetsPathConfig {
    /// Root directory for `source`. Empty for [`ResourceSource::None`].
    pub fn assets_path(&self, source: ResourceSource) -> &Path {
        match source {
            ResourceSource::Engine => &self.engine_assets_path,
            ResourceSource::Game => &self.game_assets_path,
            ResourceSource::None => Path::new(""),
        }
    }

    /// Resolve a cache-relative `path` against the root for `source`.
    pub fn resolve(&self, source: ResourceSource, path: &str) -> PathBuf {
        self.assets_path(source).join(path)
    }
}

// ---------------------------------------------------------------------------
// Resource trait
// ---------------------------------------------------------------------------

/// A value that can be constructed from a file on disk.
pub trait Resource: Sized + Send + Sync + 'static {
    fn load(path: &Path) -> Result<Self, ResourceError>;
}

/// Plain UTF-8 text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResource(pub String);

impl Resource for TextResource {
    fn load(path: &Path) -> Result<Self, ResourceError> {
        std::fs::read_to_string(path)
            .map(TextResource)
            .map_err(|source| ResourceError::Io {
                path: path.to_owned(),
                source,
            })
    }
}

/// Any JSON document, kept as a [`serde_json::Value`].
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResource(pub serde_json::Value);

impl Resource for JsonResource {
    fn load(path: &Path) -> Result<Self, ResourceError> {
        let text = TextResource::load(path)?.0;
        serde_json::from_str(&text)
            .map(JsonResource)
            .map_err(|e| ResourceError::Parse {
                path: path.to_owned(),
                details: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// ResourceHandle
// ---------------------------------------------------------------------------

/// Shared reference to a cached resource.
pub struct ResourceHandle<R> {
    path: String,
    resource: Arc<R>,
}

impl<R> ResourceHandle<R> {
    /// The cache key this handle was loaded under.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether two handles share the same loaded resource.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<R> Clone for ResourceHandle<R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<R> Deref for ResourceHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: fmt::Debug> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("path", &self.path)
            .field("resource", &*self.resource)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ResourceCache
// ---------------------------------------------------------------------------

/// Per-type cache of loaded resources, keyed by the path passed to
/// [`load`](Self::load).
pub struct ResourceCache<R: Resource> {
    assets: AssetsPathConfig,
    entries: HashMap<String, Arc<R>>,
}

impl<R: Resource> ResourceCache<R> {
    pub fn new(assets: AssetsPathConfig) -> Self {
        Self {
            assets,
            entries: HashMap::new(),
        }
    }

    pub fn assets(&self) -> &AssetsPathConfig {
        &self.assets
    }

    /// Get a handle to the resource at `path`, loading it on first use.
    ///
    /// Returns `None` (and logs an error) if the resource cannot be loaded.
    /// A failed load leaves no entry behind.
    pub fn load(&mut self, path: &str, source: ResourceSource) -> Option<ResourceHandle<R>> {
        self.evict_unused();

        if let Some(resource) = self.entries.get(path) {
            return Some(ResourceHandle {
                path: path.to_owned(),
                resource: Arc::clone(resource),
            });
        }

        info!(path, ?source, "loading resource");
        let absolute = self.assets.resolve(source, path);
        match R::load(&absolute) {
            Ok(resource) => {
                let resource = Arc::new(resource);
                self.entries.insert(path.to_owned(), Arc::clone(&resource));
                Some(ResourceHandle {
                    path: path.to_owned(),
                    resource,
                })
            }
            Err(err) => {
                error!(path, error = %err, "resource loading failed");
                None
            }
        }
    }

    /// [`load`](Self::load) relative to the engine assets directory.
    pub fn load_engine_asset(&mut self, path: &str) -> Option<ResourceHandle<R>> {
        self.load(path, ResourceSource::Engine)
    }

    /// [`load`](Self::load) relative to the game assets directory.
    pub fn load_game_asset(&mut self, path: &str) -> Option<ResourceHandle<R>> {
        self.load(path, ResourceSource::Game)
    }

    /// Release `handle`. The entry is evicted if this was its last handle.
    pub fn release(&mut self, handle: ResourceHandle<R>) {
        let ResourceHandle { path, resource } = handle;
        drop(resource);
        if self
            .entries
            .get(&path)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            self.entries.remove(&path);
            debug!(path = %path, "resource evicted");
        }
    }

    /// Number of outstanding handles for `path` (0 if not cached).
    pub fn ref_count(&self, path: &str) -> usize {
        self.entries
            .get(path)
            .map_or(0, |entry| Arc::strong_count(entry) - 1)
    }

    pub fn is_loaded(&self, path: &str) -> bool {
        self.ref_count(path) > 0
    }

    /// Number of resources with at least one live handle.
    pub fn len(&mut self) -> usize {
        self.evict_unused();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose handles were all dropped without
    /// [`release`](Self::release).
    pub fn evict_unused(&mut self) {
        self.entries.retain(|path, entry| {
            let keep = Arc::strong_count(entry) > 1;
            if !keep {
                debug!(path = %path, "resource evicted");
            }
            keep
        });
    }
}

impl<R: Resource> Default for ResourceCache<R> {
    fn default() -> Self {
        Self::new(AssetsPathConfig::default())
    }
}

impl<R: Resource> fmt::Debug for ResourceCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.entries.keys().collect();
        paths.sort();
        f.debug_struct("ResourceCache")
            .field("assets", &self.assets)
            .field("entries", &paths)
            .finish()
    }
}
