//! Component type identity.
//!
//! Every component type receives a dense [`ComponentTypeId`] the first time it
//! is used. The id indexes the world's parallel arrays (the per-entity slot
//! table and the per-type pool table), so it must stay below
//! [`MAX_COMPONENTS_COUNT`]. World components draw from their own counter and
//! range ([`WorldComponentTypeId`], [`MAX_WORLD_COMPONENTS_COUNT`]).
//!
//! Ids are process-wide and handed out in first-use order. They are stable for
//! the lifetime of the process, not across runs or binaries.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError};

/// Upper bound on distinct component types linked into one process.
pub const MAX_COMPONENTS_COUNT: usize = 64;

/// Upper bound on distinct world-component types linked into one process.
pub const MAX_WORLD_COMPONENTS_COUNT: usize = 64;

pub(crate) static COMPONENT_IDS: LazyLock<TypeIdRegistry> =
    LazyLock::new(|| TypeIdRegistry::new("component", MAX_COMPONENTS_COUNT));

static WORLD_COMPONENT_IDS: LazyLock<TypeIdRegistry> =
    LazyLock::new(|| TypeIdRegistry::new("world component", MAX_WORLD_COMPONENTS_COUNT));

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Anything that can live in a component pool or as a world component.
///
/// Implemented for every `Send + 'static` type. The `Send` bound keeps
/// [`World`](crate::world::World) itself `Send`, so separate worlds can be
/// driven from separate threads.
pub trait Component: Send + 'static {}

impl<T: Send + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Dense identifier of a component type, in `[0, MAX_COMPONENTS_COUNT)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// The id of `T`, assigning the next free one on first use.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_COMPONENTS_COUNT`] component types are used.
    pub fn of<T: Component>() -> Self {
        Self(COMPONENT_IDS.id_of::<T>())
    }

    /// The id as an array index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The Rust type name registered under this id, if any.
    pub fn name(self) -> Option<&'static str> {
        COMPONENT_IDS.name_of(self.0)
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// WorldComponentTypeId
// ---------------------------------------------------------------------------

/// Dense identifier of a world-component type, in
/// `[0, MAX_WORLD_COMPONENTS_COUNT)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldComponentTypeId(pub(crate) u32);

impl WorldComponentTypeId {
    /// The world-component id of `T`, assigning the next free one on first use.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_WORLD_COMPONENTS_COUNT`] world-component types
    /// are used.
    pub fn of<T: Component>() -> Self {
        Self(WORLD_COMPONENT_IDS.id_of::<T>())
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn name(self) -> Option<&'static str> {
        WORLD_COMPONENT_IDS.name_of(self.0)
    }
}

impl fmt::Debug for WorldComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorldComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// TypeIdRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types to dense ids in `[0, limit)`, in first-use order.
///
/// The process-wide component and world-component registries are instances of
/// this type; standalone instances are useful where an isolated id space is
/// needed.
#[derive(Debug)]
pub struct TypeIdRegistry {
    /// Used in the overflow panic message.
    kind: &'static str,
    limit: usize,
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_type: HashMap<TypeId, u32>,
    /// Indexed by id.
    names: Vec<&'static str>,
}

impl TypeIdRegistry {
    /// Create an empty registry handing out ids below `limit`.
    pub fn new(kind: &'static str, limit: usize) -> Self {
        Self {
            kind,
            limit,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// The id of `T`, assigning the next counter value if `T` is new.
    ///
    /// # Panics
    ///
    /// Panics if `T` is new and the registry already holds `limit` types.
    pub fn id_of<T: 'static>(&self) -> u32 {
        let rust_type_id = TypeId::of::<T>();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&existing) = inner.by_type.get(&rust_type_id) {
            return existing;
        }

        let next = inner.names.len();
        assert!(
            next < self.limit,
            "{} type limit of {} exceeded while registering {}",
            self.kind,
            self.limit,
            std::any::type_name::<T>()
        );
        let id = next as u32;
        inner.by_type.insert(rust_type_id, id);
        inner.names.push(std::any::type_name::<T>());
        id
    }

    /// The id of `T` if it has been assigned, without assigning one.
    pub fn lookup<T: 'static>(&self) -> Option<u32> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// The type name recorded for `id`.
    pub fn name_of(&self, id: u32) -> Option<&'static str> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.names.get(id as usize).copied()
    }

    /// Number of types assigned so far.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The maximum number of ids this registry can hand out.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Type names in id order.
    pub fn registered_names(&self) -> Vec<&'static str> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
