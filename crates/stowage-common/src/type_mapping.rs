//! Type mapping lookup keyed by a stable type identifier.
//!
//! Mappings are stored type-erased. A lookup first tries an exact entry for
//! the requested key. Failing that, it walks the parent links declared with
//! [`TypeMappingFinder::declare_parent`] to the nearest registered ancestor,
//! adapts that ancestor's mapping down the chain and caches the adapted
//! mapping under the requested key.
//!
//! Any registration or parent declaration clears the ancestor cache, so a
//! mapping registered later for an intermediate type is picked up by the
//! next lookup of its descendants.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Stable identifier of a persistable type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A registered mapping with its concrete type erased.
pub type ErasedMapping = Arc<dyn Any + Send + Sync>;

/// Turns the mapping of a parent type into the mapping of its child.
///
/// Returns `None` when the erased value is not the parent mapping it expects.
pub type MappingAdapter = Arc<dyn Fn(ErasedMapping) -> Option<ErasedMapping> + Send + Sync>;

struct ParentLink {
    parent: TypeKey,
    adapt: MappingAdapter,
}

#[derive(Default)]
struct Registry {
    direct: HashMap<TypeKey, ErasedMapping>,
    parents: HashMap<TypeKey, ParentLink>,
    resolved: HashMap<TypeKey, ErasedMapping>,
}

impl Registry {
    fn cached(&self, key: &TypeKey) -> Option<ErasedMapping> {
        self.direct
            .get(key)
            .or_else(|| self.resolved.get(key))
            .map(Arc::clone)
    }

    fn resolve_through_ancestors(&self, key: TypeKey) -> Option<ErasedMapping> {
        let mut chain: Vec<&ParentLink> = Vec::new();
        let mut visited = HashSet::from([key]);
        let mut current = key;

        let ancestor = loop {
            let link = self.parents.get(&current)?;
            chain.push(link);
            if !visited.insert(link.parent) {
                warn!(type_name = key.name(), "cycle in declared type parents");
                return None;
            }
            if let Some(mapping) = self.direct.get(&link.parent) {
                debug!(
                    type_name = key.name(),
                    ancestor = link.parent.name(),
                    "resolved type mapping through ancestor"
                );
                break Arc::clone(mapping);
            }
            current = link.parent;
        };

        // The last link adapts the ancestor to its child; walk back down to `key`.
        chain
            .iter()
            .rev()
            .try_fold(ancestor, |mapping, link| (link.adapt)(mapping))
    }
}

/// Registry of type mappings with nearest-ancestor fallback.
#[derive(Default)]
pub struct TypeMappingFinder {
    registry: RwLock<Registry>,
}

impl TypeMappingFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an exact mapping, returning the one it replaces.
    pub fn register(&self, key: TypeKey, mapping: ErasedMapping) -> Option<ErasedMapping> {
        let mut registry = self.registry.write();
        registry.resolved.clear();
        debug!(type_name = key.name(), "registered type mapping");
        registry.direct.insert(key, mapping)
    }

    /// Declares `parent` as the direct ancestor of `child`.
    ///
    /// `adapt` converts a mapping of `parent` into a mapping of `child`.
    pub fn declare_parent(&self, child: TypeKey, parent: TypeKey, adapt: MappingAdapter) {
        let mut registry = self.registry.write();
        registry.resolved.clear();
        registry.parents.insert(child, ParentLink { parent, adapt });
    }

    /// Finds the mapping for `key`: exact entry first, then the nearest
    /// registered ancestor (cached for subsequent lookups).
    pub fn find(&self, key: TypeKey) -> Option<ErasedMapping> {
        if let Some(mapping) = self.registry.read().cached(&key) {
            return Some(mapping);
        }

        let mut registry = self.registry.write();
        // Another thread may have resolved it between the two locks.
        if let Some(mapping) = registry.cached(&key) {
            return Some(mapping);
        }
        let mapping = registry.resolve_through_ancestors(key)?;
        registry.resolved.insert(key, Arc::clone(&mapping));
        Some(mapping)
    }

    /// [`find`](Self::find) followed by a downcast to the concrete mapping type.
    pub fn find_as<M: Any + Send + Sync>(&self, key: TypeKey) -> Option<Arc<M>> {
        self.find(key)?.downcast::<M>().ok()
    }

    /// Whether an exact mapping is registered for `key`.
    pub fn is_registered(&self, key: TypeKey) -> bool {
        self.registry.read().direct.contains_key(&key)
    }

    /// Number of ancestor resolutions currently cached.
    pub fn cached_resolutions(&self) -> usize {
        self.registry.read().resolved.len()
    }
}

impl fmt::Debug for TypeMappingFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("TypeMappingFinder")
            .field("direct", &registry.direct.keys().collect::<Vec<_>>())
            .field("parents", &registry.parents.len())
            .field("resolved", &registry.resolved.len())
            .finish()
    }
}
