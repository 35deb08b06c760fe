//! Chained store of values supplied to composites through `Uses` injection.
//!
//! Containers form a chain from the most specific (builder) to the least
//! specific (application) level. Lookups walk the chain and return the first
//! match.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{value_type_id, Value};

/// A uses container with an optional parent.
#[derive(Default)]
pub struct UsesContainer {
    parent: Option<Arc<UsesContainer>>,
    unnamed: RwLock<Vec<Value>>,
    named: RwLock<HashMap<String, Value>>,
}

impl UsesContainer {
    /// Create a root container.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a container whose lookups fall back to `parent`.
    pub fn with_parent(parent: &Arc<UsesContainer>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            ..Self::default()
        })
    }

    /// The parent container, if any.
    pub fn parent(&self) -> Option<&Arc<UsesContainer>> {
        self.parent.as_ref()
    }

    /// Register an unnamed value, found by its concrete type.
    pub fn use_value<T: Any + Send + Sync>(&self, value: T) {
        self.use_shared(Arc::new(value));
    }

    /// Register an already shared unnamed value.
    pub fn use_shared(&self, value: Value) {
        self.unnamed.write().push(value);
    }

    /// Register a value under a name. A later value with the same name replaces the earlier one.
    pub fn use_with_name<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.named.write().insert(name.into(), Arc::new(value));
    }

    /// Find the first value of the given concrete type, walking up the chain.
    pub fn find_by_type(&self, type_id: TypeId) -> Option<Value> {
        let local = self
            .unnamed
            .read()
            .iter()
            .find(|v| value_type_id(v) == type_id)
            .cloned();
        local.or_else(|| self.parent.as_ref().and_then(|p| p.find_by_type(type_id)))
    }

    /// Find a named value whose concrete type matches, walking up the chain.
    pub fn find_named(&self, name: &str, type_id: TypeId) -> Option<Value> {
        let local = self
            .named
            .read()
            .get(name)
            .filter(|v| value_type_id(v) == type_id)
            .cloned();
        local.or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.find_named(name, type_id))
        })
    }

    /// Typed convenience over [`find_by_type`](Self::find_by_type).
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.find_by_type(TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Typed convenience over [`find_named`](Self::find_named).
    pub fn get_named<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.find_named(name, TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Whether this container (not its parents) holds no values.
    pub fn is_empty(&self) -> bool {
        self.unnamed.read().is_empty() && self.named.read().is_empty()
    }
}

impl fmt::Debug for UsesContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsesContainer")
            .field("unnamed", &self.unnamed.read().len())
            .field("named", &self.named.read().keys().collect::<Vec<_>>())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Port(u16);

    #[test]
    fn test_unnamed_lookup_by_type() {
        let uses = UsesContainer::new();
        uses.use_value(Port(8080));
        uses.use_value("hello".to_string());

        assert_eq!(*uses.get::<Port>().unwrap(), Port(8080));
        assert_eq!(uses.get::<String>().unwrap().as_str(), "hello");
        assert!(uses.get::<u64>().is_none());
    }

    #[test]
    fn test_named_lookup_checks_type() {
        let uses = UsesContainer::new();
        uses.use_with_name("port", Port(1));

        assert_eq!(*uses.get_named::<Port>("port").unwrap(), Port(1));
        assert!(uses.get_named::<String>("port").is_none());
        assert!(uses.get_named::<Port>("other").is_none());
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = UsesContainer::new();
        root.use_value(Port(1));
        root.use_with_name("name", "root".to_string());

        let child = UsesContainer::with_parent(&root);
        child.use_value(Port(2));

        assert_eq!(*child.get::<Port>().unwrap(), Port(2));
        assert_eq!(child.get_named::<String>("name").unwrap().as_str(), "root");
        assert_eq!(*root.get::<Port>().unwrap(), Port(1));
    }

    #[test]
    fn test_lookup_walks_whole_chain() {
        let app = UsesContainer::new();
        app.use_value(7u8);
        let layer = UsesContainer::with_parent(&app);
        let module = UsesContainer::with_parent(&layer);
        let builder = UsesContainer::with_parent(&module);

        assert_eq!(*builder.get::<u8>().unwrap(), 7);
        assert!(builder.is_empty());
    }
}
