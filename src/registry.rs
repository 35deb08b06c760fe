//! Registry of composite model type supports.
//!
//! The `SupportRegistry` maps each [`CompositeModelType`] to the support that
//! knows how to declare, model and instantiate composites of that kind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::support::{
    CompositeModelType, ModelTypeSupport, PlainCompositeSupport, ServiceCompositeSupport,
};

/// A registry of model type supports, keyed by tag.
///
/// # Example
///
/// ```rust
/// use qi4rs::{CompositeModelType, SupportRegistry};
///
/// let registry = SupportRegistry::with_defaults();
///
/// assert!(registry.get(CompositeModelType::PLAIN).is_some());
/// assert!(registry.get(CompositeModelType::SERVICE).is_some());
/// assert!(registry.get(CompositeModelType::new("entity")).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SupportRegistry {
    supports: HashMap<CompositeModelType, Arc<dyn ModelTypeSupport>>,
    ordered: Vec<CompositeModelType>,
}

impl SupportRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding plain and service support.
    pub fn with_defaults() -> Self {
        SupportRegistryBuilder::new()
            .with(Arc::new(PlainCompositeSupport))
            .with(Arc::new(ServiceCompositeSupport))
            .build()
    }

    /// Register a support.
    ///
    /// A support already registered for the same tag is replaced.
    pub fn register(&mut self, support: Arc<dyn ModelTypeSupport>) {
        let tag = support.model_type();
        if !self.supports.contains_key(&tag) {
            self.ordered.push(tag);
        }
        self.supports.insert(tag, support);
    }

    /// Register a support, returning an error if the tag is taken.
    pub fn register_unique(
        &mut self,
        support: Arc<dyn ModelTypeSupport>,
    ) -> ConfigurationResult<()> {
        let tag = support.model_type();
        if self.supports.contains_key(&tag) {
            return Err(ConfigurationError::AlreadyRegistered(tag.name().to_string()));
        }
        self.ordered.push(tag);
        self.supports.insert(tag, support);
        Ok(())
    }

    /// Get the support for a tag.
    pub fn get(&self, tag: CompositeModelType) -> Option<&Arc<dyn ModelTypeSupport>> {
        self.supports.get(&tag)
    }

    /// Get the support for a tag, failing if none is registered.
    pub fn require(
        &self,
        tag: CompositeModelType,
    ) -> ConfigurationResult<&Arc<dyn ModelTypeSupport>> {
        self.get(tag)
            .ok_or_else(|| ConfigurationError::UnregisteredModelType(tag.name().to_string()))
    }

    /// Check if a tag has a registered support.
    pub fn contains(&self, tag: CompositeModelType) -> bool {
        self.supports.contains_key(&tag)
    }

    /// Registered tags in registration order.
    pub fn model_types(&self) -> &[CompositeModelType] {
        &self.ordered
    }

    /// Get the number of registered supports.
    pub fn len(&self) -> usize {
        self.supports.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.supports.is_empty()
    }

    /// Iterate over supports in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ModelTypeSupport>> {
        self.ordered.iter().filter_map(move |tag| self.supports.get(tag))
    }
}

/// Builder for creating registries with fluent API.
#[derive(Debug, Default)]
pub struct SupportRegistryBuilder {
    registry: SupportRegistry,
}

impl SupportRegistryBuilder {
    /// Create a new registry builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a support to the registry.
    pub fn with(mut self, support: Arc<dyn ModelTypeSupport>) -> Self {
        self.registry.register(support);
        self
    }

    /// Build the registry.
    pub fn build(self) -> SupportRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Debug)]
    struct EntitySupport;

    impl ModelTypeSupport for EntitySupport {
        fn model_type(&self) -> CompositeModelType {
            CompositeModelType::new("entity")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_registry_defaults() {
        let registry = SupportRegistry::with_defaults();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.model_types(),
            &[CompositeModelType::PLAIN, CompositeModelType::SERVICE]
        );
    }

    #[test]
    fn test_registry_require_unregistered() {
        let registry = SupportRegistry::with_defaults();
        let err = registry.require(CompositeModelType::new("entity")).unwrap_err();
        assert_eq!(err, ConfigurationError::UnregisteredModelType("entity".to_string()));
    }

    #[test]
    fn test_registry_unique_registration() {
        let mut registry = SupportRegistry::with_defaults();
        assert!(registry.register_unique(Arc::new(EntitySupport)).is_ok());
        assert!(registry.register_unique(Arc::new(EntitySupport)).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_replace_keeps_order() {
        let mut registry = SupportRegistry::new();
        registry.register(Arc::new(PlainCompositeSupport));
        registry.register(Arc::new(EntitySupport));
        registry.register(Arc::new(PlainCompositeSupport));

        let tags: Vec<_> = registry.iter().map(|s| s.model_type()).collect();
        assert_eq!(tags, vec![CompositeModelType::PLAIN, CompositeModelType::new("entity")]);
    }
}
