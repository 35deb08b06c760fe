//! Composite model type supports.
//!
//! Each kind of composite (plain, service, or an application-defined kind) is
//! backed by a `ModelTypeSupport`. Supports are registered in a
//! [`SupportRegistry`](crate::SupportRegistry) and consulted when a
//! declaration is started, when the model is built and validated, when a
//! module looks up composites of its kind, and when the runtime places
//! service instances in containers.

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::assembly::CompositeAssemblyInfo;
use crate::model::{CompositeId, CompositeModel, ModuleId};
use crate::resolve::{Resolver, Visible};
use crate::types::TypeKey;
use crate::uses::UsesContainer;
use crate::validation::{ValidationError, ValidationResult};

/// Tag naming a kind of composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeModelType(&'static str);

impl CompositeModelType {
    /// Plain composites, built on request by composite builders.
    pub const PLAIN: CompositeModelType = CompositeModelType("plain");

    /// Service composites, one instance per declaration, with lifecycle.
    pub const SERVICE: CompositeModelType = CompositeModelType("service");

    /// Create a tag for an application-defined composite kind.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Tag name.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CompositeModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Strategy object for one composite model type.
///
/// # Example
///
/// ```rust
/// use qi4rs::{CompositeModelType, ModelTypeSupport};
/// use std::any::Any;
///
/// #[derive(Debug)]
/// struct EntitySupport;
///
/// impl ModelTypeSupport for EntitySupport {
///     fn model_type(&self) -> CompositeModelType {
///         CompositeModelType::new("entity")
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait ModelTypeSupport: Send + Sync + Debug {
    /// The tag this support handles.
    fn model_type(&self) -> CompositeModelType;

    /// Start the assembly-time record of a new declaration.
    fn create_info(
        &self,
        id: CompositeId,
        parent_uses: &Arc<UsesContainer>,
    ) -> CompositeAssemblyInfo {
        CompositeAssemblyInfo::new(id, self.model_type(), parent_uses)
    }

    /// Promote a finished declaration into a composite model.
    fn create_model(
        &self,
        info: CompositeAssemblyInfo,
        location: Option<ModuleId>,
    ) -> CompositeModel {
        CompositeModel::from_info(info, location)
    }

    /// Model-type specific validation of a composite model.
    fn validate(&self, _model: &CompositeModel, _result: &mut ValidationResult) {}

    /// Composites of this kind visible from `from` that implement every
    /// type in `types`, in scope order.
    ///
    /// The default follows layer and module visibility.
    fn visible_models<'a>(
        &self,
        resolver: Resolver<'a>,
        from: Option<ModuleId>,
        types: &[TypeKey],
    ) -> Visible<'a> {
        resolver.of_type(from, self.model_type(), types)
    }

    /// Whether instances are owned by a service container rather than
    /// built on request.
    fn is_service_backed(&self) -> bool {
        false
    }

    /// Module whose service container holds the instance of `model`.
    ///
    /// Only asked for service-backed kinds of layered applications; the
    /// default is the module the composite was declared in.
    fn service_container(&self, model: &CompositeModel) -> Option<ModuleId> {
        model.location()
    }

    /// Downcast to concrete type for advanced usage.
    fn as_any(&self) -> &dyn Any;
}

/// Extension trait for support type checking.
pub trait ModelTypeSupportExt: ModelTypeSupport {
    /// Check if this support is of type T.
    fn is<T: ModelTypeSupport + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast to type T.
    fn downcast_ref<T: ModelTypeSupport + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<S: ModelTypeSupport + ?Sized> ModelTypeSupportExt for S {}

/// Support for plain composites.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCompositeSupport;

impl ModelTypeSupport for PlainCompositeSupport {
    fn model_type(&self) -> CompositeModelType {
        CompositeModelType::PLAIN
    }

    fn validate(&self, model: &CompositeModel, result: &mut ValidationResult) {
        if !model.lifecycle().is_empty() {
            result.push(ValidationError::ModelType {
                composite: model.describe(),
                message: "plain composites cannot declare activation or passivation".to_string(),
            });
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Support for service composites.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceCompositeSupport;

impl ModelTypeSupport for ServiceCompositeSupport {
    fn model_type(&self) -> CompositeModelType {
        CompositeModelType::SERVICE
    }

    fn is_service_backed(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tags() {
        assert_eq!(PlainCompositeSupport.model_type(), CompositeModelType::PLAIN);
        assert_eq!(ServiceCompositeSupport.model_type(), CompositeModelType::SERVICE);
        assert_eq!(CompositeModelType::new("entity").name(), "entity");
        assert!(!PlainCompositeSupport.is_service_backed());
        assert!(ServiceCompositeSupport.is_service_backed());
    }

    #[test]
    fn test_service_container_defaults_to_location() {
        let parent = UsesContainer::new();
        let info = ServiceCompositeSupport.create_info(CompositeId(2), &parent);
        let model = ServiceCompositeSupport.create_model(info, Some(ModuleId(4)));
        assert_eq!(ServiceCompositeSupport.service_container(&model), Some(ModuleId(4)));
    }

    #[test]
    fn test_create_info_uses_support_tag() {
        let parent = UsesContainer::new();
        let info = ServiceCompositeSupport.create_info(CompositeId(3), &parent);
        assert_eq!(info.model_type(), CompositeModelType::SERVICE);
        assert_eq!(info.id(), CompositeId(3));
    }

    #[test]
    fn test_plain_support_rejects_lifecycle() {
        let parent = UsesContainer::new();
        let mut info = PlainCompositeSupport.create_info(CompositeId(1), &parent);
        info.lifecycle.activate_with_application = true;
        let model = PlainCompositeSupport.create_model(info, None);

        let mut result = ValidationResult::new();
        PlainCompositeSupport.validate(&model, &mut result);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_support_downcast() {
        let support: Box<dyn ModelTypeSupport> = Box::new(ServiceCompositeSupport);
        assert!(support.is::<ServiceCompositeSupport>());
        assert!(support.downcast_ref::<PlainCompositeSupport>().is_none());
    }
}
