//! Module instances and composite builders.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::error::{CompositeError, CompositeResult, ResolutionError};
use crate::model::{CompositeId, CompositeModel, ModuleId};
use crate::resolve::Resolver;
use crate::runtime::application::{Application, ApplicationInner};
use crate::runtime::composite::{instantiate, Composite};
use crate::runtime::service::{ServiceContainer, ServiceReference};
use crate::stream::LifecycleEvent;
use crate::support::CompositeModelType;
use crate::types::{type_list, TypeKey, Value};
use crate::uses::UsesContainer;

type LookupKey = (CompositeModelType, Vec<TypeKey>);

/// Live counterpart of a module. Singleton applications have exactly one.
pub struct ModuleInstance {
    app: Weak<ApplicationInner>,
    module: Option<ModuleId>,
    name: String,
    services: ServiceContainer,
    lookup_cache: DashMap<LookupKey, CompositeId>,
}

impl ModuleInstance {
    pub(crate) fn new(
        app: Weak<ApplicationInner>,
        module: Option<ModuleId>,
        name: String,
        services: ServiceContainer,
    ) -> Self {
        Self {
            app,
            module,
            name,
            services,
            lookup_cache: DashMap::new(),
        }
    }

    /// Module name; the application name for singleton applications.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the module model; `None` for singleton applications.
    pub fn module_id(&self) -> Option<ModuleId> {
        self.module
    }

    /// Services placed in this module.
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// The owning application.
    pub fn application(&self) -> CompositeResult<Application> {
        self.application_inner().map(Application::from_inner)
    }

    pub(crate) fn application_inner(&self) -> CompositeResult<Arc<ApplicationInner>> {
        self.app
            .upgrade()
            .ok_or_else(|| CompositeError::InvalidOperation("application was dropped".to_string()))
    }

    pub(crate) fn publish(&self, event: LifecycleEvent) {
        if let Some(app) = self.app.upgrade() {
            app.events.publish(event);
        }
    }

    /// Builder for the plain composite visible from here implementing `types`.
    pub fn new_plain_composite_builder(
        &self,
        types: &[TypeKey],
    ) -> CompositeResult<CompositeBuilder> {
        self.new_composite_builder(CompositeModelType::PLAIN, types)
    }

    /// Builder for the composite of `model_type` visible from here implementing `types`.
    pub fn new_composite_builder(
        &self,
        model_type: CompositeModelType,
        types: &[TypeKey],
    ) -> CompositeResult<CompositeBuilder> {
        let app = self.application_inner()?;
        let model = self.lookup(&app, model_type, types)?;
        if app.model.is_service_backed(&model) {
            return Err(CompositeError::InvalidOperation(format!(
                "{} is a service; obtain it through a service reference",
                model.describe()
            )));
        }
        let owner = app.owner_of(model.location())?;
        Ok(CompositeBuilder {
            uses: UsesContainer::with_parent(model.uses()),
            owner: Arc::clone(owner),
            model,
            prototype: Vec::new(),
        })
    }

    fn lookup(
        &self,
        app: &ApplicationInner,
        model_type: CompositeModelType,
        types: &[TypeKey],
    ) -> CompositeResult<Arc<CompositeModel>> {
        let key = (model_type, types.to_vec());
        let id = *self
            .lookup_cache
            .entry(key)
            .or_try_insert_with(|| {
                debug!(
                    module = %self.name,
                    model_type = %model_type,
                    types = %type_list(types),
                    "Composite lookup cache miss"
                );
                Resolver::new(&app.model)
                    .resolve_unique(self.module, model_type, types)
                    .map(|model| model.id())
            })?
            .value();
        app.model.composite(id).cloned().ok_or_else(|| {
            CompositeError::InvalidOperation(format!("composite {id} is not part of the model"))
        })
    }

    /// The first service implementing `service_type` visible from here.
    pub fn find_service(&self, service_type: TypeKey) -> CompositeResult<ServiceReference> {
        self.find_services(service_type)
            .into_iter()
            .next()
            .ok_or_else(|| {
                let location = self
                    .app
                    .upgrade()
                    .map(|app| app.model.location_name(self.module))
                    .unwrap_or_else(|| self.name.clone());
                ResolutionError::NotFound {
                    model_type: CompositeModelType::SERVICE.to_string(),
                    requested: type_list(&[service_type]),
                    location,
                }
                .into()
            })
    }

    /// Every service implementing `service_type` visible from here, in scope order.
    pub fn find_services(&self, service_type: TypeKey) -> Vec<ServiceReference> {
        let Some(app) = self.app.upgrade() else {
            return Vec::new();
        };
        Resolver::new(&app.model)
            .find_services(self.module, service_type)
            .into_iter()
            .filter_map(|id| {
                let model = app.model.composite(id)?;
                let owner = app.owner_of(app.model.service_container_of(model)).ok()?;
                Some(ServiceReference::new(owner, id))
            })
            .collect()
    }

    /// Number of cached composite lookups.
    pub fn cached_lookups(&self) -> usize {
        self.lookup_cache.len()
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("services", &self.services)
            .field("cached_lookups", &self.lookup_cache.len())
            .finish()
    }
}

/// Builds one composite instance.
pub struct CompositeBuilder {
    owner: Arc<ModuleInstance>,
    model: Arc<CompositeModel>,
    uses: Arc<UsesContainer>,
    prototype: Vec<(String, Value)>,
}

impl CompositeBuilder {
    /// Model the builder instantiates.
    pub fn model(&self) -> &Arc<CompositeModel> {
        &self.model
    }

    /// Supply an unnamed value for `Uses` injection.
    pub fn use_value<T: Any + Send + Sync>(self, value: T) -> Self {
        self.uses.use_value(value);
        self
    }

    /// Supply a named value for `Uses` injection.
    pub fn use_with_name<T: Any + Send + Sync>(self, name: impl Into<String>, value: T) -> Self {
        self.uses.use_with_name(name, value);
        self
    }

    /// Set a property while the composite is a prototype; immutable
    /// properties can be written and constraints are not checked.
    pub fn set_property<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.prototype.push((name.into(), Arc::new(value)));
        self
    }

    /// Build the composite.
    pub fn instantiate(self) -> CompositeResult<Composite> {
        instantiate(&self.owner, self.model, self.uses, self.prototype)
    }
}

impl fmt::Debug for CompositeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeBuilder")
            .field("composite", &self.model.id())
            .field("owner", &self.owner.name)
            .field("prototype", &self.prototype.len())
            .finish()
    }
}

/// Structure handle injected into fragments: the module owning the composite.
#[derive(Clone)]
pub struct Structure {
    module: Weak<ModuleInstance>,
}

impl Structure {
    pub(crate) fn new(module: Weak<ModuleInstance>) -> Self {
        Self { module }
    }

    /// The owning module.
    pub fn module(&self) -> CompositeResult<Arc<ModuleInstance>> {
        self.module
            .upgrade()
            .ok_or_else(|| {
                CompositeError::InvalidOperation("owning module was dropped".to_string())
            })
    }

    /// The owning application.
    pub fn application(&self) -> CompositeResult<Application> {
        self.module()?.application()
    }

    /// Builder for a plain composite visible from the owning module.
    pub fn new_plain_composite_builder(
        &self,
        types: &[TypeKey],
    ) -> CompositeResult<CompositeBuilder> {
        self.module()?.new_plain_composite_builder(types)
    }
}

impl fmt::Debug for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.module.upgrade().map(|m| m.name.clone());
        f.debug_struct("Structure").field("module", &name).finish()
    }
}
