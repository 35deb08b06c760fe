//! Live applications and their lifecycle.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::{
    CompositeError, CompositeResult, LifecycleError, PassivationFailures, ResolutionError,
};
use crate::model::{ApplicationModel, CompositeId, LayerId, ModuleId};
use crate::runtime::module::ModuleInstance;
use crate::runtime::service::{ServiceContainer, ServiceSlot};
use crate::stream::{EventStream, LifecycleEvent, LifecycleEvents};

/// Live counterpart of a layer.
#[derive(Debug)]
pub struct LayerInstance {
    id: LayerId,
    name: String,
    modules: Vec<Arc<ModuleInstance>>,
}

impl LayerInstance {
    /// Id of the layer model.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Layer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module instances in declaration order.
    pub fn modules(&self) -> &[Arc<ModuleInstance>] {
        &self.modules
    }

    /// Module instance by name.
    pub fn module(&self, name: &str) -> Option<&Arc<ModuleInstance>> {
        self.modules.iter().find(|m| m.name() == name)
    }
}

pub(crate) struct ApplicationInner {
    pub(crate) model: Arc<ApplicationModel>,
    pub(crate) events: LifecycleEvents,
    owners: Vec<Arc<ModuleInstance>>,
    layers: Vec<LayerInstance>,
}

impl ApplicationInner {
    /// Module instance owning composites placed at `location`.
    pub(crate) fn owner_of(
        &self,
        location: Option<ModuleId>,
    ) -> CompositeResult<&Arc<ModuleInstance>> {
        let index = match (self.model.is_layered(), location) {
            (true, Some(id)) => id.0,
            (false, _) => 0,
            (true, None) => {
                return Err(CompositeError::InvalidOperation(
                    "composite has no module in a layered application".to_string(),
                ))
            }
        };
        self.owners.get(index).ok_or_else(|| {
            CompositeError::InvalidOperation(format!("no module instance at index {index}"))
        })
    }
}

/// A live application created from an [`ApplicationModel`].
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

impl Application {
    pub(crate) fn new(model: Arc<ApplicationModel>) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            let container =
                |module: Option<ModuleId>| ServiceContainer::new(model.contained_services(module));

            let owners: Vec<Arc<ModuleInstance>> = if model.is_layered() {
                model
                    .modules()
                    .iter()
                    .map(|m| {
                        Arc::new(ModuleInstance::new(
                            weak.clone(),
                            Some(m.id()),
                            m.name().to_string(),
                            container(Some(m.id())),
                        ))
                    })
                    .collect()
            } else {
                vec![Arc::new(ModuleInstance::new(
                    weak.clone(),
                    None,
                    model.name().to_string(),
                    container(None),
                ))]
            };

            let layers = model
                .layers()
                .iter()
                .map(|l| LayerInstance {
                    id: l.id(),
                    name: l.name().to_string(),
                    modules: l.modules().iter().map(|m| Arc::clone(&owners[m.0])).collect(),
                })
                .collect();

            ApplicationInner {
                events: LifecycleEvents::new(model.config().event_buffer_size),
                model: Arc::clone(&model),
                owners,
                layers,
            }
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ApplicationInner>) -> Self {
        Self { inner }
    }

    /// The structural model.
    pub fn model(&self) -> &Arc<ApplicationModel> {
        &self.inner.model
    }

    /// Application name.
    pub fn name(&self) -> &str {
        self.inner.model.name()
    }

    /// Layer instances; empty for singleton applications.
    pub fn layers(&self) -> &[LayerInstance] {
        &self.inner.layers
    }

    /// Layer instance by name.
    pub fn layer(&self, name: &str) -> Option<&LayerInstance> {
        self.inner.layers.iter().find(|l| l.name == name)
    }

    /// Module instance by layer and module name.
    pub fn module(&self, layer: &str, module: &str) -> Option<&Arc<ModuleInstance>> {
        self.layer(layer)?.module(module)
    }

    /// Module instance by layer and module name, failing with
    /// [`ResolutionError::UnknownLocation`] when there is none.
    pub fn require_module(
        &self,
        layer: &str,
        module: &str,
    ) -> CompositeResult<&Arc<ModuleInstance>> {
        self.module(layer, module).ok_or_else(|| {
            ResolutionError::UnknownLocation(format!("{layer}/{module}")).into()
        })
    }

    /// The only module instance of a singleton application.
    pub fn singleton_module(&self) -> Option<&Arc<ModuleInstance>> {
        if self.inner.model.is_layered() {
            None
        } else {
            self.inner.owners.first()
        }
    }

    /// Every module instance.
    pub fn modules(&self) -> &[Arc<ModuleInstance>] {
        &self.inner.owners
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> EventStream<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Activate every service declared to activate with the application,
    /// deepest used layer first. The first failure stops activation.
    pub fn activate(&self) -> CompositeResult<()> {
        let model = &self.inner.model;
        for id in model.service_activation_order() {
            let Some(composite) = model.composite(id) else {
                continue;
            };
            if !composite.lifecycle().activate_with_application() {
                continue;
            }
            let owner = self.inner.owner_of(model.service_container_of(composite))?;
            let slot = slot_of(owner, id)?;
            slot.activate(owner)?;
        }
        info!(application = %self.name(), "Application activated");
        self.inner.events.publish(LifecycleEvent::ApplicationActivated {
            name: self.name().to_string(),
        });
        Ok(())
    }

    /// Passivate every active service in reverse activation order.
    ///
    /// Every passivation hook runs; failures are reported together.
    pub fn passivate(&self) -> CompositeResult<()> {
        let model = &self.inner.model;
        let mut failures = PassivationFailures::new();
        let mut passivated = 0usize;
        for id in model.service_activation_order().into_iter().rev() {
            let Some(composite) = model.composite(id) else {
                continue;
            };
            let owner = self.inner.owner_of(model.service_container_of(composite))?;
            if slot_of(owner, id)?.passivate(owner, &mut failures) {
                passivated += 1;
            }
        }
        info!(
            application = %self.name(),
            services = passivated,
            failures = failures.len(),
            "Application passivated"
        );
        self.inner.events.publish(LifecycleEvent::ApplicationPassivated {
            name: self.name().to_string(),
        });
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::PassivationFailed(failures).into())
        }
    }
}

fn slot_of(owner: &ModuleInstance, id: CompositeId) -> CompositeResult<&Arc<ServiceSlot>> {
    owner.services().slot(id).ok_or_else(|| {
        CompositeError::InvalidOperation(format!("service {id} has no container slot"))
    })
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name())
            .field("modules", &self.inner.owners.len())
            .finish()
    }
}
