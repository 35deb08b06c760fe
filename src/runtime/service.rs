//! Service containers and lazily activated service slots.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{CompositeError, CompositeResult, LifecycleError, PassivationFailures};
use crate::model::{CompositeId, CompositeModel};
use crate::runtime::composite::{instantiate, Composite};
use crate::runtime::module::ModuleInstance;
use crate::stream::LifecycleEvent;
use crate::types::Value;
use crate::uses::UsesContainer;

const PASSIVE: u8 = 0;
const ACTIVATING: u8 = 1;
const ACTIVE: u8 = 2;
const PASSIVATING: u8 = 3;

/// Lifecycle state of a service slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No instance exists
    Passive,
    /// An activation is in progress
    Activating,
    /// The instance is live
    Active,
    /// A passivation is in progress
    Passivating,
}

impl ServiceState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            ACTIVATING => ServiceState::Activating,
            ACTIVE => ServiceState::Active,
            PASSIVATING => ServiceState::Passivating,
            _ => ServiceState::Passive,
        }
    }
}

fn backoff() {
    std::hint::spin_loop();
    std::thread::yield_now();
}

/// Holds the single instance of one service composite.
pub(crate) struct ServiceSlot {
    model: Arc<CompositeModel>,
    state: AtomicU8,
    instance: RwLock<Option<Composite>>,
    /// Thread running the current activation or passivation.
    transition: Mutex<Option<ThreadId>>,
}

impl ServiceSlot {
    pub(crate) fn new(model: Arc<CompositeModel>) -> Self {
        Self {
            model,
            state: AtomicU8::new(PASSIVE),
            instance: RwLock::new(None),
            transition: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> CompositeId {
        self.model.id()
    }

    pub(crate) fn state(&self) -> ServiceState {
        ServiceState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// The live instance, activating it exactly once if needed.
    ///
    /// A thread asking for the service while it is itself activating or
    /// passivating it gets [`LifecycleError::CyclicActivation`].
    pub(crate) fn activate(&self, owner: &Arc<ModuleInstance>) -> CompositeResult<Composite> {
        loop {
            match self
                .state
                .compare_exchange(PASSIVE, ACTIVATING, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.enter_transition();
                    return self.run_activation(owner);
                }
                Err(ACTIVE) => {
                    if let Some(instance) = self.instance.read().clone() {
                        return Ok(instance);
                    }
                    backoff();
                }
                Err(_) if self.in_transition_on_current_thread() => {
                    warn!(
                        composite = %self.model.id(),
                        types = %self.model.describe(),
                        "Cyclic service activation"
                    );
                    return Err(LifecycleError::CyclicActivation {
                        composite: self.model.describe(),
                    }
                    .into());
                }
                Err(_) => backoff(),
            }
        }
    }

    fn enter_transition(&self) {
        *self.transition.lock() = Some(thread::current().id());
    }

    fn leave_transition(&self, state: u8) {
        *self.transition.lock() = None;
        self.state.store(state, Ordering::Release);
    }

    fn in_transition_on_current_thread(&self) -> bool {
        *self.transition.lock() == Some(thread::current().id())
    }

    fn run_activation(&self, owner: &Arc<ModuleInstance>) -> CompositeResult<Composite> {
        let activated = instantiate(
            owner,
            Arc::clone(&self.model),
            UsesContainer::with_parent(self.model.uses()),
            Vec::new(),
        )
        .and_then(|composite| {
            for hook in &self.model.lifecycle.activators {
                hook(&composite)?;
            }
            Ok(composite)
        });

        match activated {
            Ok(composite) => {
                *self.instance.write() = Some(composite.clone());
                self.leave_transition(ACTIVE);
                info!(
                    composite = %self.model.id(),
                    types = %self.model.describe(),
                    "Service activated"
                );
                owner.publish(LifecycleEvent::ServiceActivated {
                    composite: self.model.id(),
                    types: self.model.describe(),
                });
                Ok(composite)
            }
            Err(err) => {
                self.leave_transition(PASSIVE);
                Err(LifecycleError::ActivationFailed {
                    composite: self.model.describe(),
                    source: Box::new(err),
                }
                .into())
            }
        }
    }

    /// Passivate the instance if it is active, running every passivation
    /// hook. Returns whether this call passivated the slot.
    ///
    /// Nested calls from the thread already moving the slot return `false`.
    pub(crate) fn passivate(
        &self,
        owner: &ModuleInstance,
        failures: &mut PassivationFailures,
    ) -> bool {
        loop {
            match self
                .state
                .compare_exchange(ACTIVE, PASSIVATING, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(PASSIVE) => return false,
                Err(_) if self.in_transition_on_current_thread() => return false,
                Err(_) => backoff(),
            }
        }
        self.enter_transition();

        let instance = self.instance.write().take();
        if let Some(composite) = instance {
            for hook in &self.model.lifecycle.passivators {
                if let Err(err) = hook(&composite) {
                    warn!(
                        composite = %self.model.id(),
                        types = %self.model.describe(),
                        error = %err,
                        "Passivation hook failed"
                    );
                    failures.push(self.model.describe(), err);
                }
            }
        }
        self.leave_transition(PASSIVE);
        owner.publish(LifecycleEvent::ServicePassivated {
            composite: self.model.id(),
            types: self.model.describe(),
        });
        true
    }
}

impl fmt::Debug for ServiceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSlot")
            .field("composite", &self.model.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Service slots of one module, in declaration order.
#[derive(Debug, Default)]
pub struct ServiceContainer {
    slots: Vec<Arc<ServiceSlot>>,
}

impl ServiceContainer {
    pub(crate) fn new(models: impl IntoIterator<Item = Arc<CompositeModel>>) -> Self {
        Self {
            slots: models.into_iter().map(|m| Arc::new(ServiceSlot::new(m))).collect(),
        }
    }

    pub(crate) fn slot(&self, id: CompositeId) -> Option<&Arc<ServiceSlot>> {
        self.slots.iter().find(|s| s.id() == id)
    }

    /// Ids of the services held here.
    pub fn ids(&self) -> Vec<CompositeId> {
        self.slots.iter().map(|s| s.id()).collect()
    }

    /// Current state of a held service.
    pub fn state_of(&self, id: CompositeId) -> Option<ServiceState> {
        self.slot(id).map(|s| s.state())
    }

    /// Number of services held here.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no service is held here.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Handle to a service; the service is activated on first access.
#[derive(Clone)]
pub struct ServiceReference {
    owner: Weak<ModuleInstance>,
    id: CompositeId,
}

impl ServiceReference {
    pub(crate) fn new(owner: &Arc<ModuleInstance>, id: CompositeId) -> Self {
        Self {
            owner: Arc::downgrade(owner),
            id,
        }
    }

    /// Id of the service composite.
    pub fn id(&self) -> CompositeId {
        self.id
    }

    /// The service instance, activating it if necessary.
    pub fn get(&self) -> CompositeResult<Composite> {
        let owner = self.owner()?;
        let slot = owner
            .services()
            .slot(self.id)
            .cloned()
            .ok_or_else(|| self.missing_slot())?;
        slot.activate(&owner)
    }

    /// Invoke a method on the service, activating it if necessary.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> CompositeResult<Value> {
        self.get()?.invoke(name, args)
    }

    /// Current lifecycle state of the service.
    pub fn state(&self) -> CompositeResult<ServiceState> {
        let owner = self.owner()?;
        owner
            .services()
            .state_of(self.id)
            .ok_or_else(|| self.missing_slot())
    }

    /// Whether the service is active.
    pub fn is_active(&self) -> bool {
        matches!(self.state(), Ok(ServiceState::Active))
    }

    fn owner(&self) -> CompositeResult<Arc<ModuleInstance>> {
        self.owner
            .upgrade()
            .ok_or_else(|| {
                CompositeError::InvalidOperation("owning module was dropped".to_string())
            })
    }

    fn missing_slot(&self) -> CompositeError {
        CompositeError::InvalidOperation(format!("service {} has no container slot", self.id))
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceReference {}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_state_from_raw() {
        assert_eq!(ServiceState::from_raw(PASSIVE), ServiceState::Passive);
        assert_eq!(ServiceState::from_raw(ACTIVATING), ServiceState::Activating);
        assert_eq!(ServiceState::from_raw(ACTIVE), ServiceState::Active);
        assert_eq!(ServiceState::from_raw(PASSIVATING), ServiceState::Passivating);
    }
}
