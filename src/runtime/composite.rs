//! Live composites and method dispatch.
//!
//! A call to a composite method walks the method's concern chain, reaches the
//! mixin, then runs the side-effect chain with the outcome. Each concern
//! continues the chain through its [`ConcernNext`] handle.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{CompositeError, CompositeResult, InjectionError};
use crate::injection::{InjectionService, InjectionTime, Injections, ProvisionContext};
use crate::model::{CompositeId, CompositeModel, FragmentInstance};
use crate::runtime::application::ApplicationInner;
use crate::runtime::module::ModuleInstance;
use crate::types::{TypeKey, Value};
use crate::uses::UsesContainer;

/// Handler subscribed to a composite event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Description of the method call being served.
#[derive(Debug, Clone)]
pub struct InvocationInfo {
    composite: CompositeId,
    method_index: usize,
    method_name: String,
    declaring_type: TypeKey,
    attributes: Vec<String>,
}

impl InvocationInfo {
    /// The composite being called.
    pub fn composite(&self) -> CompositeId {
        self.composite
    }

    /// Index of the method in the composite's method table.
    pub fn method_index(&self) -> usize {
        self.method_index
    }

    /// Method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Public type declaring the method.
    pub fn declaring_type(&self) -> TypeKey {
        self.declaring_type
    }

    /// Whether the method carries `attribute`.
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

/// Outcome of a completed call, as seen by side-effects.
#[derive(Debug)]
pub struct SideEffectResult {
    value: Option<Value>,
    error: Option<CompositeError>,
}

impl SideEffectResult {
    fn of(outcome: &CompositeResult<Value>) -> Self {
        match outcome {
            Ok(value) => Self {
                value: Some(Arc::clone(value)),
                error: None,
            },
            Err(error) => Self {
                value: None,
                error: Some(error.clone()),
            },
        }
    }

    /// Returned value, if the call succeeded.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returned value downcast to `T`.
    pub fn value_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().and_then(|v| v.downcast::<T>().ok())
    }

    /// Failure, if the call failed.
    pub fn error(&self) -> Option<&CompositeError> {
        self.error.as_ref()
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-call context of one fragment invocation.
#[derive(Debug)]
pub(crate) struct CallSite {
    pub(crate) method: usize,
    pub(crate) position: usize,
    pub(crate) invocation: Arc<InvocationInfo>,
    pub(crate) result: Option<Arc<SideEffectResult>>,
}

/// Arguments and per-call injections handed to a fragment.
#[derive(Debug)]
pub struct MethodCall {
    invocation: Arc<InvocationInfo>,
    args: Vec<Value>,
    injections: Injections,
}

impl MethodCall {
    /// The call being served.
    pub fn invocation(&self) -> &InvocationInfo {
        &self.invocation
    }

    /// Method name.
    pub fn method_name(&self) -> &str {
        &self.invocation.method_name
    }

    /// All arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument `index` as `T`.
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> CompositeResult<Arc<T>> {
        self.args
            .get(index)
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
            .ok_or_else(|| {
                InjectionError::ArgumentMismatch {
                    index,
                    expected: std::any::type_name::<T>().to_string(),
                }
                .into()
            })
    }

    /// Replace argument `index` before proceeding down the chain.
    pub fn set_arg(&mut self, index: usize, value: Value) -> CompositeResult<()> {
        match self.args.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CompositeError::InvalidOperation(format!(
                "method '{}' has no argument {index}",
                self.invocation.method_name
            ))),
        }
    }

    /// Per-call injection named `name`.
    pub fn injected<T: Any + Send + Sync>(&self, name: &str) -> CompositeResult<Arc<T>> {
        self.injections.get(name)
    }

    /// Per-call injection named `name`, if the point was satisfied.
    pub fn injected_optional<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> CompositeResult<Option<Arc<T>>> {
        self.injections.get_optional(name)
    }
}

/// Continues a concern chain.
#[derive(Debug, Clone)]
pub struct ConcernNext {
    composite: Weak<CompositeInner>,
    method: usize,
    position: usize,
}

impl ConcernNext {
    pub(crate) fn new(composite: Weak<CompositeInner>, method: usize, position: usize) -> Self {
        Self {
            composite,
            method,
            position,
        }
    }

    /// Invoke the rest of the chain with the arguments of `call`.
    pub fn proceed(&self, call: &MethodCall) -> CompositeResult<Value> {
        let inner = upgrade(&self.composite)?;
        inner.dispatch(self.method, self.position, &call.invocation, call.args.clone())
    }
}

/// Property storage of one composite.
pub(crate) struct CompositeState {
    model: Arc<CompositeModel>,
    prototype: AtomicBool,
    values: RwLock<HashMap<String, Value>>,
}

impl CompositeState {
    fn new(model: Arc<CompositeModel>) -> Self {
        Self {
            model,
            prototype: AtomicBool::new(true),
            values: RwLock::new(HashMap::new()),
        }
    }

    fn is_prototype(&self) -> bool {
        self.prototype.load(Ordering::Acquire)
    }

    fn get(&self, name: &str) -> CompositeResult<Option<Value>> {
        if self.model.property(name).is_none() {
            return Err(unknown_property(name));
        }
        Ok(self.values.read().get(name).cloned())
    }

    fn set(&self, name: &str, value: Value) -> CompositeResult<()> {
        let property = self.model.property(name).ok_or_else(|| unknown_property(name))?;
        if !property.value_type.matches(&value) {
            return Err(CompositeError::ConstraintViolation {
                property: name.to_string(),
                reason: format!("expected a value of type {}", property.value_type),
            });
        }
        if !self.is_prototype() {
            if property.immutable {
                return Err(CompositeError::InvalidOperation(format!(
                    "property '{name}' is immutable"
                )));
            }
            if let Some(failed) = property.constraints.iter().find(|c| !c.accepts(&value)) {
                return Err(CompositeError::ConstraintViolation {
                    property: name.to_string(),
                    reason: format!("constraint '{}' failed", failed.name()),
                });
            }
        }
        self.values.write().insert(name.to_string(), value);
        Ok(())
    }

    /// Leave the prototype stage once every mandatory property holds a value.
    fn seal(&self) -> CompositeResult<()> {
        let values = self.values.read();
        for property in self.model.properties() {
            if !property.optional && !values.contains_key(&property.name) {
                return Err(CompositeError::ConstraintViolation {
                    property: property.name.clone(),
                    reason: "mandatory property has no value".to_string(),
                });
            }
        }
        drop(values);
        self.prototype.store(false, Ordering::Release);
        Ok(())
    }
}

fn unknown_property(name: &str) -> CompositeError {
    CompositeError::InvalidOperation(format!("unknown property '{name}'"))
}

/// Typed access to a composite's properties.
#[derive(Clone)]
pub struct StateHandle(Arc<CompositeState>);

impl StateHandle {
    pub(crate) fn new(state: Arc<CompositeState>) -> Self {
        Self(state)
    }

    /// Value of property `name`, `None` if unset.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> CompositeResult<Option<Arc<T>>> {
        match self.0.get(name)? {
            None => Ok(None),
            Some(value) => value.downcast::<T>().map(Some).map_err(|_| {
                CompositeError::InvalidOperation(format!(
                    "property '{name}' is not of type {}",
                    std::any::type_name::<T>()
                ))
            }),
        }
    }

    /// Write property `name`.
    pub fn set<T: Any + Send + Sync>(&self, name: &str, value: T) -> CompositeResult<()> {
        self.0.set(name, Arc::new(value))
    }

    /// Whether the composite is still being constructed.
    pub fn is_prototype(&self) -> bool {
        self.0.is_prototype()
    }
}

impl fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle")
            .field("composite", &self.0.model.id)
            .field("prototype", &self.0.is_prototype())
            .finish()
    }
}

struct FragmentSlot {
    instance: FragmentInstance,
    per_call: Vec<usize>,
}

pub(crate) struct CompositeInner {
    pub(crate) model: Arc<CompositeModel>,
    pub(crate) owner: Weak<ModuleInstance>,
    pub(crate) app: Weak<ApplicationInner>,
    pub(crate) uses: Arc<UsesContainer>,
    pub(crate) state: Arc<CompositeState>,
    injection: Arc<InjectionService>,
    fragments: OnceLock<Vec<FragmentSlot>>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl CompositeInner {
    pub(crate) fn owner(&self) -> CompositeResult<Arc<ModuleInstance>> {
        self.owner
            .upgrade()
            .ok_or_else(|| {
                CompositeError::InvalidOperation("owning module was dropped".to_string())
            })
    }

    fn fragments(&self) -> CompositeResult<&[FragmentSlot]> {
        self.fragments.get().map(Vec::as_slice).ok_or_else(|| {
            CompositeError::InvalidOperation(format!(
                "composite {} is still being constructed",
                self.model.describe()
            ))
        })
    }

    fn call_for(
        self: &Arc<Self>,
        fragment: usize,
        site: &CallSite,
        args: Vec<Value>,
    ) -> CompositeResult<MethodCall> {
        let model = &self.model.fragments[fragment];
        let slot = &self.fragments()?[fragment];
        let mut injections = Injections::new();
        for point in slot.per_call.iter().map(|i| &model.decl.injection_points[*i]) {
            let ctx = ProvisionContext {
                composite: self,
                fragment: model,
                point,
                call: Some(site),
            };
            if let Some(value) = self.injection.provide(&ctx)? {
                injections.insert(&point.name, value);
            }
        }
        Ok(MethodCall {
            invocation: Arc::clone(&site.invocation),
            args,
            injections,
        })
    }

    /// Run the chain of `method` from `position`: concerns first, then the mixin.
    fn dispatch(
        self: &Arc<Self>,
        method: usize,
        position: usize,
        invocation: &Arc<InvocationInfo>,
        args: Vec<Value>,
    ) -> CompositeResult<Value> {
        let entry = &self.model.methods[method];
        let site = CallSite {
            method,
            position,
            invocation: Arc::clone(invocation),
            result: None,
        };
        let fragment = match entry.concerns.get(position) {
            Some(index) => *index,
            None => entry.mixin.ok_or_else(|| {
                CompositeError::InvalidOperation(format!("method '{}' has no mixin", entry.name))
            })?,
        };
        let mut call = self.call_for(fragment, &site, args)?;
        match &self.fragments()?[fragment].instance {
            FragmentInstance::Concern(concern) => concern.invoke(&mut call),
            FragmentInstance::Mixin(mixin) => mixin.invoke(&mut call),
            FragmentInstance::SideEffect(_) => Err(CompositeError::InvalidOperation(format!(
                "side-effect placed in the chain of '{}'",
                entry.name
            ))),
        }
    }

    fn run_side_effects(
        self: &Arc<Self>,
        method: usize,
        invocation: &Arc<InvocationInfo>,
        args: &[Value],
        outcome: &CompositeResult<Value>,
    ) {
        let entry = &self.model.methods[method];
        if entry.side_effects.is_empty() {
            return;
        }
        let site = CallSite {
            method,
            position: 0,
            invocation: Arc::clone(invocation),
            result: Some(Arc::new(SideEffectResult::of(outcome))),
        };
        for index in &entry.side_effects {
            let result = self.call_for(*index, &site, args.to_vec()).and_then(|call| {
                match &self.fragments()?[*index].instance {
                    FragmentInstance::SideEffect(side_effect) => side_effect.invoke(&call),
                    _ => Ok(()),
                }
            });
            if let Err(err) = result {
                warn!(
                    composite = %self.model.id,
                    method = %entry.name,
                    fragment = self.model.fragments[*index].decl.name(),
                    error = %err,
                    "Side-effect failed"
                );
            }
        }
    }
}

/// Build a composite of `model` owned by `owner`.
pub(crate) fn instantiate(
    owner: &Arc<ModuleInstance>,
    model: Arc<CompositeModel>,
    uses: Arc<UsesContainer>,
    prototype: Vec<(String, Value)>,
) -> CompositeResult<Composite> {
    let app = owner.application_inner()?;
    let state = Arc::new(CompositeState::new(Arc::clone(&model)));
    let inner = Arc::new(CompositeInner {
        model: Arc::clone(&model),
        owner: Arc::downgrade(owner),
        app: Arc::downgrade(&app),
        uses,
        state: Arc::clone(&state),
        injection: Arc::clone(&app.model.injection),
        fragments: OnceLock::new(),
        handlers: RwLock::new(HashMap::new()),
    });

    for property in model.properties() {
        if let Some(default) = &property.default {
            state.set(&property.name, Arc::clone(default))?;
        }
    }
    for (name, value) in prototype {
        state.set(&name, value)?;
    }

    let mut slots = Vec::with_capacity(model.fragments.len());
    for fragment in model.fragments() {
        let mut injections = Injections::new();
        let mut per_call = Vec::new();
        for (index, point) in fragment.decl.injection_points().iter().enumerate() {
            if inner.injection.timing_of(point.scope) == Some(InjectionTime::OnMethodInvocation) {
                per_call.push(index);
                continue;
            }
            let ctx = ProvisionContext {
                composite: &inner,
                fragment,
                point,
                call: None,
            };
            if let Some(value) = inner.injection.provide(&ctx)? {
                injections.insert(&point.name, value);
            }
        }
        debug!(
            composite = %model.id,
            fragment = fragment.decl.name(),
            injected = injections.len(),
            "Fragment instantiated"
        );
        slots.push(FragmentSlot {
            instance: fragment.decl.instantiate(&injections)?,
            per_call,
        });
    }
    if inner.fragments.set(slots).is_err() {
        return Err(CompositeError::InvalidOperation(
            "composite fragments initialised twice".to_string(),
        ));
    }

    state.seal()?;
    debug!(composite = %model.id, types = %model.describe(), "Composite instantiated");
    Ok(Composite { inner })
}

fn upgrade(weak: &Weak<CompositeInner>) -> CompositeResult<Arc<CompositeInner>> {
    weak.upgrade()
        .ok_or_else(|| CompositeError::InvalidOperation("composite was dropped".to_string()))
}

/// A live composite instance.
#[derive(Clone)]
pub struct Composite {
    inner: Arc<CompositeInner>,
}

impl Composite {
    /// Structural model of the composite.
    pub fn model(&self) -> &Arc<CompositeModel> {
        &self.inner.model
    }

    /// Composite id.
    pub fn id(&self) -> CompositeId {
        self.inner.model.id
    }

    /// Invoke the first method named `name`.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> CompositeResult<Value> {
        let method = self.inner.model.method(name).ok_or_else(|| {
            CompositeError::InvalidOperation(format!(
                "{} has no method '{name}'",
                self.inner.model.describe()
            ))
        })?;
        self.invoke_method(method.index, args)
    }

    /// Invoke the method at `index` of the method table.
    pub fn invoke_method(&self, index: usize, args: Vec<Value>) -> CompositeResult<Value> {
        let method = self.inner.model.methods.get(index).ok_or_else(|| {
            CompositeError::InvalidOperation(format!(
                "{} has no method at index {index}",
                self.inner.model.describe()
            ))
        })?;
        let invocation = Arc::new(InvocationInfo {
            composite: self.inner.model.id,
            method_index: index,
            method_name: method.name.clone(),
            declaring_type: method.declaring_type,
            attributes: method.attributes.clone(),
        });
        let outcome = self.inner.dispatch(index, 0, &invocation, args.clone());
        self.inner.run_side_effects(index, &invocation, &args, &outcome);
        outcome
    }

    /// Invoke `name` and downcast the result to `T`.
    pub fn call<T: Any + Send + Sync>(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> CompositeResult<Arc<T>> {
        self.invoke(name, args)?.downcast::<T>().map_err(|_| {
            CompositeError::InvalidOperation(format!(
                "method '{name}' did not return a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Property state.
    pub fn state(&self) -> StateHandle {
        StateHandle::new(Arc::clone(&self.inner.state))
    }

    /// Value of property `name`.
    pub fn property<T: Any + Send + Sync>(&self, name: &str) -> CompositeResult<Option<Arc<T>>> {
        self.state().get(name)
    }

    /// Write property `name`; immutable properties are rejected after construction.
    pub fn set_property<T: Any + Send + Sync>(&self, name: &str, value: T) -> CompositeResult<()> {
        self.state().set(name, value)
    }

    /// Subscribe `handler` to the event `name`.
    pub fn on_event<F>(&self, name: &str, handler: F) -> CompositeResult<()>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.require_event(name)?;
        self.inner
            .handlers
            .write()
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(handler));
        Ok(())
    }

    /// Raise the event `name`, returning how many handlers saw it.
    pub fn raise_event(&self, name: &str, payload: Value) -> CompositeResult<usize> {
        self.require_event(name)?;
        let handlers: Vec<EventHandler> = self
            .inner
            .handlers
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default();
        for handler in &handlers {
            handler(&payload);
        }
        Ok(handlers.len())
    }

    fn require_event(&self, name: &str) -> CompositeResult<()> {
        match self.inner.model.event(name) {
            Some(_) => Ok(()),
            None => Err(CompositeError::InvalidOperation(format!(
                "{} declares no event '{name}'",
                self.inner.model.describe()
            ))),
        }
    }

    /// Uses container of this instance.
    pub fn uses(&self) -> &Arc<UsesContainer> {
        &self.inner.uses
    }

    /// A weak handle to this composite.
    pub fn downgrade(&self) -> ThisRef {
        ThisRef::new(Arc::downgrade(&self.inner))
    }

    /// Whether both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Composite) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("id", &self.inner.model.id)
            .field("types", &self.inner.model.describe())
            .finish()
    }
}

/// Weak handle to a composite, injected into its own fragments.
#[derive(Debug, Clone)]
pub struct ThisRef(Weak<CompositeInner>);

impl ThisRef {
    pub(crate) fn new(inner: Weak<CompositeInner>) -> Self {
        Self(inner)
    }

    /// The composite, if it is still alive.
    pub fn get(&self) -> CompositeResult<Composite> {
        upgrade(&self.0).map(|inner| Composite { inner })
    }

    /// Invoke a method on the composite.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> CompositeResult<Value> {
        self.get()?.invoke(name, args)
    }
}

impl fmt::Debug for CompositeInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeInner")
            .field("id", &self.model.id)
            .field("fragments", &self.fragments.get().map(Vec::len))
            .finish()
    }
}
