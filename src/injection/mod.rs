//! Injection scopes and the strategy table that satisfies them.
//!
//! Every fragment declares its injection points explicitly. Each point names
//! a scope; the [`InjectionService`] maps scopes to strategies that decide at
//! validation time whether the point can be satisfied, and supply its value
//! at construction time or on every method call.

mod strategies;

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use crate::config::ApplicationConfig;
use crate::error::{CompositeResult, ConfigurationError, InjectionError};
use crate::model::{ApplicationModel, CompositeModel, FragmentModel};
use crate::runtime::{
    CallSite, CompositeInner, ConcernNext, InvocationInfo, ModuleInstance, SideEffectResult,
    StateHandle, Structure, ThisRef,
};
use crate::types::{TypeKey, Value};
use crate::uses::UsesContainer;

pub use strategies::{
    ConcernForInjection, InvocationInjection, ServiceInjection, SideEffectForInjection,
    StateInjection, StructureInjection, ThisInjection, UsesInjection,
};

/// Where an injected value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionScope {
    /// Framework structure: the owning module, application configuration
    Structure,
    /// A service composite visible from the owning module
    Service,
    /// The composite itself
    This,
    /// A value from the uses container chain
    Uses,
    /// The composite's property state
    State,
    /// The rest of the concern chain
    ConcernFor,
    /// The outcome observed by a side-effect
    SideEffectFor,
    /// The method call being served
    Invocation,
    /// An application-defined scope
    Custom(&'static str),
}

impl fmt::Display for InjectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionScope::Structure => f.write_str("Structure"),
            InjectionScope::Service => f.write_str("Service"),
            InjectionScope::This => f.write_str("This"),
            InjectionScope::Uses => f.write_str("Uses"),
            InjectionScope::State => f.write_str("State"),
            InjectionScope::ConcernFor => f.write_str("ConcernFor"),
            InjectionScope::SideEffectFor => f.write_str("SideEffectFor"),
            InjectionScope::Invocation => f.write_str("Invocation"),
            InjectionScope::Custom(name) => f.write_str(name),
        }
    }
}

/// When an injection point is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionTime {
    /// Once, while the composite is constructed
    #[default]
    OnCreation,
    /// Freshly on every composite method call
    OnMethodInvocation,
}

/// A named, scoped dependency of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPoint {
    pub(crate) name: String,
    pub(crate) scope: InjectionScope,
    pub(crate) target: TypeKey,
    pub(crate) optional: bool,
    pub(crate) qualifier: Option<String>,
    pub(crate) many: bool,
}

impl InjectionPoint {
    /// A point in an arbitrary scope requesting type `T`.
    pub fn new<T: ?Sized + 'static>(scope: InjectionScope, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope,
            target: TypeKey::of::<T>(),
            optional: false,
            qualifier: None,
            many: false,
        }
    }

    /// The visible service implementing `T`, injected as a `ServiceReference`.
    pub fn service<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new::<T>(InjectionScope::Service, name)
    }

    /// Every visible service implementing `T`, injected as `Vec<ServiceReference>`.
    pub fn services<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            many: true,
            ..Self::new::<T>(InjectionScope::Service, name)
        }
    }

    /// An unnamed uses value of type `T`.
    pub fn uses<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::new::<T>(InjectionScope::Uses, name)
    }

    /// A uses value of type `T` registered under `key`.
    pub fn uses_named<T: Any + Send + Sync>(
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            qualifier: Some(key.into()),
            ..Self::new::<T>(InjectionScope::Uses, name)
        }
    }

    /// The composite itself, viewed as public type `T`, injected as a `ThisRef`.
    pub fn this<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new::<T>(InjectionScope::This, name)
    }

    /// A structure value: `Structure` or `ApplicationConfig`.
    pub fn structure<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::new::<T>(InjectionScope::Structure, name)
    }

    /// The composite's `StateHandle`.
    pub fn state(name: impl Into<String>) -> Self {
        Self::new::<StateHandle>(InjectionScope::State, name)
    }

    /// The `ConcernNext` handle continuing the chain.
    pub fn concern_for(name: impl Into<String>) -> Self {
        Self::new::<ConcernNext>(InjectionScope::ConcernFor, name)
    }

    /// The `SideEffectResult` of the completed call.
    pub fn side_effect_for(name: impl Into<String>) -> Self {
        Self::new::<SideEffectResult>(InjectionScope::SideEffectFor, name)
    }

    /// The `InvocationInfo` of the current call.
    pub fn invocation(name: impl Into<String>) -> Self {
        Self::new::<InvocationInfo>(InjectionScope::Invocation, name)
    }

    /// A value of type `T` from an application-defined scope.
    pub fn custom<T: ?Sized + 'static>(scope: &'static str, name: impl Into<String>) -> Self {
        Self::new::<T>(InjectionScope::Custom(scope), name)
    }

    /// Leave the point empty instead of failing when no value is available.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Point name, used to fetch the value from [`Injections`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Injection scope.
    pub fn scope(&self) -> InjectionScope {
        self.scope
    }

    /// Requested type.
    pub fn target(&self) -> TypeKey {
        self.target
    }

    /// Whether the point may stay empty.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Name qualifier, used by named uses lookups.
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Whether every match is requested.
    pub fn is_many(&self) -> bool {
        self.many
    }
}

/// Values injected into a fragment, keyed by injection point name.
#[derive(Debug, Default, Clone)]
pub struct Injections {
    values: HashMap<String, Value>,
}

impl Injections {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// The value injected under `name`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> CompositeResult<Arc<T>> {
        self.get_optional(name)?
            .ok_or_else(|| InjectionError::Missing(name.to_string()).into())
    }

    /// The value injected under `name`, or `None` for an empty optional point.
    pub fn get_optional<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> CompositeResult<Option<Arc<T>>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(value) => Arc::clone(value).downcast::<T>().map(Some).map_err(|_| {
                InjectionError::TypeMismatch {
                    name: name.to_string(),
                    expected: std::any::type_name::<T>().to_string(),
                }
                .into()
            }),
        }
    }

    /// Whether a value was injected under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of injected values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was injected.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a strategy sees when deciding whether a point can be satisfied.
#[derive(Debug)]
pub struct ValidationContext<'a> {
    pub(crate) application: &'a ApplicationModel,
    pub(crate) composite: &'a CompositeModel,
    pub(crate) fragment: &'a FragmentModel,
    pub(crate) point: &'a InjectionPoint,
}

impl<'a> ValidationContext<'a> {
    /// The application model being validated.
    pub fn application(&self) -> &'a ApplicationModel {
        self.application
    }

    /// The composite declaring the fragment.
    pub fn composite(&self) -> &'a CompositeModel {
        self.composite
    }

    /// The fragment declaring the point.
    pub fn fragment(&self) -> &'a FragmentModel {
        self.fragment
    }

    /// The injection point.
    pub fn point(&self) -> &'a InjectionPoint {
        self.point
    }
}

/// What a strategy sees when supplying a value.
pub struct ProvisionContext<'a> {
    pub(crate) composite: &'a Arc<CompositeInner>,
    pub(crate) fragment: &'a FragmentModel,
    pub(crate) point: &'a InjectionPoint,
    pub(crate) call: Option<&'a CallSite>,
}

impl<'a> ProvisionContext<'a> {
    /// Model of the composite being served.
    pub fn composite(&self) -> &CompositeModel {
        &self.composite.model
    }

    /// The fragment declaring the point.
    pub fn fragment(&self) -> &'a FragmentModel {
        self.fragment
    }

    /// The injection point.
    pub fn point(&self) -> &'a InjectionPoint {
        self.point
    }

    /// The composite instance's uses container.
    pub fn uses(&self) -> &Arc<UsesContainer> {
        &self.composite.uses
    }

    /// The current call, for method-invocation timed points.
    pub fn invocation(&self) -> Option<&Arc<InvocationInfo>> {
        self.call.map(|c| &c.invocation)
    }

    /// A weak handle to the composite.
    pub fn this(&self) -> ThisRef {
        ThisRef::new(Arc::downgrade(self.composite))
    }

    /// Structure handle of the module owning the composite.
    pub fn structure(&self) -> Structure {
        Structure::new(Weak::clone(&self.composite.owner))
    }

    /// Configuration of the running application, if it is still alive.
    pub fn application_config(&self) -> Option<ApplicationConfig> {
        self.composite
            .app
            .upgrade()
            .map(|app| app.model.config().clone())
    }

    pub(crate) fn owner(&self) -> CompositeResult<Arc<ModuleInstance>> {
        self.composite.owner()
    }
}

impl fmt::Debug for ProvisionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionContext")
            .field("composite", &self.composite.model.id)
            .field("fragment", &self.fragment.decl.name())
            .field("point", &self.point.name)
            .field("call", &self.call.map(|c| c.invocation.method_name()))
            .finish()
    }
}

/// Strategy for one injection scope.
pub trait InjectionFunctionality: Send + Sync + Debug {
    /// When points of this scope are filled.
    fn timing(&self) -> InjectionTime {
        InjectionTime::OnCreation
    }

    /// Whether the point can be satisfied; `Err` carries the reason.
    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String>;

    /// Supply the value, or `None` if none is available right now.
    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>>;
}

/// Table of injection strategies keyed by scope.
#[derive(Debug, Clone)]
pub struct InjectionService {
    strategies: HashMap<InjectionScope, Arc<dyn InjectionFunctionality>>,
}

impl Default for InjectionService {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectionService {
    /// Create a table with every built-in scope.
    pub fn new() -> Self {
        let mut service = Self {
            strategies: HashMap::new(),
        };
        service.register(InjectionScope::Structure, Arc::new(StructureInjection));
        service.register(InjectionScope::Service, Arc::new(ServiceInjection));
        service.register(InjectionScope::This, Arc::new(ThisInjection));
        service.register(InjectionScope::Uses, Arc::new(UsesInjection));
        service.register(InjectionScope::State, Arc::new(StateInjection));
        service.register(InjectionScope::ConcernFor, Arc::new(ConcernForInjection));
        service.register(InjectionScope::SideEffectFor, Arc::new(SideEffectForInjection));
        service.register(InjectionScope::Invocation, Arc::new(InvocationInjection));
        service
    }

    /// Register or replace the strategy for a scope.
    pub fn register(&mut self, scope: InjectionScope, strategy: Arc<dyn InjectionFunctionality>) {
        self.strategies.insert(scope, strategy);
    }

    /// The strategy for a scope.
    pub fn get(&self, scope: InjectionScope) -> Option<&Arc<dyn InjectionFunctionality>> {
        self.strategies.get(&scope)
    }

    /// When points of `scope` are filled, if the scope is registered.
    pub fn timing_of(&self, scope: InjectionScope) -> Option<InjectionTime> {
        self.get(scope).map(|s| s.timing())
    }

    /// Fill one point, enforcing optionality.
    pub(crate) fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        let point = ctx.point;
        let strategy = self
            .get(point.scope)
            .ok_or_else(|| ConfigurationError::UnregisteredScope(point.scope.to_string()))?;
        match strategy.provide(ctx)? {
            Some(value) => Ok(Some(value)),
            None if point.optional => Ok(None),
            None => Err(InjectionError::NotPossible {
                scope: point.scope.to_string(),
                name: point.name.clone(),
                target: point.target.to_string(),
                reason: "no value available".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositeError;
    use crate::types::value;

    #[test]
    fn test_injections_typed_access() {
        let mut injections = Injections::new();
        injections.insert("port", value(8080u16));

        assert_eq!(*injections.get::<u16>("port").unwrap(), 8080);
        assert!(matches!(
            injections.get::<String>("port"),
            Err(CompositeError::Injection(InjectionError::TypeMismatch { .. }))
        ));
        assert!(matches!(
            injections.get::<u16>("host"),
            Err(CompositeError::Injection(InjectionError::Missing(_)))
        ));
        assert!(injections.get_optional::<u16>("host").unwrap().is_none());
    }

    #[test]
    fn test_builtin_timings() {
        let service = InjectionService::new();
        assert_eq!(service.timing_of(InjectionScope::Service), Some(InjectionTime::OnCreation));
        assert_eq!(service.timing_of(InjectionScope::Uses), Some(InjectionTime::OnCreation));
        assert_eq!(
            service.timing_of(InjectionScope::Invocation),
            Some(InjectionTime::OnMethodInvocation)
        );
        assert_eq!(
            service.timing_of(InjectionScope::ConcernFor),
            Some(InjectionTime::OnMethodInvocation)
        );
        assert_eq!(service.timing_of(InjectionScope::Custom("request")), None);
    }

    #[test]
    fn test_point_constructors() {
        let point = InjectionPoint::uses_named::<u16>("port", "http").optional();
        assert_eq!(point.scope(), InjectionScope::Uses);
        assert_eq!(point.qualifier(), Some("http"));
        assert!(point.is_optional());
        assert_eq!(point.target(), TypeKey::of::<u16>());

        let many = InjectionPoint::services::<dyn std::fmt::Debug>("all");
        assert!(many.is_many());
        assert_eq!(InjectionPoint::state("s").target(), TypeKey::of::<StateHandle>());
    }
}
