//! Fragments: the mixins, concerns and side-effects composites are built from.

use std::fmt;
use std::sync::Arc;

use crate::error::CompositeResult;
use crate::injection::{InjectionPoint, Injections};
use crate::runtime::MethodCall;
use crate::types::{TypeKey, Value};

/// Implements composite methods. Exactly one mixin runs per method call.
pub trait Mixin: Send + Sync {
    /// Handle a method call.
    fn invoke(&self, call: &mut MethodCall) -> CompositeResult<Value>;
}

/// Wraps composite methods. A concern continues the chain through its
/// `ConcernFor` injection; not proceeding short-circuits the call.
pub trait Concern: Send + Sync {
    /// Handle a method call before the rest of the chain.
    fn invoke(&self, call: &mut MethodCall) -> CompositeResult<Value>;
}

/// Observes completed composite method calls.
///
/// The outcome is available through a `SideEffectFor` injection. Failures
/// are logged and do not change the caller's result.
pub trait SideEffect: Send + Sync {
    /// React to a completed call.
    fn invoke(&self, call: &MethodCall) -> CompositeResult<()>;
}

/// Role of a fragment in a method-composition chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Method implementation
    Mixin,
    /// Method interceptor
    Concern,
    /// Post-call observer
    SideEffect,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentKind::Mixin => f.write_str("mixin"),
            FragmentKind::Concern => f.write_str("concern"),
            FragmentKind::SideEffect => f.write_str("side-effect"),
        }
    }
}

/// Which composite methods a fragment applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliesTo {
    /// Every method
    All,
    /// Methods with one of these names
    Methods(Vec<String>),
    /// Methods declared by this public type
    Type(TypeKey),
    /// Methods carrying this attribute
    Attribute(String),
}

impl AppliesTo {
    /// Methods with the given names.
    pub fn methods<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AppliesTo::Methods(names.into_iter().map(Into::into).collect())
    }

    /// Methods declared by `T`.
    pub fn type_of<T: ?Sized + 'static>() -> Self {
        AppliesTo::Type(TypeKey::of::<T>())
    }

    /// Methods carrying `attribute`.
    pub fn attribute(attribute: impl Into<String>) -> Self {
        AppliesTo::Attribute(attribute.into())
    }

    pub(crate) fn matches(
        &self,
        name: &str,
        declaring_type: TypeKey,
        attributes: &[String],
    ) -> bool {
        match self {
            AppliesTo::All => true,
            AppliesTo::Methods(names) => names.iter().any(|n| n == name),
            AppliesTo::Type(ty) => *ty == declaring_type,
            AppliesTo::Attribute(attr) => attributes.iter().any(|a| a == attr),
        }
    }
}

type MixinFactory = dyn Fn(&Injections) -> CompositeResult<Box<dyn Mixin>> + Send + Sync;
type ConcernFactory = dyn Fn(&Injections) -> CompositeResult<Box<dyn Concern>> + Send + Sync;
type SideEffectFactory = dyn Fn(&Injections) -> CompositeResult<Box<dyn SideEffect>> + Send + Sync;

#[derive(Clone)]
pub(crate) enum FragmentFactory {
    Mixin(Arc<MixinFactory>),
    Concern(Arc<ConcernFactory>),
    SideEffect(Arc<SideEffectFactory>),
}

/// A live fragment owned by one composite instance.
pub(crate) enum FragmentInstance {
    Mixin(Box<dyn Mixin>),
    Concern(Box<dyn Concern>),
    SideEffect(Box<dyn SideEffect>),
}

/// Declaration of a fragment: its factory, applicability and injection points.
#[derive(Clone)]
pub struct FragmentDecl {
    pub(crate) name: &'static str,
    pub(crate) applies_to: AppliesTo,
    pub(crate) injection_points: Vec<InjectionPoint>,
    pub(crate) factory: FragmentFactory,
}

impl FragmentDecl {
    /// Declare a mixin built by `factory` from its on-creation injections.
    pub fn mixin<M, F>(factory: F) -> Self
    where
        M: Mixin + 'static,
        F: Fn(&Injections) -> CompositeResult<M> + Send + Sync + 'static,
    {
        Self::with_factory(
            std::any::type_name::<M>(),
            FragmentFactory::Mixin(Arc::new(move |inj: &Injections| {
                factory(inj).map(|m| Box::new(m) as Box<dyn Mixin>)
            })),
        )
    }

    /// Declare a concern built by `factory` from its on-creation injections.
    pub fn concern<C, F>(factory: F) -> Self
    where
        C: Concern + 'static,
        F: Fn(&Injections) -> CompositeResult<C> + Send + Sync + 'static,
    {
        Self::with_factory(
            std::any::type_name::<C>(),
            FragmentFactory::Concern(Arc::new(move |inj: &Injections| {
                factory(inj).map(|c| Box::new(c) as Box<dyn Concern>)
            })),
        )
    }

    /// Declare a side-effect built by `factory` from its on-creation injections.
    pub fn side_effect<S, F>(factory: F) -> Self
    where
        S: SideEffect + 'static,
        F: Fn(&Injections) -> CompositeResult<S> + Send + Sync + 'static,
    {
        Self::with_factory(
            std::any::type_name::<S>(),
            FragmentFactory::SideEffect(Arc::new(move |inj: &Injections| {
                factory(inj).map(|s| Box::new(s) as Box<dyn SideEffect>)
            })),
        )
    }

    fn with_factory(name: &'static str, factory: FragmentFactory) -> Self {
        Self {
            name,
            applies_to: AppliesTo::All,
            injection_points: Vec::new(),
            factory,
        }
    }

    /// Restrict the methods this fragment applies to. Defaults to [`AppliesTo::All`].
    pub fn applies_to(mut self, applies_to: AppliesTo) -> Self {
        self.applies_to = applies_to;
        self
    }

    /// Declare an injection point.
    pub fn inject(mut self, point: InjectionPoint) -> Self {
        self.injection_points.push(point);
        self
    }

    /// Fragment type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The fragment's role, fixed by the type it was declared with.
    pub fn kind(&self) -> FragmentKind {
        match self.factory {
            FragmentFactory::Mixin(_) => FragmentKind::Mixin,
            FragmentFactory::Concern(_) => FragmentKind::Concern,
            FragmentFactory::SideEffect(_) => FragmentKind::SideEffect,
        }
    }

    /// Declared injection points.
    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    pub(crate) fn instantiate(&self, injections: &Injections) -> CompositeResult<FragmentInstance> {
        match &self.factory {
            FragmentFactory::Mixin(f) => f(injections).map(FragmentInstance::Mixin),
            FragmentFactory::Concern(f) => f(injections).map(FragmentInstance::Concern),
            FragmentFactory::SideEffect(f) => f(injections).map(FragmentInstance::SideEffect),
        }
    }
}

impl fmt::Debug for FragmentDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentDecl")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("applies_to", &self.applies_to)
            .field("injection_points", &self.injection_points)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::unit;

    struct Noop;

    impl Mixin for Noop {
        fn invoke(&self, _call: &mut MethodCall) -> CompositeResult<Value> {
            Ok(unit())
        }
    }

    struct Audit;

    impl SideEffect for Audit {
        fn invoke(&self, _call: &MethodCall) -> CompositeResult<()> {
            Ok(())
        }
    }

    trait Repo {}

    #[test]
    fn test_fragment_kind_follows_constructor() {
        let mixin = FragmentDecl::mixin(|_| Ok(Noop));
        let side_effect = FragmentDecl::side_effect(|_| Ok(Audit));

        assert_eq!(mixin.kind(), FragmentKind::Mixin);
        assert_eq!(side_effect.kind(), FragmentKind::SideEffect);
        assert!(mixin.name().ends_with("Noop"));
    }

    #[test]
    fn test_applies_to_rules() {
        let attrs = vec!["cached".to_string()];
        let repo = TypeKey::of::<dyn Repo>();

        assert!(AppliesTo::All.matches("load", repo, &[]));
        assert!(AppliesTo::methods(["load", "save"]).matches("save", repo, &[]));
        assert!(!AppliesTo::methods(["load"]).matches("save", repo, &[]));
        assert!(AppliesTo::type_of::<dyn Repo>().matches("load", repo, &[]));
        assert!(!AppliesTo::type_of::<String>().matches("load", repo, &[]));
        assert!(AppliesTo::attribute("cached").matches("load", repo, &attrs));
        assert!(!AppliesTo::attribute("cached").matches("load", repo, &[]));
    }
}
