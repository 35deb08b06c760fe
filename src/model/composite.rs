//! Composite models and their method-composition tables.

use std::fmt;
use std::sync::Arc;

use crate::assembly::CompositeAssemblyInfo;
use crate::error::CompositeResult;
use crate::model::application::ModuleId;
use crate::model::decl::{Constraint, PublicType};
use crate::model::fragment::{FragmentDecl, FragmentKind};
use crate::runtime::Composite;
use crate::support::CompositeModelType;
use crate::types::{type_list, TypeKey, Value};
use crate::uses::UsesContainer;

/// Identifier of a composite model, unique within one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeId(pub(crate) u64);

impl CompositeId {
    /// Numeric value of the id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hook run against a service composite when it is activated or passivated.
pub type LifecycleHook = Arc<dyn Fn(&Composite) -> CompositeResult<()> + Send + Sync>;

/// Activation data of service-backed composites.
#[derive(Clone, Default)]
pub struct ServiceLifecycle {
    pub(crate) activate_with_application: bool,
    pub(crate) activators: Vec<LifecycleHook>,
    pub(crate) passivators: Vec<LifecycleHook>,
}

impl ServiceLifecycle {
    /// Whether the service is activated eagerly by `Application::activate`.
    pub fn activate_with_application(&self) -> bool {
        self.activate_with_application
    }

    /// Whether no lifecycle data was declared.
    pub fn is_empty(&self) -> bool {
        !self.activate_with_application && self.activators.is_empty() && self.passivators.is_empty()
    }
}

impl fmt::Debug for ServiceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLifecycle")
            .field("activate_with_application", &self.activate_with_application)
            .field("activators", &self.activators.len())
            .field("passivators", &self.passivators.len())
            .finish()
    }
}

/// A fragment as placed in a composite.
#[derive(Debug, Clone)]
pub struct FragmentModel {
    pub(crate) index: usize,
    pub(crate) declared_as: FragmentKind,
    pub(crate) decl: FragmentDecl,
}

impl FragmentModel {
    /// Position in the composite's fragment list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Role the fragment was declared in.
    pub fn declared_as(&self) -> FragmentKind {
        self.declared_as
    }

    /// The fragment declaration.
    pub fn decl(&self) -> &FragmentDecl {
        &self.decl
    }
}

/// One entry of the method-composition table.
#[derive(Debug, Clone)]
pub struct CompositeMethodModel {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) declaring_type: TypeKey,
    pub(crate) attributes: Vec<String>,
    pub(crate) concerns: Vec<usize>,
    pub(crate) mixin: Option<usize>,
    pub(crate) side_effects: Vec<usize>,
}

impl CompositeMethodModel {
    /// Stable position in the method table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public type declaring the method.
    pub fn declaring_type(&self) -> TypeKey {
        self.declaring_type
    }

    /// Declared attributes.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Whether the method carries `attribute`.
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    /// Fragment indices of the concern chain, outermost first.
    pub fn concerns(&self) -> &[usize] {
        &self.concerns
    }

    /// Fragment index of the implementing mixin.
    pub fn mixin(&self) -> Option<usize> {
        self.mixin
    }

    /// Fragment indices of the side-effect chain.
    pub fn side_effects(&self) -> &[usize] {
        &self.side_effects
    }
}

/// A property in a composite's state.
#[derive(Debug, Clone)]
pub struct CompositePropertyModel {
    pub(crate) name: String,
    pub(crate) declaring_type: TypeKey,
    pub(crate) value_type: TypeKey,
    pub(crate) immutable: bool,
    pub(crate) optional: bool,
    pub(crate) default: Option<Value>,
    pub(crate) constraints: Vec<Constraint>,
}

impl CompositePropertyModel {
    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public type declaring the property.
    pub fn declaring_type(&self) -> TypeKey {
        self.declaring_type
    }

    /// Type of the property's values.
    pub fn value_type(&self) -> TypeKey {
        self.value_type
    }

    /// Writable only during the prototype stage.
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// May remain unset.
    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// An event a composite can raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeEventModel {
    pub(crate) name: String,
    pub(crate) declaring_type: TypeKey,
}

impl CompositeEventModel {
    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public type declaring the event.
    pub fn declaring_type(&self) -> TypeKey {
        self.declaring_type
    }
}

/// Immutable structural description of one declared composite.
#[derive(Debug)]
pub struct CompositeModel {
    pub(crate) id: CompositeId,
    pub(crate) model_type: CompositeModelType,
    pub(crate) public_types: Vec<TypeKey>,
    pub(crate) fragments: Vec<FragmentModel>,
    pub(crate) methods: Vec<CompositeMethodModel>,
    pub(crate) properties: Vec<CompositePropertyModel>,
    pub(crate) events: Vec<CompositeEventModel>,
    pub(crate) uses: Arc<UsesContainer>,
    pub(crate) location: Option<ModuleId>,
    pub(crate) lifecycle: ServiceLifecycle,
}

impl CompositeModel {
    /// Promote an assembly info into a model placed at `location`.
    ///
    /// Fragments are ordered mixins, then concerns, then side-effects, each in
    /// declaration order. Every method gets the first applicable mixin and all
    /// applicable concerns and side-effects.
    pub fn from_info(info: CompositeAssemblyInfo, location: Option<ModuleId>) -> Self {
        let CompositeAssemblyInfo {
            id,
            model_type,
            types,
            mixins,
            concerns,
            side_effects,
            uses,
            lifecycle,
            ..
        } = info;

        let fragments: Vec<FragmentModel> = mixins
            .into_iter()
            .map(|d| (FragmentKind::Mixin, d))
            .chain(concerns.into_iter().map(|d| (FragmentKind::Concern, d)))
            .chain(side_effects.into_iter().map(|d| (FragmentKind::SideEffect, d)))
            .enumerate()
            .map(|(index, (declared_as, decl))| FragmentModel {
                index,
                declared_as,
                decl,
            })
            .collect();

        let mut public_types = Vec::new();
        let mut methods: Vec<CompositeMethodModel> = Vec::new();
        let mut properties = Vec::new();
        let mut events = Vec::new();

        for PublicType {
            key,
            methods: method_decls,
            properties: property_decls,
            events: event_decls,
        } in types
        {
            if !public_types.contains(&key) {
                public_types.push(key);
            }
            for decl in method_decls {
                if methods
                    .iter()
                    .any(|m| m.declaring_type == key && m.name == decl.name)
                {
                    continue;
                }
                let applies =
                    |kind| applicable(&fragments, kind, &decl.name, key, &decl.attributes);
                let mixin = applies(FragmentKind::Mixin).first().copied();
                let concerns = applies(FragmentKind::Concern);
                let side_effects = applies(FragmentKind::SideEffect);
                methods.push(CompositeMethodModel {
                    index: methods.len(),
                    name: decl.name,
                    declaring_type: key,
                    attributes: decl.attributes,
                    concerns,
                    mixin,
                    side_effects,
                });
            }
            for decl in property_decls {
                if properties
                    .iter()
                    .any(|p: &CompositePropertyModel| p.name == decl.name)
                {
                    continue;
                }
                properties.push(CompositePropertyModel {
                    name: decl.name,
                    declaring_type: key,
                    value_type: decl.value_type,
                    immutable: decl.immutable,
                    optional: decl.optional,
                    default: decl.default,
                    constraints: decl.constraints,
                });
            }
            for decl in event_decls {
                if !events.iter().any(|e: &CompositeEventModel| e.name == decl.name) {
                    events.push(CompositeEventModel {
                        name: decl.name,
                        declaring_type: key,
                    });
                }
            }
        }

        Self {
            id,
            model_type,
            public_types,
            fragments,
            methods,
            properties,
            events,
            uses,
            location,
            lifecycle,
        }
    }

    /// Composite id.
    pub fn id(&self) -> CompositeId {
        self.id
    }

    /// Composite model type tag.
    pub fn model_type(&self) -> CompositeModelType {
        self.model_type
    }

    /// Public types in declaration order.
    pub fn public_types(&self) -> &[TypeKey] {
        &self.public_types
    }

    /// Whether every requested type is one of the public types.
    pub fn implements(&self, types: &[TypeKey]) -> bool {
        types.iter().all(|t| self.public_types.contains(t))
    }

    /// Fragment list.
    pub fn fragments(&self) -> &[FragmentModel] {
        &self.fragments
    }

    /// Method table.
    pub fn methods(&self) -> &[CompositeMethodModel] {
        &self.methods
    }

    /// First method with the given name.
    pub fn method(&self, name: &str) -> Option<&CompositeMethodModel> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Property models.
    pub fn properties(&self) -> &[CompositePropertyModel] {
        &self.properties
    }

    /// Property with the given name.
    pub fn property(&self, name: &str) -> Option<&CompositePropertyModel> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Event models.
    pub fn events(&self) -> &[CompositeEventModel] {
        &self.events
    }

    /// Event with the given name.
    pub fn event(&self, name: &str) -> Option<&CompositeEventModel> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Uses container scoped to this composite.
    pub fn uses(&self) -> &Arc<UsesContainer> {
        &self.uses
    }

    /// Module the composite is placed in; `None` in singleton applications.
    pub fn location(&self) -> Option<ModuleId> {
        self.location
    }

    /// Service lifecycle declarations.
    pub fn lifecycle(&self) -> &ServiceLifecycle {
        &self.lifecycle
    }

    /// Public types rendered for diagnostics.
    pub fn describe(&self) -> String {
        type_list(&self.public_types)
    }
}

fn applicable(
    fragments: &[FragmentModel],
    kind: FragmentKind,
    name: &str,
    declaring_type: TypeKey,
    attributes: &[String],
) -> Vec<usize> {
    fragments
        .iter()
        .filter(|f| f.declared_as == kind && f.decl.kind() == kind)
        .filter(|f| f.decl.applies_to.matches(name, declaring_type, attributes))
        .map(|f| f.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositeResult;
    use crate::model::decl::MethodDecl;
    use crate::model::fragment::{AppliesTo, Concern, Mixin, SideEffect};
    use crate::runtime::MethodCall;
    use crate::types::unit;

    trait Store {}
    trait Clock {}

    struct M;
    impl Mixin for M {
        fn invoke(&self, _call: &mut MethodCall) -> CompositeResult<Value> {
            Ok(unit())
        }
    }

    struct C;
    impl Concern for C {
        fn invoke(&self, _call: &mut MethodCall) -> CompositeResult<Value> {
            Ok(unit())
        }
    }

    struct S;
    impl SideEffect for S {
        fn invoke(&self, _call: &MethodCall) -> CompositeResult<()> {
            Ok(())
        }
    }

    fn info() -> CompositeAssemblyInfo {
        CompositeAssemblyInfo::new(CompositeId(7), CompositeModelType::PLAIN, &UsesContainer::new())
    }

    #[test]
    fn test_method_table_assigns_chains() {
        let mut info = info();
        info.types.push(
            PublicType::of::<dyn Store>()
                .method("load")
                .method_with(MethodDecl::new("save").attribute("tx")),
        );
        info.types.push(PublicType::of::<dyn Clock>().method("now"));
        info.mixins
            .push(FragmentDecl::mixin(|_| Ok(M)).applies_to(AppliesTo::type_of::<dyn Clock>()));
        info.mixins.push(FragmentDecl::mixin(|_| Ok(M)));
        info.concerns.push(FragmentDecl::concern(|_| Ok(C)).applies_to(AppliesTo::attribute("tx")));
        info.side_effects.push(FragmentDecl::side_effect(|_| Ok(S)));

        let model = CompositeModel::from_info(info, None);

        assert_eq!(model.id(), CompositeId(7));
        assert_eq!(model.methods().len(), 3);
        let load = model.method("load").unwrap();
        assert_eq!(load.mixin(), Some(1));
        assert!(load.concerns().is_empty());
        let save = model.method("save").unwrap();
        assert_eq!(save.concerns(), &[2]);
        assert_eq!(save.side_effects(), &[3]);
        assert!(save.has_attribute("tx"));
        let now = model.method("now").unwrap();
        assert_eq!(now.index(), 2);
        assert_eq!(now.mixin(), Some(0));
    }

    #[test]
    fn test_misdeclared_fragment_is_left_out_of_chains() {
        let mut info = info();
        info.types.push(PublicType::of::<dyn Store>().method("load"));
        info.mixins.push(FragmentDecl::concern(|_| Ok(C)));

        let model = CompositeModel::from_info(info, None);

        assert_eq!(model.fragments().len(), 1);
        assert_eq!(model.method("load").unwrap().mixin(), None);
    }

    #[test]
    fn test_implements_requires_every_type() {
        let mut info = info();
        info.types.push(PublicType::of::<dyn Store>());
        info.types.push(PublicType::of::<dyn Store>());
        let model = CompositeModel::from_info(info, None);

        assert_eq!(model.public_types().len(), 1);
        assert!(model.implements(&[TypeKey::of::<dyn Store>()]));
        assert!(!model.implements(&[TypeKey::of::<dyn Store>(), TypeKey::of::<dyn Clock>()]));
        assert!(model.implements(&[]));
    }
}
