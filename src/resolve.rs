//! Visibility-scoped composite resolution.
//!
//! A search from a module yields, in order:
//!
//! 1. every composite of the module itself,
//! 2. composites of the other modules of its layer visible at [`Visibility::Layer`] or wider,
//! 3. composites of every module of every transitively used layer visible at
//!    [`Visibility::Application`].
//!
//! The scopes are concatenated lazily. A composite reachable through several
//! layer paths is yielded once per path; consumers needing uniqueness compare
//! composite ids.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{ResolutionError, ResolutionResult};
use crate::model::{ApplicationModel, CompositeId, CompositeModel, LayerId, ModuleId, Visibility};
use crate::support::CompositeModelType;
use crate::types::{type_list, TypeKey};

/// Lazy sequence of visible composite models.
pub type Visible<'a> = Box<dyn Iterator<Item = &'a Arc<CompositeModel>> + 'a>;

/// Resolver over one application model.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    model: &'a ApplicationModel,
}

impl<'a> Resolver<'a> {
    /// Create a resolver for `model`.
    pub fn new(model: &'a ApplicationModel) -> Self {
        Self { model }
    }

    /// Every composite visible from `from` that satisfies `predicate`.
    ///
    /// Singleton applications, and searches without a starting module, see
    /// every composite.
    pub fn visible<P>(&self, from: Option<ModuleId>, predicate: P) -> Visible<'a>
    where
        P: Fn(&CompositeModel) -> bool + 'a,
    {
        let model = self.model;
        let module = match from.and_then(|id| model.module(id)) {
            Some(module) if model.is_layered() => module,
            _ => return Box::new(model.composite_models().filter(move |c| predicate(c))),
        };
        let predicate = Rc::new(predicate);

        let p = Rc::clone(&predicate);
        let own = module
            .composites
            .iter()
            .filter_map(move |id| model.composite(*id))
            .filter(move |c| p(c));

        let siblings: Vec<ModuleId> = model
            .layer(module.layer)
            .map(|layer| layer.modules.iter().copied().filter(|m| *m != module.id).collect())
            .unwrap_or_default();
        let p = Rc::clone(&predicate);
        let layer_scope = siblings
            .into_iter()
            .flat_map(move |m| scoped(model, m, Visibility::Layer))
            .filter(move |c| p(c));

        let application_scope = used_layers(model, module.layer)
            .into_iter()
            .filter_map(move |l| model.layer(l))
            .flat_map(|layer| layer.modules.iter().copied())
            .flat_map(move |m| scoped(model, m, Visibility::Application))
            .filter(move |c| predicate(c));

        Box::new(own.chain(layer_scope).chain(application_scope))
    }

    /// Composites of `model_type` visible from `from` implementing every
    /// type in `types`.
    pub fn of_type(
        &self,
        from: Option<ModuleId>,
        model_type: CompositeModelType,
        types: &[TypeKey],
    ) -> Visible<'a> {
        let requested = types.to_vec();
        self.visible(from, move |c| {
            c.model_type == model_type && c.implements(&requested)
        })
    }

    /// The single composite of `model_type` implementing every type in `types`.
    ///
    /// Candidates come from the registered support of `model_type`. An empty
    /// type list matches nothing. The search stops at the second distinct
    /// match.
    pub fn resolve_unique(
        &self,
        from: Option<ModuleId>,
        model_type: CompositeModelType,
        types: &[TypeKey],
    ) -> ResolutionResult<&'a Arc<CompositeModel>> {
        let not_found = || ResolutionError::NotFound {
            model_type: model_type.to_string(),
            requested: type_list(types),
            location: self.model.location_name(from),
        };
        if types.is_empty() {
            return Err(not_found());
        }

        let mut matches = match self.model.registry.get(model_type) {
            Some(support) => support.visible_models(*self, from, types),
            None => self.of_type(from, model_type, types),
        };
        let Some(first) = matches.next() else {
            return Err(not_found());
        };
        match matches.find(|c| c.id != first.id) {
            None => Ok(first),
            Some(other) => Err(ResolutionError::Ambiguous {
                model_type: model_type.to_string(),
                requested: type_list(types),
                location: self.model.location_name(from),
                candidates: vec![first.describe(), other.describe()],
            }),
        }
    }

    /// Service-backed composites implementing `service_type`, deduplicated,
    /// in scope order.
    pub fn find_services(
        &self,
        from: Option<ModuleId>,
        service_type: TypeKey,
    ) -> Vec<CompositeId> {
        let model = self.model;
        let mut seen = HashSet::new();
        self.visible(from, move |c| {
            model.is_service_backed(c) && c.public_types.contains(&service_type)
        })
        .map(|c| c.id)
        .filter(|id| seen.insert(*id))
        .collect()
    }
}

/// Composites of `module` declared at `min` visibility or wider.
fn scoped<'a>(
    model: &'a ApplicationModel,
    module: ModuleId,
    min: Visibility,
) -> impl Iterator<Item = &'a Arc<CompositeModel>> + 'a {
    model.module(module).into_iter().flat_map(move |m| {
        m.composites
            .iter()
            .filter_map(move |id| model.composite(*id))
            .filter(move |c| m.visibility_of(c).unwrap_or_default() >= min)
    })
}

/// Layers reachable from `origin` breadth-first, once per usage edge.
///
/// Every layer's own usages are expanded once, so shared layers repeat but
/// cycles terminate.
fn used_layers(model: &ApplicationModel, origin: LayerId) -> Vec<LayerId> {
    let mut reached = Vec::new();
    let mut expanded = HashSet::from([origin]);
    let mut queue = VecDeque::from([origin]);
    while let Some(current) = queue.pop_front() {
        let Some(layer) = model.layer(current) else {
            continue;
        };
        for used in &layer.used_layers {
            reached.push(*used);
            if expanded.insert(*used) {
                queue.push_back(*used);
            }
        }
    }
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::LayeredArchitecture;
    use crate::error::CompositeResult;
    use crate::model::{FragmentDecl, Mixin, PublicType};
    use crate::runtime::MethodCall;
    use crate::types::{unit, Value};

    trait Repository {}

    struct Noop;
    impl Mixin for Noop {
        fn invoke(&self, _call: &mut MethodCall) -> CompositeResult<Value> {
            Ok(unit())
        }
    }

    fn declare(arch: &mut LayeredArchitecture, layer: &str, module: &str, visibility: Visibility) {
        let l = arch.get_or_create_layer(layer);
        let m = arch.get_or_create_module(l, module);
        arch.assembler(m)
            .new_plain_composite()
            .unwrap()
            .of_types([PublicType::of::<dyn Repository>()])
            .with_mixins([FragmentDecl::mixin(|_| Ok(Noop))])
            .visible_in(visibility);
    }

    #[test]
    fn test_diamond_yields_duplicates_but_resolves_once() {
        let mut arch = LayeredArchitecture::new();
        let a = arch.get_or_create_layer("a");
        let b = arch.get_or_create_layer("b");
        let c = arch.get_or_create_layer("c");
        let d = arch.get_or_create_layer("d");
        arch.use_layers(a, &[b, c]);
        arch.use_layers(b, &[d]);
        arch.use_layers(c, &[d]);
        let origin = arch.get_or_create_module(a, "m");
        let _ = arch.get_or_create_module(b, "m");
        let _ = arch.get_or_create_module(c, "m");
        declare(&mut arch, "d", "m", Visibility::Application);
        let model = arch.create_model().unwrap();

        let from = model.module_by_name("a", "m").map(|m| m.id());
        assert_eq!(from, Some(origin.id()));
        let resolver = Resolver::new(&model);
        let raw: Vec<_> = resolver.visible(from, |_| true).map(|c| c.id()).collect();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0], raw[1]);

        let key = TypeKey::of::<dyn Repository>();
        let found = resolver
            .resolve_unique(from, CompositeModelType::PLAIN, &[key])
            .unwrap();
        assert_eq!(found.id(), raw[0]);
    }

    #[test]
    fn test_module_visibility_hides_from_siblings() {
        let mut arch = LayeredArchitecture::new();
        declare(&mut arch, "domain", "users", Visibility::Module);
        let domain = arch.get_or_create_layer("domain");
        let _ = arch.get_or_create_module(domain, "orders");
        let model = arch.create_model().unwrap();

        let resolver = Resolver::new(&model);
        let key = TypeKey::of::<dyn Repository>();
        let users = model.module_by_name("domain", "users").map(|m| m.id());
        let orders = model.module_by_name("domain", "orders").map(|m| m.id());
        assert!(resolver
            .resolve_unique(users, CompositeModelType::PLAIN, &[key])
            .is_ok());
        assert!(matches!(
            resolver.resolve_unique(orders, CompositeModelType::PLAIN, &[key]),
            Err(ResolutionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_empty_type_list_matches_nothing() {
        let mut arch = LayeredArchitecture::new();
        declare(&mut arch, "domain", "users", Visibility::Module);
        let model = arch.create_model().unwrap();

        let users = model.module_by_name("domain", "users").map(|m| m.id());
        let resolver = Resolver::new(&model);
        assert_eq!(resolver.of_type(users, CompositeModelType::PLAIN, &[]).count(), 1);
        assert!(matches!(
            resolver.resolve_unique(users, CompositeModelType::PLAIN, &[]),
            Err(ResolutionError::NotFound { .. })
        ));
    }
}
