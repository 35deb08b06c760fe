//! The immutable application → layer → module → composite graph.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::config::ApplicationConfig;
use crate::injection::InjectionService;
use crate::model::composite::{CompositeId, CompositeModel};
use crate::registry::SupportRegistry;
use crate::runtime::Application;
use crate::support::CompositeModelType;
use crate::validation::{self, ValidationResult};

/// How far a composite can be seen from other modules.
///
/// Ordered `Module < Layer < Application`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Visibility {
    /// Only from its own module
    #[default]
    Module,
    /// From every module of its layer
    Layer,
    /// From every layer that (transitively) uses its layer
    Application,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Module => f.write_str("module"),
            Visibility::Layer => f.write_str("layer"),
            Visibility::Application => f.write_str("application"),
        }
    }
}

/// Index of a layer in its application model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) usize);

/// Index of a module in its application model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

/// A layer of a layered application.
#[derive(Debug)]
pub struct LayerModel {
    pub(crate) id: LayerId,
    pub(crate) name: String,
    pub(crate) modules: Vec<ModuleId>,
    pub(crate) used_layers: Vec<LayerId>,
}

impl LayerModel {
    /// Layer id.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Layer name, unique in the application.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modules in declaration order.
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    /// Layers this layer uses directly.
    pub fn used_layers(&self) -> &[LayerId] {
        &self.used_layers
    }
}

/// A module of a layered application.
#[derive(Debug)]
pub struct ModuleModel {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
    pub(crate) layer: LayerId,
    pub(crate) composites: Vec<CompositeId>,
    pub(crate) visibilities: HashMap<CompositeModelType, HashMap<CompositeId, Visibility>>,
}

impl ModuleModel {
    /// Module id.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Module name, unique in its layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning layer.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Composites placed here, in declaration order.
    pub fn composites(&self) -> &[CompositeId] {
        &self.composites
    }

    /// Declared visibility of a composite placed in this module.
    pub fn visibility_of(&self, model: &CompositeModel) -> Option<Visibility> {
        self.visibilities
            .get(&model.model_type)
            .and_then(|m| m.get(&model.id))
            .copied()
    }
}

#[derive(Debug)]
pub(crate) enum ApplicationShape {
    Layered {
        layers: Vec<LayerModel>,
        modules: Vec<ModuleModel>,
        top_level: Vec<LayerId>,
    },
    Singleton {
        composites: Vec<CompositeId>,
    },
}

/// Root of the structural model. Immutable once created.
#[derive(Debug)]
pub struct ApplicationModel {
    pub(crate) config: ApplicationConfig,
    pub(crate) shape: ApplicationShape,
    pub(crate) composites: BTreeMap<CompositeId, Arc<CompositeModel>>,
    pub(crate) registry: Arc<SupportRegistry>,
    pub(crate) injection: Arc<InjectionService>,
}

impl ApplicationModel {
    /// Configuration the application was assembled with.
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether this is a layered (as opposed to singleton) application.
    pub fn is_layered(&self) -> bool {
        matches!(self.shape, ApplicationShape::Layered { .. })
    }

    /// All layers; empty for singleton applications.
    pub fn layers(&self) -> &[LayerModel] {
        match &self.shape {
            ApplicationShape::Layered { layers, .. } => layers,
            ApplicationShape::Singleton { .. } => &[],
        }
    }

    /// All modules; empty for singleton applications.
    pub fn modules(&self) -> &[ModuleModel] {
        match &self.shape {
            ApplicationShape::Layered { modules, .. } => modules,
            ApplicationShape::Singleton { .. } => &[],
        }
    }

    /// Layers no other layer uses.
    pub fn top_level_layers(&self) -> Vec<&LayerModel> {
        match &self.shape {
            ApplicationShape::Layered {
                layers, top_level, ..
            } => top_level.iter().map(|id| &layers[id.0]).collect(),
            ApplicationShape::Singleton { .. } => Vec::new(),
        }
    }

    /// Layer by id.
    pub fn layer(&self, id: LayerId) -> Option<&LayerModel> {
        self.layers().get(id.0)
    }

    /// Layer by name.
    pub fn layer_by_name(&self, name: &str) -> Option<&LayerModel> {
        self.layers().iter().find(|l| l.name == name)
    }

    /// Module by id.
    pub fn module(&self, id: ModuleId) -> Option<&ModuleModel> {
        self.modules().get(id.0)
    }

    /// Module by layer and module name.
    pub fn module_by_name(&self, layer: &str, module: &str) -> Option<&ModuleModel> {
        let layer = self.layer_by_name(layer)?;
        layer
            .modules
            .iter()
            .filter_map(|id| self.module(*id))
            .find(|m| m.name == module)
    }

    /// Composite model by id.
    pub fn composite(&self, id: CompositeId) -> Option<&Arc<CompositeModel>> {
        self.composites.get(&id)
    }

    /// Every composite model, ordered by id.
    pub fn composite_models(&self) -> impl Iterator<Item = &Arc<CompositeModel>> + '_ {
        self.composites.values()
    }

    /// Composite ids in placement order: per module for layered applications,
    /// declaration order for singleton ones.
    pub(crate) fn placed_composites(&self, module: Option<ModuleId>) -> Vec<CompositeId> {
        match (&self.shape, module) {
            (ApplicationShape::Layered { modules, .. }, Some(id)) => modules
                .get(id.0)
                .map(|m| m.composites.clone())
                .unwrap_or_default(),
            (ApplicationShape::Singleton { composites }, _) => composites.clone(),
            (ApplicationShape::Layered { .. }, None) => Vec::new(),
        }
    }

    /// Composite model type supports.
    pub fn registry(&self) -> &SupportRegistry {
        &self.registry
    }

    /// Injection strategy table.
    pub fn injection_service(&self) -> &InjectionService {
        &self.injection
    }

    /// Whether composites of this model type live in a service container.
    pub fn is_service_backed(&self, model: &CompositeModel) -> bool {
        self.registry
            .get(model.model_type)
            .is_some_and(|s| s.is_service_backed())
    }

    /// Module whose service container holds the instance of `model`, as
    /// decided by the support of its model type.
    pub fn service_container_of(&self, model: &CompositeModel) -> Option<ModuleId> {
        if !self.is_layered() {
            return None;
        }
        match self.registry.get(model.model_type) {
            Some(support) => support.service_container(model),
            None => model.location(),
        }
    }

    /// Service-backed composites held by the container of `module`, in
    /// placement order.
    pub(crate) fn contained_services(&self, module: Option<ModuleId>) -> Vec<Arc<CompositeModel>> {
        let placed: Vec<CompositeId> = match &self.shape {
            ApplicationShape::Layered { modules, .. } => modules
                .iter()
                .flat_map(|m| m.composites.iter().copied())
                .collect(),
            ApplicationShape::Singleton { .. } => self.placed_composites(None),
        };
        placed
            .into_iter()
            .filter_map(|id| self.composite(id))
            .filter(|c| self.is_service_backed(c))
            .filter(|c| self.service_container_of(c) == module)
            .cloned()
            .collect()
    }

    /// Human readable location: `layer/module` or the application name.
    pub fn location_name(&self, module: Option<ModuleId>) -> String {
        match module.and_then(|id| self.module(id)) {
            Some(m) => {
                let layer = self.layer(m.layer).map(|l| l.name.as_str()).unwrap_or("?");
                format!("{}/{}", layer, m.name)
            }
            None => self.config.name.clone(),
        }
    }

    /// Layers ordered so that every layer comes after all layers it uses.
    pub fn layer_activation_order(&self) -> Vec<LayerId> {
        let layers = self.layers();
        let mut order = Vec::with_capacity(layers.len());
        let mut done = HashSet::new();
        for layer in layers {
            visit_post_order(layers, layer.id, &mut done, &mut order);
        }
        order
    }

    /// Service-backed composites in activation order: deepest used layer
    /// first, then modules and composites in declaration order.
    pub fn service_activation_order(&self) -> Vec<CompositeId> {
        let ids: Vec<CompositeId> = match &self.shape {
            ApplicationShape::Layered { layers, modules, .. } => self
                .layer_activation_order()
                .into_iter()
                .flat_map(move |l| layers[l.0].modules.iter())
                .flat_map(move |m| modules[m.0].composites.iter().copied())
                .collect(),
            ApplicationShape::Singleton { composites } => composites.clone(),
        };
        ids.into_iter()
            .filter(|id| {
                self.composite(*id)
                    .is_some_and(|model| self.is_service_backed(model))
            })
            .collect()
    }

    /// Re-run model validation.
    pub fn validate(&self) -> ValidationResult {
        validation::validate(self)
    }

    /// Create a live application from this model.
    pub fn new_instance(self: &Arc<Self>) -> Application {
        Application::new(Arc::clone(self))
    }
}

fn visit_post_order(
    layers: &[LayerModel],
    id: LayerId,
    done: &mut HashSet<LayerId>,
    order: &mut Vec<LayerId>,
) {
    if !done.insert(id) {
        return;
    }
    for used in &layers[id.0].used_layers {
        visit_post_order(layers, *used, done, order);
    }
    order.push(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_ordering() {
        assert!(Visibility::Module < Visibility::Layer);
        assert!(Visibility::Layer < Visibility::Application);
        assert_eq!(Visibility::default(), Visibility::Module);
    }

    fn layer(id: usize, used: &[usize]) -> LayerModel {
        LayerModel {
            id: LayerId(id),
            name: format!("l{id}"),
            modules: Vec::new(),
            used_layers: used.iter().map(|u| LayerId(*u)).collect(),
        }
    }

    #[test]
    fn test_post_order_places_used_layers_first() {
        // 0 uses 1 and 2, both use 3
        let layers = vec![layer(0, &[1, 2]), layer(1, &[3]), layer(2, &[3]), layer(3, &[])];
        let mut done = HashSet::new();
        let mut order = Vec::new();
        for l in &layers {
            visit_post_order(&layers, l.id, &mut done, &mut order);
        }
        assert_eq!(order, vec![LayerId(3), LayerId(1), LayerId(2), LayerId(0)]);
    }
}
