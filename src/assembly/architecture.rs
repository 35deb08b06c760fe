//! Layered and singleton architectures.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::assembly::declaration::{Assembler, CompositeAssemblyInfo, IdGenerator};
use crate::config::{ApplicationConfig, Config, MergeableConfig};
use crate::error::{CompositeError, CompositeResult, ConfigurationError};
use crate::injection::InjectionService;
use crate::model::{
    ApplicationModel, ApplicationShape, CompositeId, CompositeModel, LayerId, LayerModel, ModuleId,
    ModuleModel, Visibility,
};
use crate::registry::SupportRegistry;
use crate::support::CompositeModelType;
use crate::uses::UsesContainer;

/// Handle to a layer declared in a [`LayeredArchitecture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerHandle(usize);

impl LayerHandle {
    /// Id the layer will have in the application model.
    pub fn id(&self) -> LayerId {
        LayerId(self.0)
    }
}

/// Handle to a module declared in a [`LayeredArchitecture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(usize);

impl ModuleHandle {
    /// Id the module will have in the application model.
    pub fn id(&self) -> ModuleId {
        ModuleId(self.0)
    }
}

#[derive(Debug)]
struct LayerAssembly {
    name: String,
    uses: Arc<UsesContainer>,
    modules: Vec<ModuleId>,
    used: Vec<LayerId>,
}

#[derive(Debug)]
struct ModuleAssembly {
    name: String,
    layer: LayerId,
    uses: Arc<UsesContainer>,
    infos: Vec<CompositeAssemblyInfo>,
}

/// An application made of layers, each holding modules of composites.
///
/// Handles returned by this architecture must only be passed back to it.
#[derive(Debug)]
pub struct LayeredArchitecture {
    config: ApplicationConfig,
    registry: SupportRegistry,
    injection: InjectionService,
    uses: Arc<UsesContainer>,
    layers: Vec<LayerAssembly>,
    modules: Vec<ModuleAssembly>,
    ids: IdGenerator,
}

impl Default for LayeredArchitecture {
    fn default() -> Self {
        Self::new()
    }
}

impl LayeredArchitecture {
    /// Create an architecture with plain and service support.
    pub fn new() -> Self {
        Self {
            config: ApplicationConfig::default(),
            registry: SupportRegistry::with_defaults(),
            injection: InjectionService::new(),
            uses: UsesContainer::new(),
            layers: Vec::new(),
            modules: Vec::new(),
            ids: IdGenerator::default(),
        }
    }

    /// Merge `config` over the current configuration.
    ///
    /// Fields of `config` left at their default keep the current value.
    pub fn with_config(mut self, config: ApplicationConfig) -> Self {
        self.config.merge(&config);
        self
    }

    /// Replace the model type supports. The registry must support plain composites.
    pub fn with_registry(mut self, registry: SupportRegistry) -> CompositeResult<Self> {
        ensure_plain_support(&registry)?;
        self.registry = registry;
        Ok(self)
    }

    /// Application configuration.
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Injection strategy table, open for custom scopes.
    pub fn injection_service_mut(&mut self) -> &mut InjectionService {
        &mut self.injection
    }

    /// Application-level uses container.
    pub fn uses(&self) -> &Arc<UsesContainer> {
        &self.uses
    }

    /// The layer named `name`, created on first request.
    pub fn get_or_create_layer(&mut self, name: &str) -> LayerHandle {
        if let Some(index) = self.layers.iter().position(|l| l.name == name) {
            return LayerHandle(index);
        }
        self.layers.push(LayerAssembly {
            name: name.to_string(),
            uses: UsesContainer::with_parent(&self.uses),
            modules: Vec::new(),
            used: Vec::new(),
        });
        LayerHandle(self.layers.len() - 1)
    }

    /// The module named `name` in `layer`, created on first request.
    pub fn get_or_create_module(&mut self, layer: LayerHandle, name: &str) -> ModuleHandle {
        let owner = &mut self.layers[layer.0];
        if let Some(existing) = owner
            .modules
            .iter()
            .find(|m| self.modules[m.0].name == name)
        {
            return ModuleHandle(existing.0);
        }
        let id = ModuleId(self.modules.len());
        owner.modules.push(id);
        self.modules.push(ModuleAssembly {
            name: name.to_string(),
            layer: layer.id(),
            uses: UsesContainer::with_parent(&owner.uses),
            infos: Vec::new(),
        });
        ModuleHandle(id.0)
    }

    /// Record that `layer` uses each of `used`. Duplicates and self-use are
    /// accepted here and rejected by validation when they form cycles.
    pub fn use_layers(&mut self, layer: LayerHandle, used: &[LayerHandle]) {
        self.layers[layer.0].used.extend(used.iter().map(LayerHandle::id));
    }

    /// Name of a declared layer.
    pub fn layer_name(&self, layer: LayerHandle) -> &str {
        &self.layers[layer.0].name
    }

    /// Name of a declared module.
    pub fn module_name(&self, module: ModuleHandle) -> &str {
        &self.modules[module.0].name
    }

    /// Layer-level uses container.
    pub fn layer_uses(&self, layer: LayerHandle) -> &Arc<UsesContainer> {
        &self.layers[layer.0].uses
    }

    /// Module-level uses container.
    pub fn module_uses(&self, module: ModuleHandle) -> &Arc<UsesContainer> {
        &self.modules[module.0].uses
    }

    /// Number of declared layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Assembler declaring composites into `module`.
    pub fn assembler(&mut self, module: ModuleHandle) -> Assembler<'_> {
        let target = &mut self.modules[module.0];
        Assembler::new(&mut target.infos, &target.uses, &mut self.ids, &self.registry)
    }

    /// Freeze the architecture into a validated application model.
    pub fn create_model(self) -> CompositeResult<Arc<ApplicationModel>> {
        let Self {
            config,
            registry,
            injection,
            layers,
            modules,
            ..
        } = self;
        check_config(&config)?;
        ensure_plain_support(&registry)?;

        let mut composites = BTreeMap::new();
        let mut module_models = Vec::with_capacity(modules.len());
        for (index, module) in modules.into_iter().enumerate() {
            let id = ModuleId(index);
            let mut placed = Vec::new();
            let mut visibilities: HashMap<CompositeModelType, HashMap<CompositeId, Visibility>> =
                HashMap::new();
            for (model, visibility) in promote(&registry, module.infos, Some(id))? {
                visibilities
                    .entry(model.model_type)
                    .or_default()
                    .insert(model.id, visibility);
                placed.push(model.id);
                composites.insert(model.id, Arc::new(model));
            }
            placed.sort();
            debug!(
                layer = %layers[module.layer.0].name,
                module = %module.name,
                composites = placed.len(),
                "Module model created"
            );
            module_models.push(ModuleModel {
                id,
                name: module.name,
                layer: module.layer,
                composites: placed,
                visibilities,
            });
        }

        let layer_models: Vec<LayerModel> = layers
            .into_iter()
            .enumerate()
            .map(|(index, layer)| LayerModel {
                id: LayerId(index),
                name: layer.name,
                modules: layer.modules,
                used_layers: layer.used,
            })
            .collect();
        let top_level = layer_models
            .iter()
            .filter(|l| {
                !layer_models
                    .iter()
                    .any(|other| other.id != l.id && other.used_layers.contains(&l.id))
            })
            .map(|l| l.id)
            .collect();

        finish(
            config,
            registry,
            injection,
            ApplicationShape::Layered {
                layers: layer_models,
                modules: module_models,
                top_level,
            },
            composites,
        )
    }
}

/// An application without layers; every composite sees every other.
#[derive(Debug)]
pub struct SingletonArchitecture {
    config: ApplicationConfig,
    registry: SupportRegistry,
    injection: InjectionService,
    uses: Arc<UsesContainer>,
    infos: Vec<CompositeAssemblyInfo>,
    ids: IdGenerator,
}

impl Default for SingletonArchitecture {
    fn default() -> Self {
        Self::new()
    }
}

impl SingletonArchitecture {
    /// Create an architecture with plain and service support.
    pub fn new() -> Self {
        Self {
            config: ApplicationConfig::default(),
            registry: SupportRegistry::with_defaults(),
            injection: InjectionService::new(),
            uses: UsesContainer::new(),
            infos: Vec::new(),
            ids: IdGenerator::default(),
        }
    }

    /// Merge `config` over the current configuration.
    ///
    /// Fields of `config` left at their default keep the current value.
    pub fn with_config(mut self, config: ApplicationConfig) -> Self {
        self.config.merge(&config);
        self
    }

    /// Replace the model type supports. The registry must support plain composites.
    pub fn with_registry(mut self, registry: SupportRegistry) -> CompositeResult<Self> {
        ensure_plain_support(&registry)?;
        self.registry = registry;
        Ok(self)
    }

    /// Application configuration.
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Injection strategy table, open for custom scopes.
    pub fn injection_service_mut(&mut self) -> &mut InjectionService {
        &mut self.injection
    }

    /// Application-level uses container.
    pub fn uses(&self) -> &Arc<UsesContainer> {
        &self.uses
    }

    /// The single assembler of the application.
    pub fn assembler(&mut self) -> Assembler<'_> {
        Assembler::new(&mut self.infos, &self.uses, &mut self.ids, &self.registry)
    }

    /// Freeze the architecture into a validated application model.
    pub fn create_model(self) -> CompositeResult<Arc<ApplicationModel>> {
        let Self {
            config,
            registry,
            injection,
            infos,
            ..
        } = self;
        check_config(&config)?;
        ensure_plain_support(&registry)?;

        let mut composites = BTreeMap::new();
        let mut placed = Vec::new();
        for (model, _) in promote(&registry, infos, None)? {
            placed.push(model.id);
            composites.insert(model.id, Arc::new(model));
        }
        placed.sort();
        debug!(composites = placed.len(), "Singleton model created");

        finish(
            config,
            registry,
            injection,
            ApplicationShape::Singleton { composites: placed },
            composites,
        )
    }
}

fn ensure_plain_support(registry: &SupportRegistry) -> CompositeResult<()> {
    if registry.contains(CompositeModelType::PLAIN) {
        Ok(())
    } else {
        Err(ConfigurationError::MissingPlainSupport.into())
    }
}

fn check_config(config: &ApplicationConfig) -> CompositeResult<()> {
    config
        .validate()
        .map_err(|reason| ConfigurationError::InvalidConfig(reason).into())
}

/// Promote infos into models, one model type at a time in registry order.
fn promote(
    registry: &SupportRegistry,
    mut infos: Vec<CompositeAssemblyInfo>,
    location: Option<ModuleId>,
) -> CompositeResult<Vec<(CompositeModel, Visibility)>> {
    let mut models = Vec::with_capacity(infos.len());
    for support in registry.iter() {
        let (of_type, rest): (Vec<_>, Vec<_>) = infos
            .into_iter()
            .partition(|info| info.model_type == support.model_type());
        infos = rest;
        for info in of_type {
            let visibility = info.visibility;
            models.push((support.create_model(info, location), visibility));
        }
    }
    match infos.first() {
        None => Ok(models),
        Some(orphan) => {
            Err(ConfigurationError::UnregisteredModelType(orphan.model_type.to_string()).into())
        }
    }
}

fn finish(
    config: ApplicationConfig,
    registry: SupportRegistry,
    injection: InjectionService,
    shape: ApplicationShape,
    composites: BTreeMap<CompositeId, Arc<CompositeModel>>,
) -> CompositeResult<Arc<ApplicationModel>> {
    let model = ApplicationModel {
        config,
        shape,
        composites,
        registry: Arc::new(registry),
        injection: Arc::new(injection),
    };
    let result = model.validate();
    if !result.is_empty() {
        debug!(errors = result.len(), "Application model rejected");
        return Err(CompositeError::Validation(result));
    }
    debug!(
        application = %model.name(),
        composites = model.composites.len(),
        "Application model created"
    );
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationMode;
    use crate::model::PublicType;
    use crate::validation::ValidationError;

    trait Ledger {}

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut arch = LayeredArchitecture::new();
        let first = arch.get_or_create_layer("domain");
        let second = arch.get_or_create_layer("domain");
        assert_eq!(first, second);
        assert_eq!(arch.layer_count(), 1);

        let users = arch.get_or_create_module(first, "users");
        assert_eq!(users, arch.get_or_create_module(first, "users"));
        assert_eq!(arch.module_name(users), "users");
        assert_eq!(arch.layer_name(first), "domain");
    }

    #[test]
    fn test_same_module_name_in_two_layers() {
        let mut arch = LayeredArchitecture::new();
        let a = arch.get_or_create_layer("a");
        let b = arch.get_or_create_layer("b");
        assert_ne!(arch.get_or_create_module(a, "core"), arch.get_or_create_module(b, "core"));
    }

    #[test]
    fn test_uses_chain_follows_structure() {
        let mut arch = LayeredArchitecture::new();
        arch.uses().use_value(7u32);
        let layer = arch.get_or_create_layer("infra");
        arch.layer_uses(layer).use_with_name("region", "eu".to_string());
        let module = arch.get_or_create_module(layer, "db");

        let module_uses = arch.module_uses(module);
        assert_eq!(module_uses.get::<u32>().as_deref(), Some(&7));
        assert_eq!(module_uses.get_named::<String>("region").as_deref(), Some(&"eu".to_string()));
    }

    #[test]
    fn test_top_level_layers() {
        let mut arch = LayeredArchitecture::new();
        let web = arch.get_or_create_layer("web");
        let domain = arch.get_or_create_layer("domain");
        let infra = arch.get_or_create_layer("infra");
        arch.use_layers(web, &[domain, infra]);
        arch.use_layers(domain, &[infra]);

        let model = arch.create_model().unwrap();
        let top: Vec<_> = model.top_level_layers().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(top, vec!["web".to_string()]);
        assert_eq!(model.layer_activation_order(), vec![infra.id(), domain.id(), web.id()]);
    }

    #[test]
    fn test_missing_types_fails_validation() {
        let mut arch = SingletonArchitecture::new();
        arch.assembler().new_plain_composite().unwrap();

        match arch.create_model() {
            Err(CompositeError::Validation(result)) => {
                assert!(result.has(|e| matches!(e, ValidationError::NoPublicTypes { .. })));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_registry_without_plain_support_is_rejected() {
        let err = SingletonArchitecture::new()
            .with_registry(SupportRegistry::new())
            .unwrap_err();
        assert!(matches!(
            err,
            CompositeError::Configuration(ConfigurationError::MissingPlainSupport)
        ));
    }

    #[test]
    fn test_with_config_merges_over_previous_config() {
        let arch = LayeredArchitecture::new()
            .with_config(ApplicationConfig::new().with_name("billing").with_version("2.0"))
            .with_config(ApplicationConfig::new().with_mode(ApplicationMode::Production));

        assert_eq!(arch.config().name, "billing");
        assert_eq!(arch.config().version, "2.0");
        assert_eq!(arch.config().mode, ApplicationMode::Production);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let arch =
            SingletonArchitecture::new().with_config(ApplicationConfig::new().with_name(""));
        assert!(matches!(
            arch.create_model(),
            Err(CompositeError::Configuration(ConfigurationError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_singleton_places_composites_in_declaration_order() {
        let mut arch = SingletonArchitecture::new();
        let mut assembler = arch.assembler();
        let service = assembler
            .new_service()
            .unwrap()
            .of_types([PublicType::of::<dyn Ledger>()])
            .id();
        let plain = assembler
            .new_plain_composite()
            .unwrap()
            .of_types([PublicType::of::<dyn Ledger>()])
            .id();

        let model = arch.create_model().unwrap();
        assert!(!model.is_layered());
        assert_eq!(model.placed_composites(None), vec![service, plain]);
        assert_eq!(model.service_activation_order(), vec![service]);
    }
}
