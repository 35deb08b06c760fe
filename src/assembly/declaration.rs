//! Assemblers and fluent composite declarations.

use std::any::Any;
use std::sync::Arc;

use crate::error::CompositeResult;
use crate::model::{CompositeId, FragmentDecl, PublicType, ServiceLifecycle, Visibility};
use crate::registry::SupportRegistry;
use crate::runtime::Composite;
use crate::support::CompositeModelType;
use crate::uses::UsesContainer;

/// Assembly-time record of one composite declaration.
#[derive(Debug)]
pub struct CompositeAssemblyInfo {
    pub(crate) id: CompositeId,
    pub(crate) model_type: CompositeModelType,
    pub(crate) types: Vec<PublicType>,
    pub(crate) mixins: Vec<FragmentDecl>,
    pub(crate) concerns: Vec<FragmentDecl>,
    pub(crate) side_effects: Vec<FragmentDecl>,
    pub(crate) visibility: Visibility,
    pub(crate) uses: Arc<UsesContainer>,
    pub(crate) lifecycle: ServiceLifecycle,
}

impl CompositeAssemblyInfo {
    /// Start an empty declaration whose uses container falls back to `parent_uses`.
    pub fn new(
        id: CompositeId,
        model_type: CompositeModelType,
        parent_uses: &Arc<UsesContainer>,
    ) -> Self {
        Self {
            id,
            model_type,
            types: Vec::new(),
            mixins: Vec::new(),
            concerns: Vec::new(),
            side_effects: Vec::new(),
            visibility: Visibility::default(),
            uses: UsesContainer::with_parent(parent_uses),
            lifecycle: ServiceLifecycle::default(),
        }
    }

    /// Composite id.
    pub fn id(&self) -> CompositeId {
        self.id
    }

    /// Model type tag.
    pub fn model_type(&self) -> CompositeModelType {
        self.model_type
    }

    /// Declared public types.
    pub fn types(&self) -> &[PublicType] {
        &self.types
    }

    /// Declared visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Uses container of the declaration.
    pub fn uses(&self) -> &Arc<UsesContainer> {
        &self.uses
    }
}

/// Monotonic composite id source owned by one architecture.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub(crate) fn next_id(&mut self) -> CompositeId {
        let id = CompositeId(self.next);
        self.next += 1;
        id
    }
}

/// Declares composites into one module (or into a singleton application).
#[derive(Debug)]
pub struct Assembler<'a> {
    infos: &'a mut Vec<CompositeAssemblyInfo>,
    uses: &'a Arc<UsesContainer>,
    ids: &'a mut IdGenerator,
    registry: &'a SupportRegistry,
}

impl<'a> Assembler<'a> {
    pub(crate) fn new(
        infos: &'a mut Vec<CompositeAssemblyInfo>,
        uses: &'a Arc<UsesContainer>,
        ids: &'a mut IdGenerator,
        registry: &'a SupportRegistry,
    ) -> Self {
        Self {
            infos,
            uses,
            ids,
            registry,
        }
    }

    /// Declare a plain composite.
    pub fn new_plain_composite(&mut self) -> CompositeResult<CompositeDeclaration<'_>> {
        self.new_composite(CompositeModelType::PLAIN)
    }

    /// Declare a service composite.
    pub fn new_service(&mut self) -> CompositeResult<CompositeDeclaration<'_>> {
        self.new_composite(CompositeModelType::SERVICE)
    }

    /// Declare a composite of a registered model type.
    pub fn new_composite(
        &mut self,
        model_type: CompositeModelType,
    ) -> CompositeResult<CompositeDeclaration<'_>> {
        let support = self.registry.require(model_type)?;
        let info = support.create_info(self.ids.next_id(), self.uses);
        let index = self.infos.len();
        self.infos.push(info);
        Ok(CompositeDeclaration {
            info: &mut self.infos[index],
        })
    }

    /// Number of composites declared here so far.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether nothing was declared here yet.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// Fluent declaration of one composite.
///
/// # Example
///
/// ```rust
/// use qi4rs::{
///     FragmentDecl, LayeredArchitecture, MethodCall, Mixin, PublicType, Value, Visibility,
/// };
///
/// trait Greeter {}
///
/// struct Hello;
///
/// impl Mixin for Hello {
///     fn invoke(&self, _call: &mut MethodCall) -> qi4rs::CompositeResult<Value> {
///         Ok(qi4rs::value("hello".to_string()))
///     }
/// }
///
/// let mut arch = LayeredArchitecture::new();
/// let layer = arch.get_or_create_layer("app");
/// let module = arch.get_or_create_module(layer, "greetings");
/// arch.assembler(module)
///     .new_plain_composite()
///     .unwrap()
///     .of_types([PublicType::of::<dyn Greeter>().method("greet")])
///     .with_mixins([FragmentDecl::mixin(|_| Ok(Hello))])
///     .visible_in(Visibility::Layer);
///
/// assert!(arch.create_model().is_ok());
/// ```
#[derive(Debug)]
pub struct CompositeDeclaration<'a> {
    info: &'a mut CompositeAssemblyInfo,
}

impl CompositeDeclaration<'_> {
    /// Id allocated to the composite.
    pub fn id(&self) -> CompositeId {
        self.info.id
    }

    /// Add public types.
    pub fn of_types(self, types: impl IntoIterator<Item = PublicType>) -> Self {
        self.info.types.extend(types);
        self
    }

    /// Add mixins, in priority order.
    pub fn with_mixins(self, mixins: impl IntoIterator<Item = FragmentDecl>) -> Self {
        self.info.mixins.extend(mixins);
        self
    }

    /// Add concerns, outermost first.
    pub fn with_concerns(self, concerns: impl IntoIterator<Item = FragmentDecl>) -> Self {
        self.info.concerns.extend(concerns);
        self
    }

    /// Add side-effects.
    pub fn with_side_effects(self, side_effects: impl IntoIterator<Item = FragmentDecl>) -> Self {
        self.info.side_effects.extend(side_effects);
        self
    }

    /// Set how far the composite is visible. Defaults to [`Visibility::Module`].
    pub fn visible_in(self, visibility: Visibility) -> Self {
        self.info.visibility = visibility;
        self
    }

    /// Supply an unnamed value for `Uses` injection.
    pub fn use_value<T: Any + Send + Sync>(self, value: T) -> Self {
        self.info.uses.use_value(value);
        self
    }

    /// Supply a named value for `Uses` injection.
    pub fn use_with_name<T: Any + Send + Sync>(self, name: impl Into<String>, value: T) -> Self {
        self.info.uses.use_with_name(name, value);
        self
    }

    /// Activate the service when the application is activated instead of on first use.
    pub fn activate_with_application(self, eager: bool) -> Self {
        self.info.lifecycle.activate_with_application = eager;
        self
    }

    /// Add an activation hook.
    pub fn on_activate<F>(self, hook: F) -> Self
    where
        F: Fn(&Composite) -> CompositeResult<()> + Send + Sync + 'static,
    {
        self.info.lifecycle.activators.push(Arc::new(hook));
        self
    }

    /// Add a passivation hook.
    pub fn on_passivate<F>(self, hook: F) -> Self
    where
        F: Fn(&Composite) -> CompositeResult<()> + Send + Sync + 'static,
    {
        self.info.lifecycle.passivators.push(Arc::new(hook));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Clock {}

    #[test]
    fn test_ids_are_monotonic() {
        let mut ids = IdGenerator::default();
        assert_eq!(ids.next_id(), CompositeId(0));
        assert_eq!(ids.next_id(), CompositeId(1));
    }

    #[test]
    fn test_declaration_accumulates_into_info() {
        let mut infos = Vec::new();
        let uses = UsesContainer::new();
        let mut ids = IdGenerator::default();
        let registry = SupportRegistry::with_defaults();
        let mut assembler = Assembler::new(&mut infos, &uses, &mut ids, &registry);

        let id = assembler
            .new_service()
            .unwrap()
            .of_types([PublicType::of::<dyn Clock>()])
            .visible_in(Visibility::Application)
            .use_with_name("zone", "UTC".to_string())
            .activate_with_application(true)
            .on_passivate(|_| Ok(()))
            .id();
        assert_eq!(assembler.len(), 1);

        let info = &infos[0];
        assert_eq!(info.id(), id);
        assert_eq!(info.model_type(), CompositeModelType::SERVICE);
        assert_eq!(info.visibility(), Visibility::Application);
        assert_eq!(info.types().len(), 1);
        assert_eq!(info.uses().get_named::<String>("zone").as_deref(), Some(&"UTC".to_string()));
        assert!(info.lifecycle.activate_with_application);
        assert_eq!(info.lifecycle.passivators.len(), 1);
    }

    #[test]
    fn test_unregistered_model_type_is_rejected() {
        let mut infos = Vec::new();
        let uses = UsesContainer::new();
        let mut ids = IdGenerator::default();
        let registry = SupportRegistry::with_defaults();
        let mut assembler = Assembler::new(&mut infos, &uses, &mut ids, &registry);

        assert!(assembler.new_composite(CompositeModelType::new("entity")).is_err());
        assert!(assembler.is_empty());
    }
}
