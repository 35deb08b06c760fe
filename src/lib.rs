//! # qi4rs
//!
//! **qi4rs** is a composite-oriented application framework: objects are
//! assembled from fragments, wired by explicit dependency injection, and
//! placed in a layered visibility model.
//!
//! ## Overview
//!
//! - **Composites** implement public types by combining fragments: concerns
//!   wrap a method, exactly one mixin implements it, side-effects observe it
//! - **Method-composition tables** fix each method's chain once, when the
//!   model is built
//! - **Layers and modules** scope visibility; a composite is found from its
//!   module, its layer, or any layer using its layer, depending on what it
//!   declares
//! - **Services** are activated lazily on first use, or eagerly in dependency
//!   order when the application is activated
//!
//! ## Lifecycle
//!
//! ```text
//! Architecture  - declarations, mutable, single-threaded
//!      | create_model()
//! ApplicationModel - immutable, validated, shareable
//!      | new_instance()
//! Application   - live modules, composites, service containers
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qi4rs::prelude::*;
//! use std::sync::Arc;
//!
//! trait Greeter {}
//!
//! struct HelloMixin {
//!     greeting: Arc<String>,
//! }
//!
//! impl Mixin for HelloMixin {
//!     fn invoke(&self, call: &mut MethodCall) -> CompositeResult<Value> {
//!         let name = call.arg::<String>(0)?;
//!         Ok(value(format!("{}, {}!", self.greeting, name)))
//!     }
//! }
//!
//! fn main() -> CompositeResult<()> {
//!     let mut arch = LayeredArchitecture::new();
//!     let layer = arch.get_or_create_layer("app");
//!     let module = arch.get_or_create_module(layer, "greetings");
//!     arch.assembler(module)
//!         .new_plain_composite()?
//!         .of_types([PublicType::of::<dyn Greeter>().method("greet")])
//!         .with_mixins([FragmentDecl::mixin(|inj| {
//!             Ok(HelloMixin {
//!                 greeting: inj.get::<String>("greeting")?,
//!             })
//!         })
//!         .inject(InjectionPoint::uses::<String>("greeting"))])
//!         .use_value("Hello".to_string());
//!
//!     let application = arch.create_model()?.new_instance();
//!     let greeter = application
//!         .module("app", "greetings")
//!         .ok_or("missing module")?
//!         .new_plain_composite_builder(&[TypeKey::of::<dyn Greeter>()])?
//!         .instantiate()?;
//!
//!     let greeting = greeter.call::<String>("greet", vec![value("world".to_string())])?;
//!     assert_eq!(greeting.as_str(), "Hello, world!");
//!     Ok(())
//! }
//! ```

pub mod assembly;
mod codegen;
mod config;
mod error;
pub mod injection;
pub mod model;
mod registry;
pub mod resolve;
pub mod runtime;
pub mod stream;
mod support;
mod types;
mod uses;
pub mod validation;

pub mod prelude;

// Re-export core types
pub use assembly::{
    Assembler, CompositeAssemblyInfo, CompositeDeclaration, LayerHandle, LayeredArchitecture,
    ModuleHandle, SingletonArchitecture,
};
pub use codegen::TypeGenerator;
pub use config::{ApplicationConfig, ApplicationMode, Config, MergeableConfig};
pub use error::{
    CompositeError, CompositeResult, ConfigurationError, ConfigurationResult, InjectionError,
    InjectionResult, LifecycleError, PassivationFailures, ResolutionError, ResolutionResult,
};
pub use injection::{
    InjectionFunctionality, InjectionPoint, InjectionScope, InjectionService, InjectionTime,
    Injections,
};
pub use model::{
    AppliesTo, ApplicationModel, CompositeId, CompositeModel, Concern, FragmentDecl, FragmentKind,
    MethodDecl, Mixin, PropertyDecl, PublicType, SideEffect, Visibility,
};
pub use registry::{SupportRegistry, SupportRegistryBuilder};
pub use resolve::Resolver;
pub use runtime::{
    Application, Composite, CompositeBuilder, ConcernNext, InvocationInfo, MethodCall,
    ModuleInstance, ServiceReference, ServiceState, SideEffectResult, StateHandle, Structure,
    ThisRef,
};
pub use stream::{EventSender, EventStream, LifecycleEvent, StreamBuilder};
pub use support::{
    CompositeModelType, ModelTypeSupport, ModelTypeSupportExt, PlainCompositeSupport,
    ServiceCompositeSupport,
};
pub use types::{unit, value, value_type_id, TypeKey, Value};
pub use uses::UsesContainer;
pub use validation::{ValidationError, ValidationResult};
