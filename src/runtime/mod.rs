//! Runtime: live applications, modules, composites and services.

mod application;
mod composite;
mod module;
mod service;

pub use application::{Application, LayerInstance};
pub use composite::{
    Composite, ConcernNext, EventHandler, InvocationInfo, MethodCall, SideEffectResult, StateHandle,
    ThisRef,
};
pub(crate) use composite::{CallSite, CompositeInner};
pub use module::{CompositeBuilder, ModuleInstance, Structure};
pub use service::{ServiceContainer, ServiceReference, ServiceState};
