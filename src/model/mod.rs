//! Structural model: application, layers, modules, composites and their members.

mod application;
mod composite;
mod decl;
mod fragment;

pub use application::{ApplicationModel, LayerId, LayerModel, ModuleId, ModuleModel, Visibility};
pub(crate) use application::ApplicationShape;
pub use composite::{
    CompositeEventModel, CompositeId, CompositeMethodModel, CompositeModel,
    CompositePropertyModel, FragmentModel, LifecycleHook, ServiceLifecycle,
};
pub use decl::{Constraint, EventDecl, MethodDecl, PropertyDecl, PublicType};
pub use fragment::{AppliesTo, Concern, FragmentDecl, FragmentKind, Mixin, SideEffect};
pub(crate) use fragment::FragmentInstance;
