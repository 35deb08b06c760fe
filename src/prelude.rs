//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits
//! from qi4rs for convenient glob imports.
//!
//! # Example
//!
//! ```rust
//! use qi4rs::prelude::*;
//! ```

// Assembly
pub use crate::assembly::{LayeredArchitecture, SingletonArchitecture};

// Configuration
pub use crate::config::{ApplicationConfig, ApplicationMode, Config, MergeableConfig};

// Model and fragments
pub use crate::model::{
    AppliesTo, Concern, FragmentDecl, MethodDecl, Mixin, PropertyDecl, PublicType, SideEffect,
    Visibility,
};

// Injection
pub use crate::injection::{InjectionPoint, InjectionScope, Injections};

// Runtime
pub use crate::runtime::{
    Application, Composite, ConcernNext, InvocationInfo, MethodCall, ServiceReference,
    ServiceState, SideEffectResult, StateHandle, Structure, ThisRef,
};

// Streams
pub use crate::stream::{EventStream, LifecycleEvent};

// Values
pub use crate::types::{unit, value, TypeKey, Value};

// Errors
pub use crate::error::{CompositeError, CompositeResult};
