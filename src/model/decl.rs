//! Declarations of the public surface of a composite.
//!
//! A composite implements one or more public types. Each public type lists
//! the methods, properties and events it contributes; the composite model
//! turns these into its method table and state layout.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::types::{TypeKey, Value};

/// A public type implemented by a composite.
#[derive(Debug, Clone)]
pub struct PublicType {
    pub(crate) key: TypeKey,
    pub(crate) methods: Vec<MethodDecl>,
    pub(crate) properties: Vec<PropertyDecl>,
    pub(crate) events: Vec<EventDecl>,
}

impl PublicType {
    /// Declare the public type `T`, usually a trait object type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Add a method without attributes.
    pub fn method(self, name: impl Into<String>) -> Self {
        self.method_with(MethodDecl::new(name))
    }

    /// Add a fully described method.
    pub fn method_with(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a property.
    pub fn property(mut self, property: PropertyDecl) -> Self {
        self.properties.push(property);
        self
    }

    /// Add an event.
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.events.push(EventDecl { name: name.into() });
        self
    }

    /// The declared type.
    pub fn key(&self) -> TypeKey {
        self.key
    }
}

/// A method of a public type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub(crate) name: String,
    pub(crate) attributes: Vec<String>,
}

impl MethodDecl {
    /// Create a method declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Attach an attribute, queryable at runtime and usable by applicability rules.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }
}

/// Predicate checked on every property write after the prototype stage.
#[derive(Clone)]
pub struct Constraint {
    pub(crate) name: String,
    pub(crate) check: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl Constraint {
    /// Constraint name, reported on violation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn accepts(&self, value: &Value) -> bool {
        (self.check)(value)
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Constraint").field(&self.name).finish()
    }
}

/// A property of a public type.
#[derive(Debug, Clone)]
pub struct PropertyDecl {
    pub(crate) name: String,
    pub(crate) value_type: TypeKey,
    pub(crate) immutable: bool,
    pub(crate) optional: bool,
    pub(crate) default: Option<Value>,
    pub(crate) constraints: Vec<Constraint>,
}

impl PropertyDecl {
    /// Declare a mandatory, mutable property holding values of type `T`.
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: TypeKey::of::<T>(),
            immutable: false,
            optional: false,
            default: None,
            constraints: Vec::new(),
        }
    }

    /// Only writable during the prototype stage.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// May stay unset after instantiation.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Initial value applied before prototype values.
    pub fn with_default<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    /// Add a constraint over values of type `T`.
    ///
    /// Values of any other type fail the constraint.
    pub fn constraint<T, F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.constraints.push(Constraint {
            name: name.into(),
            check: Arc::new(move |value: &Value| value.downcast_ref::<T>().is_some_and(&check)),
        });
        self
    }
}

/// An event of a public type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDecl {
    pub(crate) name: String,
}
