//! Runtime type identity and dynamically typed values.
//!
//! Composites, injection points and uses containers all work with types that
//! are only known at assembly time. `TypeKey` identifies a type (including
//! unsized `dyn Trait` types) and `Value` carries an instance of one.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A shared, dynamically typed value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete value into a [`Value`].
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// The unit value, returned by composite methods that produce nothing.
pub fn unit() -> Value {
    Arc::new(())
}

/// The `TypeId` of the concrete value behind a [`Value`].
pub fn value_type_id(value: &Value) -> TypeId {
    Any::type_id(&**value)
}

/// Identity of a type as seen by the composite model.
///
/// Equality, ordering and hashing use the `TypeId` only; the name is kept
/// for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of the type `T`. `T` may be a trait object such as `dyn Greeter`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The full type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the given value is an instance of this type.
    pub fn matches(&self, value: &Value) -> bool {
        value_type_id(value) == self.id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Render a list of type keys for error messages.
pub(crate) fn type_list(types: &[TypeKey]) -> String {
    let names: Vec<&str> = types.iter().map(TypeKey::name).collect();
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter {}

    #[test]
    fn test_type_key_equality() {
        assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
        assert_ne!(TypeKey::of::<String>(), TypeKey::of::<u32>());
        assert_eq!(TypeKey::of::<dyn Greeter>(), TypeKey::of::<dyn Greeter>());
    }

    #[test]
    fn test_value_type_id_sees_through_arc() {
        let v = value(42u32);
        assert_eq!(value_type_id(&v), TypeId::of::<u32>());
        assert!(TypeKey::of::<u32>().matches(&v));
        assert!(!TypeKey::of::<Value>().matches(&v));
    }

    #[test]
    fn test_type_list_format() {
        let list = type_list(&[TypeKey::of::<u8>(), TypeKey::of::<u16>()]);
        assert_eq!(list, "[u8, u16]");
    }
}
