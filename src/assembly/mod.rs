//! Assembly: declaring architectures, layers, modules and composites.
//!
//! An architecture collects composite declarations through assemblers and is
//! consumed by `create_model` into an immutable, validated
//! [`ApplicationModel`](crate::model::ApplicationModel).

mod architecture;
mod declaration;

pub use architecture::{LayerHandle, LayeredArchitecture, ModuleHandle, SingletonArchitecture};
pub use declaration::{Assembler, CompositeAssemblyInfo, CompositeDeclaration};
