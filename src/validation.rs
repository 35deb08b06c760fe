//! Structural validation of application models.
//!
//! Validation is total: every problem in the model is collected into a
//! [`ValidationResult`] and the caller decides whether it is fatal.

use std::fmt;

use thiserror::Error;

use crate::injection::ValidationContext;
use crate::model::{ApplicationModel, CompositeModel, FragmentKind, LayerId, LayerModel};

/// A structural problem found in an application model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The layer reaches a cycle of layer usages
    #[error("Layer '{layer}' is part of a cyclic layer usage")]
    CyclicLayers {
        /// Originating layer name
        layer: String,
    },

    /// A composite declares no public types
    #[error("Composite {composite} in {location} declares no public types")]
    NoPublicTypes {
        /// Composite id
        composite: String,
        /// Layer/module of the composite
        location: String,
    },

    /// No mixin applies to a method
    #[error("Method '{method}' of {composite} in {location} has no applicable mixin")]
    MissingMixin {
        /// Public types of the composite
        composite: String,
        /// Method name
        method: String,
        /// Layer/module of the composite
        location: String,
    },

    /// A fragment was declared in a role it does not implement
    #[error("Fragment {fragment} of {composite} is a {actual} but was declared as a {declared}")]
    FragmentRoleMismatch {
        /// Public types of the composite
        composite: String,
        /// Fragment type name
        fragment: String,
        /// Role the fragment was declared in
        declared: FragmentKind,
        /// Role the fragment implements
        actual: FragmentKind,
    },

    /// An injection strategy reported the point cannot be satisfied
    #[error(
        "Cannot satisfy injection point '{point}' ({scope}) of {fragment} in {composite}: {reason}"
    )]
    InjectionNotPossible {
        /// Public types of the composite
        composite: String,
        /// Fragment type name
        fragment: String,
        /// Injection point name
        point: String,
        /// Injection scope
        scope: String,
        /// Reason given by the strategy
        reason: String,
    },

    /// No strategy is registered for the point's scope
    #[error(
        "Injection point '{point}' of {fragment} in {composite} uses unregistered scope '{scope}'"
    )]
    UnregisteredScope {
        /// Public types of the composite
        composite: String,
        /// Fragment type name
        fragment: String,
        /// Injection point name
        point: String,
        /// Injection scope
        scope: String,
    },

    /// A composite model type support rejected the composite
    #[error("{composite}: {message}")]
    ModelType {
        /// Public types of the composite
        composite: String,
        /// Problem reported by the support
        message: String,
    },
}

/// Accumulated validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Recorded errors in discovery order.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether the model is valid.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any error matches `predicate`.
    pub fn has(&self, predicate: impl Fn(&ValidationError) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationResult {}

pub(crate) fn validate(app: &ApplicationModel) -> ValidationResult {
    let mut result = ValidationResult::new();

    let layers = app.layers();
    for layer in layers {
        if reaches_cycle(layers, layer.id) {
            result.push(ValidationError::CyclicLayers {
                layer: layer.name.clone(),
            });
        }
    }

    for composite in app.composite_models() {
        validate_composite(app, composite, &mut result);
    }

    result
}

fn validate_composite(
    app: &ApplicationModel,
    composite: &CompositeModel,
    result: &mut ValidationResult,
) {
    let describe = composite.describe();
    let location = app.location_name(composite.location);

    if composite.public_types.is_empty() {
        result.push(ValidationError::NoPublicTypes {
            composite: composite.id.to_string(),
            location: location.clone(),
        });
    }

    for method in &composite.methods {
        if method.mixin.is_none() {
            result.push(ValidationError::MissingMixin {
                composite: describe.clone(),
                method: method.name.clone(),
                location: location.clone(),
            });
        }
    }

    for fragment in &composite.fragments {
        if fragment.declared_as != fragment.decl.kind() {
            result.push(ValidationError::FragmentRoleMismatch {
                composite: describe.clone(),
                fragment: fragment.decl.name().to_string(),
                declared: fragment.declared_as,
                actual: fragment.decl.kind(),
            });
        }

        for point in fragment.decl.injection_points() {
            let Some(strategy) = app.injection_service().get(point.scope) else {
                result.push(ValidationError::UnregisteredScope {
                    composite: describe.clone(),
                    fragment: fragment.decl.name().to_string(),
                    point: point.name.clone(),
                    scope: point.scope.to_string(),
                });
                continue;
            };
            let ctx = ValidationContext {
                application: app,
                composite,
                fragment,
                point,
            };
            if let Err(reason) = strategy.possible(&ctx) {
                result.push(ValidationError::InjectionNotPossible {
                    composite: describe.clone(),
                    fragment: fragment.decl.name().to_string(),
                    point: point.name.clone(),
                    scope: point.scope.to_string(),
                    reason,
                });
            }
        }
    }

    if let Some(support) = app.registry().get(composite.model_type) {
        support.validate(composite, result);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Three-color DFS from `origin`; true if a back edge is found.
fn reaches_cycle(layers: &[LayerModel], origin: LayerId) -> bool {
    let mut marks = vec![Mark::Unvisited; layers.len()];
    let mut stack = vec![(origin, 0usize)];
    marks[origin.0] = Mark::OnPath;

    while let Some(top) = stack.last_mut() {
        let (current, next) = *top;
        let used = &layers[current.0].used_layers;
        if next < used.len() {
            top.1 += 1;
            let child = used[next];
            match marks[child.0] {
                Mark::OnPath => return true,
                Mark::Unvisited => {
                    marks[child.0] = Mark::OnPath;
                    stack.push((child, 0));
                }
                Mark::Done => {}
            }
        } else {
            marks[current.0] = Mark::Done;
            stack.pop();
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: usize, used: &[usize]) -> LayerModel {
        LayerModel {
            id: LayerId(id),
            name: format!("l{id}"),
            modules: Vec::new(),
            used_layers: used.iter().map(|u| LayerId(*u)).collect(),
        }
    }

    #[test]
    fn test_mutual_use_is_cyclic() {
        let layers = vec![layer(0, &[1]), layer(1, &[0])];
        assert!(reaches_cycle(&layers, LayerId(0)));
        assert!(reaches_cycle(&layers, LayerId(1)));
    }

    #[test]
    fn test_self_use_is_cyclic() {
        let layers = vec![layer(0, &[0])];
        assert!(reaches_cycle(&layers, LayerId(0)));
    }

    #[test]
    fn test_dag_with_shared_target_is_acyclic() {
        // a -> b -> c, a -> c
        let layers = vec![layer(0, &[1, 2]), layer(1, &[2]), layer(2, &[])];
        for l in &layers {
            assert!(!reaches_cycle(&layers, l.id));
        }
    }

    #[test]
    fn test_layer_leading_into_cycle_is_blamed() {
        // 0 -> 1 <-> 2
        let layers = vec![layer(0, &[1]), layer(1, &[2]), layer(2, &[1])];
        assert!(reaches_cycle(&layers, LayerId(0)));
    }

    #[test]
    fn test_result_display_lists_errors() {
        let mut result = ValidationResult::new();
        result.push(ValidationError::CyclicLayers {
            layer: "domain".to_string(),
        });
        assert_eq!(result.len(), 1);
        assert!(result.to_string().contains("'domain'"));
        assert!(result.has(|e| matches!(e, ValidationError::CyclicLayers { .. })));
    }
}
