//! Interface to type generators.
//!
//! A generator receives every composite model of a finished application
//! model: its id, public types, fragment list and method-composition table.
//! Generating concrete proxy types from them is left to the implementation.

use tracing::debug;

use crate::error::CompositeResult;
use crate::model::{ApplicationModel, CompositeModel};

/// Consumer of finished composite models.
pub trait TypeGenerator: Send + Sync {
    /// Generate the types backing one composite.
    fn generate(&self, model: &CompositeModel) -> CompositeResult<()>;

    /// Called once after every composite was generated.
    fn finish(&self, _application: &ApplicationModel) -> CompositeResult<()> {
        Ok(())
    }
}

impl ApplicationModel {
    /// Feed every composite model to `generator` in id order, returning how
    /// many were generated. The first failure stops generation.
    pub fn generate_types(&self, generator: &dyn TypeGenerator) -> CompositeResult<usize> {
        let mut generated = 0;
        for model in self.composite_models() {
            generator.generate(model)?;
            debug!(composite = %model.id(), types = %model.describe(), "Types generated");
            generated += 1;
        }
        generator.finish(self)?;
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::SingletonArchitecture;
    use crate::error::CompositeError;
    use crate::model::{CompositeId, PublicType};
    use parking_lot::Mutex;

    trait Clock {}
    trait Calendar {}

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<CompositeId>>,
        finished: Mutex<bool>,
    }

    impl TypeGenerator for Recorder {
        fn generate(&self, model: &CompositeModel) -> CompositeResult<()> {
            self.seen.lock().push(model.id());
            Ok(())
        }

        fn finish(&self, _application: &ApplicationModel) -> CompositeResult<()> {
            *self.finished.lock() = true;
            Ok(())
        }
    }

    struct Failing;

    impl TypeGenerator for Failing {
        fn generate(&self, _model: &CompositeModel) -> CompositeResult<()> {
            Err("generator offline".into())
        }
    }

    fn model() -> std::sync::Arc<ApplicationModel> {
        let mut arch = SingletonArchitecture::new();
        let mut assembler = arch.assembler();
        assembler
            .new_service()
            .unwrap()
            .of_types([PublicType::of::<dyn Clock>()]);
        assembler
            .new_service()
            .unwrap()
            .of_types([PublicType::of::<dyn Calendar>()]);
        arch.create_model().unwrap()
    }

    #[test]
    fn test_generator_sees_every_composite_in_id_order() {
        let model = model();
        let recorder = Recorder::default();

        assert_eq!(model.generate_types(&recorder).unwrap(), 2);
        assert_eq!(*recorder.seen.lock(), vec![CompositeId(0), CompositeId(1)]);
        assert!(*recorder.finished.lock());
    }

    #[test]
    fn test_generator_failure_stops_generation() {
        let err = model().generate_types(&Failing).unwrap_err();
        assert!(matches!(err, CompositeError::InvocationFailed(_)));
    }
}
