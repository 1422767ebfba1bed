//! The compile pass contract.

use std::sync::Arc;

use prism_common::Value;

use crate::error::BoxError;

/// A single compile step over a configuration model.
///
/// The first pass in a pipeline receives the raw configuration; each later
/// pass receives its predecessor's output. Passes must be deterministic:
/// structurally equal input yields structurally equal output, because cache
/// keys assume the compiled model is a pure function of the raw input and the
/// pipeline's [`identity`](Pass::identity) values.
pub trait Pass: Send + Sync {
    /// Short name used in logs and errors (e.g., "intern").
    fn name(&self) -> &str;

    /// Value folded into the pipeline fingerprint.
    ///
    /// Passes whose output depends on options must include those options here,
    /// otherwise two differently configured pipelines would share cache keys.
    fn identity(&self) -> Value {
        Value::from(self.name())
    }

    /// Transforms the model.
    fn run(&self, model: Value) -> Result<Value, BoxError>;
}

impl<P: Pass + ?Sized> Pass for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn identity(&self) -> Value {
        (**self).identity()
    }

    fn run(&self, model: Value) -> Result<Value, BoxError> {
        (**self).run(model)
    }
}

/// A pass backed by a closure.
pub struct FnPass<F> {
    name: String,
    f: F,
}

impl<F> FnPass<F>
where
    F: Fn(Value) -> Result<Value, BoxError> + Send + Sync,
{
    /// Creates a pass named `name` that applies `f`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Pass for FnPass<F>
where
    F: Fn(Value) -> Result<Value, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, model: Value) -> Result<Value, BoxError> {
        (self.f)(model)
    }
}
