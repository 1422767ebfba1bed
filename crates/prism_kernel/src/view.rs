//! Views and the view registry.

use std::collections::BTreeMap;

use prism_common::{Params, Value};

use crate::error::{BoxError, KernelError};

/// A named materializer that derives caller-facing data from a compiled model.
///
/// Results must be reproducible for equal `(model, params)` pairs; the kernel
/// caches them under a key derived from both.
pub trait View: Send + Sync {
    /// The key callers pass to [`Kernel::query`](crate::Kernel::query).
    fn key(&self) -> &str;

    /// Produces the view's result.
    fn materialize(&self, model: &Value, params: &Params) -> Result<Value, BoxError>;
}

/// A view backed by a closure.
pub struct FnView<F> {
    key: String,
    f: F,
}

impl<F> FnView<F>
where
    F: Fn(&Value, &Params) -> Result<Value, BoxError> + Send + Sync,
{
    /// Creates a view registered under `key` that applies `f`.
    pub fn new(key: impl Into<String>, f: F) -> Self {
        Self { key: key.into(), f }
    }
}

impl<F> View for FnView<F>
where
    F: Fn(&Value, &Params) -> Result<Value, BoxError> + Send + Sync,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn materialize(&self, model: &Value, params: &Params) -> Result<Value, BoxError> {
        (self.f)(model, params)
    }
}

/// Append-only mapping from view key to materializer.
#[derive(Default)]
pub struct ViewRegistry {
    views: BTreeMap<String, Box<dyn View>>,
}

impl ViewRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a view. Keys are unique; a second registration under the
    /// same key is rejected and the first one stays in place.
    pub fn register(&mut self, view: Box<dyn View>) -> Result<(), KernelError> {
        let key = view.key().to_string();
        if self.views.contains_key(&key) {
            return Err(KernelError::DuplicateView(key));
        }
        self.views.insert(key, view);
        Ok(())
    }

    /// Looks up a view by key.
    pub fn get(&self, key: &str) -> Option<&dyn View> {
        self.views.get(key).map(|v| v.as_ref())
    }

    /// Looks up a view, producing [`KernelError::ViewNotFound`] on a miss.
    pub fn resolve(&self, key: &str) -> Result<&dyn View, KernelError> {
        self.get(key).ok_or_else(|| KernelError::ViewNotFound {
            view: key.to_string(),
            known: self.keys(),
        })
    }

    /// All registered keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.views.keys().cloned().collect()
    }

    /// Number of registered views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Returns `true` if no views are registered.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
