//! Pull-based configuration compilation and caching kernel.
//!
//! Callers register compile [`Pass`]es and named [`View`]s, then ask the
//! [`Kernel`] for a view over a configuration. The kernel compiles the raw
//! configuration through its [`PassPipeline`], materializes the view, and
//! caches the result under a content-addressed key. A [`CompiledConfig`] from
//! [`Kernel::precompile`] answers the same queries without recompiling.
//!
//! The built-in [`InternPass`] hash-conses the model so duplicate subtrees
//! share storage.

#![warn(missing_docs)]

mod error;
mod intern;
mod kernel;
mod pass;
mod pipeline;
mod view;

pub use error::{BoxError, KernelError};
pub use intern::{InternOptions, InternPass, InternStats, MAX_INTERN_DEPTH};
pub use kernel::{build_backend, ConfigSource, Kernel, KernelStats};
pub use pass::{FnPass, Pass};
pub use pipeline::{CompiledConfig, PassPipeline};
pub use view::{FnView, View, ViewRegistry};

pub use prism_common::{Params, Value};
