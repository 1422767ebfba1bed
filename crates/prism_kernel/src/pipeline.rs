//! The ordered pass pipeline and its frozen output.

use std::sync::Arc;

use prism_common::{address, ContentHash, ContentHasher, HashAlgorithm, Value};

use crate::error::KernelError;
use crate::pass::Pass;

/// An ordered list of compile passes.
///
/// The pipeline performs no caching of its own. Its fingerprint covers every
/// pass identity in registration order and is recomputed whenever a pass is
/// appended.
pub struct PassPipeline {
    passes: Vec<Arc<dyn Pass>>,
    algorithm: HashAlgorithm,
    fingerprint: ContentHash,
}

impl PassPipeline {
    /// Creates an empty pipeline whose fingerprint uses `algorithm`.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            passes: Vec::new(),
            algorithm,
            fingerprint: fingerprint_of(&[], algorithm),
        }
    }

    /// Appends a pass.
    pub fn push(&mut self, pass: Arc<dyn Pass>) {
        self.passes.push(pass);
        self.fingerprint = fingerprint_of(&self.passes, self.algorithm);
    }

    /// Switches the fingerprint algorithm.
    pub fn set_algorithm(&mut self, algorithm: HashAlgorithm) {
        self.algorithm = algorithm;
        self.fingerprint = fingerprint_of(&self.passes, algorithm);
    }

    /// The algorithm used for fingerprints and source addresses.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Identity hash of the ordered pass list.
    pub fn fingerprint(&self) -> ContentHash {
        self.fingerprint
    }

    /// Names of the registered passes, in order.
    pub fn names(&self) -> Vec<String> {
        self.passes.iter().map(|p| p.name().to_string()).collect()
    }

    /// Number of registered passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if no passes are registered.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass in registration order, each on the previous output.
    pub fn compile(&self, raw: &Value) -> Result<Value, KernelError> {
        let mut model = raw.clone();
        for pass in &self.passes {
            tracing::trace!(pass = pass.name(), "pipeline.pass");
            model = pass.run(model).map_err(|source| KernelError::CompileFailed {
                pass: pass.name().to_string(),
                source,
            })?;
        }
        Ok(model)
    }

    /// Compiles `raw` once and freezes the result with this pipeline's
    /// fingerprint and the raw tree's content address.
    pub fn precompile(&self, raw: &Value) -> Result<CompiledConfig, KernelError> {
        let source = address(raw, self.algorithm);
        let model = self.compile(raw)?;
        tracing::debug!(source = %source, pipeline = %self.fingerprint, "pipeline.precompile");
        Ok(CompiledConfig {
            model,
            pipeline_fingerprint: self.fingerprint,
            source,
        })
    }
}

fn fingerprint_of(passes: &[Arc<dyn Pass>], algorithm: HashAlgorithm) -> ContentHash {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(&(passes.len() as u64).to_le_bytes());
    for pass in passes {
        hasher.update_hash(&address(&pass.identity(), algorithm));
    }
    hasher.finish()
}

/// An immutable compiled configuration.
///
/// Produced by [`Kernel::precompile`](crate::Kernel::precompile). Passing it to
/// [`Kernel::query`](crate::Kernel::query) yields the same results as passing
/// the raw configuration it was built from, without recompiling or rehashing
/// the raw tree. The kernel keeps no reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledConfig {
    model: Value,
    pipeline_fingerprint: ContentHash,
    source: ContentHash,
}

impl CompiledConfig {
    /// The compiled model.
    pub fn model(&self) -> &Value {
        &self.model
    }

    /// Fingerprint of the pipeline that produced the model.
    pub fn pipeline_fingerprint(&self) -> ContentHash {
        self.pipeline_fingerprint
    }

    /// Content address of the raw configuration the model was compiled from.
    pub fn source(&self) -> ContentHash {
        self.source
    }
}
