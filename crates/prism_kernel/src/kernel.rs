//! The pull-based query kernel.
//!
//! A query walks `received -> keyed -> (hit | miss -> compile -> materialize ->
//! stored) -> returned`. Failures end the walk without touching the cache.

use std::num::NonZeroUsize;
use std::sync::Arc;

use prism_cache::{BackendStats, CacheBackend, CacheError, LruBackend, NoopBackend, UnboundedBackend};
use prism_common::{address, address_map, address_record, ContentHash, HashAlgorithm, Params, Value};
use prism_config::{BackendKind, CacheConfig, KernelConfig, DEFAULT_CACHE_SIZE};
use serde::Serialize;

use crate::error::KernelError;
use crate::intern::{InternOptions, InternPass, InternStats};
use crate::pass::Pass;
use crate::pipeline::{CompiledConfig, PassPipeline};
use crate::view::{View, ViewRegistry};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CACHE_SIZE) {
    Some(n) => n,
    None => panic!("DEFAULT_CACHE_SIZE must be non-zero"),
};

/// The configuration a query runs against.
#[derive(Debug, Clone, Copy)]
pub enum ConfigSource<'a> {
    /// A raw tree; compiled on every cache miss.
    Raw(&'a Value),
    /// A precompiled configuration; its frozen model is reused as is.
    Compiled(&'a CompiledConfig),
}

impl<'a> From<&'a Value> for ConfigSource<'a> {
    fn from(raw: &'a Value) -> Self {
        ConfigSource::Raw(raw)
    }
}

impl<'a> From<&'a CompiledConfig> for ConfigSource<'a> {
    fn from(compiled: &'a CompiledConfig) -> Self {
        ConfigSource::Compiled(compiled)
    }
}

/// Snapshot of kernel counters and registrations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelStats {
    /// Every call to [`Kernel::query`], including failed ones.
    pub total_queries: u64,
    /// Queries answered from the cache.
    pub cache_hits: u64,
    /// Queries that had to compile and materialize.
    pub cache_misses: u64,
    /// Queries that returned an error.
    pub failed_queries: u64,
    /// `cache_hits / (cache_hits + cache_misses)`, or 0 before any lookup.
    pub hit_rate: f64,
    /// Occupancy counters of the cache backend.
    pub backend: BackendStats,
    /// Pass names in pipeline order.
    pub registered_passes: Vec<String>,
    /// View keys in sorted order.
    pub registered_views: Vec<String>,
    /// Counters of the built-in intern pass, when one is installed.
    pub intern: Option<InternStats>,
}

#[derive(Debug, Default, Clone, Copy)]
struct QueryCounters {
    total_queries: u64,
    cache_hits: u64,
    cache_misses: u64,
    failed_queries: u64,
}

/// Compiles configurations and serves cached views over them.
///
/// Callers never see the compiled model directly; they ask for a view by key
/// and the kernel decides whether to recompute or reuse a cached result.
/// Results are [`Value`]s whose compound nodes are shared and immutable, so a
/// caller cannot alter the entry other callers receive for the same key. To
/// edit a result, go through [`Value::map_mut`], which copies first.
///
/// The kernel is single-threaded: `query` takes `&mut self`. Wrap it in a
/// mutex, or keep one kernel per worker, to serve from several threads.
pub struct Kernel {
    pipeline: PassPipeline,
    views: ViewRegistry,
    backend: Box<dyn CacheBackend<Value>>,
    intern: Option<Arc<InternPass>>,
    counters: QueryCounters,
}

impl Kernel {
    /// Creates a kernel with an LRU cache of [`DEFAULT_CACHE_SIZE`] entries,
    /// XXH3-128 keys, and an empty pipeline.
    pub fn new() -> Self {
        Self::with_backend(Box::new(LruBackend::with_capacity(DEFAULT_CAPACITY)))
    }

    /// Creates a kernel over a caller-supplied cache backend.
    pub fn with_backend(backend: Box<dyn CacheBackend<Value>>) -> Self {
        Self {
            pipeline: PassPipeline::new(HashAlgorithm::default()),
            views: ViewRegistry::new(),
            backend,
            intern: None,
            counters: QueryCounters::default(),
        }
    }

    /// Builds a kernel from a loaded configuration.
    ///
    /// When `intern.enabled` is set, an [`InternPass`] is installed as the
    /// first pass and its counters are reported through [`Kernel::stats`].
    pub fn from_config(config: &KernelConfig) -> Result<Self, KernelError> {
        let mut kernel = Self::with_backend(build_backend(&config.cache)?)
            .with_hash_algorithm(config.hashing.algorithm);
        if config.intern.enabled {
            let pass = Arc::new(InternPass::with_options(InternOptions {
                collect_stats: config.intern.collect_stats,
                float_quantization_step: config.intern.float_quantization_step,
                algorithm: config.hashing.algorithm,
            }));
            kernel.register_pass(Arc::clone(&pass));
            kernel.intern = Some(pass);
        }
        tracing::debug!(
            backend = kernel.backend.stats().kind,
            algorithm = %config.hashing.algorithm,
            passes = kernel.pipeline.len(),
            "kernel.from_config"
        );
        Ok(kernel)
    }

    /// Switches the digest used for cache keys and fingerprints.
    ///
    /// Configurations precompiled under the previous algorithm become stale.
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.pipeline.set_algorithm(algorithm);
        self
    }

    /// The digest used for cache keys and fingerprints.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.pipeline.algorithm()
    }

    /// Appends a pass to the pipeline.
    ///
    /// Changing the pipeline changes its fingerprint, so cached results for
    /// the old pipeline stop matching and previously precompiled
    /// configurations are rejected as stale.
    pub fn register_pass<P: Pass + 'static>(&mut self, pass: P) {
        tracing::info!(pass = pass.name(), "kernel.register_pass");
        self.pipeline.push(Arc::new(pass));
    }

    /// Registers a view. Fails if a view with the same key already exists.
    pub fn register_view<V: View + 'static>(&mut self, view: V) -> Result<(), KernelError> {
        tracing::info!(view = view.key(), "kernel.register_view");
        self.views.register(Box::new(view))
    }

    /// Runs the pipeline on `raw` once and freezes the result.
    pub fn precompile(&self, raw: &Value) -> Result<CompiledConfig, KernelError> {
        self.pipeline.precompile(raw)
    }

    /// Fingerprint of the current pipeline.
    pub fn pipeline_fingerprint(&self) -> ContentHash {
        self.pipeline.fingerprint()
    }

    /// Materializes `view_key` over `config` with `params`, from cache when possible.
    ///
    /// Querying a [`CompiledConfig`] returns the same value as querying the raw
    /// tree it was built from. Both forms share cache entries, because the
    /// key is derived from the raw tree's address in either case.
    pub fn query<'a>(
        &mut self,
        view_key: &str,
        params: &Params,
        config: impl Into<ConfigSource<'a>>,
    ) -> Result<Value, KernelError> {
        self.counters.total_queries += 1;
        let config = config.into();
        let result = self.query_inner(view_key, params, config);
        if let Err(err) = &result {
            self.counters.failed_queries += 1;
            tracing::warn!(view = view_key, error = %err, "kernel.query_failed");
        }
        result
    }

    fn query_inner(
        &mut self,
        view_key: &str,
        params: &Params,
        config: ConfigSource<'_>,
    ) -> Result<Value, KernelError> {
        self.views.resolve(view_key)?;
        if let ConfigSource::Compiled(compiled) = config {
            let expected = self.pipeline.fingerprint();
            if compiled.pipeline_fingerprint() != expected {
                return Err(KernelError::StalePipeline {
                    expected,
                    found: compiled.pipeline_fingerprint(),
                });
            }
        }

        let key = self.cache_key(view_key, params, config);
        if let Some(hit) = self.backend.get(&key) {
            self.counters.cache_hits += 1;
            tracing::debug!(view = view_key, key = %key, "kernel.cache_hit");
            return Ok(hit);
        }

        self.counters.cache_misses += 1;
        tracing::debug!(view = view_key, key = %key, "kernel.cache_miss");
        let result = self.materialize(view_key, params, config)?;
        self.backend.set(key, result.clone());
        Ok(result)
    }

    /// Compiles if needed, then invokes the view's materializer.
    fn materialize(
        &self,
        view_key: &str,
        params: &Params,
        config: ConfigSource<'_>,
    ) -> Result<Value, KernelError> {
        let view = self.views.resolve(view_key)?;
        let model = match config {
            ConfigSource::Raw(raw) => {
                tracing::debug!(view = view_key, "kernel.compile");
                self.pipeline
                    .compile(raw)
                    .map_err(|err| KernelError::MaterializationFailed {
                        view: view_key.to_string(),
                        source: Box::new(err),
                    })?
            }
            ConfigSource::Compiled(compiled) => compiled.model().clone(),
        };
        view.materialize(&model, params)
            .map_err(|source| KernelError::MaterializationFailed {
                view: view_key.to_string(),
                source,
            })
    }

    /// Derives the cache key for a query.
    ///
    /// The key covers the raw configuration's address, the pipeline
    /// fingerprint, the view key, and the parameters.
    pub fn cache_key(&self, view_key: &str, params: &Params, config: ConfigSource<'_>) -> ContentHash {
        let algorithm = self.pipeline.algorithm();
        let source = match config {
            ConfigSource::Raw(raw) => address(raw, algorithm),
            ConfigSource::Compiled(compiled) => compiled.source(),
        };
        let pipeline = self.pipeline.fingerprint();
        let view = address(&Value::from(view_key), algorithm);
        let params = address_map(params, algorithm);
        address_record(
            algorithm,
            &[
                ("source", &source),
                ("pipeline", &pipeline),
                ("view", &view),
                ("params", &params),
            ],
        )
    }

    /// Drops every cached entry. Counters are kept.
    pub fn clear_cache(&mut self) {
        tracing::info!(entries = self.backend.len(), "kernel.clear_cache");
        self.backend.clear();
    }

    /// Zeroes query counters and the built-in intern pass counters.
    pub fn reset_stats(&mut self) {
        self.counters = QueryCounters::default();
        if let Some(intern) = &self.intern {
            intern.reset_stats();
        }
    }

    /// Snapshot of counters, backend occupancy, and registrations.
    pub fn stats(&self) -> KernelStats {
        let QueryCounters {
            total_queries,
            cache_hits,
            cache_misses,
            failed_queries,
        } = self.counters;
        let lookups = cache_hits + cache_misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            cache_hits as f64 / lookups as f64
        };
        KernelStats {
            total_queries,
            cache_hits,
            cache_misses,
            failed_queries,
            hit_rate,
            backend: self.backend.stats(),
            registered_passes: self.pipeline.names(),
            registered_views: self.views.keys(),
            intern: self.intern.as_ref().map(|p| p.stats()),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Constructs the cache backend named by `config`.
pub fn build_backend(config: &CacheConfig) -> Result<Box<dyn CacheBackend<Value>>, CacheError> {
    Ok(match config.backend {
        BackendKind::Lru => Box::new(LruBackend::new(config.max_size)?),
        BackendKind::Unbounded => Box::new(UnboundedBackend::new()),
        BackendKind::Disabled => Box::new(NoopBackend),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::FnPass;
    use crate::view::FnView;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tag_pass() -> FnPass<impl Fn(Value) -> Result<Value, crate::BoxError> + Send + Sync> {
        FnPass::new("tag", |model: Value| {
            let mut model = model;
            model
                .map_mut()
                .ok_or("model must be a mapping")?
                .insert("compiled".into(), Value::Bool(true));
            Ok(model)
        })
    }

    fn echo_view(key: &str) -> FnView<impl Fn(&Value, &Params) -> Result<Value, crate::BoxError> + Send + Sync> {
        FnView::new(key, |model: &Value, params: &Params| {
            Ok(Value::map([
                ("model", model.clone()),
                ("params", Value::from(params.clone())),
            ]))
        })
    }

    fn kernel() -> Kernel {
        let mut kernel = Kernel::new();
        kernel.register_pass(tag_pass());
        kernel.register_view(echo_view("v")).unwrap();
        kernel
    }

    fn tokyo() -> Params {
        Value::params([("region", "tokyo")])
    }

    #[test]
    fn second_query_is_a_hit() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web"}).into();
        let first = kernel.query("v", &tokyo(), &raw).unwrap();
        let second = kernel.query("v", &tokyo(), &raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.pointer(["model", "compiled"]),
            Some(&Value::Bool(true))
        );
        assert_eq!(
            first.pointer(["params", "region"]),
            Some(&Value::from("tokyo"))
        );
        let stats = kernel.stats();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn hit_returns_the_stored_instance() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web"}).into();
        let first = kernel.query("v", &tokyo(), &raw).unwrap();
        let second = kernel.query("v", &tokyo(), &raw).unwrap();
        assert!(Value::same_instance(&first, &second));
    }

    #[test]
    fn caller_edits_do_not_reach_the_cache() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web"}).into();
        let mut first = kernel.query("v", &tokyo(), &raw).unwrap();
        first
            .map_mut()
            .unwrap()
            .insert("model".into(), Value::from("tampered"));
        let second = kernel.query("v", &tokyo(), &raw).unwrap();
        assert_eq!(
            second.pointer(["model", "service"]),
            Some(&Value::from("web"))
        );
    }

    #[test]
    fn unknown_view_lists_registered_keys() {
        let mut kernel = kernel();
        let err = kernel
            .query("missing_view", &Params::new(), &Value::map(Vec::<(&str, Value)>::new()))
            .unwrap_err();
        match err {
            KernelError::ViewNotFound { view, known } => {
                assert_eq!(view, "missing_view");
                assert_eq!(known, vec!["v".to_string()]);
            }
            other => panic!("expected ViewNotFound, got {other}"),
        }
        let stats = kernel.stats();
        assert_eq!(stats.failed_queries, 1);
        assert_eq!(stats.cache_misses, 0);
    }

    #[test]
    fn raw_and_compiled_agree_and_share_entries() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web", "replicas": 3}).into();
        let compiled = kernel.precompile(&raw).unwrap();
        let from_compiled = kernel.query("v", &tokyo(), &compiled).unwrap();
        let from_raw = kernel.query("v", &tokyo(), &raw).unwrap();
        assert_eq!(from_compiled, from_raw);
        assert_eq!(kernel.stats().cache_hits, 1);
        assert_eq!(
            kernel.cache_key("v", &tokyo(), ConfigSource::Raw(&raw)),
            kernel.cache_key("v", &tokyo(), ConfigSource::Compiled(&compiled))
        );
    }

    #[test]
    fn compiled_path_skips_compilation() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut kernel = Kernel::new();
        kernel.register_pass(FnPass::new("count", move |model: Value| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(model)
        }));
        kernel.register_view(echo_view("v")).unwrap();
        let raw: Value = json!({"service": "web"}).into();
        let compiled = kernel.precompile(&raw).unwrap();
        assert_eq!(runs.load(Ordering::Relaxed), 1);
        for region in ["tokyo", "osaka", "paris"] {
            let params = Value::params([("region", region)]);
            kernel.query("v", &params, &compiled).unwrap();
        }
        assert_eq!(runs.load(Ordering::Relaxed), 1);
        kernel.query("v", &Value::params([("region", "lima")]), &raw).unwrap();
        assert_eq!(runs.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn params_distinguish_entries() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web"}).into();
        kernel.query("v", &tokyo(), &raw).unwrap();
        kernel
            .query("v", &Value::params([("region", "osaka")]), &raw)
            .unwrap();
        assert_eq!(kernel.stats().cache_misses, 2);
        assert_eq!(kernel.stats().backend.size, 2);
    }

    #[test]
    fn materializer_failure_is_reported_and_not_cached() {
        let mut kernel = kernel();
        kernel
            .register_view(FnView::new("strict", |model: &Value, _: &Params| {
                model
                    .get("region")
                    .cloned()
                    .ok_or_else(|| "region missing".into())
            }))
            .unwrap();
        let raw: Value = json!({"service": "web"}).into();
        for _ in 0..2 {
            let err = kernel.query("strict", &Params::new(), &raw).unwrap_err();
            match err {
                KernelError::MaterializationFailed { view, source } => {
                    assert_eq!(view, "strict");
                    assert_eq!(source.to_string(), "region missing");
                }
                other => panic!("expected MaterializationFailed, got {other}"),
            }
        }
        let stats = kernel.stats();
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.failed_queries, 2);
        assert_eq!(stats.backend.size, 0);

        // The kernel keeps serving other queries.
        assert!(kernel.query("v", &tokyo(), &raw).is_ok());
    }

    #[test]
    fn pass_failure_surfaces_as_materialization_failure() {
        let mut kernel = kernel();
        let err = kernel.query("v", &tokyo(), &Value::Int(1)).unwrap_err();
        match err {
            KernelError::MaterializationFailed { view, source } => {
                assert_eq!(view, "v");
                assert!(source.to_string().contains("pass 'tag' failed"));
            }
            other => panic!("expected MaterializationFailed, got {other}"),
        }
    }

    #[test]
    fn precompile_reports_pass_failure() {
        let kernel = kernel();
        let err = kernel.precompile(&Value::Int(1)).unwrap_err();
        assert!(matches!(err, KernelError::CompileFailed { ref pass, .. } if pass == "tag"));
    }

    #[test]
    fn stale_compiled_config_rejected() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web"}).into();
        let compiled = kernel.precompile(&raw).unwrap();
        kernel.register_pass(FnPass::new("noop", Ok));
        let err = kernel.query("v", &tokyo(), &compiled).unwrap_err();
        assert!(matches!(err, KernelError::StalePipeline { .. }));
        let fresh = kernel.precompile(&raw).unwrap();
        assert!(kernel.query("v", &tokyo(), &fresh).is_ok());
    }

    #[test]
    fn duplicate_view_rejected() {
        let mut kernel = kernel();
        let err = kernel.register_view(echo_view("v")).unwrap_err();
        assert!(matches!(err, KernelError::DuplicateView(_)));
        assert_eq!(kernel.stats().registered_views, vec!["v".to_string()]);
    }

    #[test]
    fn clear_cache_keeps_counters() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web"}).into();
        kernel.query("v", &tokyo(), &raw).unwrap();
        kernel.clear_cache();
        assert_eq!(kernel.stats().backend.size, 0);
        assert_eq!(kernel.stats().cache_misses, 1);
        kernel.query("v", &tokyo(), &raw).unwrap();
        assert_eq!(kernel.stats().cache_misses, 2);
    }

    #[test]
    fn reset_stats_zeroes_counters_only() {
        let mut kernel = kernel();
        let raw: Value = json!({"service": "web"}).into();
        kernel.query("v", &tokyo(), &raw).unwrap();
        kernel.reset_stats();
        let stats = kernel.stats();
        assert_eq!(stats.total_queries, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.backend.size, 1);
    }

    #[test]
    fn noop_backend_always_recomputes() {
        let mut kernel = Kernel::with_backend(Box::new(NoopBackend));
        kernel.register_view(echo_view("v")).unwrap();
        let raw: Value = json!({"service": "web"}).into();
        let a = kernel.query("v", &tokyo(), &raw).unwrap();
        let b = kernel.query("v", &tokyo(), &raw).unwrap();
        assert_eq!(a, b);
        assert_eq!(kernel.stats().cache_hits, 0);
        assert_eq!(kernel.stats().cache_misses, 2);
    }

    #[test]
    fn from_config_installs_intern_pass() {
        let config = prism_config::load_config_from_str(
            "[cache]\nbackend = \"unbounded\"\n[hashing]\nalgorithm = \"blake3-256\"\n",
        )
        .unwrap();
        let mut kernel = Kernel::from_config(&config).unwrap();
        kernel.register_view(echo_view("v")).unwrap();
        let raw: Value = json!({"a": ["x", "x"]}).into();
        kernel.query("v", &Params::new(), &raw).unwrap();
        let stats = kernel.stats();
        assert_eq!(stats.registered_passes, vec!["intern".to_string()]);
        assert_eq!(stats.backend.kind, "unbounded");
        assert_eq!(kernel.hash_algorithm(), HashAlgorithm::Blake3_256);
        let intern = stats.intern.unwrap();
        assert_eq!(intern.nodes_processed, 4);
        assert_eq!(intern.cache_hits, 1);
    }

    #[test]
    fn from_config_without_intern() {
        let config = prism_config::load_config_from_str("[intern]\nenabled = false\n").unwrap();
        let kernel = Kernel::from_config(&config).unwrap();
        let stats = kernel.stats();
        assert!(stats.registered_passes.is_empty());
        assert!(stats.intern.is_none());
        assert_eq!(stats.backend.max_size, Some(DEFAULT_CACHE_SIZE));
    }

    #[test]
    fn build_backend_rejects_zero_capacity() {
        let config = CacheConfig {
            backend: BackendKind::Lru,
            max_size: 0,
        };
        assert!(matches!(
            build_backend(&config),
            Err(CacheError::ZeroCapacity { .. })
        ));
    }

    #[test]
    fn stats_serialize_for_reporting() {
        let kernel = kernel();
        let json = serde_json::to_value(kernel.stats()).unwrap();
        assert_eq!(json["registered_passes"][0], "tag");
        assert_eq!(json["backend"]["kind"], "lru");
    }
}
