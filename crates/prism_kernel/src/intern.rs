//! Hash-consing pass that deduplicates equal values across a model.
//!
//! Each run builds a fresh [`InternTable`] and walks the model bottom-up. A
//! node's identity is the content hash of its tag and its children's
//! identities, so every node is hashed exactly once. When an identity has been
//! seen before in the same run, the node is replaced by the instance retained
//! for it; otherwise the node becomes that instance. The table is dropped when
//! the run ends.
//!
//! Mapping keys are deduplicated separately through a [`lasso::Rodeo`], so
//! every occurrence of a key string across the model shares one allocation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use lasso::{Key as _, Rodeo};
use prism_common::address::{self, tags, write_len, write_str};
use prism_common::{ContentHash, ContentHasher, HashAlgorithm, Key, Map, Value};
use serde::Serialize;

use crate::error::BoxError;
use crate::pass::Pass;

/// Deepest model the pass accepts. Interning recurses once per level.
pub const MAX_INTERN_DEPTH: usize = 512;

/// Options controlling an [`InternPass`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternOptions {
    /// Record hit/miss counters for each run.
    pub collect_stats: bool,
    /// Bucket width for float deduplication.
    ///
    /// When set, a float `v` is replaced by `round(v / step) * step`, so floats
    /// within one step collapse to a single value. This is lossy for callers
    /// that need exact floats.
    pub float_quantization_step: Option<f64>,
    /// Digest used for node identities.
    pub algorithm: HashAlgorithm,
}

impl Default for InternOptions {
    fn default() -> Self {
        Self {
            collect_stats: true,
            float_quantization_step: None,
            algorithm: HashAlgorithm::default(),
        }
    }
}

/// Counters accumulated by an [`InternPass`] across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InternStats {
    /// Number of completed runs.
    pub runs: u64,
    /// Every node visited.
    pub nodes_processed: u64,
    /// Distinct identities seen (unhashable nodes each count as distinct).
    pub unique_values: u64,
    /// Nodes replaced by a previously retained instance.
    pub cache_hits: u64,
    /// Nodes that became a new retained instance.
    pub cache_misses: u64,
}

impl InternStats {
    /// `cache_hits / nodes_processed`, or 0 before any node was seen.
    pub fn hit_rate(&self) -> f64 {
        if self.nodes_processed == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.nodes_processed as f64
        }
    }

    /// `unique_values / nodes_processed`, or 0 before any node was seen.
    pub fn unique_ratio(&self) -> f64 {
        if self.nodes_processed == 0 {
            0.0
        } else {
            self.unique_values as f64 / self.nodes_processed as f64
        }
    }

    fn absorb(&mut self, run: &InternStats) {
        self.runs += run.runs;
        self.nodes_processed += run.nodes_processed;
        self.unique_values += run.unique_values;
        self.cache_hits += run.cache_hits;
        self.cache_misses += run.cache_misses;
    }
}

/// A compile pass that hash-conses the model.
///
/// The output is structurally equal to the input (up to float quantization)
/// with duplicate subtrees sharing storage.
pub struct InternPass {
    options: InternOptions,
    stats: Mutex<InternStats>,
}

impl InternPass {
    /// Creates a pass with default options (stats on, exact floats).
    pub fn new() -> Self {
        Self::with_options(InternOptions::default())
    }

    /// Creates a pass with the given options.
    pub fn with_options(options: InternOptions) -> Self {
        Self {
            options,
            stats: Mutex::new(InternStats::default()),
        }
    }

    /// The options this pass was built with.
    pub fn options(&self) -> &InternOptions {
        &self.options
    }

    /// Snapshot of the accumulated counters.
    pub fn stats(&self) -> InternStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zeroes the accumulated counters.
    pub fn reset_stats(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = InternStats::default();
    }

    /// Interns `model` and returns the result with this run's counters.
    ///
    /// Recurses once per nesting level; [`Pass::run`] rejects models deeper
    /// than [`MAX_INTERN_DEPTH`] before calling this.
    pub fn intern(&self, model: Value) -> (Value, InternStats) {
        let mut table = InternTable::new(&self.options);
        let (value, _) = table.intern(model);
        let mut run = table.stats;
        run.runs = 1;
        (value, run)
    }
}

impl Default for InternPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for InternPass {
    fn name(&self) -> &str {
        "intern"
    }

    fn identity(&self) -> Value {
        let step = self
            .options
            .float_quantization_step
            .map_or(Value::Null, Value::Float);
        Value::map([
            ("pass", Value::from("intern")),
            ("algorithm", Value::from(self.options.algorithm.as_str())),
            ("float_quantization_step", step),
        ])
    }

    fn run(&self, model: Value) -> Result<Value, BoxError> {
        let depth = model.depth();
        if depth > MAX_INTERN_DEPTH {
            return Err(format!(
                "model nests {depth} levels deep, more than the {MAX_INTERN_DEPTH} the intern pass accepts"
            )
            .into());
        }
        let (value, run) = self.intern(model);
        tracing::trace!(
            nodes = run.nodes_processed,
            unique = run.unique_values,
            hits = run.cache_hits,
            "intern.run"
        );
        if self.options.collect_stats {
            self.stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .absorb(&run);
        }
        Ok(value)
    }
}

/// Per-run intern state. Never shared between runs.
struct InternTable<'a> {
    options: &'a InternOptions,
    canonical: HashMap<ContentHash, Value>,
    keys: Rodeo,
    key_instances: Vec<Key>,
    stats: InternStats,
}

impl<'a> InternTable<'a> {
    fn new(options: &'a InternOptions) -> Self {
        Self {
            options,
            canonical: HashMap::new(),
            keys: Rodeo::new(),
            key_instances: Vec::new(),
            stats: InternStats::default(),
        }
    }

    /// Interns one node, returning the retained instance and its identity.
    ///
    /// The identity is `None` for nodes that cannot be keyed (NaN floats and
    /// any container holding one); such nodes are kept as they are.
    fn intern(&mut self, value: Value) -> (Value, Option<ContentHash>) {
        self.stats.nodes_processed += 1;
        let (candidate, identity) = match value {
            Value::Float(f) => match self.quantize(f) {
                Some(q) => {
                    let v = Value::Float(q);
                    let id = address::address(&v, self.options.algorithm);
                    (v, Some(id))
                }
                None => (value, None),
            },
            Value::Seq(items) => self.intern_seq(&items),
            Value::Set(items) => {
                let interned: Vec<(Value, Option<ContentHash>)> =
                    items.iter().map(|item| self.intern(item.clone())).collect();
                self.rebuild_set(interned)
            }
            Value::Map(map) => self.intern_map(&map),
            scalar => {
                let id = address::address(&scalar, self.options.algorithm);
                (scalar, Some(id))
            }
        };

        let Some(id) = identity else {
            self.stats.cache_misses += 1;
            self.stats.unique_values += 1;
            return (candidate, None);
        };
        if let Some(existing) = self.canonical.get(&id) {
            self.stats.cache_hits += 1;
            return (existing.clone(), Some(id));
        }
        self.stats.cache_misses += 1;
        self.stats.unique_values += 1;
        self.canonical.insert(id, candidate.clone());
        (candidate, Some(id))
    }

    fn intern_seq(&mut self, items: &[Value]) -> (Value, Option<ContentHash>) {
        let mut hasher = self.hasher(tags::SEQ, items.len());
        let mut keyed = true;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let (v, id) = self.intern(item.clone());
            match id {
                Some(id) => hasher.update_hash(&id),
                None => keyed = false,
            }
            out.push(v);
        }
        let identity = keyed.then(|| hasher.finish());
        (Value::Seq(Arc::new(out)), identity)
    }

    /// Elements may collapse after quantization, so the identity is computed
    /// over the rebuilt set rather than the input.
    fn rebuild_set(&self, interned: Vec<(Value, Option<ContentHash>)>) -> (Value, Option<ContentHash>) {
        let elements: BTreeMap<Value, Option<ContentHash>> = interned.into_iter().collect();
        let mut hasher = self.hasher(tags::SET, elements.len());
        let mut keyed = true;
        for id in elements.values() {
            match id {
                Some(id) => hasher.update_hash(id),
                None => keyed = false,
            }
        }
        let identity = keyed.then(|| hasher.finish());
        (Value::Set(Arc::new(elements.into_keys().collect())), identity)
    }

    fn intern_map(&mut self, map: &Map) -> (Value, Option<ContentHash>) {
        let mut hasher = self.hasher(tags::MAP, map.len());
        let mut keyed = true;
        let mut out = Map::new();
        for (key, item) in map {
            write_str(&mut hasher, key);
            let (v, id) = self.intern(item.clone());
            match id {
                Some(id) => hasher.update_hash(&id),
                None => keyed = false,
            }
            out.insert(self.intern_key(key), v);
        }
        let identity = keyed.then(|| hasher.finish());
        (Value::Map(Arc::new(out)), identity)
    }

    fn intern_key(&mut self, key: &Key) -> Key {
        let Ok(spur) = self.keys.try_get_or_intern(&**key) else {
            // Rodeo exhausted its key space; keep the original allocation.
            return key.clone();
        };
        let index = spur.into_usize();
        if index == self.key_instances.len() {
            self.key_instances.push(key.clone());
        }
        self.key_instances[index].clone()
    }

    /// Returns the dedup value for a float, or `None` if it cannot be keyed.
    ///
    /// Infinities have no bucket, so they are unkeyable while quantizing.
    fn quantize(&self, f: f64) -> Option<f64> {
        if f.is_nan() {
            return None;
        }
        let Some(step) = self.options.float_quantization_step else {
            return Some(f);
        };
        if !f.is_finite() {
            return None;
        }
        // Adding 0.0 folds -0.0 into 0.0 so both signs share a bucket.
        let bucket = (f / step).round() * step + 0.0;
        // A bucket past the f64 range would turn a finite value into inf.
        Some(if bucket.is_finite() { bucket } else { f })
    }

    fn hasher(&self, tag: u8, len: usize) -> ContentHasher {
        let mut hasher = ContentHasher::new(self.options.algorithm);
        hasher.update(&[tag]);
        write_len(&mut hasher, len);
        hasher
    }
}
