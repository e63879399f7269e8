//! Engine facade
//!
//! Bundles a registry snapshot with a config and memoises compiled programs,
//! so command layers can compile a template once and run it many times.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::builtins;
use crate::compiler::{self, CompiledProgram};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{CompileResult, Result};
use crate::interpreter;
use crate::registry::{FunctionCatalog, FunctionRegistry};

/// Programs kept by [`Engine::compile_cached`] unless overridden.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Compiler and interpreter entry points sharing one registry and config.
pub struct Engine {
    registry: FunctionRegistry,
    config: EngineConfig,
    /// Keyed by path and source; flushed whole once `cache_capacity` is hit.
    cache: RwLock<HashMap<blake3::Hash, Arc<CompiledProgram>>>,
    cache_capacity: usize,
}

impl Engine {
    /// Engine over an explicit registry and config.
    pub fn new(registry: FunctionRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            cache: RwLock::new(HashMap::new()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Keep at most `capacity` compiled programs; zero disables caching.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Engine over the global catalog and the process-wide config.
    pub fn from_global() -> Self {
        Self::new(FunctionCatalog::global().snapshot(), EngineConfig::global())
    }

    /// Engine with only the built-in functions.
    pub fn with_builtins(config: EngineConfig) -> Result<Self> {
        Ok(Self::new(
            FunctionRegistry::from_functions(builtins::all())?,
            config,
        ))
    }

    /// Registry snapshot in use.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Config handed to new contexts.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compile without caching.
    pub fn compile(&self, source: &str, path: Option<&str>) -> CompileResult<CompiledProgram> {
        compiler::compile(&self.registry, source, path)
    }

    /// Compile, reusing an earlier result for the same path and source.
    ///
    /// The cache holds at most the configured capacity; a miss on a full
    /// cache drops every entry before storing the new program.
    pub fn compile_cached(
        &self,
        source: &str,
        path: Option<&str>,
    ) -> CompileResult<Arc<CompiledProgram>> {
        let key = cache_key(source, path);
        if let Some(program) = self.cache.read().get(&key) {
            debug!(key = %key.to_hex(), "Compiled program cache hit");
            return Ok(Arc::clone(program));
        }

        let program = Arc::new(self.compile(source, path)?);
        if self.cache_capacity == 0 {
            return Ok(program);
        }
        let mut cache = self.cache.write();
        if cache.len() >= self.cache_capacity && !cache.contains_key(&key) {
            debug!(entries = cache.len(), "Compiled program cache full, flushing");
            cache.clear();
        }
        cache.insert(key, Arc::clone(&program));
        Ok(program)
    }

    /// Number of cached programs.
    pub fn cached_programs(&self) -> usize {
        self.cache.read().len()
    }

    /// Drop every cached program.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Fresh context for running `program`.
    pub fn context(&self, program: Arc<CompiledProgram>) -> Context {
        Context::new(program, self.registry.clone(), self.config.clone())
    }

    /// Compile and run `source` without delivery.
    pub async fn render<I, K>(&self, source: &str, keywords: I) -> Result<Option<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let program = self.compile_cached(source, None)?;
        let mut ctx = self.context(program).without_delivery();
        for (name, value) in keywords {
            ctx.set_keyword(name, value);
        }
        Ok(interpreter::run(&mut ctx).await)
    }
}

fn cache_key(source: &str, path: Option<&str>) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.unwrap_or_default().as_bytes());
    hasher.update(&[0]);
    hasher.update(source.as_bytes());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_stays_within_capacity() {
        let engine = Engine::with_builtins(EngineConfig::default())
            .unwrap()
            .with_cache_capacity(2);
        for n in 0..5 {
            engine.compile_cached(&format!("line {n}"), None).unwrap();
            assert!(engine.cached_programs() <= 2);
        }
        let last = engine.compile_cached("line 4", None).unwrap();
        let again = engine.compile_cached("line 4", None).unwrap();
        assert!(Arc::ptr_eq(&last, &again));

        let uncached = Engine::with_builtins(EngineConfig::default())
            .unwrap()
            .with_cache_capacity(0);
        uncached.compile_cached("hi", None).unwrap();
        assert_eq!(uncached.cached_programs(), 0);
    }

    #[test]
    fn cache_reuses_programs() {
        let engine = Engine::with_builtins(EngineConfig::default()).unwrap();
        let first = engine.compile_cached("$get[x]", Some("a.forge")).unwrap();
        let second = engine.compile_cached("$get[x]", Some("a.forge")).unwrap();
        let other = engine.compile_cached("$get[x]", Some("b.forge")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(engine.cached_programs(), 2);

        engine.clear_cache();
        assert_eq!(engine.cached_programs(), 0);
    }

    #[test]
    fn compile_errors_are_not_cached() {
        let engine = Engine::with_builtins(EngineConfig::default()).unwrap();
        assert!(engine.compile_cached("$get", None).is_err());
        assert_eq!(engine.cached_programs(), 0);
    }

    #[tokio::test]
    async fn render_uses_keywords() {
        let engine = Engine::with_builtins(EngineConfig::default()).unwrap();
        let out = engine
            .render("Hi $get[name]", [("name", json!("Alice"))])
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("Hi Alice"));
    }
}
