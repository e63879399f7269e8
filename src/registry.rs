//! Function registry
//!
//! Provides a global catalog for registering native functions before any
//! template is compiled. Compilers and interpreters work against an immutable
//! [`FunctionRegistry`] snapshot, which owns the combined tag pattern.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::native::{NativeFunction, normalize_name};

/// Global catalog of native functions.
pub struct FunctionCatalog {
    functions: RwLock<Vec<Arc<dyn NativeFunction>>>,
    snapshot: RwLock<FunctionRegistry>,
}

static CATALOG: Lazy<FunctionCatalog> = Lazy::new(FunctionCatalog::new);

impl FunctionCatalog {
    fn new() -> Self {
        Self {
            functions: RwLock::new(Vec::new()),
            snapshot: RwLock::new(FunctionRegistry::empty()),
        }
    }

    /// Access the global catalog singleton.
    pub fn global() -> &'static Self {
        &CATALOG
    }

    /// Register additional functions; later registrations win on name clashes.
    pub fn register<I>(&self, natives: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn NativeFunction>>,
    {
        let mut functions = self.functions.write();
        functions.extend(natives);
        *self.snapshot.write() = FunctionRegistry::from_functions(functions.iter().cloned())?;
        Ok(())
    }

    /// Replace the whole function set.
    pub fn set_functions<I>(&self, natives: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn NativeFunction>>,
    {
        let mut functions = self.functions.write();
        *functions = natives.into_iter().collect();
        *self.snapshot.write() = FunctionRegistry::from_functions(functions.iter().cloned())?;
        Ok(())
    }

    /// Produce an immutable snapshot for compilers and interpreters.
    pub fn snapshot(&self) -> FunctionRegistry {
        self.snapshot.read().clone()
    }
}

struct RegistryInner {
    functions: HashMap<String, Arc<dyn NativeFunction>>,
    aliases: HashMap<String, String>,
    pattern: Option<Regex>,
}

/// Immutable view of the registered functions.
#[derive(Clone)]
pub struct FunctionRegistry {
    inner: Arc<RegistryInner>,
}

impl FunctionRegistry {
    /// Registry without any functions; nothing in a template matches.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                functions: HashMap::new(),
                aliases: HashMap::new(),
                pattern: None,
            }),
        }
    }

    /// Build a registry directly from a list of natives.
    pub fn from_functions<I>(natives: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn NativeFunction>>,
    {
        let mut functions = HashMap::new();
        let mut aliases = HashMap::new();
        for native in natives {
            let definition = native.definition();
            let name = normalize_name(&definition.name);
            for alias in &definition.aliases {
                aliases.insert(normalize_name(alias), name.clone());
            }
            functions.insert(name, native);
        }

        let mut names: Vec<&str> = functions
            .keys()
            .chain(aliases.keys())
            .map(|name| name.trim_start_matches('$'))
            .filter(|name| !name.is_empty())
            .collect();
        names.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        names.dedup();

        let pattern = if names.is_empty() {
            None
        } else {
            let alternation = names
                .iter()
                .map(|name| regex::escape(name))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!(
                r"(?i)\$(!)?(#)?(@\[(.*?)\])?({alternation})"
            ))?)
        };

        Ok(Self {
            inner: Arc::new(RegistryInner {
                functions,
                aliases,
                pattern,
            }),
        })
    }

    /// Look up a function by name, then by alias.
    pub fn resolve(&self, raw_name: &str) -> Option<&Arc<dyn NativeFunction>> {
        let name = normalize_name(raw_name);
        self.inner.functions.get(&name).or_else(|| {
            self.inner
                .aliases
                .get(&name)
                .and_then(|canonical| self.inner.functions.get(canonical))
        })
    }

    /// Whether a name or alias is known.
    pub fn contains(&self, raw_name: &str) -> bool {
        self.resolve(raw_name).is_some()
    }

    /// Number of canonical functions.
    pub fn len(&self) -> usize {
        self.inner.functions.len()
    }

    /// Whether the registry holds no functions.
    pub fn is_empty(&self) -> bool {
        self.inner.functions.is_empty()
    }

    /// Canonical names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every registered native, sorted by name.
    pub fn functions(&self) -> Vec<Arc<dyn NativeFunction>> {
        self.names()
            .iter()
            .filter_map(|name| self.inner.functions.get(name).cloned())
            .collect()
    }

    /// Combined tag pattern (longest names first, case-insensitive).
    pub fn pattern(&self) -> Option<&Regex> {
        self.inner.pattern.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{FunctionDefinition, Outcome, from_fn};

    fn native(name: &str, aliases: &[&str]) -> Arc<dyn NativeFunction> {
        let mut definition = FunctionDefinition::new(name);
        for alias in aliases {
            definition = definition.alias(alias);
        }
        from_fn(definition, |_ctx, _call| Ok(Outcome::success("ok")))
    }

    #[test]
    fn resolves_names_and_aliases_case_insensitively() {
        let registry =
            FunctionRegistry::from_functions(vec![native("$ping", &["$pong"])]).unwrap();
        assert!(registry.contains("$PING"));
        assert!(registry.contains("pong"));
        assert_eq!(
            registry.resolve("$Pong").unwrap().definition().name,
            "$ping"
        );
        assert!(registry.resolve("$missing").is_none());
    }

    #[test]
    fn pattern_prefers_longest_name() {
        let registry = FunctionRegistry::from_functions(vec![
            native("$user", &[]),
            native("$username", &[]),
        ])
        .unwrap();
        let pattern = registry.pattern().unwrap();
        let caps = pattern.captures("hi $USERNAME!").unwrap();
        assert_eq!(&caps[5], "USERNAME");
    }

    #[test]
    fn pattern_captures_modifiers() {
        let registry = FunctionRegistry::from_functions(vec![native("$list", &[])]).unwrap();
        let caps = registry.pattern().unwrap().captures("$!#@[, ]list").unwrap();
        assert!(caps.get(1).is_some());
        assert!(caps.get(2).is_some());
        assert_eq!(&caps[4], ", ");
    }

    #[test]
    fn later_registration_overwrites() {
        let first = native("$dup", &[]);
        let second = from_fn(FunctionDefinition::new("$dup").alias("$copy"), |_ctx, _call| {
            Ok(Outcome::success("second"))
        });
        let registry = FunctionRegistry::from_functions(vec![first, second]).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("$copy"));
    }

    #[test]
    fn empty_registry_has_no_pattern() {
        let registry = FunctionRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.pattern().is_none());
    }
}
