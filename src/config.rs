//! Engine configuration
//!
//! Reprocessing and failure-recovery knobs live in an explicit [`EngineConfig`].
//! A process-wide default is kept for the composition root; every
//! [`Context`](crate::context::Context) snapshots the config it was created
//! with, so changes only affect subsequent runs.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Function-name fragments that mark a failing function as needing full
/// program context.
pub const DEFAULT_RECOVERY_FUNCTIONS: &[&str] = &[
    "json", "object", "array", "variable", "get", "let", "eval", "execute", "parse", "format",
    "template",
];

/// Allow-lists restricting who may trigger template runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restrictions {
    /// Invoking user ids allowed to run templates (empty = everyone)
    #[serde(default)]
    pub user_ids: Vec<String>,

    /// Guild ids templates may run in (empty = everywhere)
    #[serde(default)]
    pub guild_ids: Vec<String>,
}

/// Configuration for the compiler/interpreter pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recursively reprocess values that still contain function syntax
    pub reprocess_enabled: bool,

    /// Maximum reprocessing depth before values are returned unchanged
    pub max_reprocess_depth: usize,

    /// Attempt whole-program recovery when a function fails
    pub recovery_enabled: bool,

    /// Name fragments that trigger recovery for a failing function
    pub recovery_functions: Vec<String>,

    /// Recovery attempts allowed per top-level run
    pub max_recovery_attempts: usize,

    /// Deadline for reprocessing a single container element (milliseconds)
    pub element_timeout_ms: u64,

    /// Optional user/guild allow-lists
    pub restrictions: Option<Restrictions>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reprocess_enabled: true,
            max_reprocess_depth: 5,
            recovery_enabled: true,
            recovery_functions: DEFAULT_RECOVERY_FUNCTIONS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            max_recovery_attempts: 3,
            element_timeout_ms: 5000,
            restrictions: None,
        }
    }
}

static GLOBAL_CONFIG: Lazy<RwLock<EngineConfig>> =
    Lazy::new(|| RwLock::new(EngineConfig::default()));

impl EngineConfig {
    /// Snapshot of the process-wide default.
    pub fn global() -> Self {
        GLOBAL_CONFIG.read().clone()
    }

    /// Replace the process-wide default.
    pub fn set_global(config: EngineConfig) {
        *GLOBAL_CONFIG.write() = config;
    }

    /// Mutate the process-wide default in place.
    pub fn update_global<F>(update: F)
    where
        F: FnOnce(&mut EngineConfig),
    {
        update(&mut GLOBAL_CONFIG.write());
    }

    /// Load configuration from a JSON file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: EngineConfig = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `FORGE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(flag) = env_flag("FORGE_REPROCESS") {
            config.reprocess_enabled = flag;
        }
        if let Some(depth) = env_parse::<usize>("FORGE_MAX_REPROCESS_DEPTH") {
            config.max_reprocess_depth = depth;
        }
        if let Some(flag) = env_flag("FORGE_RECOVERY") {
            config.recovery_enabled = flag;
        }
        if let Some(attempts) = env_parse::<usize>("FORGE_MAX_RECOVERY_ATTEMPTS") {
            config.max_recovery_attempts = attempts;
        }
        if let Some(timeout) = env_parse::<u64>("FORGE_ELEMENT_TIMEOUT_MS") {
            config.element_timeout_ms = timeout;
        }
        config
    }

    /// Reject settings that would make every element time out immediately.
    pub fn validate(&self) -> Result<()> {
        if self.element_timeout_ms == 0 {
            return Err(EngineError::Config(
                "element_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-element reprocessing deadline.
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    /// Whether a function name matches one of the recovery triggers.
    pub fn needs_full_context(&self, function_name: &str) -> bool {
        let name = function_name.trim_start_matches('$').to_lowercase();
        !name.is_empty()
            && self
                .recovery_functions
                .iter()
                .any(|fragment| name.contains(&fragment.to_lowercase()))
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}
