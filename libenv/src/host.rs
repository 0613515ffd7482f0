//! Process-scoped host state behind `libenv_load` / `libenv_unload`.
//!
//! Configuration is read from the environment once, the first time anything
//! asks for it. `libenv_load` additionally installs a `tracing` subscriber
//! unless the embedding process already has one. Nothing per-pool lives
//! here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Log filter directive, `tracing_subscriber::EnvFilter` syntax.
pub const ENV_LOG: &str = "LIBENV_LOG";
/// `1`, `true` or `yes`: abort the process on a caller contract violation.
pub const ENV_STRICT: &str = "LIBENV_STRICT";
/// Default worker cap for pools created without `num_threads`.
pub const ENV_NUM_THREADS: &str = "LIBENV_NUM_THREADS";

const DEFAULT_FILTER: &str = "warn";

static CONFIG: OnceLock<HostConfig> = OnceLock::new();
static LOADED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub log_filter: String,
    pub strict: bool,
    pub num_threads: Option<usize>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_FILTER.to_owned(),
            strict: false,
            num_threads: None,
        }
    }
}

impl HostConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparseable values fall back to
    /// the defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_filter: lookup(ENV_LOG)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.log_filter),
            strict: lookup(ENV_STRICT)
                .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            num_threads: lookup(ENV_NUM_THREADS)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|&n| n > 0),
        }
    }
}

/// The process configuration, read on first use.
pub fn config() -> &'static HostConfig {
    CONFIG.get_or_init(HostConfig::from_env)
}

#[must_use]
pub fn is_loaded() -> bool {
    LOADED.load(Ordering::Acquire)
}

/// Single-initialization entry point. A second call without an `unload` in
/// between is logged and otherwise ignored.
pub fn load() {
    let config = config();
    if LOADED.swap(true, Ordering::AcqRel) {
        warn!("libenv_load called while already loaded");
        return;
    }
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    info!(?config, installed, "host loaded");
}

pub fn unload() {
    if LOADED.swap(false, Ordering::AcqRel) {
        info!("host unloaded");
    } else {
        warn!("libenv_unload called without libenv_load");
    }
}

/// Reports a caller contract violation; aborts when strict mode is on.
pub fn contract_violation(what: &str) {
    error!("contract violation: {what}");
    if config().strict {
        std::process::abort();
    }
}
