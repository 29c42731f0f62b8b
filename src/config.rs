//! Runtime configuration.

use std::env;
use std::sync::OnceLock;

/// Upper bound on outer passes of one view graph update.
///
/// The update loop is a fixed-point iteration that may not converge, e.g. when preferences feed
/// back into the views that produce them. Bounding it trades a stale frame for bounded latency.
pub const MAX_UPDATE_PASSES: u32 = 8;

/// Upper bound on continuation-draining passes within one outer pass.
pub const MAX_CONTINUATION_PASSES: u32 = 8;

/// Enables update lock assertions.
pub const ASSERT_LOCKS_VAR: &str = "VIEWGRAPH_ASSERT_LOCKS";

/// Makes new layout computers emit layout traces.
pub const LAYOUT_TRACE_VAR: &str = "VIEWGRAPH_LAYOUT_TRACE";

/// Configuration of a view graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Panic when a lock-requiring operation runs outside an update.
    pub assert_locks: bool,
    /// Wrap layout engines in a tracing box.
    pub layout_trace: bool,
    pub max_update_passes: u32,
    pub max_continuation_passes: u32,
    /// Center the root view in the proposed size.
    pub centers_root_view: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            assert_locks: false,
            layout_trace: false,
            max_update_passes: MAX_UPDATE_PASSES,
            max_continuation_passes: MAX_CONTINUATION_PASSES,
            centers_root_view: true,
        }
    }
}

fn flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

impl Config {
    /// Reads the configuration from the environment.
    pub fn from_env() -> Config {
        Config {
            assert_locks: flag(ASSERT_LOCKS_VAR),
            layout_trace: flag(LAYOUT_TRACE_VAR),
            ..Config::default()
        }
    }

    /// The process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static Config {
        static GLOBAL: OnceLock<Config> = OnceLock::new();
        GLOBAL.get_or_init(Config::from_env)
    }
}
