//! Interpreter configuration
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SPLUS_STEP_LIMIT` | `1000000` | Statement/expression evaluations per run |
//! | `SPLUS_VIRTUAL_CLOCK` | unset | `1`/`true` runs timers on a virtual clock |
//! | `SPLUS_DEFINES` | unset | Comma-separated extra preprocessor defines |

use std::time::Duration;

pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Wall clock; suspensions really sleep
    Real,
    /// Deterministic clock that jumps straight to the next timer
    Virtual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub step_limit: u64,
    pub clock: ClockMode,
    /// Time between `SocketConnectClient` and the connected event
    pub connect_delay: Duration,
    /// Time between a send and the responder's reply
    pub response_delay: Duration,
    pub defines: Vec<String>,
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            step_limit: DEFAULT_STEP_LIMIT,
            clock: ClockMode::Real,
            connect_delay: Duration::from_millis(100),
            response_delay: Duration::from_millis(50),
            defines: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SPLUS_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(limit) = std::env::var("SPLUS_STEP_LIMIT")
            .ok()
            .and_then(|s| s.trim().parse().ok())
        {
            config.step_limit = limit;
        }

        if let Ok(flag) = std::env::var("SPLUS_VIRTUAL_CLOCK") {
            let flag = flag.trim().to_ascii_lowercase();
            if flag == "1" || flag == "true" || flag == "yes" {
                config.clock = ClockMode::Virtual;
            }
        }

        if let Ok(defines) = std::env::var("SPLUS_DEFINES") {
            config.defines = defines
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }

        config
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_virtual_clock(self) -> Self {
        self.with_clock(ClockMode::Virtual)
    }

    pub fn with_define(mut self, name: impl Into<String>) -> Self {
        self.defines.push(name.into());
        self
    }

    pub fn with_defines(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.defines.extend(names);
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &["SPLUS_STEP_LIMIT", "SPLUS_VIRTUAL_CLOCK", "SPLUS_DEFINES"];

    fn clear_env() {
        for var in VARS {
            // SAFETY: env tests are serialized
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.step_limit, 1_000_000);
        assert_eq!(config.clock, ClockMode::Real);
        assert_eq!(config.connect_delay, Duration::from_millis(100));
        assert_eq!(config.response_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_builders() {
        let config = RuntimeConfig::new()
            .with_step_limit(500)
            .with_virtual_clock()
            .with_define("DEBUG");
        assert_eq!(config.step_limit, 500);
        assert_eq!(config.clock, ClockMode::Virtual);
        assert_eq!(config.defines, vec!["DEBUG".to_string()]);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        // SAFETY: env tests are serialized
        unsafe {
            std::env::set_var("SPLUS_STEP_LIMIT", "2500");
            std::env::set_var("SPLUS_VIRTUAL_CLOCK", "true");
            std::env::set_var("SPLUS_DEFINES", "DEBUG, LAB ,");
        }

        let config = RuntimeConfig::from_env();
        assert_eq!(config.step_limit, 2500);
        assert_eq!(config.clock, ClockMode::Virtual);
        assert_eq!(config.defines, vec!["DEBUG".to_string(), "LAB".to_string()]);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env();
        // SAFETY: env tests are serialized
        unsafe {
            std::env::set_var("SPLUS_STEP_LIMIT", "lots");
            std::env::set_var("SPLUS_VIRTUAL_CLOCK", "0");
        }

        let config = RuntimeConfig::from_env();
        assert_eq!(config.step_limit, DEFAULT_STEP_LIMIT);
        assert_eq!(config.clock, ClockMode::Real);

        clear_env();
    }
}
