//! Scenario files
//!
//! A scenario is a TOML file that overrides runtime settings and scripts
//! timed input:
//!
//! ```toml
//! step_limit = 50000
//! virtual_clock = true
//! defines = ["DEBUG"]
//! settle_ms = 2000
//!
//! [[stimulus]]
//! at_ms = 100
//! kind = "digital"
//! name = "power_on"
//! value = 1
//!
//! [[stimulus]]
//! at_ms = 250
//! kind = "serial"
//! name = "rx$"
//! value = "PWR=ON\r"
//! ```

use serde::Deserialize;
use splus_runtime::{RuntimeConfig, Stimulus};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub step_limit: Option<u64>,
    pub virtual_clock: Option<bool>,
    #[serde(default)]
    pub defines: Vec<String>,
    /// How long to keep servicing timers after Main returns
    pub settle_ms: Option<u64>,
    #[serde(default)]
    pub stimulus: Vec<ScenarioStimulus>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioStimulus {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Action {
    Digital { name: String, value: i64 },
    Analog { name: String, value: i64 },
    Serial { name: String, value: String },
    Stop,
}

impl Scenario {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse scenario: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scenario '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    /// Apply the overrides on top of `config`
    pub fn configure(&self, mut config: RuntimeConfig) -> RuntimeConfig {
        if let Some(limit) = self.step_limit {
            config = config.with_step_limit(limit);
        }
        if self.virtual_clock == Some(true) {
            config = config.with_virtual_clock();
        }
        config.with_defines(self.defines.iter().cloned())
    }

    /// Stimulus in firing order with its delay from the start of the run
    pub fn timeline(&self) -> Vec<(Duration, Stimulus)> {
        let mut timeline: Vec<(Duration, Stimulus)> = self
            .stimulus
            .iter()
            .map(|entry| (Duration::from_millis(entry.at_ms), entry.action.to_stimulus()))
            .collect();
        timeline.sort_by_key(|(at, _)| *at);
        timeline
    }
}

impl Action {
    fn to_stimulus(&self) -> Stimulus {
        match self {
            Action::Digital { name, value } => Stimulus::Digital {
                name: name.clone(),
                value: *value,
            },
            Action::Analog { name, value } => Stimulus::Analog {
                name: name.clone(),
                value: *value,
            },
            Action::Serial { name, value } => Stimulus::Serial {
                name: name.clone(),
                value: value.clone(),
            },
            Action::Stop => Stimulus::Stop,
        }
    }
}
