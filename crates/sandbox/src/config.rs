//! Sandbox run configuration, loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scenarios::ScenarioConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which backend executes kernel passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Cpu,
    /// Falls back to `Cpu` when no adapter is available.
    #[default]
    Gpu,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: BackendKind,
    /// Frames to run before exiting.
    pub frames: u32,
    /// Seconds added to elapsed time per frame.
    pub frame_dt: f32,
    /// Log diagnostics every N frames; 0 disables.
    pub log_every: u32,
    pub scenario: ScenarioConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gpu,
            frames: 600,
            frame_dt: 1.0 / 60.0,
            log_every: 60,
            scenario: ScenarioConfig::default(),
        }
    }
}

impl SandboxConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
