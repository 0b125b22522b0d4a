use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AssetRoot;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled_tasks: Vec<String>,
    pub engine: EngineSettings,
}

/// Retry budgets and delays for one navigation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub interrupt_attempts: u32,
    pub transition_attempts: u32,
    pub navigate_retries: u32,
    pub settle_ms: u64,
    pub dismiss_settle_ms: u64,
    pub match_threshold: f32,
    /// Where relative paths in the declaration file start.
    pub asset_root: AssetRoot,
    /// Annotation whose first rectangle outlines the content area of a
    /// reference screenshot; the difference is the window border.
    pub border_calibration: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            interrupt_attempts: 5,
            transition_attempts: 5,
            navigate_retries: 3,
            settle_ms: 1000,
            dismiss_settle_ms: 500,
            match_threshold: 0.8,
            asset_root: AssetRoot::Project,
            border_calibration: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}
