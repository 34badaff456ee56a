// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Engine configuration

use ph_domain_types::KPTFILE_NAME;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_FUNCTION_REGISTRY: &str = "gcr.io/kpt-fn";

/// Engine configuration, loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Image prefix used to expand short function names
    pub function_registry: String,

    /// Per-task deadline in seconds, applied on top of the caller's context
    pub task_timeout_secs: Option<u64>,

    /// Manifest path inside every bundle
    pub manifest_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            function_registry: DEFAULT_FUNCTION_REGISTRY.to_string(),
            task_timeout_secs: None,
            manifest_file: KPTFILE_NAME.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        if config.manifest_file.trim().is_empty() {
            return Err(Error::Config("manifest_file must not be empty".to_string()));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Expand a short function name (`set-namespace`) to a full image reference
    pub fn expand_image(&self, image: &str) -> String {
        if image.contains('/') {
            image.to_string()
        } else {
            format!("{}/{}", self.function_registry.trim_end_matches('/'), image)
        }
    }
}
