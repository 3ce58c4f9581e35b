//! Configuration system for the oxidized-emotion emulator

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub vu: VuConfig,
    pub dmac: DmacConfig,
    pub debug: DebugConfig,
}

/// Vector unit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VuConfig {
    /// Cap on bundles executed per microprogram before the runaway guard fires
    pub runaway_limit: usize,
    /// Log every executed bundle at trace level
    pub trace_execution: bool,
}

impl Default for VuConfig {
    fn default() -> Self {
        Self {
            runaway_limit: 0, // 0 = one full wrap of micro memory
            trace_execution: false,
        }
    }
}

/// DMA controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmacConfig {
    /// Log every decoded chain tag at debug level
    pub trace_tags: bool,
}

impl Default for DmacConfig {
    fn default() -> Self {
        Self { trace_tags: false }
    }
}

/// Debug tooling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Disassemble microprograms as they are uploaded
    pub disassemble_uploads: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            disassemble_uploads: false,
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, crate::error::EmotionError> {
        toml::from_str(text).map_err(|e| crate::error::EmotionError::Config(e.to_string()))
    }

    /// Serialize the configuration to TOML text
    pub fn to_toml(&self) -> Result<String, crate::error::EmotionError> {
        toml::to_string_pretty(self).map_err(|e| crate::error::EmotionError::Config(e.to_string()))
    }
}
