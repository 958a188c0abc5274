use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config;

/// Flat application settings document. Loaded once at startup and replaced
/// wholesale on save; missing keys in the persisted file fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub theme: Theme,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: config::DEFAULT_MODEL.to_string(),
            theme: Theme::Dark,
            system_prompt: "You are a helpful assistant.".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub fn load() -> Settings {
        Self::load_from(&config::settings_path())
    }

    pub fn load_from(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_default(),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(settings: &Settings) -> Result<()> {
        Self::save_to(&config::settings_path(), settings)
    }

    /// Atomic overwrite: write a sibling temp file, then rename over the
    /// target so a crash mid-write never truncates the document.
    pub fn save_to(path: &Path, settings: &Settings) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write settings to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace settings at {}", path.display()))?;
        Ok(())
    }
}
