use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::hub::AttachmentLimits;

/// Top-level server configuration, loaded from stagecast.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub limits: LimitsSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:stagecast.db?mode=rwc".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Largest accepted inline image payload (data-URL bytes).
    pub max_image_bytes: usize,
    /// Largest accepted inline file payload (data-URL bytes).
    pub max_file_bytes: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        let defaults = AttachmentLimits::default();
        Self {
            max_image_bytes: defaults.max_image_bytes,
            max_file_bytes: defaults.max_file_bytes,
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BIND_ADDRESS") {
            self.server.address = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("MAX_IMAGE_BYTES")
            && let Ok(n) = v.parse()
        {
            self.limits.max_image_bytes = n;
        }
        if let Ok(v) = std::env::var("MAX_FILE_BYTES")
            && let Ok(n) = v.parse()
        {
            self.limits.max_file_bytes = n;
        }
    }

    pub fn attachment_limits(&self) -> AttachmentLimits {
        AttachmentLimits {
            max_image_bytes: self.limits.max_image_bytes,
            max_file_bytes: self.limits.max_file_bytes,
        }
    }
}
