use super::Config;
use crate::gateway::ApiKey;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

impl Config {
    pub fn load_or_init() -> Result<Self> {
        Self::load_or_init_at(&super::default_config_dir())
    }

    /// Read `<dir>/config.toml`, writing a default one first if it is missing.
    pub fn load_or_init_at(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");

        if !dir.exists() {
            fs::create_dir_all(dir).context("Failed to create .dhammashell directory")?;
        }

        let config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save()?;
            tracing::info!(path = %config_path.display(), "Wrote default config");
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        crate::persist::write_atomic(&self.config_path, &toml_str)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// The credential to use: the environment wins over the file.
    pub fn resolve_api_key(&self) -> Option<ApiKey> {
        let from_env = std::env::var(API_KEY_ENV).ok();
        resolve_key(from_env.as_deref(), self.api_key.as_deref())
    }
}

fn resolve_key(from_env: Option<&str>, from_file: Option<&str>) -> Option<ApiKey> {
    from_env
        .and_then(|key| ApiKey::new(key).ok())
        .or_else(|| from_file.and_then(|key| ApiKey::new(key).ok()))
}
