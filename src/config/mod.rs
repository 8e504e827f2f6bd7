pub mod loader;
pub mod schema;

pub use loader::API_KEY_ENV;
pub use schema::{
    AuditConfig, Config, DEFAULT_SYSTEM_PROMPT, GatewayConfig, HealthConfig, ProtocolConfig,
    ReliabilityConfig, StorageConfig,
};

use directories::UserDirs;
use std::path::PathBuf;

/// `~/.dhammashell`, or `./.dhammashell` when no home directory is known.
pub fn default_config_dir() -> PathBuf {
    UserDirs::new()
        .map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf())
        .join(".dhammashell")
}
