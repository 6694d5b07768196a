pub mod chat;
pub mod config_cmd;
pub mod models;
pub mod tools;

use kubesage_config::AppConfig;
use std::path::Path;

/// Load configuration from `path`, or the default location.
///
/// Environment overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}
