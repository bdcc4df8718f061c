//! Control plane config loader (strict parsing).

pub mod schema;

use std::fs;

use proxvoice_core::error::{ProxVoiceError, Result};

pub use schema::{
    AuthSection, ControlConfig, EnforcementMode, PolicySection, RateLimitSection, ServerSection, TransportSection,
};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "PROXVOICE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "proxvoice.yaml";

/// Config path from `PROXVOICE_CONFIG`, falling back to `proxvoice.yaml`.
pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load_from_file(path: &str) -> Result<ControlConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ProxVoiceError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ControlConfig> {
    let cfg: ControlConfig = serde_yaml::from_str(s)
        .map_err(|e| ProxVoiceError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
