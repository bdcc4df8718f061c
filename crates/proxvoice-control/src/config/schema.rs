use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use proxvoice_core::error::{ProxVoiceError, Result};

use crate::policy::PolicyConstants;

/// Floor for the scheduler period.
pub const MIN_RECOMPUTE_PERIOD_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    pub auth: AuthSection,

    pub transport: TransportSection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub rate_limits: RateLimitSection,
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ProxVoiceError::UnsupportedVersion);
        }

        self.server.validate()?;
        self.auth.validate()?;
        self.transport.validate()?;
        self.policy.validate()?;
        self.rate_limits.validate()?;

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server.listen_addr()
    }
}

fn bad(msg: &str) -> ProxVoiceError {
    ProxVoiceError::BadRequest(msg.to_string())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Overrides the socket URL derived from request headers.
    #[serde(default)]
    pub public_socket_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_socket_url: None,
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if let Some(url) = &self.public_socket_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(bad("server.public_socket_url must start with ws:// or wss://"));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|_| bad("server.listen must be a valid socket address"))
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Shared operator secret expected as `Authorization: Bearer <token>`.
    pub control_token: String,

    /// HS256 key for policy socket tokens.
    pub socket_secret: String,

    #[serde(default = "default_token_ttl_sec")]
    pub socket_token_ttl_sec: u64,
}

impl AuthSection {
    pub fn validate(&self) -> Result<()> {
        if self.control_token.is_empty() {
            return Err(bad("auth.control_token must not be empty"));
        }
        if self.socket_secret.is_empty() {
            return Err(bad("auth.socket_secret must not be empty"));
        }
        if self.socket_token_ttl_sec == 0 {
            return Err(bad("auth.socket_token_ttl_sec must be at least 1"));
        }
        Ok(())
    }
}

/// Voice transport the clients connect to for audio.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,

    #[serde(default = "default_token_ttl_sec")]
    pub token_ttl_sec: u64,

    /// Base URL of the transport's server API (subscription control).
    #[serde(default = "default_server_api_url")]
    pub server_api_url: String,

    #[serde(default)]
    pub enforcement: EnforcementMode,
}

/// Where audibility decisions are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Update track subscriptions through the server API.
    #[default]
    Livekit,
    /// Log the intended subscriptions only.
    Log,
}

impl TransportSection {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(bad("transport.url must not be empty"));
        }
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(bad("transport.api_key and transport.api_secret must not be empty"));
        }
        if self.token_ttl_sec == 0 {
            return Err(bad("transport.token_ttl_sec must be at least 1"));
        }
        if !(self.server_api_url.starts_with("http://") || self.server_api_url.starts_with("https://")) {
            return Err(bad("transport.server_api_url must be an http(s) URL"));
        }
        Ok(())
    }
}

fn default_token_ttl_sec() -> u64 {
    900
}

fn default_server_api_url() -> String {
    "http://127.0.0.1:7880".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    #[serde(default = "default_max_subscribed_voices")]
    pub max_subscribed_voices: usize,

    #[serde(default = "default_radius_enter_m")]
    pub radius_enter_m: f64,

    #[serde(default = "default_radius_exit_m")]
    pub radius_exit_m: f64,

    #[serde(default = "default_recompute_hz")]
    pub recompute_hz: f64,

    #[serde(default = "default_reconnect_grace_sec")]
    pub reconnect_grace_sec: u64,

    /// Drop rooms left without participants after a stale sweep.
    #[serde(default)]
    pub evict_empty_rooms: bool,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            max_subscribed_voices: default_max_subscribed_voices(),
            radius_enter_m: default_radius_enter_m(),
            radius_exit_m: default_radius_exit_m(),
            recompute_hz: default_recompute_hz(),
            reconnect_grace_sec: default_reconnect_grace_sec(),
            evict_empty_rooms: false,
        }
    }
}

impl PolicySection {
    pub fn validate(&self) -> Result<()> {
        if self.max_subscribed_voices == 0 {
            return Err(bad("policy.max_subscribed_voices must be at least 1"));
        }
        if !self.radius_enter_m.is_finite() || self.radius_enter_m < 0.0 {
            return Err(bad("policy.radius_enter_m must be a non-negative number"));
        }
        if !self.radius_exit_m.is_finite() || self.radius_exit_m < self.radius_enter_m {
            return Err(bad("policy.radius_exit_m must be >= policy.radius_enter_m"));
        }
        if !self.recompute_hz.is_finite() || self.recompute_hz <= 0.0 {
            return Err(bad("policy.recompute_hz must be greater than 0"));
        }
        Ok(())
    }

    pub fn constants(&self) -> PolicyConstants {
        PolicyConstants {
            max_subscribed_voices: self.max_subscribed_voices,
            radius_enter_m: self.radius_enter_m,
            radius_exit_m: self.radius_exit_m,
        }
    }

    /// `round(1000 / recompute_hz)` clamped to at least 100 ms.
    pub fn recompute_period(&self) -> Duration {
        let ms = (1000.0 / self.recompute_hz).round() as u64;
        Duration::from_millis(ms.max(MIN_RECOMPUTE_PERIOD_MS))
    }

    pub fn reconnect_grace_ms(&self) -> u64 {
        self.reconnect_grace_sec.saturating_mul(1000)
    }
}

fn default_max_subscribed_voices() -> usize {
    12
}
fn default_radius_enter_m() -> f64 {
    24.0
}
fn default_radius_exit_m() -> f64 {
    26.0
}
fn default_recompute_hz() -> f64 {
    4.0
}
fn default_reconnect_grace_sec() -> u64 {
    20
}

/// Per-caller budgets, counted in fixed one-minute windows.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    #[serde(default = "default_sessions_per_minute")]
    pub sessions_per_minute: u32,

    #[serde(default = "default_pose_batches_per_minute")]
    pub pose_batches_per_minute: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            sessions_per_minute: default_sessions_per_minute(),
            pose_batches_per_minute: default_pose_batches_per_minute(),
        }
    }
}

impl RateLimitSection {
    pub fn validate(&self) -> Result<()> {
        if self.sessions_per_minute == 0 || self.pose_batches_per_minute == 0 {
            return Err(bad("rate_limits values must be at least 1"));
        }
        Ok(())
    }
}

fn default_sessions_per_minute() -> u32 {
    120
}
fn default_pose_batches_per_minute() -> u32 {
    600
}
