#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use proxvoice_control::app_state::AppState;
use proxvoice_control::config::{self, ControlConfig};
use proxvoice_control::external::{LiveKitTransport, TransportEnforcer};
use proxvoice_control::room::CanHearMap;
use proxvoice_core::error::Result;

pub const CONTROL_TOKEN: &str = "ops-token";
pub const SOCKET_SECRET: &str = "socket-secret";
pub const VOICE_URL: &str = "wss://voice.example";

/// Test config; `extra` is appended verbatim (top-level sections).
pub fn config(extra: &str) -> ControlConfig {
    let yaml = format!(
        r#"
version: 1
auth:
  control_token: "{CONTROL_TOKEN}"
  socket_secret: "{SOCKET_SECRET}"
transport:
  url: "{VOICE_URL}"
  api_key: "key"
  api_secret: "secret"
{extra}"#
    );
    config::load_from_str(&yaml).unwrap()
}

/// Reports every enforcement call.
pub struct RecordingEnforcer {
    pub calls: mpsc::UnboundedSender<(String, CanHearMap)>,
}

#[async_trait]
impl TransportEnforcer for RecordingEnforcer {
    async fn enforce_room(&self, room_id: &str, can_hear_by_listener: &CanHearMap) -> Result<()> {
        let _ = self.calls.send((room_id.to_string(), can_hear_by_listener.clone()));
        Ok(())
    }
}

pub fn state(extra: &str) -> (AppState, mpsc::UnboundedReceiver<(String, CanHearMap)>) {
    let cfg = config(extra);
    let (tx, rx) = mpsc::unbounded_channel();
    let voice = Arc::new(LiveKitTransport::new(&cfg.transport));
    let state = AppState::with_collaborators(cfg, voice, Arc::new(RecordingEnforcer { calls: tx })).unwrap();
    (state, rx)
}
