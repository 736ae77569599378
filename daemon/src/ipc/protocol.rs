//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::config::BindingSummary;
use crate::events::EngineEvent;
use crate::hotkey::StrategyKind;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// List the bindings currently in effect (for menu construction)
    ListBindings,

    /// Re-read configuration and reset the engine
    Reload,

    /// Ping to check connectivity
    Ping,

    /// Turn this connection into a stream of engine events
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Bindings in effect
    Bindings { bindings: Vec<BindingSummary> },

    /// Reload has been handed to the engine
    ReloadQueued,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed; events follow
    Subscribed,

    /// Pushed engine event (subscribed clients only)
    Event { event: EngineEvent },

    /// Error response
    Error { code: String, message: String },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Observation strategy in use
    pub strategy: StrategyKind,

    /// Trigger of the armed binding, if any
    pub armed: Option<String>,

    /// Number of bindings in effect
    pub bindings: usize,

    /// Binding table generation
    pub generation: u32,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            strategy: StrategyKind::default(),
            armed: None,
            bindings: 0,
            generation: 0,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StopReason;

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_string(&Request::ListBindings).unwrap();
        assert_eq!(json, r#"{"type":"list_bindings"}"#);

        let req: Request = serde_json::from_str(r#"{"type":"reload"}"#).unwrap();
        assert!(matches!(req, Request::Reload));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("continuous_monitor"));
    }

    #[test]
    fn test_event_response_round_trip() {
        let resp = Response::Event {
            event: EngineEvent::CommandStopped {
                trigger: "S".into(),
                reason: StopReason::KeyReleased,
                duration_ms: 12,
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            Response::Event {
                event: EngineEvent::CommandStopped { duration_ms: 12, .. }
            }
        ));
    }
}
