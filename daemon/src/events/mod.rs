//! Status events emitted by the engine
//!
//! Fire-and-forget notifications for UI collaborators (menu refresh,
//! banners). The engine's correctness never depends on their delivery.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{BindingSummary, SkipReason, SystemAction};
use crate::hotkey::StrategyKind;

/// Why an armed command was stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The trigger key was released
    KeyReleased,
    /// The activation modifiers no longer match exactly
    ModifiersReleased,
    /// Another binding was pressed
    Switched,
    /// Configuration was reloaded
    Reload,
    /// The event tap stopped delivering events
    TapDisabled,
    /// The engine is shutting down
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::KeyReleased => "key released",
            StopReason::ModifiersReleased => "modifiers released",
            StopReason::Switched => "switched",
            StopReason::Reload => "reload",
            StopReason::TapDisabled => "tap disabled",
            StopReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Events emitted by the engine during transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A binding was armed and its command spawned
    CommandStarted {
        trigger: String,
        command: String,
        pid: u32,
    },

    /// The command could not be spawned; the binding stays idle
    CommandFailed {
        trigger: String,
        command: String,
        reason: String,
    },

    /// The armed command was stopped
    CommandStopped {
        trigger: String,
        reason: StopReason,
        /// Duration in milliseconds that the binding was armed
        duration_ms: u64,
    },

    /// A system action was started; nothing is armed
    ActionLaunched {
        trigger: String,
        action: SystemAction,
        pid: u32,
    },

    /// The OS refused to register a binding's hotkey
    RegistrationFailed { trigger: String, reason: String },

    /// A configured shortcut did not make it into the binding table
    BindingSkipped { trigger: String, reason: SkipReason },

    /// The configuration file could not be re-read; old bindings stay
    ConfigurationRejected { reason: String },

    /// A new binding table is in effect
    ConfigurationReloaded {
        generation: u32,
        strategy: StrategyKind,
        bindings: Vec<BindingSummary>,
    },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::CommandStarted { trigger, pid, .. } => {
                write!(f, "COMMAND_STARTED {} (pid {})", trigger, pid)
            }
            EngineEvent::CommandFailed { trigger, reason, .. } => {
                write!(f, "COMMAND_FAILED {}: {}", trigger, reason)
            }
            EngineEvent::CommandStopped {
                trigger,
                reason,
                duration_ms,
            } => write!(f, "COMMAND_STOPPED {} ({}, {}ms)", trigger, reason, duration_ms),
            EngineEvent::ActionLaunched {
                trigger,
                action,
                pid,
            } => write!(f, "ACTION_LAUNCHED {} {} (pid {})", trigger, action, pid),
            EngineEvent::ConfigurationRejected { reason } => {
                write!(f, "CONFIGURATION_REJECTED: {}", reason)
            }
            EngineEvent::RegistrationFailed { trigger, reason } => {
                write!(f, "REGISTRATION_FAILED {}: {}", trigger, reason)
            }
            EngineEvent::BindingSkipped { trigger, reason } => {
                write!(f, "BINDING_SKIPPED {}: {}", trigger, reason)
            }
            EngineEvent::ConfigurationReloaded {
                generation,
                bindings,
                ..
            } => write!(
                f,
                "CONFIGURATION_RELOADED gen {} ({} bindings)",
                generation,
                bindings.len()
            ),
        }
    }
}
