//! Platform-neutral keyboard events
//!
//! Every observation strategy adapts its raw platform notifications into
//! this one stream, so the engine's decision logic is written once.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::keycode::KeyCode;
use super::keys::ModifierState;

/// Identifier of an exclusive hotkey registration
///
/// The generation is the binding table generation the registration was
/// made for. Ids from an older generation are stale and never match, even
/// if a newer table reuses the same slot for a different command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HotkeyId {
    pub generation: u32,
    pub slot: u32,
}

impl fmt::Display for HotkeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.slot)
    }
}

/// Events sent from a hotkey strategy to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// A key was pressed; `character` is absent when the key produces none
    KeyDown {
        key: KeyCode,
        character: Option<char>,
    },
    /// A key was released
    KeyUp {
        key: KeyCode,
        character: Option<char>,
    },
    /// Modifier state has changed
    ModifiersChanged(ModifierState),
    /// An exclusively registered hotkey was pressed
    HotkeyFired(HotkeyId),
    /// Event tap was disabled by macOS (needs re-registration)
    TapDisabled,
}

impl HotkeyEvent {
    /// Key down with the character resolved from the fixed layout
    pub fn key_down(key: KeyCode) -> Self {
        Self::KeyDown {
            key,
            character: super::keycode::character(key),
        }
    }

    /// Key up with the character resolved from the fixed layout
    pub fn key_up(key: KeyCode) -> Self {
        Self::KeyUp {
            key,
            character: super::keycode::character(key),
        }
    }
}
