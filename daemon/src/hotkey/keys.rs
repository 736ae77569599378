//! Modifier key definitions and state tracking
//!
//! Provides the raw flag masks for macOS modifier keys, the `Modifier`
//! vocabulary used by configuration, and a struct for tracking the
//! current state of the four modifier keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Modifier key flag masks, laid out as in macOS `CGEventFlags`
pub mod flags {
    /// Shift key modifier flag
    pub const SHIFT: u64 = 0x0002_0000;
    /// Control key modifier flag
    pub const CONTROL: u64 = 0x0004_0000;
    /// Option/Alt key modifier flag
    pub const OPTION: u64 = 0x0008_0000;
    /// Command key modifier flag
    pub const COMMAND: u64 = 0x0010_0000;
}

/// A single modifier key, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Control,
    Shift,
    Command,
    Option,
}

impl Modifier {
    pub const ALL: [Modifier; 4] = [
        Modifier::Control,
        Modifier::Shift,
        Modifier::Command,
        Modifier::Option,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Control => "control",
            Modifier::Shift => "shift",
            Modifier::Command => "command",
            Modifier::Option => "option",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks which modifier keys are currently pressed
///
/// Also used to describe the activation set a binding requires, since
/// both are plain sets over the same four keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierState {
    /// Control key is held
    pub control: bool,
    /// Shift key is held
    pub shift: bool,
    /// Command key is held
    pub command: bool,
    /// Option/Alt key is held
    pub option: bool,
}

impl ModifierState {
    /// Create a new ModifierState from a raw flag word
    ///
    /// The result fully replaces any previous state: flag words are level
    /// snapshots of the hardware, not deltas. Bits other than the four
    /// tracked modifiers (caps lock, fn, device bits) are ignored.
    pub fn from_raw(bits: u64) -> Self {
        Self {
            control: bits & flags::CONTROL != 0,
            shift: bits & flags::SHIFT != 0,
            command: bits & flags::COMMAND != 0,
            option: bits & flags::OPTION != 0,
        }
    }

    /// Build a set from a list of modifiers; duplicates collapse
    pub fn from_modifiers(modifiers: &[Modifier]) -> Self {
        let mut state = Self::default();
        for modifier in modifiers {
            state.set(*modifier, true);
        }
        state
    }

    pub fn is_held(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Control => self.control,
            Modifier::Shift => self.shift,
            Modifier::Command => self.command,
            Modifier::Option => self.option,
        }
    }

    fn set(&mut self, modifier: Modifier, held: bool) {
        match modifier {
            Modifier::Control => self.control = held,
            Modifier::Shift => self.shift = held,
            Modifier::Command => self.command = held,
            Modifier::Option => self.option = held,
        }
    }

    /// Held modifiers in canonical order
    pub fn modifiers(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(|m| self.is_held(*m))
    }

    /// Check if all modifiers are released
    pub fn is_empty(&self) -> bool {
        !self.control && !self.shift && !self.command && !self.option
    }

    /// Exact-set comparison against a required activation set
    ///
    /// Holding a modifier outside `required` breaks the match, as does
    /// missing one. An empty `required` set never matches: nothing is
    /// reachable without activation modifiers.
    pub fn matches_required(&self, required: &ModifierState) -> bool {
        !required.is_empty() && self == required
    }
}

impl fmt::Display for ModifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.modifiers().map(Modifier::as_str).collect();
        f.write_str(&names.join("+"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control_shift() -> ModifierState {
        ModifierState::from_modifiers(&[Modifier::Control, Modifier::Shift])
    }

    #[test]
    fn test_empty_state() {
        let state = ModifierState::default();
        assert!(state.is_empty());
        assert_eq!(state.to_string(), "none");
    }

    #[test]
    fn test_from_raw_ignores_unrelated_bits() {
        // caps lock (0x10000) and a device-dependent bit
        let state = ModifierState::from_raw(flags::CONTROL | 0x0001_0000 | 0x1);
        assert_eq!(
            state,
            ModifierState {
                control: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_latest_flags_win() {
        let sequence = [
            flags::CONTROL,
            flags::CONTROL | flags::SHIFT,
            flags::SHIFT | flags::OPTION,
            flags::COMMAND,
        ];
        let mut state = ModifierState::default();
        for bits in sequence {
            state = ModifierState::from_raw(bits);
        }
        assert_eq!(state, ModifierState::from_raw(flags::COMMAND));
        assert!(!state.control && !state.shift && !state.option);
    }

    #[test]
    fn test_exact_match() {
        let required = control_shift();
        assert!(control_shift().matches_required(&required));
    }

    #[test]
    fn test_extra_modifier_breaks_match() {
        let required = control_shift();
        let held = ModifierState::from_modifiers(&[
            Modifier::Control,
            Modifier::Shift,
            Modifier::Option,
        ]);
        assert!(!held.matches_required(&required));
    }

    #[test]
    fn test_missing_modifier_breaks_match() {
        let required = control_shift();
        let held = ModifierState::from_modifiers(&[Modifier::Control]);
        assert!(!held.matches_required(&required));
    }

    #[test]
    fn test_empty_required_never_matches() {
        let required = ModifierState::default();
        assert!(!ModifierState::default().matches_required(&required));
    }

    #[test]
    fn test_match_is_order_independent() {
        let required = control_shift();
        let a = ModifierState::from_modifiers(&[Modifier::Shift, Modifier::Control]);
        let b = ModifierState::from_raw(flags::SHIFT | flags::CONTROL);
        assert!(a.matches_required(&required));
        assert!(b.matches_required(&required));
    }

    #[test]
    fn test_display() {
        let state = ModifierState::from_modifiers(&[Modifier::Option, Modifier::Control]);
        assert_eq!(state.to_string(), "control+option");
    }

    #[test]
    fn test_modifier_serde_names() {
        let json = serde_json::to_string(&Modifier::Option).unwrap();
        assert_eq!(json, "\"option\"");
        let parsed: Modifier = serde_json::from_str("\"command\"").unwrap();
        assert_eq!(parsed, Modifier::Command);
    }
}
