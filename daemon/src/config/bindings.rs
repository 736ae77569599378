//! Binding validation and the engine's binding table
//!
//! Raw shortcut entries from the store are validated and de-duplicated
//! here, at the configuration boundary. The engine only ever sees a
//! finished `BindingTable`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hotkey::keycode::{self, KeyCode};
use crate::hotkey::{Modifier, ModifierState};

use super::store::{ShortcutConfig, StoreSnapshot};

/// The key that, combined with the activation modifiers, starts a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A printable character, stored lower-cased
    Char(char),
    /// A raw virtual key code
    Code(KeyCode),
}

impl Trigger {
    /// Key code for this trigger on the fixed layout, if it has one
    pub fn key_code(&self) -> Option<KeyCode> {
        match self {
            Trigger::Char(c) => keycode::translate(*c),
            Trigger::Code(code) => Some(*code),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Char(' ') => f.write_str("SPACE"),
            Trigger::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Trigger::Code(code) => write!(f, "key {}", code),
        }
    }
}

/// A power action run once per press, independent of how long it is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemAction {
    Sleep,
    Restart,
    Shutdown,
}

impl SystemAction {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sleep" => Some(Self::Sleep),
            "restart" => Some(Self::Restart),
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SystemAction::Sleep => "sleep",
            SystemAction::Restart => "restart",
            SystemAction::Shutdown => "shutdown",
        }
    }

    /// Fixed command line that performs the action on macOS
    pub fn command_line(self) -> &'static str {
        match self {
            SystemAction::Sleep => "pmset sleepnow",
            SystemAction::Restart => {
                "osascript -e 'tell application \"System Events\" to restart'"
            }
            SystemAction::Shutdown => {
                "osascript -e 'tell application \"System Events\" to shut down'"
            }
        }
    }
}

impl fmt::Display for SystemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a binding does when its trigger is pressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "command", rename_all = "snake_case")]
pub enum BindingAction {
    /// Run a shell command line while the combination is held
    Shell(String),
    /// Reload configuration; never arms
    Reload,
    /// Launch a power action once; never arms
    System(SystemAction),
}

impl fmt::Display for BindingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingAction::Shell(command) => f.write_str(command),
            BindingAction::Reload => f.write_str("<reload configuration>"),
            BindingAction::System(action) => write!(f, "<system {}>", action),
        }
    }
}

/// A validated binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub trigger: Trigger,
    pub action: BindingAction,
    /// Resolved key code; `None` for characters outside the layout table
    pub key_code: Option<KeyCode>,
}

impl Binding {
    pub fn new(trigger: Trigger, action: BindingAction) -> Self {
        Self {
            key_code: trigger.key_code(),
            trigger,
            action,
        }
    }

    /// Whether a raw key event refers to this binding's trigger
    pub fn matches(&self, key: KeyCode, character: Option<char>) -> bool {
        let by_char = match (self.trigger, character) {
            (Trigger::Char(c), Some(pressed)) => pressed.to_ascii_lowercase() == c,
            _ => false,
        };
        by_char || self.key_code == Some(key)
    }
}

/// Why a shortcut entry did not become a usable binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("key must be exactly one character, got {0:?}")]
    InvalidKey(String),

    #[error("command is empty")]
    EmptyCommand,

    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("trigger already bound by an earlier shortcut")]
    Duplicate,

    #[error("no activation modifiers configured")]
    NoActivationModifiers,

    #[error("character has no key code on this layout")]
    Unmappable,
}

/// A shortcut entry that was dropped while building a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBinding {
    /// Position of the entry in the configured list
    pub index: usize,
    /// Trigger as written in configuration
    pub trigger: String,
    pub reason: SkipReason,
}

/// Summary of a binding for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSummary {
    pub trigger: String,
    pub command: String,
}

/// An immutable, generation-stamped set of bindings
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    generation: u32,
    modifiers: ModifierState,
    bindings: Vec<Binding>,
}

impl BindingTable {
    /// Build a table from a store snapshot
    ///
    /// Entries are validated in list order. For duplicate triggers the
    /// first entry wins and later ones are skipped. A character and a key
    /// code that name the same physical key count as duplicates.
    pub fn build(snapshot: &StoreSnapshot, generation: u32) -> (Self, Vec<SkippedBinding>) {
        let modifiers = parse_modifiers(&snapshot.activation_modifiers);
        let mut skipped = Vec::new();
        let mut bindings: Vec<Binding> = Vec::new();
        let mut seen_triggers = HashSet::new();
        let mut seen_codes = HashSet::new();

        for (index, entry) in snapshot.shortcuts.iter().enumerate() {
            let label = entry.label();
            let mut skip = |reason: SkipReason| {
                warn!(index, trigger = %label, %reason, "skipping shortcut");
                skipped.push(SkippedBinding {
                    index,
                    trigger: label.clone(),
                    reason,
                });
            };

            if modifiers.is_empty() {
                skip(SkipReason::NoActivationModifiers);
                continue;
            }

            let binding = match validate(entry) {
                Ok(binding) => binding,
                Err(reason) => {
                    skip(reason);
                    continue;
                }
            };

            let duplicate_code = binding
                .key_code
                .map(|code| seen_codes.contains(&code))
                .unwrap_or(false);
            if seen_triggers.contains(&binding.trigger) || duplicate_code {
                skip(SkipReason::Duplicate);
                continue;
            }

            seen_triggers.insert(binding.trigger);
            if let Some(code) = binding.key_code {
                seen_codes.insert(code);
            }
            bindings.push(binding);
        }

        (
            Self {
                generation,
                modifiers,
                bindings,
            },
            skipped,
        )
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The exact activation modifier set
    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Binding> {
        self.bindings.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Binding)> {
        self.bindings.iter().enumerate()
    }

    /// Find the binding a key event refers to
    pub fn find(&self, key: KeyCode, character: Option<char>) -> Option<(usize, &Binding)> {
        self.iter().find(|(_, binding)| binding.matches(key, character))
    }

    pub fn summaries(&self) -> Vec<BindingSummary> {
        self.bindings
            .iter()
            .map(|b| BindingSummary {
                trigger: b.trigger.to_string(),
                command: b.action.to_string(),
            })
            .collect()
    }
}

fn parse_modifiers(names: &[String]) -> ModifierState {
    let mut modifiers = Vec::with_capacity(names.len());
    for name in names {
        match name.trim().to_ascii_lowercase().as_str() {
            "control" | "ctrl" => modifiers.push(Modifier::Control),
            "shift" => modifiers.push(Modifier::Shift),
            "command" | "cmd" => modifiers.push(Modifier::Command),
            "option" | "alt" => modifiers.push(Modifier::Option),
            other => warn!(modifier = other, "ignoring unknown activation modifier"),
        }
    }
    ModifierState::from_modifiers(&modifiers)
}

fn validate(entry: &ShortcutConfig) -> Result<Binding, SkipReason> {
    let trigger = match (entry.key_code, entry.key.as_deref()) {
        (Some(code), _) => Trigger::Code(KeyCode(code)),
        (None, Some(key)) => {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Trigger::Char(c.to_ascii_lowercase()),
                _ => return Err(SkipReason::InvalidKey(key.to_string())),
            }
        }
        (None, None) => return Err(SkipReason::InvalidKey(String::new())),
    };

    let action = match entry.action.as_deref() {
        Some("reload") => BindingAction::Reload,
        Some("shell") | None => match entry.command.as_deref() {
            Some(command) if !command.trim().is_empty() => {
                BindingAction::Shell(command.to_string())
            }
            _ => return Err(SkipReason::EmptyCommand),
        },
        Some(other) => match SystemAction::from_name(other) {
            Some(system) => BindingAction::System(system),
            None => return Err(SkipReason::UnknownAction(other.to_string())),
        },
    };

    Ok(Binding::new(trigger, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortcut(key: &str, command: &str) -> ShortcutConfig {
        ShortcutConfig {
            key: Some(key.to_string()),
            command: Some(command.to_string()),
            ..Default::default()
        }
    }

    fn snapshot(shortcuts: Vec<ShortcutConfig>) -> StoreSnapshot {
        StoreSnapshot {
            activation_modifiers: vec!["control".into(), "shift".into()],
            shortcuts,
        }
    }

    #[test]
    fn test_build_simple_table() {
        let snap = snapshot(vec![shortcut("s", "open -a Calculator")]);
        let (table, skipped) = BindingTable::build(&snap, 3);

        assert!(skipped.is_empty());
        assert_eq!(table.generation(), 3);
        assert_eq!(table.len(), 1);
        assert!(table.modifiers().control && table.modifiers().shift);

        let binding = table.get(0).unwrap();
        assert_eq!(binding.trigger, Trigger::Char('s'));
        assert_eq!(binding.key_code, Some(KeyCode(0x01)));
        assert_eq!(
            binding.action,
            BindingAction::Shell("open -a Calculator".into())
        );
    }

    #[test]
    fn test_duplicate_trigger_first_wins() {
        let snap = snapshot(vec![shortcut("s", "first"), shortcut("S", "second")]);
        let (table, skipped) = BindingTable::build(&snap, 1);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().action, BindingAction::Shell("first".into()));
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].index, 1);
        assert_eq!(skipped[0].reason, SkipReason::Duplicate);
    }

    #[test]
    fn test_char_and_code_for_same_key_are_duplicates() {
        let by_code = ShortcutConfig {
            key_code: Some(0x01),
            command: Some("second".into()),
            ..Default::default()
        };
        let snap = snapshot(vec![shortcut("s", "first"), by_code]);
        let (table, skipped) = BindingTable::build(&snap, 1);

        assert_eq!(table.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::Duplicate);
    }

    #[test]
    fn test_invalid_entries_skipped() {
        let snap = snapshot(vec![
            shortcut("ab", "x"),
            shortcut("", "x"),
            shortcut("k", "   "),
            ShortcutConfig {
                key: Some("r".into()),
                action: Some("explode".into()),
                ..Default::default()
            },
            shortcut("j", "echo ok"),
        ]);
        let (table, skipped) = BindingTable::build(&snap, 1);

        assert_eq!(table.len(), 1);
        let reasons: Vec<_> = skipped.iter().map(|s| s.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::InvalidKey("ab".into()),
                SkipReason::InvalidKey(String::new()),
                SkipReason::EmptyCommand,
                SkipReason::UnknownAction("explode".into()),
            ]
        );
    }

    #[test]
    fn test_no_modifiers_makes_everything_unreachable() {
        let snap = StoreSnapshot {
            activation_modifiers: vec![],
            shortcuts: vec![shortcut("s", "x"), shortcut("d", "y")],
        };
        let (table, skipped) = BindingTable::build(&snap, 1);

        assert!(table.is_empty());
        assert_eq!(skipped.len(), 2);
        assert!(skipped
            .iter()
            .all(|s| s.reason == SkipReason::NoActivationModifiers));
    }

    #[test]
    fn test_unknown_modifier_ignored() {
        let snap = StoreSnapshot {
            activation_modifiers: vec!["Control".into(), "hyper".into()],
            shortcuts: vec![],
        };
        let (table, _) = BindingTable::build(&snap, 1);
        assert_eq!(
            table.modifiers(),
            ModifierState::from_modifiers(&[Modifier::Control])
        );
    }

    #[test]
    fn test_reload_action() {
        let snap = snapshot(vec![ShortcutConfig {
            key: Some("r".into()),
            action: Some("reload".into()),
            ..Default::default()
        }]);
        let (table, skipped) = BindingTable::build(&snap, 1);
        assert!(skipped.is_empty());
        assert_eq!(table.get(0).unwrap().action, BindingAction::Reload);
    }

    #[test]
    fn test_system_actions() {
        let entry = |key: &str, action: &str| ShortcutConfig {
            key: Some(key.into()),
            action: Some(action.into()),
            ..Default::default()
        };
        let snap = snapshot(vec![
            entry("1", "sleep"),
            entry("2", "restart"),
            entry("3", "shutdown"),
            entry("4", "hibernate"),
        ]);
        let (table, skipped) = BindingTable::build(&snap, 1);

        let actions: Vec<_> = table.iter().map(|(_, b)| b.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                BindingAction::System(SystemAction::Sleep),
                BindingAction::System(SystemAction::Restart),
                BindingAction::System(SystemAction::Shutdown),
            ]
        );
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::UnknownAction("hibernate".into()));

        assert_eq!(SystemAction::Sleep.command_line(), "pmset sleepnow");
        assert!(SystemAction::Shutdown.command_line().contains("shut down"));
        assert_eq!(table.summaries()[0].command, "<system sleep>");
    }

    #[test]
    fn test_unmapped_char_kept_without_key_code() {
        let snap = snapshot(vec![shortcut("é", "echo accent")]);
        let (table, skipped) = BindingTable::build(&snap, 1);
        assert!(skipped.is_empty());
        let binding = table.get(0).unwrap();
        assert_eq!(binding.key_code, None);
        assert!(binding.matches(KeyCode(0x7F), Some('é')));
    }

    #[test]
    fn test_find_by_character_or_code() {
        let snap = snapshot(vec![shortcut("s", "a"), shortcut("d", "b")]);
        let (table, _) = BindingTable::build(&snap, 1);

        assert_eq!(table.find(KeyCode(0x02), None).map(|(slot, _)| slot), Some(1));
        assert_eq!(table.find(KeyCode(0x01), Some('S')).map(|(slot, _)| slot), Some(0));
        assert!(table.find(KeyCode(0x0C), Some('q')).is_none());
    }

    #[test]
    fn test_summaries() {
        let snap = snapshot(vec![shortcut("s", "open -a Calculator")]);
        let (table, _) = BindingTable::build(&snap, 1);
        assert_eq!(
            table.summaries(),
            vec![BindingSummary {
                trigger: "S".into(),
                command: "open -a Calculator".into(),
            }]
        );
    }
}
