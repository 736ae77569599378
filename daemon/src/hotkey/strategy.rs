//! Hotkey observation strategies
//!
//! Two ways of learning about hotkeys, one behavioral contract:
//! - `ContinuousMonitor` watches every key and modifier event and lets
//!   the engine do all of the matching.
//! - `ExclusiveRegistration` registers each binding with the OS as an
//!   exclusive hotkey and reports presses as `HotkeyFired`, with releases
//!   delivered as raw key-up events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{BindingTable, Trigger};

use super::event::HotkeyId;
use super::keycode::KeyCode;
use super::keys::ModifierState;
use super::listener::{HotkeyError, HotkeyListener};

/// Which observation strategy the daemon uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Global low-level key monitoring
    #[default]
    ContinuousMonitor,
    /// Native exclusive hotkey registration
    ExclusiveRegistration,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::ContinuousMonitor => write!(f, "continuous"),
            StrategyKind::ExclusiveRegistration => write!(f, "exclusive"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown observation strategy {0:?} (expected \"continuous\" or \"exclusive\")")]
pub struct UnknownStrategy(String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" | "continuous_monitor" | "monitor" => Ok(Self::ContinuousMonitor),
            "exclusive" | "exclusive_registration" | "registration" => {
                Ok(Self::ExclusiveRegistration)
            }
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Why the OS refused a hotkey
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("trigger has no key code on this layout")]
    Unmappable,

    #[error("hotkey rejected: {0}")]
    Rejected(String),

    #[error("exclusive hotkey registration is not supported on this platform")]
    Unsupported,
}

/// A binding that could not be installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFailure {
    pub slot: usize,
    pub trigger: Trigger,
    pub error: RegistrationError,
}

/// Capability interface shared by both observation strategies
///
/// Adapters push their events into the engine's input channel on their
/// own threads; the engine only tells them when the binding table
/// changes.
pub trait ObservationStrategy {
    fn kind(&self) -> StrategyKind;

    /// Start observing on behalf of `table`
    ///
    /// Returns the bindings that could not be installed. Each failure
    /// affects only its own binding.
    fn install(&mut self, table: &BindingTable) -> Result<Vec<RegistrationFailure>, HotkeyError>;

    /// Stop observing on behalf of the current table
    fn uninstall(&mut self);

    /// Release everything for good
    fn shutdown(&mut self) {
        self.uninstall();
    }
}

/// Global low-level key monitoring
///
/// The listener is independent of the binding table, so installing for a
/// new table only makes sure it is running.
pub struct ContinuousMonitor {
    listener: HotkeyListener,
}

impl ContinuousMonitor {
    pub fn new(listener: HotkeyListener) -> Self {
        Self { listener }
    }
}

impl ObservationStrategy for ContinuousMonitor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ContinuousMonitor
    }

    fn install(&mut self, table: &BindingTable) -> Result<Vec<RegistrationFailure>, HotkeyError> {
        if !self.listener.is_running() {
            self.listener.start()?;
        }
        let failures = unmappable(table);
        debug!(
            generation = table.generation(),
            bindings = table.len(),
            unmappable = failures.len(),
            "continuous monitor armed for binding table"
        );
        Ok(failures)
    }

    fn uninstall(&mut self) {}

    fn shutdown(&mut self) {
        self.listener.stop();
    }
}

/// Bindings the tap can never match
///
/// Tap events carry only a key code, so a binding without one is dead.
fn unmappable(table: &BindingTable) -> Vec<RegistrationFailure> {
    table
        .iter()
        .filter(|(_, binding)| binding.key_code.is_none())
        .map(|(slot, binding)| {
            warn!(trigger = %binding.trigger, "no key code for binding, it cannot fire");
            RegistrationFailure {
                slot,
                trigger: binding.trigger,
                error: RegistrationError::Unmappable,
            }
        })
        .collect()
}

/// Registers exclusive hotkeys with the operating system
pub trait HotkeyRegistrar {
    /// Register `key` with exactly `modifiers` under `id`
    fn register(
        &mut self,
        id: HotkeyId,
        key: KeyCode,
        modifiers: ModifierState,
    ) -> Result<(), RegistrationError>;

    /// Drop every registration made so far
    fn unregister_all(&mut self);
}

/// Native exclusive hotkey registration
pub struct ExclusiveRegistration<G: HotkeyRegistrar> {
    registrar: G,
    registered: usize,
}

impl<G: HotkeyRegistrar> ExclusiveRegistration<G> {
    pub fn new(registrar: G) -> Self {
        Self {
            registrar,
            registered: 0,
        }
    }

    /// Number of hotkeys currently registered
    #[cfg(test)]
    pub fn registered(&self) -> usize {
        self.registered
    }
}

impl<G: HotkeyRegistrar> ObservationStrategy for ExclusiveRegistration<G> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExclusiveRegistration
    }

    fn install(&mut self, table: &BindingTable) -> Result<Vec<RegistrationFailure>, HotkeyError> {
        let modifiers = table.modifiers();
        let mut failures = Vec::new();

        for (slot, binding) in table.iter() {
            let id = HotkeyId {
                generation: table.generation(),
                slot: slot as u32,
            };
            let result = match binding.key_code {
                Some(key) => self.registrar.register(id, key, modifiers),
                None => Err(RegistrationError::Unmappable),
            };
            match result {
                Ok(()) => {
                    self.registered += 1;
                    debug!(%id, trigger = %binding.trigger, %modifiers, "hotkey registered");
                }
                Err(error) => {
                    warn!(%id, trigger = %binding.trigger, %error, "hotkey registration failed");
                    failures.push(RegistrationFailure {
                        slot,
                        trigger: binding.trigger,
                        error,
                    });
                }
            }
        }

        info!(
            generation = table.generation(),
            registered = self.registered,
            failed = failures.len(),
            "exclusive hotkeys installed"
        );
        Ok(failures)
    }

    fn uninstall(&mut self) {
        if self.registered > 0 {
            debug!(count = self.registered, "unregistering hotkeys");
        }
        self.registrar.unregister_all();
        self.registered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::{ShortcutConfig, StoreSnapshot};

    #[derive(Default)]
    struct FakeRegistrar {
        registered: Vec<(HotkeyId, KeyCode, ModifierState)>,
        refuse: Vec<KeyCode>,
        unregister_calls: usize,
    }

    impl HotkeyRegistrar for FakeRegistrar {
        fn register(
            &mut self,
            id: HotkeyId,
            key: KeyCode,
            modifiers: ModifierState,
        ) -> Result<(), RegistrationError> {
            if self.refuse.contains(&key) {
                return Err(RegistrationError::Rejected("already in use".into()));
            }
            self.registered.push((id, key, modifiers));
            Ok(())
        }

        fn unregister_all(&mut self) {
            self.unregister_calls += 1;
            self.registered.clear();
        }
    }

    fn table(keys: &[&str], generation: u32) -> BindingTable {
        let snapshot = StoreSnapshot {
            activation_modifiers: vec!["control".into(), "shift".into()],
            shortcuts: keys
                .iter()
                .map(|k| ShortcutConfig {
                    key: Some(k.to_string()),
                    command: Some(format!("echo {}", k)),
                    ..Default::default()
                })
                .collect(),
        };
        BindingTable::build(&snapshot, generation).0
    }

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("continuous".parse::<StrategyKind>().unwrap(), StrategyKind::ContinuousMonitor);
        assert_eq!("Exclusive".parse::<StrategyKind>().unwrap(), StrategyKind::ExclusiveRegistration);
        assert!("psychic".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_registers_every_binding_with_generation() {
        let mut strategy = ExclusiveRegistration::new(FakeRegistrar::default());
        let failures = strategy.install(&table(&["s", "d"], 7)).unwrap();

        assert!(failures.is_empty());
        assert_eq!(strategy.registered(), 2);
        let ids: Vec<_> = strategy.registrar.registered.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(
            ids,
            vec![
                HotkeyId { generation: 7, slot: 0 },
                HotkeyId { generation: 7, slot: 1 },
            ]
        );
        let (_, key, modifiers) = strategy.registrar.registered[0];
        assert_eq!(key, KeyCode(0x01));
        assert!(modifiers.control && modifiers.shift && !modifiers.command);
    }

    #[test]
    fn test_refused_binding_does_not_affect_others() {
        let mut registrar = FakeRegistrar::default();
        registrar.refuse.push(KeyCode(0x01));
        let mut strategy = ExclusiveRegistration::new(registrar);

        let failures = strategy.install(&table(&["s", "d"], 1)).unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].slot, 0);
        assert_eq!(failures[0].trigger, Trigger::Char('s'));
        assert_eq!(strategy.registered(), 1);
    }

    #[test]
    fn test_unmappable_character_is_skipped() {
        let mut strategy = ExclusiveRegistration::new(FakeRegistrar::default());
        let failures = strategy.install(&table(&["é", "d"], 1)).unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error, RegistrationError::Unmappable);
        assert_eq!(strategy.registered(), 1);
    }

    #[test]
    fn test_monitor_reports_bindings_without_key_code() {
        let failures = unmappable(&table(&["s", "é", "d"], 3));

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].slot, 1);
        assert_eq!(failures[0].trigger, Trigger::Char('é'));
        assert_eq!(failures[0].error, RegistrationError::Unmappable);
        assert!(unmappable(&table(&["s", "d"], 4)).is_empty());
    }

    #[test]
    fn test_uninstall_clears_registrations() {
        let mut strategy = ExclusiveRegistration::new(FakeRegistrar::default());
        strategy.install(&table(&["s"], 1)).unwrap();
        strategy.uninstall();

        assert_eq!(strategy.registered(), 0);
        assert!(strategy.registrar.registered.is_empty());
        assert_eq!(strategy.registrar.unregister_calls, 1);
    }
}
