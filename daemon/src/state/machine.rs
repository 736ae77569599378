//! Core hotkey engine implementation
//!
//! Decides when a binding becomes armed or idle and drives the command
//! runner in lockstep. Events arrive one at a time through a channel, so
//! the keyboard snapshot and the session are only ever touched from
//! `run`.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{BindingAction, BindingTable, ConfigStore, SkipReason, SystemAction, Trigger};
use crate::events::{EngineEvent, StopReason};
use crate::hotkey::{
    HotkeyEvent, HotkeyId, KeyCode, ModifierState, ObservationStrategy, RegistrationError,
};
use crate::runner::Runner;

/// Input consumed by the engine, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    /// A keyboard event from the observation strategy
    Hotkey(HotkeyEvent),
    /// Re-derive bindings from the configuration store
    Reload,
    /// Stop everything and leave the run loop
    Shutdown,
}

impl From<HotkeyEvent> for EngineInput {
    fn from(event: HotkeyEvent) -> Self {
        EngineInput::Hotkey(event)
    }
}

/// Engine state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No binding armed, no command running
    #[default]
    Idle,
    /// One binding's command is running
    Armed { slot: usize, trigger: Trigger },
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::Armed { trigger, .. } => write!(f, "Armed({})", trigger),
        }
    }
}

/// The armed binding and the process running for it
#[derive(Debug)]
struct Session {
    slot: usize,
    trigger: Trigger,
    armed_at: Instant,
}

/// The engine that maps keyboard state to command lifecycles
pub struct HotkeyEngine<R: Runner> {
    runner: R,
    strategy: Box<dyn ObservationStrategy>,
    store: Arc<dyn ConfigStore>,
    /// Current binding table; replaced whole on reload
    table: Arc<BindingTable>,
    /// Live modifier snapshot
    modifiers: ModifierState,
    /// At most one armed binding
    session: Option<Session>,
    /// Key whose presses are ignored until released (after a reload key)
    suppressed: Option<KeyCode>,
    /// Channel for emitting status events
    event_tx: broadcast::Sender<EngineEvent>,
}

impl<R: Runner> HotkeyEngine<R> {
    /// Create a new engine with an empty binding table
    ///
    /// Nothing is observed until the first `reload` (done by `run`).
    pub fn new(
        runner: R,
        strategy: Box<dyn ObservationStrategy>,
        store: Arc<dyn ConfigStore>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            runner,
            strategy,
            store,
            table: Arc::new(BindingTable::default()),
            modifiers: ModifierState::default(),
            session: None,
            suppressed: None,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> State {
        match &self.session {
            Some(session) => State::Armed {
                slot: session.slot,
                trigger: session.trigger,
            },
            None => State::Idle,
        }
    }

    /// Current binding table
    #[cfg(test)]
    pub fn table(&self) -> &Arc<BindingTable> {
        &self.table
    }

    /// Run the engine, processing inputs until shutdown or channel close
    pub async fn run(&mut self, mut input_rx: mpsc::Receiver<EngineInput>) {
        info!(strategy = %self.strategy.kind(), "hotkey engine started");
        self.reload();

        while let Some(input) = input_rx.recv().await {
            match input {
                EngineInput::Hotkey(event) => self.handle_event(event),
                EngineInput::Reload => self.reload(),
                EngineInput::Shutdown => break,
            }
        }

        self.shutdown();
        info!("hotkey engine stopped");
    }

    /// Handle one keyboard event
    pub fn handle_event(&mut self, event: HotkeyEvent) {
        match event {
            HotkeyEvent::KeyDown { key, character } => self.handle_key_down(key, character),
            HotkeyEvent::KeyUp { key, character } => self.handle_key_up(key, character),
            HotkeyEvent::ModifiersChanged(modifiers) => self.handle_modifier_change(modifiers),
            HotkeyEvent::HotkeyFired(id) => self.handle_hotkey_fired(id),
            HotkeyEvent::TapDisabled => {
                // Key-up events may have been lost while the tap was down
                warn!("hotkey tap disabled, events may be missed");
                self.disarm(StopReason::TapDisabled);
            }
        }
    }

    /// Stop everything, re-read the store, swap in a fresh table, re-install
    ///
    /// Returns with the engine idle and no command running. The new table
    /// is in place before any later event is matched. If the store cannot
    /// be re-read, the table is rebuilt from the snapshot it already had.
    pub fn reload(&mut self) {
        self.disarm(StopReason::Reload);
        self.strategy.uninstall();

        if let Err(e) = self.store.refresh() {
            warn!(error = %e, "configuration rejected, keeping previous bindings");
            let reason = match std::error::Error::source(&e) {
                Some(source) => format!("{}: {}", e, source),
                None => e.to_string(),
            };
            self.emit(EngineEvent::ConfigurationRejected { reason });
        }

        let snapshot = self.store.snapshot();
        let generation = self.table.generation().wrapping_add(1);
        let (table, skipped) = BindingTable::build(&snapshot, generation);
        self.table = Arc::new(table);

        for skip in skipped {
            self.emit(EngineEvent::BindingSkipped {
                trigger: skip.trigger,
                reason: skip.reason,
            });
        }

        match self.strategy.install(&self.table) {
            Ok(failures) => {
                for failure in failures {
                    let trigger = failure.trigger.to_string();
                    let event = match failure.error {
                        RegistrationError::Unmappable => EngineEvent::BindingSkipped {
                            trigger,
                            reason: SkipReason::Unmappable,
                        },
                        error => EngineEvent::RegistrationFailed {
                            trigger,
                            reason: error.to_string(),
                        },
                    };
                    self.emit(event);
                }
            }
            Err(e) => {
                error!(?e, "failed to install hotkey observation");
                warn!("continuing without hotkey support - check Accessibility permissions");
            }
        }

        info!(
            generation,
            bindings = self.table.len(),
            modifiers = %self.table.modifiers(),
            "configuration loaded"
        );
        self.emit(EngineEvent::ConfigurationReloaded {
            generation,
            strategy: self.strategy.kind(),
            bindings: self.table.summaries(),
        });
    }

    /// Disarm and release the observation strategy
    pub fn shutdown(&mut self) {
        self.disarm(StopReason::Shutdown);
        self.strategy.shutdown();
    }

    fn handle_key_down(&mut self, key: KeyCode, character: Option<char>) {
        if self.suppressed == Some(key) {
            return;
        }
        if !self.modifiers.matches_required(&self.table.modifiers()) {
            return;
        }
        let Some((slot, _)) = self.table.find(key, character) else {
            debug!(%key, ?character, "key down matches no binding");
            return;
        };
        self.activate(slot, key);
    }

    fn handle_key_up(&mut self, key: KeyCode, character: Option<char>) {
        if self.suppressed == Some(key) {
            self.suppressed = None;
        }

        let released = match &self.session {
            Some(session) => self
                .table
                .get(session.slot)
                .map(|binding| binding.matches(key, character))
                .unwrap_or(false),
            None => false,
        };
        if released {
            self.disarm(StopReason::KeyReleased);
        }
    }

    fn handle_modifier_change(&mut self, modifiers: ModifierState) {
        self.modifiers = modifiers;

        if self.session.is_some() && !modifiers.matches_required(&self.table.modifiers()) {
            debug!(%modifiers, required = %self.table.modifiers(), "activation modifiers broken");
            self.disarm(StopReason::ModifiersReleased);
        }
    }

    fn handle_hotkey_fired(&mut self, id: HotkeyId) {
        if id.generation != self.table.generation() {
            debug!(%id, current = self.table.generation(), "stale hotkey ignored");
            return;
        }
        let slot = id.slot as usize;
        let Some(key) = self.table.get(slot).map(|b| b.key_code) else {
            debug!(%id, "hotkey for unknown slot ignored");
            return;
        };
        // Registered bindings always have a key code
        if let Some(key) = key {
            if self.suppressed == Some(key) {
                return;
            }
            self.activate(slot, key);
        }
    }

    /// Arm `slot` unless it is already armed; stops any other binding first
    fn activate(&mut self, slot: usize, key: KeyCode) {
        let Some(binding) = self.table.get(slot).cloned() else {
            return;
        };

        let command = match binding.action {
            BindingAction::Reload => {
                info!(trigger = %binding.trigger, "reload requested by hotkey");
                self.suppressed = Some(key);
                self.reload();
                return;
            }
            BindingAction::System(action) => {
                self.suppressed = Some(key);
                self.launch_system(binding.trigger, action);
                return;
            }
            BindingAction::Shell(command) => command,
        };

        match self.session.as_ref().map(|s| s.slot) {
            Some(armed) if armed == slot => {
                debug!(trigger = %binding.trigger, "already armed");
                return;
            }
            Some(_) => self.disarm(StopReason::Switched),
            None => {}
        }

        match self.runner.start(&command) {
            Ok(pid) => {
                info!(from = %State::Idle, trigger = %binding.trigger, pid, "state transition");
                self.session = Some(Session {
                    slot,
                    trigger: binding.trigger,
                    armed_at: Instant::now(),
                });
                self.emit(EngineEvent::CommandStarted {
                    trigger: binding.trigger.to_string(),
                    command,
                    pid,
                });
            }
            Err(e) => {
                warn!(trigger = %binding.trigger, %e, "command failed to start");
                self.emit(EngineEvent::CommandFailed {
                    trigger: binding.trigger.to_string(),
                    command,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Fire a power action; the armed session, if any, is left alone
    fn launch_system(&mut self, trigger: Trigger, action: SystemAction) {
        match self.runner.launch(action.command_line()) {
            Ok(pid) => {
                info!(%trigger, %action, pid, "system action launched");
                self.emit(EngineEvent::ActionLaunched {
                    trigger: trigger.to_string(),
                    action,
                    pid,
                });
            }
            Err(e) => {
                warn!(%trigger, %action, %e, "system action failed to start");
                self.emit(EngineEvent::CommandFailed {
                    trigger: trigger.to_string(),
                    command: action.command_line().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Stop the armed command, if any
    fn disarm(&mut self, reason: StopReason) {
        let from = self.state();
        let Some(session) = self.session.take() else {
            return;
        };

        self.runner.stop();

        let duration_ms = session.armed_at.elapsed().as_millis() as u64;
        info!(
            %from,
            to = %State::Idle,
            %reason,
            duration_ms,
            "state transition"
        );
        self.emit(EngineEvent::CommandStopped {
            trigger: session.trigger.to_string(),
            reason,
            duration_ms,
        });
    }

    fn emit(&self, event: EngineEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}
