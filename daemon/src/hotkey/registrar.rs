//! Exclusive hotkey registration through the `global-hotkey` crate
//!
//! Presses are reported as `HotkeyFired` with the generation-stamped id the
//! binding was registered under. Releases come back as raw key-up events
//! for the registered key code.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::thread;

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::EngineInput;

use super::event::{HotkeyEvent, HotkeyId};
use super::keycode::{self, KeyCode};
use super::keys::{Modifier, ModifierState};
use super::strategy::{HotkeyRegistrar, RegistrationError};

/// Registered hotkeys by platform id
type Registrations = Arc<Mutex<HashMap<u32, (HotkeyId, KeyCode)>>>;

/// Registrar backed by the OS global hotkey service
pub struct GlobalRegistrar {
    manager: GlobalHotKeyManager,
    active: Vec<HotKey>,
    registrations: Registrations,
}

impl GlobalRegistrar {
    /// Create the manager and start forwarding its events to the engine
    ///
    /// Must be called on the main thread on macOS.
    pub fn new(event_tx: mpsc::Sender<EngineInput>) -> Result<Self, RegistrationError> {
        let manager =
            GlobalHotKeyManager::new().map_err(|e| RegistrationError::Rejected(e.to_string()))?;
        let registrations: Registrations = Arc::default();

        let lookup = Arc::clone(&registrations);
        thread::Builder::new()
            .name("hotkey-forwarder".to_string())
            .spawn(move || forward_events(lookup, event_tx))
            .map_err(|e| RegistrationError::Rejected(e.to_string()))?;

        info!("global hotkey manager created");
        Ok(Self {
            manager,
            active: Vec::new(),
            registrations,
        })
    }
}

impl HotkeyRegistrar for GlobalRegistrar {
    fn register(
        &mut self,
        id: HotkeyId,
        key: KeyCode,
        modifiers: ModifierState,
    ) -> Result<(), RegistrationError> {
        let accelerator = accelerator(key, modifiers).ok_or(RegistrationError::Unmappable)?;
        let hotkey = HotKey::from_str(&accelerator)
            .map_err(|e| RegistrationError::Rejected(e.to_string()))?;

        self.manager
            .register(hotkey)
            .map_err(|e| RegistrationError::Rejected(e.to_string()))?;

        debug!(%id, accelerator, platform_id = hotkey.id(), "registered with OS");
        if let Ok(mut map) = self.registrations.lock() {
            map.insert(hotkey.id(), (id, key));
        }
        self.active.push(hotkey);
        Ok(())
    }

    fn unregister_all(&mut self) {
        // Forget ids first so late events for these hotkeys find nothing
        if let Ok(mut map) = self.registrations.lock() {
            map.clear();
        }
        for hotkey in self.active.drain(..) {
            if let Err(e) = self.manager.unregister(hotkey) {
                warn!(?e, platform_id = hotkey.id(), "failed to unregister hotkey");
            }
        }
    }
}

/// Accelerator string such as `control+shift+KeyS`
fn accelerator(key: KeyCode, modifiers: ModifierState) -> Option<String> {
    let key_name = keycode::accelerator_key(key)?;
    let mut parts: Vec<&str> = modifiers
        .modifiers()
        .map(|m| match m {
            Modifier::Control => "control",
            Modifier::Shift => "shift",
            Modifier::Command => "super",
            Modifier::Option => "alt",
        })
        .collect();
    parts.push(key_name);
    Some(parts.join("+"))
}

fn forward_events(registrations: Registrations, event_tx: mpsc::Sender<EngineInput>) {
    let receiver = GlobalHotKeyEvent::receiver();
    while let Ok(event) = receiver.recv() {
        let entry = registrations
            .lock()
            .ok()
            .and_then(|map| map.get(&event.id()).copied());
        let Some((id, key)) = entry else {
            debug!(platform_id = event.id(), "event for unknown hotkey ignored");
            continue;
        };

        let hotkey_event = match event.state() {
            HotKeyState::Pressed => HotkeyEvent::HotkeyFired(id),
            HotKeyState::Released => HotkeyEvent::key_up(key),
        };
        if event_tx.blocking_send(EngineInput::Hotkey(hotkey_event)).is_err() {
            warn!("engine channel closed, hotkey forwarder exiting");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accelerator() {
        let modifiers = ModifierState::from_modifiers(&[Modifier::Control, Modifier::Shift]);
        assert_eq!(
            accelerator(KeyCode(0x01), modifiers).as_deref(),
            Some("control+shift+KeyS")
        );
        assert_eq!(accelerator(KeyCode(0x7A), modifiers), None);
    }
}
