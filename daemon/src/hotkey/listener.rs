//! Global hotkey listener using macOS CGEventTap
//!
//! Monitors system-wide key down, key up and modifier events.
//! Runs on a dedicated thread with its own CFRunLoop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::state::EngineInput;

use super::event::HotkeyEvent;
use super::keycode::KeyCode;
use super::keys::ModifierState;

/// Global hotkey listener that feeds raw keyboard events to the engine
pub struct HotkeyListener {
    event_tx: mpsc::Sender<EngineInput>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener
    pub fn new(event_tx: mpsc::Sender<EngineInput>) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener
    ///
    /// This spawns a dedicated thread that runs a CFRunLoop to receive
    /// CGEventTap callbacks. The listener runs until `stop()` is called
    /// or the program exits.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if !cfg!(target_os = "macos") {
            return Err(HotkeyError::Unsupported);
        }

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = run_event_loop(event_tx, running.clone()) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    /// Stop the hotkey listener
    ///
    /// The listener thread notices on its next run loop iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global key monitoring is not supported on this platform")]
    Unsupported,
}

/// Payload handed from the tap callback to the listener loop
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
enum RawEvent {
    KeyDown(u16),
    KeyUp(u16),
    Flags(u64),
    TapDisabled,
}

/// Turns raw tap payloads into engine events
///
/// FlagsChanged fires for caps lock and for every modifier edge; only
/// changes to the four tracked modifiers are forwarded.
#[derive(Debug, Default)]
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
struct RawTranslator {
    /// Last forwarded modifiers; `None` until known
    modifiers: Option<ModifierState>,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
impl RawTranslator {
    fn translate(&mut self, raw: RawEvent) -> Option<HotkeyEvent> {
        match raw {
            RawEvent::KeyDown(code) => Some(HotkeyEvent::key_down(KeyCode(code))),
            RawEvent::KeyUp(code) => Some(HotkeyEvent::key_up(KeyCode(code))),
            RawEvent::Flags(bits) => {
                let next = ModifierState::from_raw(bits);
                if self.modifiers == Some(next) {
                    return None;
                }
                debug!(from = ?self.modifiers, to = %next, "modifier state changed");
                self.modifiers = Some(next);
                Some(HotkeyEvent::ModifiersChanged(next))
            }
            RawEvent::TapDisabled => {
                // Flag edges were lost; forward the next flags word whatever it is
                self.modifiers = None;
                Some(HotkeyEvent::TapDisabled)
            }
        }
    }
}

#[cfg(target_os = "macos")]
fn run_event_loop(
    event_tx: mpsc::Sender<EngineInput>,
    running: Arc<AtomicBool>,
) -> Result<(), HotkeyError> {
    use std::time::Duration;

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType, EventField,
    };
    use tracing::warn;

    let mut translator = RawTranslator::default();
    let (raw_tx, raw_rx) = std::sync::mpsc::channel::<RawEvent>();
    let reenable = Arc::new(AtomicBool::new(false));
    let reenable_cb = Arc::clone(&reenable);

    // Runs on the tap's run loop; only copies fields out
    let callback = move |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| -> Option<CGEvent> {
        let keycode = || event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
        let raw = match event_type {
            CGEventType::KeyDown => Some(RawEvent::KeyDown(keycode())),
            CGEventType::KeyUp => Some(RawEvent::KeyUp(keycode())),
            CGEventType::FlagsChanged => Some(RawEvent::Flags(event.get_flags().bits())),
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                reenable_cb.store(true, Ordering::SeqCst);
                Some(RawEvent::TapDisabled)
            }
            _ => None,
        };
        if let Some(raw) = raw {
            let _ = raw_tx.send(raw);
        }
        Some(event.clone())
    };

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown, CGEventType::KeyUp, CGEventType::FlagsChanged],
        callback,
    )
    .map_err(|_| {
        error!("failed to create event tap - is Accessibility permission granted?");
        HotkeyError::EventTapCreation
    })?;
    tap.enable();

    let source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| HotkeyError::EventTapCreation)?;
    unsafe {
        CFRunLoop::get_current().add_source(&source, kCFRunLoopCommonModes);
    }

    info!("event tap created and enabled");

    'outer: while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(20), true);
        }

        if reenable.swap(false, Ordering::SeqCst) {
            warn!("event tap disabled by the system, re-enabling");
            tap.enable();
        }

        for event in raw_rx.try_iter().filter_map(|raw| translator.translate(raw)) {
            if event_tx.blocking_send(EngineInput::Hotkey(event)).is_err() {
                warn!("engine channel closed, stopping event tap");
                running.store(false, Ordering::SeqCst);
                break 'outer;
            }
        }
    }

    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn run_event_loop(
    _event_tx: mpsc::Sender<EngineInput>,
    _running: Arc<AtomicBool>,
) -> Result<(), HotkeyError> {
    Err(HotkeyError::Unsupported)
}
