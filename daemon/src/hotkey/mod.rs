//! Hotkey module for global keyboard event observation
//!
//! Uses macOS CGEventTap to monitor key and modifier events, or native
//! exclusive hotkey registration, and adapts both into one event stream
//! for the engine.

mod event;
pub mod keycode;
mod keys;
mod listener;
#[cfg(target_os = "macos")]
mod registrar;
mod strategy;

pub use event::{HotkeyEvent, HotkeyId};
pub use keycode::KeyCode;
pub use keys::{Modifier, ModifierState};
pub use listener::{HotkeyError, HotkeyListener};
#[cfg(target_os = "macos")]
pub use registrar::GlobalRegistrar;
pub use strategy::{
    ContinuousMonitor, ExclusiveRegistration, HotkeyRegistrar, ObservationStrategy,
    RegistrationError, RegistrationFailure, StrategyKind,
};
