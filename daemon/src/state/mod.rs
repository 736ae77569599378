//! Hotkey engine module
//!
//! Provides the engine state machine. Each binding is either:
//! - Idle: nothing running on its behalf
//! - Armed: its command is the one running process
//!
//! At most one binding is armed at any time.

mod machine;

pub use machine::{EngineInput, HotkeyEngine};
