//! Configuration loading and management
//!
//! Daemon settings come from the environment; activation modifiers and
//! shortcuts live in a JSON file that feeds the configuration store.

pub mod bindings;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::hotkey::StrategyKind;

pub use bindings::{BindingAction, BindingSummary, BindingTable, SkipReason, SystemAction, Trigger};
pub use store::{ConfigStore, FileStore};

/// Grace window between SIGTERM and SIGKILL when stopping a command
pub const DEFAULT_GRACE: Duration = Duration::from_millis(100);

#[cfg(target_os = "macos")]
const DEFAULT_SHELL: &str = "/bin/zsh";
#[cfg(not(target_os = "macos"))]
const DEFAULT_SHELL: &str = "/bin/sh";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// JSON file holding activation modifiers and shortcuts
    pub bindings_path: PathBuf,

    /// How hotkeys are observed
    pub strategy: StrategyKind,

    /// Shell used to run command lines (`<shell> -c <command>`)
    pub shell: PathBuf,

    /// Delay before a stopped command is force-killed
    pub grace: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = PathBuf::from(lookup("HOME").context("HOME is not set")?);
        let data_dir = home.join(".local").join("share").join("hotkey-commander");
        let socket_path = data_dir.join("daemon.sock");

        let bindings_path = lookup("HOTKEY_COMMANDER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                home.join(".config")
                    .join("hotkey-commander")
                    .join("config.json")
            });

        let strategy = match lookup("HOTKEY_COMMANDER_STRATEGY") {
            Some(value) => value
                .parse()
                .with_context(|| format!("invalid HOTKEY_COMMANDER_STRATEGY {:?}", value))?,
            None => StrategyKind::default(),
        };

        let shell = lookup("HOTKEY_COMMANDER_SHELL")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL));

        let grace = match lookup("HOTKEY_COMMANDER_GRACE_MS") {
            Some(value) => Duration::from_millis(
                value
                    .parse()
                    .with_context(|| format!("invalid HOTKEY_COMMANDER_GRACE_MS {:?}", value))?,
            ),
            None => DEFAULT_GRACE,
        };

        Ok(Self {
            socket_path,
            data_dir,
            bindings_path,
            strategy,
            shell,
            grace,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {:?}", self.data_dir))?;
        Ok(())
    }
}
