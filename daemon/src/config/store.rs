//! Configuration store
//!
//! Holds the activation modifiers and the ordered shortcut list as one
//! immutable snapshot. Readers get an `Arc` to a whole snapshot; writers
//! replace it atomically, so nobody ever observes a half-updated list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A single shortcut entry as written in the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutConfig {
    /// Single character trigger (e.g. `"s"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Raw virtual key code trigger; takes precedence over `key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_code: Option<u16>,

    /// Shell command line, passed to the shell unmodified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// `"shell"` (default), `"reload"`, `"sleep"`, `"restart"` or `"shutdown"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ShortcutConfig {
    /// Trigger as written, for log and status messages
    pub fn label(&self) -> String {
        match (self.key_code, self.key.as_deref()) {
            (Some(code), _) => format!("keyCode {}", code),
            (None, Some(key)) => key.to_string(),
            (None, None) => "<none>".to_string(),
        }
    }
}

/// Everything the store holds, read and replaced as a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Activation modifier names, e.g. `["control", "shift"]`
    #[serde(default)]
    pub activation_modifiers: Vec<String>,

    #[serde(default)]
    pub shortcuts: Vec<ShortcutConfig>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            activation_modifiers: vec!["control".to_string(), "shift".to_string()],
            shortcuts: Vec::new(),
        }
    }
}

impl StoreSnapshot {
    /// Load a snapshot from a JSON file
    ///
    /// A missing file yields the default configuration (control+shift, no
    /// shortcuts). A file that exists but cannot be read or parsed is an
    /// error so that a typo never silently drops every binding.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(?path, "no configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let snapshot: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;

        debug!(
            ?path,
            shortcuts = snapshot.shortcuts.len(),
            "configuration file parsed"
        );
        Ok(snapshot)
    }
}

/// Errors that can occur while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of activation modifiers and shortcuts for the engine
pub trait ConfigStore: Send + Sync {
    /// Current snapshot
    fn snapshot(&self) -> Arc<StoreSnapshot>;

    /// Atomically replace the whole snapshot
    fn replace(&self, snapshot: StoreSnapshot);

    /// Re-read the backing source, if there is one
    ///
    /// On error the current snapshot stays in place.
    fn refresh(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// In-memory store backed by an atomically swapped pointer
pub struct MemoryStore {
    current: ArcSwap<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreSnapshot::default())
    }
}

impl ConfigStore for MemoryStore {
    fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.current.load_full()
    }

    fn replace(&self, snapshot: StoreSnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

/// Store backed by the JSON bindings file
///
/// `refresh` re-reads the file. A file that fails to parse leaves the
/// previous snapshot in effect.
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl FileStore {
    /// Open the store, falling back to defaults if the file is unusable
    ///
    /// Only the first load falls back; later refreshes keep what they had.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = StoreSnapshot::load(&path).unwrap_or_else(|e| {
            warn!(error = %e, cause = %source_of(&e), "using default configuration");
            StoreSnapshot::default()
        });
        Self {
            path,
            memory: MemoryStore::new(snapshot),
        }
    }
}

impl ConfigStore for FileStore {
    fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.memory.snapshot()
    }

    fn replace(&self, snapshot: StoreSnapshot) {
        self.memory.replace(snapshot);
    }

    fn refresh(&self) -> Result<(), ConfigError> {
        let snapshot = StoreSnapshot::load(&self.path)?;
        info!(
            path = ?self.path,
            shortcuts = snapshot.shortcuts.len(),
            "configuration file reloaded"
        );
        self.replace(snapshot);
        Ok(())
    }
}

/// Underlying I/O or JSON error text, for log lines
fn source_of(error: &ConfigError) -> String {
    match error {
        ConfigError::Read { source, .. } => source.to_string(),
        ConfigError::Parse { source, .. } => source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_original_format() {
        let json = r#"{
            "activationModifiers": ["control", "shift"],
            "shortcuts": [
                {"key": "s", "command": "open -a Calculator"},
                {"keyCode": 2, "command": "say hello"},
                {"key": "r", "action": "reload"}
            ]
        }"#;
        let snapshot: StoreSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.activation_modifiers, ["control", "shift"]);
        assert_eq!(snapshot.shortcuts.len(), 3);
        assert_eq!(snapshot.shortcuts[1].key_code, Some(2));
        assert_eq!(snapshot.shortcuts[2].action.as_deref(), Some("reload"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = StoreSnapshot::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(snapshot, StoreSnapshot::default());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"activationModifiers":["command"],"shortcuts":[{{"key":"x","command":"true"}}]}}"#
        )
        .unwrap();

        let snapshot = StoreSnapshot::load(file.path()).unwrap();
        assert_eq!(snapshot.activation_modifiers, ["command"]);
        assert_eq!(snapshot.shortcuts[0].label(), "x");
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = StoreSnapshot::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_memory_store_replace() {
        let store = MemoryStore::default();
        let before = store.snapshot();
        assert!(before.shortcuts.is_empty());

        store.replace(StoreSnapshot {
            activation_modifiers: vec!["option".into()],
            shortcuts: vec![ShortcutConfig {
                key: Some("a".into()),
                command: Some("true".into()),
                ..Default::default()
            }],
        });

        // Old readers keep their snapshot; new readers see the replacement
        assert!(before.shortcuts.is_empty());
        assert_eq!(store.snapshot().shortcuts.len(), 1);
    }

    #[test]
    fn test_file_store_refresh_picks_up_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"shortcuts":[{"key":"s","command":"old"}]}"#).unwrap();

        let store = FileStore::open(&path);
        assert_eq!(store.snapshot().shortcuts[0].command.as_deref(), Some("old"));

        std::fs::write(&path, r#"{"shortcuts":[{"key":"s","command":"new"}]}"#).unwrap();
        // Nothing changes until asked
        assert_eq!(store.snapshot().shortcuts[0].command.as_deref(), Some("old"));

        store.refresh().unwrap();
        assert_eq!(store.snapshot().shortcuts[0].command.as_deref(), Some("new"));
    }

    #[test]
    fn test_file_store_typo_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"activationModifiers":["command"],"shortcuts":[{"key":"s","command":"a"},{"key":"d","command":"b"}]}"#,
        )
        .unwrap();
        let store = FileStore::open(&path);

        std::fs::write(&path, r#"{"shortcuts":[{"key":"s","command":"a"},]}"#).unwrap();
        let err = store.refresh().unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        let kept = store.snapshot();
        assert_eq!(kept.shortcuts.len(), 2);
        assert_eq!(kept.activation_modifiers, ["command"]);
    }

    #[test]
    fn test_file_store_open_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let store = FileStore::open(file.path());
        assert_eq!(*store.snapshot(), StoreSnapshot::default());
    }

    #[test]
    fn test_file_store_missing_file_after_start_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"shortcuts":[{"key":"s","command":"a"}]}"#).unwrap();
        let store = FileStore::open(&path);

        std::fs::remove_file(&path).unwrap();
        store.refresh().unwrap();
        assert!(store.snapshot().shortcuts.is_empty());
    }
}
