//! Command runner
//!
//! Runs at most one external command at a time on behalf of the engine
//! and makes sure a stopped command does not outlive its hotkey.

mod process;

pub use process::CommandRunner;

/// Starts and stops the single command owned by the engine
pub trait Runner {
    /// Stop whatever is running, then start `command` through the shell
    ///
    /// Returns the pid of the new process.
    fn start(&mut self, command: &str) -> Result<u32, RunnerError>;

    /// Stop the current command, if any, without waiting for it to exit
    fn stop(&mut self);

    /// Whether the runner currently owns a process
    fn is_running(&self) -> bool;

    /// Run a one-off command that is not tied to a held key
    ///
    /// The current command, if any, keeps running.
    fn launch(&mut self, command: &str) -> Result<u32, RunnerError>;
}

/// Errors that can occur while starting a command
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command {0:?} exited before its pid could be read")]
    ExitedImmediately(String),
}
