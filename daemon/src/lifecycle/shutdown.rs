//! Signal handling for reload and graceful shutdown

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// What a received signal asks the daemon to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// SIGTERM or SIGINT
    Shutdown,
    /// SIGHUP: re-read the bindings file
    Reload,
}

/// Handles SIGTERM, SIGINT and SIGHUP
pub struct Signals {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

impl Signals {
    /// Register the signal handlers
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal
    pub async fn recv(&mut self) -> LifecycleSignal {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
                LifecycleSignal::Shutdown
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
                LifecycleSignal::Shutdown
            }
            _ = self.sighup.recv() => {
                debug!("received SIGHUP");
                LifecycleSignal::Reload
            }
        }
    }
}
