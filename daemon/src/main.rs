//! hotkey-commander-daemon: run shell commands while a hotkey is held
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Global hotkey observation via CGEventTap or exclusive registration
//! - An engine that arms one binding at a time and stops its command on release
//! - IPC server for status queries, reloads and event subscriptions
//!
//! Bindings live in a JSON file. SIGHUP or an IPC `reload` re-reads it.

mod config;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod runner;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, FileStore};
use crate::events::EngineEvent;
use crate::hotkey::{ContinuousMonitor, HotkeyListener, ObservationStrategy, StrategyKind};
use crate::ipc::Server;
use crate::lifecycle::{LifecycleSignal, Signals};
use crate::runner::CommandRunner;
use crate::state::{EngineInput, HotkeyEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "hotkey-commander-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket_path = ?config.socket_path,
        bindings_path = ?config.bindings_path,
        strategy = %config.strategy,
        "configuration loaded"
    );

    // Re-read on every engine reload: SIGHUP, IPC `reload` or a reload hotkey
    let store = Arc::new(FileStore::open(&config.bindings_path));

    let mut signals = Signals::new().context("failed to register signal handlers")?;

    // Strategy adapters and IPC -> engine
    let (input_tx, input_rx) = mpsc::channel::<EngineInput>(64);
    // Engine -> IPC server and subscribers
    let (event_tx, _event_rx) = broadcast::channel::<EngineEvent>(64);

    let strategy = build_strategy(config.strategy, input_tx.clone())?;
    let runner = CommandRunner::new(&config.shell, config.grace);
    let mut engine = HotkeyEngine::new(runner, strategy, store, event_tx.clone());

    let server = Server::new(&config.socket_path, input_tx.clone(), event_tx.clone())?;
    let mut ipc_event_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the engine (processes hotkey events and reloads)
        _ = engine.run(input_rx) => {
            info!("hotkey engine exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status view in sync with the engine
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "engine event");
                        server.record_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "engine event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("engine event relay exited");
        }

        // Exclusive registrations are delivered through the main run loop
        _ = pump_main_run_loop() => {}

        // Signals: SIGHUP reloads, SIGTERM/SIGINT shut down
        _ = async {
            loop {
                match signals.recv().await {
                    LifecycleSignal::Reload => {
                        info!("reloading bindings file");
                        if input_tx.send(EngineInput::Reload).await.is_err() {
                            break;
                        }
                    }
                    LifecycleSignal::Shutdown => break,
                }
            }
        } => {
            info!("shutdown signal received");
        }
    }

    // Cleanup; the engine future was dropped mid-run so stop it explicitly
    info!("shutting down...");

    engine.shutdown();
    server.shutdown().await;

    info!("hotkey-commander-daemon stopped");

    Ok(())
}

/// Drain pending main run loop sources between tokio polls
///
/// `block_on` polls this future on the main thread.
#[cfg(target_os = "macos")]
async fn pump_main_run_loop() {
    use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};

    let mut tick = tokio::time::interval(std::time::Duration::from_millis(20));
    loop {
        tick.tick().await;
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, std::time::Duration::ZERO, true);
        }
    }
}

#[cfg(not(target_os = "macos"))]
async fn pump_main_run_loop() {
    std::future::pending::<()>().await
}

fn build_strategy(
    kind: StrategyKind,
    input_tx: mpsc::Sender<EngineInput>,
) -> Result<Box<dyn ObservationStrategy>> {
    match kind {
        StrategyKind::ContinuousMonitor => Ok(Box::new(ContinuousMonitor::new(
            HotkeyListener::new(input_tx),
        ))),
        #[cfg(target_os = "macos")]
        StrategyKind::ExclusiveRegistration => {
            use crate::hotkey::{ExclusiveRegistration, GlobalRegistrar};

            let registrar =
                GlobalRegistrar::new(input_tx).context("failed to create hotkey registrar")?;
            Ok(Box::new(ExclusiveRegistration::new(registrar)))
        }
        #[cfg(not(target_os = "macos"))]
        StrategyKind::ExclusiveRegistration => {
            anyhow::bail!("exclusive registration is only available on macOS")
        }
    }
}
