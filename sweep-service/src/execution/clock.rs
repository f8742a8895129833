// Wait Primitives
// Injectable sleeping and cooperative shutdown for the pacing countdown

use std::time::Duration;
use tokio::sync::watch;

/// Source of delays for the pacing countdown
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Requests a clean stop of a running sweep
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes shutdown requests; cheap to clone
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Request shutdown; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    ///
    /// Pends forever when the trigger is dropped without firing.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Format a remaining wait as `DD:HH:MM:SS`
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let (mins, secs) = (total / 60, total % 60);
    let (hours, mins) = (mins / 60, mins % 60);
    let (days, hours) = (hours / 24, hours % 24);
    format!("{:02}:{:02}:{:02}:{:02}", days, hours, mins, secs)
}
