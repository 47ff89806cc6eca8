// src/engine/signals.rs

//! SIGINT/SIGTERM handling for the engine entry (§4.G).
//!
//! A first SIGINT or SIGTERM requests a graceful shutdown; a second SIGINT
//! within [`ESCALATION_WINDOW`] escalates to an immediate force-kill
//! signal. Runs as its own task so the engine loop only has to select on
//! one channel.

use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::warn;

/// How soon a second Ctrl-C must arrive to escalate to SIGKILL (§4.G).
pub const ESCALATION_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Graceful,
    Force,
}

/// Spawn the signal-listening task. The returned receiver yields
/// [`ShutdownSignal::Graceful`] once, then [`ShutdownSignal::Force`] if a
/// second interrupt lands inside the escalation window.
pub fn spawn() -> mpsc::Receiver<ShutdownSignal> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(err) => {
                warn!(error = %err, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        if tx.send(ShutdownSignal::Graceful).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(ESCALATION_WINDOW) => break,
                recv = sigint.recv() => {
                    if recv.is_some() {
                        let _ = tx.send(ShutdownSignal::Force).await;
                    }
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{raise, Signal};

    /// A single test function so the two scenarios never race each other
    /// over the process-wide SIGINT disposition: a lone SIGINT requests a
    /// graceful shutdown, and a second one landing inside the escalation
    /// window escalates to `Force` (§4.G).
    #[tokio::test]
    async fn sigint_then_second_sigint_escalates_to_force() {
        let mut rx = spawn();

        raise(Signal::SIGINT).unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("graceful signal should arrive promptly");
        assert_eq!(first, Some(ShutdownSignal::Graceful));

        raise(Signal::SIGINT).unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("force signal should arrive promptly");
        assert_eq!(second, Some(ShutdownSignal::Force));
    }
}
