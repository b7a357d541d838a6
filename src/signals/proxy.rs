/*!
 * Signal Proxy
 * Forwards every signal delivered to the parent on to the child
 */

use super::delivery;
use super::types::Signal;
use crate::core::types::Pid;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

/// Proxies signals from the parent process to one child.
///
/// The listener registration table holds one forwarding task per signal the
/// platform let us subscribe to. Invariant: a signal is in the table iff the
/// parent currently forwards it to this child.
pub struct SignalProxy {
    child: Pid,
    table: Arc<Mutex<HashMap<Signal, JoinHandle<()>>>>,
}

impl SignalProxy {
    /// Subscribe the parent to every signal in the catalog and forward each
    /// receipt to `child`.
    ///
    /// Subscription failures (SIGKILL, SIGSTOP, anything else the platform
    /// refuses) are expected and the signal is simply omitted from the
    /// table. Must be called from within a tokio runtime.
    pub fn start(child: Pid) -> Self {
        let mut table = HashMap::new();
        for &sig in Signal::catalog() {
            let mut stream = match signal(SignalKind::from_raw(sig.number() as i32)) {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("Not proxying {}: {}", sig, e);
                    continue;
                }
            };
            let handle = tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    // Best-effort: some signals cannot be sent to this
                    // target and that is never fatal.
                    match delivery::send(child, sig) {
                        Ok(()) => debug!("Forwarded {} to child {}", sig, child),
                        Err(e) => debug!("Could not forward {} to child {}: {}", sig, child, e),
                    }
                }
            });
            table.insert(sig, handle);
        }

        info!(
            "Signal proxy started: forwarding {} signals to child {}",
            table.len(),
            child
        );
        Self {
            child,
            table: Arc::new(Mutex::new(table)),
        }
    }

    /// Pid of the child signals are forwarded to.
    pub fn child(&self) -> Pid {
        self.child
    }

    /// Number of signals currently registered for forwarding.
    pub fn registered(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether `sig` is currently in the registration table.
    pub fn is_registered(&self, sig: Signal) -> bool {
        self.table.lock().contains_key(&sig)
    }

    /// Unsubscribe every registered handler and clear the table.
    ///
    /// Draining under the lock makes this idempotent: a second call (or a
    /// concurrent one from another teardown path) finds an empty table and
    /// does nothing. Aborting a forwarding task drops its signal stream,
    /// which removes the parent-level subscription.
    pub fn stop(&self) {
        let drained: Vec<(Signal, JoinHandle<()>)> = self.table.lock().drain().collect();
        if drained.is_empty() {
            return;
        }
        for (sig, handle) in drained {
            handle.abort();
            debug!("Unregistered forwarding for {}", sig);
        }
        info!("Signal proxy stopped for child {}", self.child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_uncatchable_signals_omitted() {
        let proxy = SignalProxy::start(std::process::id());
        assert!(!proxy.is_registered(Signal::SIGKILL));
        assert!(!proxy.is_registered(Signal::SIGSTOP));
        assert!(proxy.is_registered(Signal::SIGTERM));
        assert!(proxy.is_registered(Signal::SIGUSR1));
        proxy.stop();
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_clears_table_and_is_idempotent() {
        let proxy = SignalProxy::start(std::process::id());
        assert!(proxy.registered() > 0);

        proxy.stop();
        assert_eq!(proxy.registered(), 0);

        // Second stop observes an empty table and is a no-op.
        proxy.stop();
        assert_eq!(proxy.registered(), 0);
    }
}
