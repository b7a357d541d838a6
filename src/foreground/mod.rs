/*!
 * Foreground Module
 * The exit reconciler: wires spawn, signal proxy, watchdog, parent-exit
 * guard, and the cleanup callback; decides how the parent terminates
 */

use crate::core::types::Pid;
use crate::errors::{ForegroundError, ForegroundResult};
use crate::ipc::{self, IpcChannel};
use crate::process::{ChildHandle, ExitDisposition, SpawnConfig, Watchdog};
use crate::signals::{delivery, Signal, SignalProxy};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Context handed to the cleanup callback alongside the child's disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupContext {
    /// Pid of the watchdog helper, if one was spawned, so external tooling
    /// can account for it.
    pub watchdog_pid: Option<Pid>,
}

/// What the cleanup callback wants done with the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Adopt the child's disposition unchanged.
    Default,
    /// Exit with this code instead.
    Code(i32),
    /// Terminate via this signal instead.
    Signal(Signal),
    /// Do not terminate the parent at all; control returns to the host.
    Veto,
}

/// User-supplied cleanup callback. Invoked exactly once, after the child
/// closes; may resolve asynchronously.
pub type CleanupFn =
    Box<dyn FnOnce(ExitDisposition, CleanupContext) -> BoxFuture<'static, CleanupOutcome> + Send>;

/// Configuration for one foreground run.
pub struct ForegroundConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env_vars: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    cleanup: Option<CleanupFn>,
}

impl ForegroundConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_vars: Vec::new(),
            working_dir: None,
            cleanup: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_cleanup<F, Fut>(mut self, cleanup: F) -> Self
    where
        F: FnOnce(ExitDisposition, CleanupContext) -> Fut + Send + 'static,
        Fut: Future<Output = CleanupOutcome> + Send + 'static,
    {
        self.cleanup = Some(Box::new(move |disposition, context| {
            cleanup(disposition, context).boxed()
        }));
        self
    }
}

/// Force-kills the child if the parent is torn down outside the normal
/// reconciliation path. Armed at spawn, disarmed once reconciling begins.
struct ParentExitGuard {
    child: Pid,
    armed: AtomicBool,
}

impl ParentExitGuard {
    fn arm(child: Pid) -> Self {
        Self {
            child,
            armed: AtomicBool::new(true),
        }
    }

    /// Idempotent; safe to call in any order relative to proxy teardown.
    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl Drop for ParentExitGuard {
    fn drop(&mut self) {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        warn!(
            "Parent tearing down with child {} still running, hanging it up",
            self.child
        );
        if delivery::send(self.child, Signal::SIGHUP).is_err() {
            let _ = delivery::send(self.child, Signal::SIGTERM);
        }
    }
}

/// The terminal step the reconciler settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalAction {
    /// Exit the parent with this code.
    Exit(i32),
    /// Terminate the parent via this signal.
    Raise(Signal),
    /// Vetoed: hand this disposition back to the host and keep running.
    Return(ExitDisposition),
}

/// Map the child's disposition and the cleanup outcome to the parent's fate.
pub(crate) fn reconcile(child: ExitDisposition, outcome: CleanupOutcome) -> FinalAction {
    match outcome {
        CleanupOutcome::Veto => FinalAction::Return(child),
        CleanupOutcome::Code(code) => FinalAction::Exit(code),
        CleanupOutcome::Signal(sig) => FinalAction::Raise(sig),
        CleanupOutcome::Default => match child.signal {
            Some(sig) => FinalAction::Raise(sig),
            None => FinalAction::Exit(child.code.unwrap_or(0)),
        },
    }
}

/// Terminate the parent the way the child terminated: re-raise the signal at
/// our own pid, falling back once to SIGTERM if it cannot be sent.
fn raise_self(sig: Signal) -> ! {
    use nix::sys::signal::{kill, signal as set_handler, SigHandler, Signal as NixSignal};

    let me = nix::unistd::getpid();
    let deliver = |s: Signal| -> bool {
        match NixSignal::try_from(s.number() as i32) {
            Ok(nsig) => {
                // The runtime's installed handler would catch our own signal;
                // the default disposition must be back in place first.
                // SAFETY: process-wide handler change at the point of
                // termination; no further signal handling happens after this.
                unsafe {
                    let _ = set_handler(nsig, SigHandler::SigDfl);
                }
                kill(me, nsig).is_ok()
            }
            Err(_) => false,
        }
    };

    if !deliver(sig) {
        debug!("Could not self-deliver {}, falling back to SIGTERM", sig);
        let _ = deliver(Signal::SIGTERM);
    }

    // Keep-alive: hold the process for a beat so delivery wins the race
    // against a graceful return. A non-fatal or undeliverable signal must
    // still never leave the parent hanging in the terminal state.
    std::thread::sleep(Duration::from_millis(200));
    std::process::exit(128 + sig.number() as i32);
}

/// Run `config.program` as a foreground child.
///
/// The child inherits the parent's stdio; every signal delivered to the
/// parent is forwarded to the child; when the child terminates, the parent
/// terminates the same way unless the cleanup callback overrides or vetoes
/// it. Returns only on veto (with the final disposition) or if the child
/// could not be spawned at all.
pub async fn run(mut config: ForegroundConfig) -> ForegroundResult<ExitDisposition> {
    let parent_ipc = IpcChannel::from_env().map_err(ForegroundError::Ipc)?;

    let mut spawn_config = SpawnConfig::new(config.program.clone())
        .with_args(config.args.clone())
        .with_ipc(parent_ipc.is_some());
    spawn_config.env_vars = config.env_vars.clone();
    spawn_config.working_dir = config.working_dir.clone();

    // spawning -> running
    let mut child = ChildHandle::spawn(&spawn_config)?;
    let proxy = SignalProxy::start(child.pid());
    let mut watchdog = Watchdog::spawn(child.pid());
    let exit_guard = ParentExitGuard::arm(child.pid());
    let relay = parent_ipc.and_then(|parent_channel| {
        child
            .take_ipc()
            .map(|child_channel| ipc::relay(parent_channel, child_channel))
    });

    // running -> child-closed; single-fire inside ChildHandle::wait.
    let disposition = match child.wait().await {
        Ok(disposition) => disposition,
        Err(e) => {
            // Torn down outside the normal path: unregister everything and
            // let the armed exit guard hang up the child.
            proxy.stop();
            if let Some(watchdog) = watchdog.take() {
                watchdog.stop();
            }
            return Err(e);
        }
    };

    // child-closed -> reconciling: the callback may resolve after a delay,
    // and stdio plus signal proxying stay live until it does.
    let context = CleanupContext {
        watchdog_pid: watchdog.as_ref().map(Watchdog::pid),
    };
    let outcome = match config.cleanup.take() {
        Some(cleanup) => cleanup(disposition, context).await,
        None => CleanupOutcome::Default,
    };

    // Idempotent teardown; nothing here cares about ordering.
    proxy.stop();
    exit_guard.disarm();
    if let Some(watchdog) = watchdog {
        watchdog.stop();
    }
    if let Some(relay) = relay {
        relay.shutdown();
    }

    // reconciling -> terminal
    match reconcile(disposition, outcome) {
        FinalAction::Return(disposition) => {
            info!("Parent exit vetoed by cleanup; control returns to host");
            Ok(disposition)
        }
        FinalAction::Exit(code) => std::process::exit(code),
        FinalAction::Raise(sig) => raise_self(sig),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reconcile_default_adopts_code() {
        let action = reconcile(ExitDisposition::from_code(3), CleanupOutcome::Default);
        assert_eq!(action, FinalAction::Exit(3));
    }

    #[test]
    fn test_reconcile_default_adopts_signal() {
        let action = reconcile(
            ExitDisposition::from_signal(Signal::SIGINT),
            CleanupOutcome::Default,
        );
        assert_eq!(action, FinalAction::Raise(Signal::SIGINT));
    }

    #[test]
    fn test_reconcile_default_without_code_exits_zero() {
        let child = ExitDisposition {
            code: None,
            signal: None,
        };
        assert_eq!(reconcile(child, CleanupOutcome::Default), FinalAction::Exit(0));
    }

    #[test]
    fn test_reconcile_explicit_code_wins_over_signal() {
        let action = reconcile(
            ExitDisposition::from_signal(Signal::SIGTERM),
            CleanupOutcome::Code(42),
        );
        assert_eq!(action, FinalAction::Exit(42));
    }

    #[test]
    fn test_reconcile_explicit_signal_wins_over_code() {
        let action = reconcile(
            ExitDisposition::from_code(0),
            CleanupOutcome::Signal(Signal::SIGTERM),
        );
        assert_eq!(action, FinalAction::Raise(Signal::SIGTERM));
    }

    #[test]
    fn test_reconcile_veto_returns_child_disposition() {
        let child = ExitDisposition::from_code(7);
        assert_eq!(reconcile(child, CleanupOutcome::Veto), FinalAction::Return(child));
    }

    #[tokio::test]
    async fn test_exit_guard_drop_hangs_up_child() {
        let config = SpawnConfig::new("sleep").with_args(vec!["30".into()]);
        let mut child = ChildHandle::spawn(&config).expect("spawn sleep");

        let guard = ParentExitGuard::arm(child.pid());
        drop(guard);

        let disposition = child.wait().await.expect("wait");
        assert_eq!(disposition.signal, Some(Signal::SIGHUP));
    }

    #[tokio::test]
    async fn test_exit_guard_disarmed_leaves_child_alone() {
        let config = SpawnConfig::new("sleep").with_args(vec!["30".into()]);
        let mut child = ChildHandle::spawn(&config).expect("spawn sleep");

        let guard = ParentExitGuard::arm(child.pid());
        guard.disarm();
        guard.disarm();
        drop(guard);

        // Child is still alive; kill it ourselves.
        child.signal(Signal::SIGTERM).expect("send SIGTERM");
        let disposition = child.wait().await.expect("wait");
        assert_eq!(disposition.signal, Some(Signal::SIGTERM));
    }
}
