/*!
 * Watchdog
 * Detached helper process that notifies the child if the parent is killed
 * before the signal proxy can run
 */

use crate::core::types::Pid;
use log::{debug, info, warn};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Pid of the parent the helper observes.
pub const WATCHDOG_PARENT_ENV: &str = "FOREGROUND_WATCHDOG_PARENT";
/// Pid of the child the helper terminates once the parent is gone.
pub const WATCHDOG_CHILD_ENV: &str = "FOREGROUND_WATCHDOG_CHILD";

/// Liveness polling interval. Signal-0 probing is the most portable check
/// available; 200ms keeps an orphaned child from lingering noticeably.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The helper's whole program: probe parent liveness at [`POLL_INTERVAL`];
/// the instant the parent is gone, send a termination signal to the child
/// and exit. Parameterized purely by the two pid env vars.
fn bootstrap_script() -> String {
    format!(
        "while kill -0 \"${parent}\" 2>/dev/null; do sleep {interval}; done; \
         kill -TERM \"${child}\" 2>/dev/null",
        parent = WATCHDOG_PARENT_ENV,
        child = WATCHDOG_CHILD_ENV,
        interval = POLL_INTERVAL.as_secs_f32(),
    )
}

/// Handle on the spawned helper process.
pub struct Watchdog {
    helper: Child,
}

impl Watchdog {
    /// Spawn the helper: a small bootstrap script detached from the parent's
    /// stdio, told the two pids through its environment.
    ///
    /// Best-effort safety net: if the helper fails to spawn, the operation
    /// proceeds without one.
    pub fn spawn(child: Pid) -> Option<Self> {
        let parent = std::process::id();
        match Command::new("sh")
            .arg("-c")
            .arg(bootstrap_script())
            .env(WATCHDOG_PARENT_ENV, parent.to_string())
            .env(WATCHDOG_CHILD_ENV, child.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(helper) => {
                info!(
                    "Watchdog {} observing parent {} on behalf of child {}",
                    helper.id(),
                    parent,
                    child
                );
                Some(Self { helper })
            }
            Err(e) => {
                warn!("Watchdog failed to spawn, proceeding without one: {}", e);
                None
            }
        }
    }

    /// The helper's own pid, surfaced so external tooling can account for it.
    pub fn pid(&self) -> Pid {
        self.helper.id()
    }

    /// Kill and reap the helper once the child's fate is being decided
    /// through the normal path.
    pub fn stop(mut self) {
        if let Err(e) = self.helper.kill() {
            debug!("Watchdog {} already gone: {}", self.helper.id(), e);
        }
        let _ = self.helper.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_script_probes_and_terminates() {
        let script = bootstrap_script();
        assert!(script.contains("kill -0"));
        assert!(script.contains("kill -TERM"));
        assert!(script.contains(WATCHDOG_PARENT_ENV));
        assert!(script.contains(WATCHDOG_CHILD_ENV));
        assert!(script.contains("0.2"));
    }

    #[test]
    fn test_spawn_and_stop() {
        let watchdog = Watchdog::spawn(std::process::id()).expect("spawn watchdog");
        assert!(watchdog.pid() > 0);
        watchdog.stop();
    }

    #[test]
    fn test_script_kills_child_once_parent_gone() {
        use std::os::unix::process::ExitStatusExt;

        // A stand-in parent that is already dead by the time the helper runs.
        let mut stand_in = Command::new("true").spawn().expect("spawn stand-in");
        let dead_parent = stand_in.id();
        stand_in.wait().expect("reap stand-in");

        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn child");
        let mut helper = Command::new("sh")
            .arg("-c")
            .arg(bootstrap_script())
            .env(WATCHDOG_PARENT_ENV, dead_parent.to_string())
            .env(WATCHDOG_CHILD_ENV, child.id().to_string())
            .spawn()
            .expect("spawn helper");

        helper.wait().expect("helper exits");
        let status = child.wait().expect("reap child");
        assert_eq!(status.signal(), Some(15));
    }
}
