/*!
 * Signal Delivery
 * Best-effort signal sends and liveness probes at the nix boundary
 */

use super::types::Signal;
use crate::core::types::Pid;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::Pid as NixPid;

/// Send `sig` to `pid`.
///
/// Returns the nix error on failure; callers treat delivery as best-effort
/// and decide whether a failure is worth more than a debug log.
pub fn send(pid: Pid, sig: Signal) -> nix::Result<()> {
    let nsig = NixSignal::try_from(sig.number() as i32)?;
    kill(NixPid::from_raw(pid as i32), nsig)
}

/// Signal-0 liveness probe.
///
/// EPERM still proves the process exists; only ESRCH (or any other failure)
/// counts as gone.
pub fn alive(pid: Pid) -> bool {
    match kill(NixPid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
