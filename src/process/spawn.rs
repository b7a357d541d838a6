/*!
 * Child Spawning
 * The spawn collaborator: a stdio-inheriting child process with an optional
 * structured-message channel
 */

use super::types::{ExitDisposition, SpawnConfig};
use crate::core::types::Pid;
use crate::errors::{ForegroundError, ForegroundResult};
use crate::ipc::{self, IpcChannel};
use crate::signals::{delivery, Signal};
use log::{debug, info};
use std::io;
use std::os::fd::RawFd;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// A live reference to the spawned child.
///
/// Exposes signal sends, the optional IPC channel end, and termination as an
/// awaitable completion. The first observed termination is cached, so a
/// duplicate close notification is a no-op that yields the same disposition.
pub struct ChildHandle {
    pid: Pid,
    child: Child,
    ipc: Option<IpcChannel>,
    disposition: Option<ExitDisposition>,
}

impl ChildHandle {
    /// Spawn the child with the parent's three standard streams.
    pub fn spawn(config: &SpawnConfig) -> ForegroundResult<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }
        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }
        // The child runs in the parent's place, so it gets the parent's stdio.
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let wired = if config.ipc {
            Some(wire_ipc(&mut cmd).map_err(ForegroundError::Ipc)?)
        } else {
            None
        };

        let spawned = cmd.spawn().map_err(ForegroundError::Spawn);

        // Our copy of the child's channel end is dead weight once the child
        // holds it (or once the spawn failed).
        let ipc = match wired {
            Some((channel, child_fd)) => {
                unsafe { libc::close(child_fd) };
                Some(channel)
            }
            None => None,
        };

        let child = spawned?;
        let pid = child.id().unwrap_or(0);
        info!("Spawned child '{}' (pid {})", config.command, pid);

        Ok(Self {
            pid,
            child,
            ipc,
            disposition: None,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Send a signal to the child. Best-effort, like all signal delivery.
    pub fn signal(&self, sig: Signal) -> nix::Result<()> {
        delivery::send(self.pid, sig)
    }

    /// Take ownership of the parent-side end of the child's IPC channel.
    pub fn take_ipc(&mut self) -> Option<IpcChannel> {
        self.ipc.take()
    }

    /// Await child termination.
    ///
    /// Single-fire: the first completion is cached and any later observation
    /// returns the same disposition without touching the process again.
    pub async fn wait(&mut self) -> ForegroundResult<ExitDisposition> {
        if let Some(disposition) = self.disposition {
            debug!("Duplicate close notification for pid {} ignored", self.pid);
            return Ok(disposition);
        }

        let status = self.child.wait().await.map_err(ForegroundError::Wait)?;
        let disposition = ExitDisposition::from_status(status);
        info!(
            "Child {} closed (code: {:?}, signal: {:?})",
            self.pid, disposition.code, disposition.signal
        );
        self.disposition = Some(disposition);
        Ok(disposition)
    }
}

/// Create the child's channel end and arrange for it to appear at
/// `CHILD_IPC_FD` after exec. Returns the parent's end and the raw fd the
/// parent must close once the spawn is done.
fn wire_ipc(cmd: &mut Command) -> io::Result<(IpcChannel, RawFd)> {
    use std::os::fd::IntoRawFd;

    let (ours, theirs) = std::os::unix::net::UnixStream::pair()?;
    let child_fd = theirs.into_raw_fd();

    cmd.env(ipc::IPC_FD_ENV, ipc::CHILD_IPC_FD.to_string());
    // SAFETY: runs in the forked child before exec; dup2 and fcntl are
    // async-signal-safe, and `child_fd` stays open in the parent until after
    // spawn returns.
    unsafe {
        cmd.pre_exec(move || {
            if child_fd == ipc::CHILD_IPC_FD {
                // Already the right descriptor; just clear close-on-exec.
                let flags = libc::fcntl(child_fd, libc::F_GETFD);
                if flags < 0 || libc::fcntl(child_fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                    return Err(io::Error::last_os_error());
                }
            } else if libc::dup2(child_fd, ipc::CHILD_IPC_FD) < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let channel = IpcChannel::from_raw_fd(ours.into_raw_fd())?;
    Ok((channel, child_fd))
}
