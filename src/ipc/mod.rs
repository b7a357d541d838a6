/*!
 * IPC Module
 * Structured-message channel between parent and child, and the relay that
 * pumps messages across both when the parent itself was launched with one
 */

use log::{debug, warn};
use serde_json::Value;
use std::io;
use std::os::fd::RawFd;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

/// Environment variable naming the inherited channel descriptor.
pub const IPC_FD_ENV: &str = "FOREGROUND_IPC_FD";

/// Descriptor number the child's channel end is mapped to.
pub const CHILD_IPC_FD: RawFd = 3;

/// Receiving half of a channel: newline-delimited JSON frames.
pub struct IpcReceiver {
    reader: BufReader<OwnedReadHalf>,
}

impl IpcReceiver {
    /// Receive the next message; `None` once the peer closes.
    ///
    /// Malformed frames are discarded, not surfaced: the channel stays usable.
    pub async fn recv(&mut self) -> io::Result<Option<Value>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(None);
            }
            match serde_json::from_str(line.trim_end()) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => debug!("Discarding malformed IPC frame: {}", e),
            }
        }
    }
}

/// Sending half of a channel.
pub struct IpcSender {
    writer: OwnedWriteHalf,
}

impl IpcSender {
    pub async fn send(&mut self, msg: &Value) -> io::Result<()> {
        let mut frame = serde_json::to_vec(msg)?;
        frame.push(b'\n');
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }
}

/// A bidirectional structured-message channel.
pub struct IpcChannel {
    rx: IpcReceiver,
    tx: IpcSender,
}

impl IpcChannel {
    fn from_stream(stream: UnixStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            rx: IpcReceiver {
                reader: BufReader::new(read),
            },
            tx: IpcSender { writer: write },
        }
    }

    /// Claim the channel this process was launched with, if any.
    ///
    /// Detected via `FOREGROUND_IPC_FD`; the env var is removed once claimed
    /// so the descriptor cannot be adopted twice. An unparseable value is a
    /// degraded launch environment, not an error: logged and treated as no
    /// channel.
    pub fn from_env() -> io::Result<Option<Self>> {
        let raw = match std::env::var(IPC_FD_ENV) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        std::env::remove_var(IPC_FD_ENV);

        let fd: RawFd = match raw.parse() {
            Ok(fd) => fd,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}", IPC_FD_ENV, raw);
                return Ok(None);
            }
        };
        Ok(Some(Self::from_raw_fd(fd)?))
    }

    /// Adopt an inherited descriptor as a channel.
    ///
    /// SAFETY: the descriptor was advertised to us by our launcher for
    /// exactly this purpose and is owned by no other handle in this process.
    pub(crate) fn from_raw_fd(fd: RawFd) -> io::Result<Self> {
        use std::os::fd::FromRawFd;

        let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
        std_stream.set_nonblocking(true)?;
        let stream = UnixStream::from_std(std_stream)?;
        Ok(Self::from_stream(stream))
    }

    /// A connected channel pair within this process.
    pub fn pair() -> io::Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::from_stream(a), Self::from_stream(b)))
    }

    pub fn split(self) -> (IpcReceiver, IpcSender) {
        (self.rx, self.tx)
    }

    pub async fn send(&mut self, msg: &Value) -> io::Result<()> {
        self.tx.send(msg).await
    }

    pub async fn recv(&mut self) -> io::Result<Option<Value>> {
        self.rx.recv().await
    }
}

/// Handle on the two pump tasks of a running relay.
pub struct Relay {
    to_child: JoinHandle<()>,
    to_parent: JoinHandle<()>,
}

impl Relay {
    /// Stop both pumps. Idempotent: aborting a finished task is a no-op.
    pub fn shutdown(&self) {
        self.to_child.abort();
        self.to_parent.abort();
        debug!("IPC relay shut down");
    }
}

/// Install the bidirectional message relay.
///
/// The relay takes ownership of both channels, so no other listener in this
/// process can observe (or double-handle) relayed messages for its lifetime.
/// Each direction stops on peer close or send failure.
pub fn relay(parent: IpcChannel, child: IpcChannel) -> Relay {
    let (mut parent_rx, mut parent_tx) = parent.split();
    let (mut child_rx, mut child_tx) = child.split();

    let to_child = tokio::spawn(async move {
        while let Ok(Some(msg)) = parent_rx.recv().await {
            if child_tx.send(&msg).await.is_err() {
                break;
            }
        }
        debug!("Parent-to-child relay finished");
    });
    let to_parent = tokio::spawn(async move {
        while let Ok(Some(msg)) = child_rx.recv().await {
            if parent_tx.send(&msg).await.is_err() {
                break;
            }
        }
        debug!("Child-to-parent relay finished");
    });

    Relay {
        to_child,
        to_parent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_recv_round_trip() {
        let (mut a, mut b) = IpcChannel::pair().expect("channel pair");
        a.send(&json!({"op": "ping", "seq": 1})).await.expect("send");
        let msg = b.recv().await.expect("recv").expect("open");
        assert_eq!(msg["op"], "ping");
        assert_eq!(msg["seq"], 1);
    }

    #[tokio::test]
    async fn test_recv_none_on_close() {
        let (a, mut b) = IpcChannel::pair().expect("channel pair");
        drop(a);
        assert!(b.recv().await.expect("recv").is_none());
    }

    #[tokio::test]
    async fn test_malformed_frames_discarded() {
        let (a, mut b) = IpcChannel::pair().expect("channel pair");
        let (_rx, mut tx) = a.split();
        tx.writer
            .write_all(b"not json\n{\"ok\":true}\n")
            .await
            .expect("write frames");
        let msg = b.recv().await.expect("recv").expect("open");
        assert_eq!(msg["ok"], true);
    }

    #[tokio::test]
    async fn test_relay_forwards_both_directions() {
        let (parent_far, parent_near) = IpcChannel::pair().expect("parent pair");
        let (child_far, child_near) = IpcChannel::pair().expect("child pair");
        let relay = relay(parent_near, child_near);

        let (mut parent_rx, mut parent_tx) = parent_far.split();
        let (mut child_rx, mut child_tx) = child_far.split();

        parent_tx.send(&json!({"dir": "down"})).await.expect("send down");
        let down = child_rx.recv().await.expect("recv down").expect("open");
        assert_eq!(down["dir"], "down");

        child_tx.send(&json!({"dir": "up"})).await.expect("send up");
        let up = parent_rx.recv().await.expect("recv up").expect("open");
        assert_eq!(up["dir"], "up");

        relay.shutdown();
        relay.shutdown();
    }
}
