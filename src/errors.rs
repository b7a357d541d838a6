/*!
 * Error Types
 * Crate-level error enum and result alias
 */

use std::io;
use thiserror::Error;

/// Foreground operation result
pub type ForegroundResult<T> = Result<T, ForegroundError>;

/// Foreground errors
///
/// Only failures that leave no child to emulate are surfaced here; degraded
/// conditions (unsupported signals, failed best-effort sends, a watchdog
/// that would not spawn) are logged and absorbed.
#[derive(Error, Debug)]
pub enum ForegroundError {
    #[error("failed to spawn child process: {0}")]
    Spawn(io::Error),

    #[error("failed to establish IPC channel: {0}")]
    Ipc(io::Error),

    #[error("failed to wait for child process: {0}")]
    Wait(io::Error),
}
