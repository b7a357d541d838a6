/*!
 * Foreground
 * Foreground-process semantics for a spawned child: the child gets the
 * parent's stdio, every signal delivered to the parent is forwarded to the
 * child, a detached watchdog reaps the child if the parent is killed
 * uncatchably, and when the child terminates the parent terminates the same
 * way unless a cleanup callback overrides or vetoes it.
 *
 * Unix only; signal semantics are POSIX.
 */

pub mod core;
pub mod errors;
pub mod foreground;
pub mod ipc;
pub mod process;
pub mod signals;

// Re-exports
pub use errors::{ForegroundError, ForegroundResult};
pub use foreground::{run, CleanupContext, CleanupFn, CleanupOutcome, ForegroundConfig};
pub use process::{ChildHandle, ExitDisposition, SpawnConfig, Watchdog};
pub use signals::{Signal, SignalProxy};
