/*!
 * Process Module
 * Child spawning, exit dispositions, and the watchdog helper
 */

mod spawn;
pub mod types;
pub mod watchdog;

// Re-export public API
pub use spawn::ChildHandle;
pub use types::{ExitDisposition, SpawnConfig};
pub use watchdog::Watchdog;
