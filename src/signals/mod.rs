/*!
 * Signals Module
 * Signal catalog, delivery, and parent-to-child forwarding
 */

pub mod delivery;
mod proxy;
pub mod types;

// Re-export public API
pub use proxy::SignalProxy;
pub use types::Signal;
