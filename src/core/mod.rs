/*!
 * Core Module
 * Shared types used across the crate
 */

pub mod types;

pub use types::Pid;
