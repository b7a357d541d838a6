/*!
 * Core Types
 * Common types shared across the crate
 */

/// Process ID type
///
/// Unsigned, matching what `std::process::Child::id` hands out; converted at
/// the nix boundary where a signed pid is required.
pub type Pid = u32;
