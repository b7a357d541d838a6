/*!
 * Process Types
 * Spawn configuration and exit dispositions
 */

use crate::signals::Signal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitStatus;

/// How a process terminated, or how the parent should terminate.
///
/// Exactly one of `code`/`signal` is meaningful at a time: a process exits
/// either with a numeric code or because of a signal, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitDisposition {
    pub code: Option<i32>,
    pub signal: Option<Signal>,
}

impl ExitDisposition {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_signal(signal: Signal) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Map an OS exit status to a disposition.
    ///
    /// A terminating signal outside the catalog collapses to the POSIX
    /// `128 + signo` convention; a status with neither code nor signal is an
    /// unknown termination reason and maps to code 1.
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        if let Some(code) = status.code() {
            Self::from_code(code)
        } else if let Some(signo) = status.signal() {
            match Signal::from_number(signo as u32) {
                Some(sig) => Self::from_signal(sig),
                None => Self::from_code(128 + signo),
            }
        } else {
            Self::from_code(1)
        }
    }

    /// Numeric code suitable for `std::process::exit`: the code if present,
    /// `128 + signo` for a signal, 0 when neither is set.
    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self.code {
            code
        } else if let Some(sig) = self.signal {
            128 + sig.number() as i32
        } else {
            0
        }
    }
}

/// Configuration for spawning the child.
///
/// One explicit structure with named fields; shape detection happens nowhere
/// because there is exactly one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env_vars: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    /// Establish a structured-message channel on the child's side.
    pub ipc: bool,
}

impl SpawnConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env_vars: Vec::new(),
            working_dir: None,
            ipc: false,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_ipc(mut self, ipc: bool) -> Self {
        self.ipc = ipc;
        self
    }
}
