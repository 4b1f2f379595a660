//! Crate-wide error taxonomy.
//!
//! Each variant is local to one subsystem and is handled at the point it's
//! raised (logged, sometimes triggering a state transition); nothing here
//! is meant to unwind past the autoscaler tick or a Control API handler.

use std::fmt;
use std::io;

pub type Result<T> = ::std::result::Result<T, SupervisorError>;

#[derive(Debug)]
pub enum SupervisorError {
    /// Instance Driver failed to bring an instance up. Local to `scale_up`:
    /// the caller aborts without mutating membership.
    Launch { name: String, cause: io::Error },

    /// Instance Driver failed to stop/remove an instance. Cleanup is
    /// best-effort; this is logged, never propagated.
    Driver { name: String, cause: io::Error },

    /// A controller's `/role` POST was rejected (404) or timed out. Local
    /// to one (switch, controller) pair within a redistribution round; the
    /// round continues.
    RoleRejected { controller: String, switch: String },

    /// A startup-time configuration invariant was violated. Fatal: the
    /// process refuses to start.
    Config(String),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::Launch { name, cause } => {
                write!(f, "failed to launch instance {}: {}", name, cause)
            }
            SupervisorError::Driver { name, cause } => {
                write!(f, "failed to stop instance {}: {}", name, cause)
            }
            SupervisorError::RoleRejected { controller, switch } => {
                write!(f, "role post rejected: controller {} switch {}", controller, switch)
            }
            SupervisorError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::Launch { cause, .. } => Some(cause),
            SupervisorError::Driver { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl From<io::Error> for SupervisorError {
    fn from(e: io::Error) -> SupervisorError {
        SupervisorError::Config(e.to_string())
    }
}
