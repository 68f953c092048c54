//! pmufw - Platform power-management controller request core
//!
//! This is the request-processing core of the PMU firmware. It receives
//! power-management requests from the hardware masters over IPI, validates
//! them, drives the processor and power-domain state machines, tracks
//! master/slave requirements and acknowledges every request.
//!
//! The crate is `no_std` and allocation-free: all tables are fixed-size
//! and the platform (IPI transport, MMIO, reset lines, notifier delivery)
//! is reached through the traits in [`drivers`].

#![cfg_attr(not(test), no_std)]

// Core modules
pub mod utils;
pub mod config;

// Power-management engine
pub mod core;

// Platform collaborators
pub mod drivers;

// Re-export key types for convenience
pub use crate::config::{ConfigError, TopologyConfig};
pub use crate::core::api::{process_request, ApiId, PayloadError};
pub use crate::core::node::NodeId;
pub use crate::core::Topology;
pub use crate::drivers::Platform;

/// pmufw version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Status reported back to a master for a failed PM operation
///
/// Success is represented by `Ok(..)`; see [`status_word`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Generic failure
    Failure,
    /// Unrecognized API id
    InvalidVersion,
    /// Malformed or out-of-range argument
    InvalidParam,
    /// Node lacks the requested capability
    NoFeature,
    /// Event is illegal in the current state
    Internal,
    /// Blocked by a system-level transition
    Conflict,
    /// Permission or topology denies the request
    NoAccess,
    /// Node is not applicable to the request
    InvalidNode,
    /// Operation already in flight for the target
    DoubleRequest,
    /// Target aborted the requested suspend
    AbortSuspend,
}

/// Wire code for a successful operation
pub const STATUS_SUCCESS: u32 = 0;

impl Error {
    /// Wire code for this status
    pub const fn code(self) -> u32 {
        match self {
            Error::Failure => 1,
            Error::InvalidVersion => 4,
            Error::InvalidParam => 15,
            Error::NoFeature => 19,
            Error::Internal => 2000,
            Error::Conflict => 2001,
            Error::NoAccess => 2002,
            Error::InvalidNode => 2003,
            Error::DoubleRequest => 2004,
            Error::AbortSuspend => 2005,
        }
    }

    /// Decode a wire code, `None` for success or unknown codes
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Error::Failure),
            4 => Some(Error::InvalidVersion),
            15 => Some(Error::InvalidParam),
            19 => Some(Error::NoFeature),
            2000 => Some(Error::Internal),
            2001 => Some(Error::Conflict),
            2002 => Some(Error::NoAccess),
            2003 => Some(Error::InvalidNode),
            2004 => Some(Error::DoubleRequest),
            2005 => Some(Error::AbortSuspend),
            _ => None,
        }
    }

    /// Get error message
    pub fn as_str(self) -> &'static str {
        match self {
            Error::Failure => "Failure",
            Error::InvalidVersion => "Invalid version",
            Error::InvalidParam => "Invalid parameter",
            Error::NoFeature => "No feature",
            Error::Internal => "Internal",
            Error::Conflict => "Conflict",
            Error::NoAccess => "No access",
            Error::InvalidNode => "Invalid node",
            Error::DoubleRequest => "Double request",
            Error::AbortSuspend => "Suspend aborted",
        }
    }
}

impl ::core::fmt::Display for Error {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;

/// Convert an operation result into the status word placed in a reply
pub fn status_word<T>(result: &Result<T>) -> u32 {
    match result {
        Ok(_) => STATUS_SUCCESS,
        Err(err) => err.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_round_trip() {
        let all = [
            Error::Failure,
            Error::InvalidVersion,
            Error::InvalidParam,
            Error::NoFeature,
            Error::Internal,
            Error::Conflict,
            Error::NoAccess,
            Error::InvalidNode,
            Error::DoubleRequest,
            Error::AbortSuspend,
        ];
        for err in all {
            assert_eq!(Error::from_code(err.code()), Some(err));
        }
        assert_eq!(Error::from_code(STATUS_SUCCESS), None);
    }

    #[test]
    fn test_status_word() {
        assert_eq!(status_word(&Ok::<(), Error>(())), 0);
        assert_eq!(status_word::<u32>(&Err(Error::Conflict)), 2001);
    }
}
