//! Exit codes for the CLI.
//!
//! These follow common Unix conventions and provide meaningful
//! status information for scripting and automation.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments)
pub const USAGE_ERROR: u8 = 2;

/// The quota backend reported a failure
pub const BACKEND_ERROR: u8 = 3;

/// The backend refused the operation for lack of privileges
pub const NOT_PRIVILEGED: u8 = 4;

/// The backend or its mount cursor is held by someone else
pub const BUSY: u8 = 5;
