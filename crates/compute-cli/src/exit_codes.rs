//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - the request was rejected before anything changed
pub const VALIDATION_ERROR: i32 = 2;

/// Not found - the container or key does not exist for this user
pub const NOT_FOUND: i32 = 3;

/// Limit exceeded - the per-user cap for the resource is reached
pub const LIMIT_EXCEEDED: i32 = 4;

/// IO error - configuration or database file problems
pub const IO_ERROR: i32 = 5;

/// Authentication error - the API key is not recognized
pub const AUTH_ERROR: i32 = 6;

/// Upstream error - the cluster or record store failed
pub const UPSTREAM_ERROR: i32 = 7;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
