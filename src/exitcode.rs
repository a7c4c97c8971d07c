//! Standard exit codes (BSD sysexits.h compatible)

/// Successful termination
pub const OK: i32 = 0;

/// Command line usage error (also malformed queries)
pub const USAGE: i32 = 64;

/// Data format error: unreadable document or invalid tree
pub const DATAERR: i32 = 65;

/// Cannot open input: missing document, include or resource
pub const NOINPUT: i32 = 66;

/// Service unavailable: vault command failed
pub const UNAVAILABLE: i32 = 69;

/// Internal software error
pub const SOFTWARE: i32 = 70;

/// Input/output error
pub const IOERR: i32 = 74;

/// Permission denied: vault passcode or decryption faults
pub const NOPERM: i32 = 77;

/// Configuration error
pub const CONFIG: i32 = 78;
