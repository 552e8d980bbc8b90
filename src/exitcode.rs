//! Standard exit codes (BSD sysexits.h compatible)

/// Successful termination
pub const OK: i32 = 0;

/// Command line usage error
pub const USAGE: i32 = 64;

/// Data format error (bad value, constraint, collision)
pub const DATAERR: i32 = 65;

/// Cannot open input (unknown tree, node or name)
pub const NOINPUT: i32 = 66;

/// Internal software error
pub const SOFTWARE: i32 = 70;

/// Input/output error
pub const IOERR: i32 = 74;

/// Operation not allowed in the tree's current state
pub const NOPERM: i32 = 77;

/// Configuration error
pub const CONFIG: i32 = 78;
