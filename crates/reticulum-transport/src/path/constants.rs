//! Path table constants.

/// Default path expiration time (7 days in seconds).
pub const PATHFINDER_E: u64 = 60 * 60 * 24 * 7;

/// Access Point path time (24 hours in seconds).
pub const AP_PATH_TIME: u64 = 60 * 60 * 24;

/// Roaming path time (6 hours in seconds).
pub const ROAMING_PATH_TIME: u64 = 60 * 60 * 6;

/// Maximum random blobs stored per path entry.
pub const MAX_RANDOM_BLOBS: usize = 64;

/// Length of an announce random blob.
pub const RANDOM_BLOB_LEN: usize = 10;
