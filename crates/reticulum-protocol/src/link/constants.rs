//! Link protocol constants.

use std::time::Duration;

/// Size of one public key (X25519 or Ed25519).
pub const LINK_KEYSIZE: usize = 32;

/// Size of a link request payload: X25519 key followed by Ed25519 key.
pub const ECPUBSIZE: usize = 2 * LINK_KEYSIZE;

/// Length of the HKDF output that keys a link.
pub const DERIVED_KEY_SIZE: usize = 64;

pub const SIGNATURE_SIZE: usize = 64;

pub const LINK_ID_SIZE: usize = 16;

/// Proof frame: link id, signature, responder X25519 key.
pub const PROOF_SIZE: usize = LINK_ID_SIZE + SIGNATURE_SIZE + LINK_KEYSIZE;

/// Per-hop allowance for link establishment.
pub const ESTABLISHMENT_TIMEOUT_PER_HOP: Duration = Duration::from_secs(6);

/// Default keepalive interval.
pub const KEEPALIVE_DEFAULT: Duration = Duration::from_secs(360);

/// `stale_time = keepalive * STALE_FACTOR`.
pub const STALE_FACTOR: u32 = 2;

/// Time a stale link is kept before it is closed.
pub const STALE_GRACE: Duration = Duration::from_secs(5);

/// Shortest sleep the watchdog takes between checks.
pub const WATCHDOG_MIN_SLEEP: Duration = Duration::from_millis(25);
