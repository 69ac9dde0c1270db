//! Process-wide CSPRNG access.

use rand::rngs::OsRng;
use rand::RngCore;

/// Overwrite `buf` with cryptographically secure random bytes.
pub fn random_fill(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}
