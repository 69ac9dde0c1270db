//! BLAKE2b generic hashing.

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

use crate::types::Hash;

/// BLAKE2b with a caller-chosen output width, fed from several parts.
pub fn blake2b<const N: usize>(parts: &[&[u8]]) -> [u8; N] {
    let mut hasher = Blake2bVar::new(N).expect("BLAKE2b output size out of range");
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; N];
    hasher
        .finalize_variable(&mut out)
        .expect("BLAKE2b output size mismatch");
    out
}

/// BLAKE2b-256 of a single buffer.
pub fn generic_hash(data: &[u8]) -> Hash {
    Hash::new(blake2b::<32>(&[data]))
}
