//! Cryptographic primitives for the Cachet SDK.
//!
//! A thin, panic-free facade: XChaCha20-Poly1305 AEAD, Curve25519 box and
//! seal, Ed25519 detached signatures, BLAKE2b hashing, CSPRNG access, and
//! the fixed-width byte types every other crate builds on.

mod aead;
mod asymmetric;
mod error;
mod hash;
mod padding;
mod random;
mod resource_id;
mod sign;
mod types;

pub use aead::{
    aead_decrypt, aead_encrypt, decrypted_size, derive_iv, encrypted_size, extract_mac,
};
pub use asymmetric::{
    box_decrypt, box_encrypt, encryption_key_pair_from_private, make_encryption_key_pair,
    seal_decrypt, seal_encrypt, BOX_OVERHEAD, SEAL_OVERHEAD,
};
pub use error::CryptoError;
pub use hash::{blake2b, generic_hash};
pub use padding::{pad_clear_data, padded_from_clear_size, unpadded_size, Padding};
pub use random::random_fill;
pub use resource_id::{CompositeResourceId, ResourceId, SimpleResourceId};
pub use sign::{make_signature_key_pair, sign, signature_key_pair_from_private, verify};
pub use types::{
    AeadIv, EncryptionKeyPair, Hash, Mac, PrivateEncryptionKey, PrivateSignatureKey,
    PublicEncryptionKey, PublicSignatureKey, SealedPrivateEncryptionKey,
    SealedPrivateEncryptionKeys, SealedPrivateSignatureKey, SealedSymmetricKey, Signature,
    SignatureKeyPair, SubkeySeed, SymmetricKey, TwoTimesSealedPrivateEncryptionKey,
    TwoTimesSealedSymmetricKey,
};

/// Generate a fresh random symmetric key.
pub fn make_symmetric_key() -> SymmetricKey {
    SymmetricKey::random()
}
