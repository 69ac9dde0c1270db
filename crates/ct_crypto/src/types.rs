//! Fixed-width byte types.
//!
//! Every cryptographic value on the wire has a fixed size; constructors
//! validate length so a mis-sized buffer can never masquerade as a key.
//! All types are plain value types: hex `Debug`, zero `Default`, ordered so
//! they can key maps and be sorted for duplicate detection.

/// Declare a fixed-width byte newtype with size-checked construction.
/// Exported so the protocol crate can declare its ids the same way.
#[macro_export]
macro_rules! bytes_type {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $size]);

        impl $name {
            pub const SIZE: usize = $size;

            pub fn new(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(slice: &[u8]) -> Result<Self, $crate::CryptoError> {
                let bytes: [u8; $size] =
                    slice.try_into().map_err(|_| $crate::CryptoError::InvalidBufferSize {
                        name: stringify!($name),
                        expected: $size,
                        actual: slice.len(),
                    })?;
                Ok(Self(bytes))
            }

            /// Fill from the process CSPRNG.
            pub fn random() -> Self {
                let mut bytes = [0u8; $size];
                $crate::random_fill(&mut bytes);
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }

            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            /// All-zero values mark absent fields in legacy wire layouts.
            pub fn is_null(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $size])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = $crate::CryptoError;

            fn try_from(slice: &[u8]) -> Result<Self, $crate::CryptoError> {
                Self::from_slice(slice)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

bytes_type!(
    /// BLAKE2b-256 digest.
    Hash, 32
);
bytes_type!(
    /// Ed25519 public key.
    PublicSignatureKey, 32
);
bytes_type!(
    /// Ed25519 keypair bytes (seed || public), libsodium layout.
    PrivateSignatureKey, 64
);
bytes_type!(
    /// Detached Ed25519 signature.
    Signature, 64
);
bytes_type!(
    /// X25519 public key.
    PublicEncryptionKey, 32
);
bytes_type!(
    /// X25519 secret scalar.
    PrivateEncryptionKey, 32
);
bytes_type!(
    /// XChaCha20-Poly1305 key.
    SymmetricKey, 32
);
bytes_type!(
    /// Poly1305 authentication tag.
    Mac, 16
);
bytes_type!(
    /// XChaCha20 nonce.
    AeadIv, 24
);
bytes_type!(
    /// Seed hashed with a session key to derive a per-resource subkey.
    SubkeySeed, 16
);
bytes_type!(
    /// `seal(PrivateEncryptionKey)`: 32 + seal overhead.
    SealedPrivateEncryptionKey, 80
);
bytes_type!(
    /// `seal(PrivateSignatureKey)`: 64 + seal overhead.
    SealedPrivateSignatureKey, 112
);
bytes_type!(
    /// `seal(SymmetricKey)`: 32 + seal overhead.
    SealedSymmetricKey, 80
);
bytes_type!(
    /// `seal(seal(SymmetricKey))`: sealed once per provisional half.
    TwoTimesSealedSymmetricKey, 128
);
bytes_type!(
    /// `seal(seal(PrivateEncryptionKey))`: sealed once per provisional half.
    TwoTimesSealedPrivateEncryptionKey, 128
);
bytes_type!(
    /// Two private encryption keys (app || service) sealed together.
    SealedPrivateEncryptionKeys, 112
);

// Secret material supports explicit wiping; holders decide when a copy's
// lifetime ends.
macro_rules! zeroize_impl {
    ($($name:ident),* $(,)?) => {
        $(impl zeroize::Zeroize for $name {
            fn zeroize(&mut self) {
                self.0.zeroize();
            }
        })*
    };
}

zeroize_impl!(PrivateSignatureKey, PrivateEncryptionKey, SymmetricKey);

/// Ed25519 key pair. The private half is the 64-byte keypair encoding so
/// signing never needs the public half alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureKeyPair {
    pub public_key: PublicSignatureKey,
    pub private_key: PrivateSignatureKey,
}

/// X25519 key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKeyPair {
    pub public_key: PublicEncryptionKey,
    pub private_key: PrivateEncryptionKey,
}
