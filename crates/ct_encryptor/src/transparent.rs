//! Transparent-session key derivation (v9/v10/v11).
//!
//! Every ciphertext of a session carries a random `subkeySeed`; its actual
//! encryption key is `BLAKE2b-32(sessionKey || subkeySeed)`. One key
//! publish addressing the session id therefore unlocks every resource
//! derived from that session, while distinct seeds keep per-resource keys
//! independent.

use ct_crypto::{blake2b, AeadIv, SimpleResourceId, SubkeySeed, SymmetricKey};

pub fn derive_subkey(session_key: &SymmetricKey, subkey_seed: &SubkeySeed) -> SymmetricKey {
    SymmetricKey::new(blake2b::<32>(&[session_key.as_ref(), subkey_seed.as_ref()]))
}

/// IV of the single-shot transparent formats and base IV of the streaming
/// one: the session id followed by zeros.
pub fn transparent_session_iv(session_id: &SimpleResourceId) -> AeadIv {
    let mut iv = [0u8; AeadIv::SIZE];
    iv[..SimpleResourceId::SIZE].copy_from_slice(session_id.as_ref());
    AeadIv::new(iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subkeys_differ_per_seed() {
        let session_key = SymmetricKey::random();
        let a = derive_subkey(&session_key, &SubkeySeed::random());
        let b = derive_subkey(&session_key, &SubkeySeed::random());
        assert_ne!(a, b);
    }

    #[test]
    fn subkey_is_deterministic() {
        let session_key = SymmetricKey::new([2u8; 32]);
        let seed = SubkeySeed::new([3u8; 16]);
        assert_eq!(
            derive_subkey(&session_key, &seed),
            derive_subkey(&session_key, &seed)
        );
    }

    #[test]
    fn iv_is_session_id_zero_extended() {
        let session_id = SimpleResourceId::new([1u8; 16]);
        let iv = transparent_session_iv(&session_id);
        assert_eq!(&iv.as_bytes()[..16], &[1u8; 16]);
        assert_eq!(&iv.as_bytes()[16..], &[0u8; 8]);
    }
}
