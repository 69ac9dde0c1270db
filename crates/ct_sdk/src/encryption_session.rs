//! Caller-scoped encryption sessions.
//!
//! All encryptions under one session share the `(sessionId, sessionKey)`
//! pair, so a single key publish grants access to every resource the
//! session ever produces.

use std::sync::atomic::{AtomicU64, Ordering};

use ct_crypto::{Padding, ResourceId, SimpleResourceId, SymmetricKey};

use crate::error::Result;

pub struct EncryptionSession {
    session_id: SimpleResourceId,
    session_key: SymmetricKey,
    padding: Padding,
    issued_subkeys: AtomicU64,
}

impl EncryptionSession {
    pub(crate) fn new(padding: Padding) -> Self {
        Self {
            session_id: SimpleResourceId::random(),
            session_key: ct_crypto::make_symmetric_key(),
            padding,
            issued_subkeys: AtomicU64::new(0),
        }
    }

    pub fn session_id(&self) -> SimpleResourceId {
        self.session_id
    }

    pub(crate) fn session_key(&self) -> SymmetricKey {
        self.session_key
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Number of per-resource subkeys handed out so far.
    pub fn issued_subkeys(&self) -> u64 {
        self.issued_subkeys.load(Ordering::Relaxed)
    }

    /// Encrypt under this session. The ciphertext carries the session id,
    /// so the session's key publish is all a recipient needs.
    pub async fn encrypt(&self, clear_data: &[u8]) -> Result<Vec<u8>> {
        let (encrypted, _) = ct_encryptor::encrypt(
            clear_data,
            self.padding,
            &self.session_id,
            &self.session_key,
        )
        .await?;
        self.issued_subkeys.fetch_add(1, Ordering::Relaxed);
        Ok(encrypted)
    }

    /// The composite resource id of a ciphertext produced by this session.
    pub fn resource_id_of(&self, encrypted_data: &[u8]) -> Result<ResourceId> {
        Ok(ct_encryptor::extract_resource_id(encrypted_data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ciphertexts_share_the_session_id() {
        let session = EncryptionSession::new(Padding::Off);
        let a = session.encrypt(b"one").await.unwrap();
        let b = session.encrypt(b"two").await.unwrap();
        let ResourceId::Composite(id_a) = session.resource_id_of(&a).unwrap() else {
            panic!("expected composite id");
        };
        let ResourceId::Composite(id_b) = session.resource_id_of(&b).unwrap() else {
            panic!("expected composite id");
        };
        assert_eq!(id_a.session_id(), session.session_id());
        assert_eq!(id_b.session_id(), session.session_id());
        assert_ne!(id_a.subkey_seed(), id_b.subkey_seed());
        assert_eq!(session.issued_subkeys(), 2);
    }

    #[tokio::test]
    async fn session_key_decrypts_every_ciphertext() {
        let session = EncryptionSession::new(Padding::Off);
        let encrypted = session.encrypt(b"shared secret").await.unwrap();
        let clear = ct_encryptor::decrypt_with_key(&session.session_key(), &encrypted)
            .await
            .unwrap();
        assert_eq!(clear, b"shared secret");
    }

    #[tokio::test]
    async fn padded_sessions_produce_v10() {
        let session = EncryptionSession::new(Padding::Auto);
        let encrypted = session.encrypt(b"pad me").await.unwrap();
        assert_eq!(encrypted[0], 10);
    }
}
