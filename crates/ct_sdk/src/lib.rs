//! Cachet: an SDK for end-to-end encrypted data sharing among users and
//! groups within a trustchain.
//!
//! A client identifies itself by a cryptographic identity, registers and
//! verifies devices, derives per-user key pairs, and exchanges encrypted
//! resources with other users, groups, and not-yet-registered recipients.
//! Integrity rests on a signed append-only log of actions that every
//! client verifies independently before trusting derived keys.

mod block_generator;
mod coalescer;
mod encryption_session;
mod error;
pub mod identity;
mod local_user;
mod provisional;
mod resource_keys;
mod session;
mod share;
mod streams;
mod transport;
mod verification;

pub mod groups;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

pub use block_generator::BlockGenerator;
pub use coalescer::TaskCoalescer;
pub use encryption_session::EncryptionSession;
pub use error::{Error, ErrorKind, Result};
pub use local_user::LocalUser;
pub use provisional::ProvisionalUser;
pub use session::{
    AttachResult, EncryptionOptions, Session, SharingOptions, Status,
};
pub use share::{KeyRecipients, SHARE_LIMIT};
pub use transport::{
    error_kind_for_code, is_unrecoverable_code, sign_challenge, Backend, ServerError,
    ServiceProvisionalKeys, ShareActions, UserRegistration, CHALLENGE_PREFIX,
};
pub use verification::{GhostDevice, Verification, VerificationRequest};

// Re-exported building blocks callers interact with directly.
pub use ct_crypto::{Padding, ResourceId};
pub use ct_proto::GroupId;

#[cfg(test)]
mod scenarios {
    //! End-to-end flows against the in-memory server.

    use std::sync::Arc;

    use crate::identity::{
        public_identity_of, serialize_public_identity, serialize_secret_provisional_identity,
    };
    use crate::test_support::FakeServer;
    use crate::*;
    use ct_store::MemoryDatastore;

    async fn ready_session(server: &Arc<FakeServer>) -> (Session, String) {
        let (identity_string, identity) = server.mint_identity();
        let mut session = Session::start(
            &identity_string,
            server.clone(),
            Arc::new(MemoryDatastore::new()),
        )
        .await
        .unwrap();
        assert_eq!(session.status(), Status::IdentityRegistrationNeeded);
        session
            .register_identity(&Verification::Passphrase("correct horse".into()))
            .await
            .unwrap();
        assert_eq!(session.status(), Status::Ready);
        let public_identity = serialize_public_identity(&public_identity_of(&identity));
        (session, public_identity)
    }

    #[tokio::test]
    async fn register_encrypt_decrypt_roundtrip() {
        let server = Arc::new(FakeServer::new());
        let (session, _) = ready_session(&server).await;

        let encrypted = session
            .encrypt(b"very secret data", &EncryptionOptions::default())
            .await
            .unwrap();
        assert_eq!(session.decrypt(&encrypted).await.unwrap(), b"very secret data");
    }

    #[tokio::test]
    async fn decrypt_works_from_the_key_publish_alone() {
        let server = Arc::new(FakeServer::new());
        let (alice, _) = ready_session(&server).await;
        let (bob, bob_public) = ready_session(&server).await;

        let options = EncryptionOptions {
            sharing: SharingOptions {
                share_with_users: vec![bob_public],
                share_with_groups: vec![],
            },
            padding: Padding::Off,
        };
        let encrypted = alice.encrypt(b"for bob", &options).await.unwrap();
        // Bob's cache is empty; the key arrives via the key publish.
        assert_eq!(bob.decrypt(&encrypted).await.unwrap(), b"for bob");
    }

    #[tokio::test]
    async fn sharing_with_an_unknown_user_is_an_invalid_argument() {
        let server = Arc::new(FakeServer::new());
        let (alice, _) = ready_session(&server).await;
        let (_, ghost_identity) = server.mint_identity(); // never registered
        let unknown_public =
            serialize_public_identity(&public_identity_of(&ghost_identity));

        let options = EncryptionOptions {
            sharing: SharingOptions {
                share_with_users: vec![unknown_public],
                share_with_groups: vec![],
            },
            padding: Padding::Off,
        };
        let error = alice.encrypt(b"data", &options).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn group_sharing_reaches_members_added_later() {
        let server = Arc::new(FakeServer::new());
        let (alice, alice_public) = ready_session(&server).await;
        let (bob, bob_public) = ready_session(&server).await;

        // Alice creates a group with only herself.
        let group_id = alice
            .create_group(&SharingOptions {
                share_with_users: vec![alice_public],
                share_with_groups: vec![],
            })
            .await
            .unwrap();

        // She encrypts to the group, then adds Bob.
        let options = EncryptionOptions {
            sharing: SharingOptions {
                share_with_users: vec![],
                share_with_groups: vec![group_id],
            },
            padding: Padding::Off,
        };
        let encrypted = alice.encrypt(b"group news", &options).await.unwrap();

        alice
            .update_group_members(
                &group_id,
                &SharingOptions {
                    share_with_users: vec![bob_public],
                    share_with_groups: vec![],
                },
            )
            .await
            .unwrap();

        // Bob resolves the group key lazily on first decrypt.
        assert_eq!(bob.decrypt(&encrypted).await.unwrap(), b"group news");
    }

    #[tokio::test]
    async fn non_members_cannot_update_a_group() {
        let server = Arc::new(FakeServer::new());
        let (alice, alice_public) = ready_session(&server).await;
        let (bob, bob_public) = ready_session(&server).await;

        let group_id = alice
            .create_group(&SharingOptions {
                share_with_users: vec![alice_public],
                share_with_groups: vec![],
            })
            .await
            .unwrap();

        let error = bob
            .update_group_members(
                &group_id,
                &SharingOptions {
                    share_with_users: vec![bob_public],
                    share_with_groups: vec![],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn provisional_identity_attach_and_claim() {
        let server = Arc::new(FakeServer::new());
        let (alice, _) = ready_session(&server).await;

        // Alice shares with an email that has no account yet.
        let provisional = server.mint_provisional_identity("bob@example.com");
        let provisional_public =
            serialize_public_identity(&identity::public_provisional_identity_of(&provisional));
        let options = EncryptionOptions {
            sharing: SharingOptions {
                share_with_users: vec![provisional_public],
                share_with_groups: vec![],
            },
            padding: Padding::Off,
        };
        let encrypted = alice.encrypt(b"welcome bob", &options).await.unwrap();

        // Bob signs up later and claims the provisional identity.
        let (bob, _) = ready_session(&server).await;
        let attach = bob
            .attach_provisional_identity(&serialize_secret_provisional_identity(&provisional))
            .await
            .unwrap();
        assert_eq!(attach.status, Status::IdentityVerificationNeeded);
        assert_eq!(attach.verification_target.as_deref(), Some("bob@example.com"));
        bob.verify_provisional_identity(&Verification::EmailVerificationCode {
            email: "bob@example.com".into(),
            code: "12345678".into(),
        })
        .await
        .unwrap();

        assert_eq!(bob.decrypt(&encrypted).await.unwrap(), b"welcome bob");
    }

    #[tokio::test]
    async fn attaching_an_already_claimed_identity_is_ready() {
        let server = Arc::new(FakeServer::new());
        let (bob, _) = ready_session(&server).await;
        let provisional = server.mint_provisional_identity("bob@example.com");
        let provisional_string = serialize_secret_provisional_identity(&provisional);

        let attach = bob.attach_provisional_identity(&provisional_string).await.unwrap();
        assert_eq!(attach.status, Status::IdentityVerificationNeeded);
        bob.verify_provisional_identity(&Verification::EmailVerificationCode {
            email: "bob@example.com".into(),
            code: "12345678".into(),
        })
        .await
        .unwrap();

        let again = bob.attach_provisional_identity(&provisional_string).await.unwrap();
        assert_eq!(again.status, Status::Ready);
        assert_eq!(again.verification_target, None);
    }

    #[tokio::test]
    async fn encryption_sessions_share_one_key_publish() {
        let server = Arc::new(FakeServer::new());
        let (alice, _) = ready_session(&server).await;
        let (bob, bob_public) = ready_session(&server).await;

        let encryption_session = alice
            .create_encryption_session(&EncryptionOptions {
                sharing: SharingOptions {
                    share_with_users: vec![bob_public],
                    share_with_groups: vec![],
                },
                padding: Padding::Off,
            })
            .await
            .unwrap();

        // Several resources, one session: Bob can open them all.
        for message in [&b"first"[..], b"second", b"third"] {
            let encrypted = encryption_session.encrypt(message).await.unwrap();
            assert_eq!(bob.decrypt(&encrypted).await.unwrap(), message);
        }
        assert_eq!(encryption_session.issued_subkeys(), 3);
    }

    #[tokio::test]
    async fn second_session_restores_from_the_local_store() {
        let server = Arc::new(FakeServer::new());
        let datastore = Arc::new(MemoryDatastore::new());
        let (identity_string, _) = server.mint_identity();

        let mut first = Session::start(&identity_string, server.clone(), datastore.clone())
            .await
            .unwrap();
        first
            .register_identity(&Verification::Passphrase("pass".into()))
            .await
            .unwrap();
        let encrypted = first
            .encrypt(b"persisted", &EncryptionOptions::default())
            .await
            .unwrap();
        first.stop().await.unwrap();

        let second = Session::start(&identity_string, server.clone(), datastore)
            .await
            .unwrap();
        assert_eq!(second.status(), Status::Ready);
        assert_eq!(second.decrypt(&encrypted).await.unwrap(), b"persisted");
    }

    #[tokio::test]
    async fn verify_identity_registers_a_second_device() {
        let server = Arc::new(FakeServer::new());
        let (identity_string, _) = server.mint_identity();

        // First device registers with a passphrase.
        let mut first = Session::start(
            &identity_string,
            server.clone(),
            Arc::new(MemoryDatastore::new()),
        )
        .await
        .unwrap();
        first
            .register_identity(&Verification::Passphrase("pass".into()))
            .await
            .unwrap();
        let encrypted = first
            .encrypt(b"from device one", &EncryptionOptions::default())
            .await
            .unwrap();

        // A second device starts fresh and goes through verification.
        let mut second = Session::start(
            &identity_string,
            server.clone(),
            Arc::new(MemoryDatastore::new()),
        )
        .await
        .unwrap();
        assert_eq!(second.status(), Status::IdentityVerificationNeeded);
        second
            .verify_identity(&Verification::Passphrase("pass".into()))
            .await
            .unwrap();
        assert_eq!(second.status(), Status::Ready);

        // The new device holds the same user key: it can open the key
        // publish Alice made to herself from device one.
        assert_eq!(second.decrypt(&encrypted).await.unwrap(), b"from device one");
    }

    #[tokio::test]
    async fn device_revocation_rotates_the_user_key() {
        let server = Arc::new(FakeServer::new());
        let (identity_string, identity) = server.mint_identity();
        let mut alice = Session::start(
            &identity_string,
            server.clone(),
            Arc::new(MemoryDatastore::new()),
        )
        .await
        .unwrap();
        alice
            .register_identity(&Verification::Passphrase("pass".into()))
            .await
            .unwrap();
        let alice_public = serialize_public_identity(&public_identity_of(&identity));
        let (bob, _) = ready_session(&server).await;

        // Bob shares with Alice before the rotation.
        let before = bob
            .encrypt(
                b"before rotation",
                &EncryptionOptions {
                    sharing: SharingOptions {
                        share_with_users: vec![alice_public.clone()],
                        share_with_groups: vec![],
                    },
                    padding: Padding::Off,
                },
            )
            .await
            .unwrap();

        // Alice revokes her ghost device, rotating the user key.
        let ghost_id = server
            .actions()
            .iter()
            .find_map(|action| match &action.payload {
                ct_proto::actions::Payload::DeviceCreation3(payload)
                    if payload.user_id == identity.user_id && payload.is_ghost_device =>
                {
                    Some(ct_proto::DeviceId::from(action.hash()))
                }
                _ => None,
            })
            .unwrap();
        alice.revoke_device(&ghost_id).await.unwrap();

        // Bob re-reads Alice and publishes to the rotated key.
        let after = bob
            .encrypt(
                b"after rotation",
                &EncryptionOptions {
                    sharing: SharingOptions {
                        share_with_users: vec![alice_public],
                        share_with_groups: vec![],
                    },
                    padding: Padding::Off,
                },
            )
            .await
            .unwrap();

        // The archived key pair still opens pre-rotation publishes.
        assert_eq!(alice.decrypt(&before).await.unwrap(), b"before rotation");
        assert_eq!(alice.decrypt(&after).await.unwrap(), b"after rotation");
    }

    #[tokio::test]
    async fn stopped_sessions_cancel_operations() {
        let server = Arc::new(FakeServer::new());
        let (mut session, _) = ready_session(&server).await;
        session.stop().await.unwrap();
        let error = session
            .encrypt(b"too late", &EncryptionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn streamed_encrypt_decrypt_roundtrip() {
        let server = Arc::new(FakeServer::new());
        let (alice, _) = ready_session(&server).await;
        let (bob, bob_public) = ready_session(&server).await;

        let clear = vec![0x7fu8; 300_000];
        let mut encryptor = alice
            .encrypt_stream(
                OwnedSource(clear.clone(), 0),
                &EncryptionOptions {
                    sharing: SharingOptions {
                        share_with_users: vec![bob_public],
                        share_with_groups: vec![],
                    },
                    padding: Padding::Off,
                },
            )
            .await
            .unwrap();
        let encrypted = ct_encryptor::stream::read_all(&mut encryptor).await.unwrap();
        assert_eq!(encrypted[0], 11);

        let mut decryptor = bob.decrypt_stream(OwnedSource(encrypted, 0)).await.unwrap();
        let decrypted = ct_encryptor::stream::read_all(decryptor.as_mut()).await.unwrap();
        assert_eq!(decrypted, clear);
    }

    /// Minimal owned input source for the streaming tests.
    struct OwnedSource(Vec<u8>, usize);

    #[async_trait::async_trait]
    impl ct_encryptor::stream::InputSource for OwnedSource {
        async fn read(
            &mut self,
            buf: &mut [u8],
        ) -> std::result::Result<usize, ct_encryptor::EncryptorError> {
            let n = buf.len().min(self.0.len() - self.1);
            buf[..n].copy_from_slice(&self.0[self.1..self.1 + n]);
            self.1 += n;
            Ok(n)
        }
    }
}
