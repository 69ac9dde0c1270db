//! Key-publish generation for sharing.

use ct_crypto::{PublicEncryptionKey, SimpleResourceId, SymmetricKey};
use ct_proto::UserId;

use crate::block_generator::BlockGenerator;
use crate::error::{Error, Result};
use crate::provisional::ProvisionalUser;
use crate::transport::ShareActions;

/// A share call addresses at most this many recipients.
pub const SHARE_LIMIT: usize = 100;

/// Resolved recipients of a share: concrete public keys only.
#[derive(Default)]
pub struct KeyRecipients {
    pub user_keys: Vec<(UserId, PublicEncryptionKey)>,
    pub group_keys: Vec<PublicEncryptionKey>,
    pub provisional_users: Vec<ProvisionalUser>,
}

impl KeyRecipients {
    pub fn len(&self) -> usize {
        self.user_keys.len() + self.group_keys.len() + self.provisional_users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One key publish per (resource, recipient) pair, grouped by kind so the
/// server accepts them as one transaction.
pub fn generate_share_actions(
    generator: &BlockGenerator,
    resource_keys: &[(SimpleResourceId, SymmetricKey)],
    recipients: &KeyRecipients,
) -> Result<ShareActions> {
    if resource_keys.is_empty() {
        return Err(Error::internal("no keys to share"));
    }
    if recipients.len() > SHARE_LIMIT {
        return Err(Error::invalid_argument(format!(
            "cannot share with more than {SHARE_LIMIT} recipients at once"
        )));
    }

    let mut actions = ShareActions::default();
    for (resource_id, resource_key) in resource_keys {
        for (_, user_key) in &recipients.user_keys {
            actions.key_publishes_to_users.push(generator.key_publish_to_user(
                *resource_id,
                resource_key,
                user_key,
            )?);
        }
        for group_key in &recipients.group_keys {
            actions
                .key_publishes_to_user_groups
                .push(generator.key_publish_to_group(*resource_id, resource_key, group_key)?);
        }
        for provisional_user in &recipients.provisional_users {
            actions.key_publishes_to_provisional_users.push(
                generator.key_publish_to_provisional_user(
                    *resource_id,
                    resource_key,
                    provisional_user,
                )?,
            );
        }
    }
    Ok(actions)
}
