//! The signed action envelope.
//!
//! Wire layout:
//!
//! ```text
//! version(varint=1) | trustchainId(32) | nature(varint)
//! | payloadSize(varint) | payload | author(32) | signature(64)
//! ```
//!
//! An action's hash is BLAKE2b-256 over `varint(nature) || author ||
//! payload`. The trustchain id is deliberately excluded: the root action's
//! hash *is* the trustchain id. The envelope signature is Ed25519 over the
//! hash.

use ct_crypto::{Hash, PrivateSignatureKey, PublicSignatureKey, Signature};

use crate::actions::Payload;
use crate::error::ProtoError;
use crate::ids::TrustchainId;
use crate::nature::Nature;
use crate::serialization::{varint_write, Reader};

const SERIALIZED_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub trustchain_id: TrustchainId,
    /// Hash of the parent action: the trustchain id for first devices, the
    /// author device id otherwise.
    pub author: Hash,
    pub payload: Payload,
    pub signature: Signature,
}

impl Action {
    /// Build and sign an action with the author's private signature key.
    pub fn create(
        trustchain_id: TrustchainId,
        author: Hash,
        payload: Payload,
        private_signature_key: &PrivateSignatureKey,
    ) -> Self {
        let mut action = Self {
            trustchain_id,
            author,
            payload,
            signature: Signature::default(),
        };
        action.signature = ct_crypto::sign(action.hash().as_ref(), private_signature_key);
        action
    }

    pub fn nature(&self) -> Nature {
        self.payload.nature()
    }

    /// BLAKE2b-256 over `varint(nature) || author || payload`. Also the
    /// device id for device creations.
    pub fn hash(&self) -> Hash {
        let mut nature_bytes = Vec::with_capacity(2);
        varint_write(&mut nature_bytes, self.nature().to_wire());
        let payload = self.payload.to_bytes();
        Hash::new(ct_crypto::blake2b::<32>(&[
            &nature_bytes,
            self.author.as_ref(),
            &payload,
        ]))
    }

    /// Check the envelope signature against a public key.
    pub fn verify_signature(&self, public_key: &PublicSignatureKey) -> bool {
        ct_crypto::verify(self.hash().as_ref(), &self.signature, public_key)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let payload = self.payload.to_bytes();
        let mut out = Vec::new();
        varint_write(&mut out, SERIALIZED_VERSION);
        out.extend_from_slice(self.trustchain_id.as_ref());
        varint_write(&mut out, self.nature().to_wire());
        varint_write(&mut out, payload.len() as u64);
        out.extend_from_slice(&payload);
        out.extend_from_slice(self.author.as_ref());
        out.extend_from_slice(self.signature.as_ref());
        out
    }

    /// Parse one action, consuming the whole input.
    pub fn deserialize(data: &[u8]) -> Result<Self, ProtoError> {
        let mut reader = Reader::new(data);
        let action = Self::read(&mut reader)?;
        reader.expect_end()?;
        Ok(action)
    }

    /// Parse one action out of a longer buffer (batched responses).
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        let version = reader.read_varint()?;
        if version != SERIALIZED_VERSION {
            return Err(ProtoError::UnsupportedVersion(version));
        }
        let trustchain_id = reader.read_value()?;
        let nature = Nature::from_wire(reader.read_varint()?)?;
        let payload_size = reader.read_varint()? as usize;
        let payload = Payload::from_bytes(nature, reader.read(payload_size)?)?;
        Ok(Self {
            trustchain_id,
            author: reader.read_value()?,
            payload,
            signature: reader.read_value()?,
        })
    }
}
