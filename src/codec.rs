//! Promise / invoice byte layout, hashlock derivation, and signature
//! recovery (C1).
//!
//! Pure and stateless: every function here is a deterministic mapping from
//! bytes to bytes (or back). The preimage layout is bit-exact and must not
//! change without breaking interop with already-deployed consumers:
//!
//! ```text
//! channel_id (20 bytes) || amount (u256 BE) || fee (u256 BE) || hashlock (32 bytes)
//! ```
//! hashed with keccak256 to produce the hash that the consumer's signature
//! is checked against.

use crate::ids::{AgreementId, ConsumerId, ProviderId};
use crate::types::{Amount, ExchangeMessage, Invoice, Promise};
use alloy_primitives::{keccak256, Signature, B256, U256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed signature")]
    MalformedSignature,
    #[error("malformed hashlock hex: {0}")]
    MalformedHashlock(String),
}

/// Lowercase hex of `keccak256(r)`. Identifies an invoice without revealing `r`.
pub fn hashlock_hex(r: &[u8; 32]) -> String {
    hex::encode(keccak256(r))
}

/// Builds a fresh invoice for `amount_owed`, binding it to `r` via its hashlock.
pub fn create_invoice(
    agreement_id: AgreementId,
    amount_owed: Amount,
    transactor_fee: Amount,
    r: &[u8; 32],
    provider: ProviderId,
) -> Invoice {
    Invoice {
        agreement_id,
        amount_owed,
        transactor_fee,
        hashlock: hashlock_hex(r),
        provider,
    }
}

fn decode_hashlock(hashlock: &str) -> Result<[u8; 32], CodecError> {
    let bytes =
        hex::decode(hashlock).map_err(|_| CodecError::MalformedHashlock(hashlock.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CodecError::MalformedHashlock(hashlock.to_string()))
}

impl Promise {
    /// The exact byte layout that is signed over: `channel_id || amount(u256 BE)
    /// || fee(u256 BE) || hashlock`.
    pub fn signing_preimage(&self) -> Result<Vec<u8>, CodecError> {
        let hashlock = decode_hashlock(&self.hashlock)?;
        let mut buf = Vec::with_capacity(20 + 32 + 32 + 32);
        buf.extend_from_slice(&self.channel_id);
        buf.extend_from_slice(&U256::from(self.amount).to_be_bytes::<32>());
        buf.extend_from_slice(&U256::from(self.fee).to_be_bytes::<32>());
        buf.extend_from_slice(&hashlock);
        Ok(buf)
    }

    fn signing_hash(&self) -> Result<B256, CodecError> {
        Ok(keccak256(self.signing_preimage()?))
    }

    /// Recovers the address that produced [`Promise::signature`] over
    /// [`Promise::signing_preimage`].
    pub fn recover_signer(&self) -> Result<ConsumerId, CodecError> {
        let signature = Signature::from_raw_array(&self.signature)
            .map_err(|_| CodecError::MalformedSignature)?;
        let hash = self.signing_hash()?;
        let address = signature
            .recover_address_from_prehash(&hash)
            .map_err(|_| CodecError::MalformedSignature)?;
        Ok(ConsumerId::new(address))
    }
}

impl ExchangeMessage {
    /// The outer envelope preimage: the inner promise's preimage plus the
    /// claimed running total, so the outer signature also commits to
    /// `agreement_total`.
    fn envelope_preimage(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = self.promise.signing_preimage()?;
        buf.extend_from_slice(&U256::from(self.agreement_total).to_be_bytes::<32>());
        Ok(buf)
    }

    /// Recovers the outer signer and compares it against `consumer`.
    ///
    /// This is the external codec's contract: "recovers the consumer address
    /// iff the consumer signed". The concrete envelope format used here is a
    /// superset of the inner [`Promise`] preimage; the platform's real
    /// envelope codec is an external collaborator and may differ in framing
    /// while preserving that contract.
    pub fn is_valid(&self, consumer: ConsumerId) -> bool {
        let Ok(preimage) = self.envelope_preimage() else {
            return false;
        };
        let hash = keccak256(preimage);
        let Ok(signature) = Signature::from_raw_array(&self.signature) else {
            return false;
        };
        match signature.recover_address_from_prehash(&hash) {
            Ok(address) => address == consumer.address(),
            Err(_) => false,
        }
    }
}
