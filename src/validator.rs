//! Validates incoming exchange messages against the running agreement (C4).
//!
//! The four checks bind each payment to the right paying party, a monotone
//! settlement total, and the correct on-chain receiving channel. They run in
//! this order; reordering is fine only if all four still execute on an
//! accepted message.

use crate::error::TrackerError;
use crate::ids::ConsumerId;
use crate::ports::ChannelAddressCalculator;
use crate::types::ExchangeMessage;

pub struct ExchangeValidator<'a, C> {
    pub consumer: ConsumerId,
    pub channel_address_calculator: &'a C,
}

impl<'a, C> ExchangeValidator<'a, C>
where
    C: ChannelAddressCalculator,
{
    pub fn new(consumer: ConsumerId, channel_address_calculator: &'a C) -> Self {
        Self {
            consumer,
            channel_address_calculator,
        }
    }

    /// Runs all four checks against `msg`, given the last accepted amount.
    pub async fn validate(
        &self,
        msg: &ExchangeMessage,
        last_amount: u64,
    ) -> Result<(), TrackerError> {
        if !msg.is_valid(self.consumer) {
            return Err(TrackerError::ExchangeValidationFailed);
        }

        let inner_signer = msg
            .promise
            .recover_signer()
            .map_err(|e| TrackerError::ExchangeValidationFailed.context(e))?;
        if inner_signer != self.consumer {
            return Err(TrackerError::ConsumerPromiseValidationFailed(
                "identity mismatch".to_string(),
            ));
        }

        if msg.promise.amount < last_amount {
            return Err(TrackerError::ConsumerPromiseValidationFailed(
                "invalid amount".to_string(),
            ));
        }

        let expected_channel = self
            .channel_address_calculator
            .channel_address(self.consumer)
            .await
            .map_err(|e| TrackerError::Blockchain(e.to_string()))?;
        if expected_channel != msg.promise.channel_id {
            return Err(TrackerError::ConsumerPromiseValidationFailed(
                "invalid channel address".to_string(),
            ));
        }

        Ok(())
    }
}

impl TrackerError {
    /// Attaches a lower-level cause's message without changing the variant
    /// the caller matches on; keeps `ExchangeValidationFailed` a stable,
    /// argument-free identity for callers while still logging context.
    fn context(self, cause: impl std::fmt::Display) -> Self {
        tracing::debug!(%cause, "exchange validation failure detail");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Promise;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use async_trait::async_trait;

    struct FixedChannel(pub [u8; 20]);

    #[async_trait]
    impl ChannelAddressCalculator for FixedChannel {
        type Error = std::convert::Infallible;
        async fn channel_address(&self, _peer: ConsumerId) -> Result<[u8; 20], Self::Error> {
            Ok(self.0)
        }
    }

    fn signed_message(
        signer: &PrivateKeySigner,
        channel_id: [u8; 20],
        amount: u64,
        agreement_total: u64,
    ) -> ExchangeMessage {
        let hashlock = crate::codec::hashlock_hex(&[1u8; 32]);
        let mut promise = Promise {
            channel_id,
            amount,
            fee: 0,
            hashlock,
            signature: [0u8; 65],
        };
        let hash = promise.signing_preimage().unwrap();
        let hash = alloy_primitives::keccak256(hash);
        let sig = signer.sign_hash_sync(&hash).unwrap();
        promise.signature = sig.as_bytes();

        let mut msg = ExchangeMessage {
            promise,
            agreement_total,
            signature: [0u8; 65],
        };
        let envelope_hash = {
            let mut buf = msg.promise.signing_preimage().unwrap();
            buf.extend_from_slice(&alloy_primitives::U256::from(agreement_total).to_be_bytes::<32>());
            alloy_primitives::keccak256(buf)
        };
        let outer_sig = signer.sign_hash_sync(&envelope_hash).unwrap();
        msg.signature = outer_sig.as_bytes();
        msg
    }

    #[tokio::test]
    async fn rejects_amount_regression() {
        let signer = PrivateKeySigner::random();
        let consumer = ConsumerId::new(signer.address());
        let channel = FixedChannel([5u8; 20]);
        let validator = ExchangeValidator::new(consumer, &channel);

        let msg = signed_message(&signer, [5u8; 20], 99, 100);
        let result = validator.validate(&msg, 100).await;
        assert!(matches!(
            result,
            Err(TrackerError::ConsumerPromiseValidationFailed(ref s)) if s == "invalid amount"
        ));
    }

    #[tokio::test]
    async fn rejects_wrong_channel() {
        let signer = PrivateKeySigner::random();
        let consumer = ConsumerId::new(signer.address());
        let channel = FixedChannel([5u8; 20]);
        let validator = ExchangeValidator::new(consumer, &channel);

        let msg = signed_message(&signer, [9u8; 20], 100, 100);
        let result = validator.validate(&msg, 0).await;
        assert!(matches!(
            result,
            Err(TrackerError::ConsumerPromiseValidationFailed(ref s)) if s == "invalid channel address"
        ));
    }

    #[tokio::test]
    async fn accepts_valid_monotone_message() {
        let signer = PrivateKeySigner::random();
        let consumer = ConsumerId::new(signer.address());
        let channel = FixedChannel([5u8; 20]);
        let validator = ExchangeValidator::new(consumer, &channel);

        let msg = signed_message(&signer, [5u8; 20], 150, 150);
        let result = validator.validate(&msg, 100).await;
        assert!(result.is_ok());
    }
}
