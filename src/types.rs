//! Core data types shared by every component: invoices, promises, exchange
//! messages, and the latest-only accountant promise record.

use crate::ids::{AgreementId, ProviderId};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::time::Duration;

/// Amounts are non-negative integers in the smallest token unit.
pub type Amount = u64;

/// Price per unit time. `duration == 0` or `price == 0` means the service
/// is free: invoices are still emitted, but the accountant round-trip is
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRate {
    pub price: Amount,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl PaymentRate {
    pub fn is_free(&self) -> bool {
        self.duration.is_zero() || self.price == 0
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// A provider-signed demand for a cumulative amount, committed via a hashlock.
///
/// `hashlock` uniquely keys the invoice in [`crate::invoice_table::InvoiceTable`].
/// The preimage `r` is intentionally absent here — it is never transmitted,
/// and is tracked only in the sender's [`crate::invoice_table::TableEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub agreement_id: AgreementId,
    pub amount_owed: Amount,
    pub transactor_fee: Amount,
    pub hashlock: String,
    pub provider: ProviderId,
}

/// A consumer-signed instrument redeemable by the provider at the accountant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    /// Raw 20-byte on-chain channel address the payment is bound to.
    pub channel_id: [u8; 20],
    pub amount: Amount,
    pub fee: Amount,
    pub hashlock: String,
    /// Raw ECDSA signature bytes (r || s || v), recoverable to the consumer.
    /// `serde` only implements (de)serialization for arrays up to length 32,
    /// so a 65-byte signature needs `serde_big_array`.
    #[serde(with = "BigArray")]
    pub signature: [u8; 65],
}

/// Consumer-signed envelope carrying a [`Promise`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeMessage {
    pub promise: Promise,
    /// Cumulative total the consumer believes has been agreed so far.
    /// A value of `0` signals "no prior accepted message" and triggers
    /// first-invoice leniency (see [`crate::tracker`]).
    pub agreement_total: Amount,
    /// Outer signature over the envelope, by the consumer.
    #[serde(with = "BigArray")]
    pub signature: [u8; 65],
}

impl ExchangeMessage {
    /// A zeroed placeholder used as `last_exchange_message` before any
    /// message has been accepted. `agreement_total == 0` here is what
    /// drives first-invoice leniency and the monotonicity floor of `0`.
    pub fn none() -> Self {
        ExchangeMessage {
            promise: Promise {
                channel_id: [0; 20],
                amount: 0,
                fee: 0,
                hashlock: String::new(),
                signature: [0; 65],
            },
            agreement_total: 0,
            signature: [0; 65],
        }
    }
}

/// Latest-only accountant promise record, persisted per provider x accountant pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountantPromise {
    pub promise: Promise,
    /// Hex-encoded preimage, revealed to the accountant once per promise.
    pub r_hex: String,
    pub revealed: bool,
    pub agreement_id: AgreementId,
}
