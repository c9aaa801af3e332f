//! Event topic payloads published through [`crate::ports::Publisher`].
//!
//! The payload shape is part of the external interface contract (spec'd in
//! the wire-level section), not an implementation detail — downstream event
//! subscribers depend on these field names and types.

use crate::ids::{AccountantId, ConsumerId, ProviderId};
use crate::types::{Amount, Promise};
use serde::{Deserialize, Serialize};

pub const TOPIC_ACCOUNTANT_PROMISE: &str = "provider-accountant-promise";
pub const TOPIC_SESSION_TOKENS_EARNED: &str = "session-tokens-earned";

/// Published once a promise has been successfully redeemed with the
/// accountant. Carries the preimage `r` attached to the promise, matching
/// the original's convention of stapling `R` onto the promise before
/// publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountantPromiseEvent {
    pub promise: Promise,
    pub r_hex: String,
    pub accountant: AccountantId,
    pub provider: ProviderId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionTokensEarnedEvent {
    pub consumer: ConsumerId,
    pub total: Amount,
}
