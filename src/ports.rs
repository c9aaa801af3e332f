//! Injected ports the tracker depends on. Specified by operation only —
//! concrete implementations (HTTP clients, on-chain queries, the actual
//! key/value stores) live outside this crate.
//!
//! Traits are `async_trait`-based rather than using return-position `impl
//! Future` so they stay object-safe for callers that prefer to box a
//! dynamic adapter; [`crate::tracker::InvoiceTracker`] itself is generic
//! over these traits and monomorphizes over whatever concrete adapters the
//! embedding application wires up, the same way the teacher's own
//! `Facilitator` trait is consumed generically rather than boxed.

use crate::accountant::AccountantError;
use crate::ids::{AccountantId, ConsumerId, ProviderId};
use crate::types::{AccountantPromise, Amount, ExchangeMessage, Invoice};
use async_trait::async_trait;
use std::time::Duration;

/// Sends a just-issued invoice to the consumer.
#[async_trait]
pub trait PeerInvoiceSender: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send(&self, invoice: &Invoice) -> Result<(), Self::Error>;
}

/// Persistent storage for issued invoices and their revealed preimages.
#[async_trait]
pub trait InvoiceStorage: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(&self, provider: ProviderId, consumer: ConsumerId) -> Result<Invoice, Self::Error>;
    async fn store(
        &self,
        provider: ProviderId,
        consumer: ConsumerId,
        invoice: &Invoice,
    ) -> Result<(), Self::Error>;
    async fn store_r(
        &self,
        provider: ProviderId,
        agreement_id: crate::ids::AgreementId,
        r_hex: &str,
    ) -> Result<(), Self::Error>;
    async fn get_r(
        &self,
        provider: ProviderId,
        agreement_id: crate::ids::AgreementId,
    ) -> Result<String, Self::Error>;
}

/// Latest-only storage for the accountant promise record.
#[async_trait]
pub trait AccountantPromiseStorage: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `Ok(None)` when no promise has ever been stored for this pair.
    async fn get(
        &self,
        provider: ProviderId,
        accountant: AccountantId,
    ) -> Result<Option<AccountantPromise>, Self::Error>;
    async fn store(
        &self,
        provider: ProviderId,
        accountant: AccountantId,
        promise: &AccountantPromise,
    ) -> Result<(), Self::Error>;
}

/// The two-phase accountant protocol: redeem a promise, then reveal its preimage.
#[async_trait]
pub trait AccountantCaller: Send + Sync {
    async fn request_promise(
        &self,
        msg: &ExchangeMessage,
    ) -> Result<crate::types::Promise, AccountantError>;

    async fn reveal_r(
        &self,
        r_hex: &str,
        provider: ProviderId,
        agreement_id: crate::ids::AgreementId,
    ) -> Result<(), AccountantError>;
}

/// Reports the current settlement transactor fee, fetched once at `Start`.
#[async_trait]
pub trait FeeProvider: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch_settle_fees(&self) -> Result<Amount, Self::Error>;
}

/// On-chain registry and accountant-fee lookups.
#[async_trait]
pub trait BlockchainHelper: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get_accountant_fee(&self, accountant: AccountantId) -> Result<u16, Self::Error>;
    async fn is_registered(&self, registry: &str, consumer: ConsumerId) -> Result<bool, Self::Error>;
}

/// Deterministic `CREATE2`-style channel address derivation for a consumer.
#[async_trait]
pub trait ChannelAddressCalculator: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn channel_address(&self, peer: ConsumerId) -> Result<[u8; 20], Self::Error>;
}

/// Event-bus publication. Payload types are fixed by [`crate::events`].
pub trait Publisher: Send + Sync {
    fn publish_accountant_promise(&self, event: crate::events::AccountantPromiseEvent);
    fn publish_session_tokens_earned(&self, event: crate::events::SessionTokensEarnedEvent);
}

/// Tracks elapsed billable time since the session started.
pub trait TimeTracker: Send + Sync {
    fn start_tracking(&self);
    fn elapsed(&self) -> Duration;
}

/// Converts accumulated promises into on-chain transfers. Invoked
/// asynchronously and best-effort; its own errors are only logged.
#[async_trait]
pub trait Settler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn settle(&self, provider: ProviderId, accountant: AccountantId) -> Result<(), Self::Error>;
}

/// Cryptographically-secure randomness for `agreement_id` and `r` generation.
///
/// Injected rather than read from a global RNG so the source is swappable
/// (and deterministic in tests) — the original implementation seeded a
/// time-based PRNG for `agreement_id`, which the design notes flag as
/// acceptable for uniqueness but not for unpredictability.
pub trait Rng: Send + Sync {
    fn agreement_id(&self) -> u64;
    fn r(&self) -> [u8; 32];
}

/// [`Rng`] backed by the operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRng;

impl Rng for OsRng {
    fn agreement_id(&self) -> u64 {
        rand::random()
    }

    fn r(&self) -> [u8; 32] {
        rand::random()
    }
}
