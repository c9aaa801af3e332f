//! In-memory reference implementations of every injected port, used by
//! unit and integration tests. Grounded in the same "fake everything,
//! assert on collected calls" style as the original's `mockStorage`
//! test doubles — not meant for production use.

use crate::accountant::AccountantError;
use crate::events::{AccountantPromiseEvent, SessionTokensEarnedEvent};
use crate::ids::{AccountantId, AgreementId, ConsumerId, ProviderId};
use crate::ports::{
    AccountantCaller, AccountantPromiseStorage, BlockchainHelper, ChannelAddressCalculator,
    FeeProvider, InvoiceStorage, PeerInvoiceSender, Publisher, Rng, Settler, TimeTracker,
};
use crate::types::{AccountantPromise, Amount, ExchangeMessage, Invoice, Promise};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MemoryInvoiceSender {
    pub sent: Mutex<Vec<Invoice>>,
}

#[async_trait]
impl PeerInvoiceSender for MemoryInvoiceSender {
    type Error = Infallible;

    async fn send(&self, invoice: &Invoice) -> Result<(), Self::Error> {
        self.sent.lock().unwrap().push(invoice.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryInvoiceStorage {
    invoices: DashMap<(ProviderId, ConsumerId), Invoice>,
    preimages: DashMap<(ProviderId, AgreementId), String>,
}

#[derive(Debug, thiserror::Error)]
#[error("invoice storage miss")]
pub struct StorageMiss;

#[async_trait]
impl InvoiceStorage for MemoryInvoiceStorage {
    type Error = StorageMiss;

    async fn get(&self, provider: ProviderId, consumer: ConsumerId) -> Result<Invoice, Self::Error> {
        self.invoices
            .get(&(provider, consumer))
            .map(|e| e.clone())
            .ok_or(StorageMiss)
    }

    async fn store(
        &self,
        provider: ProviderId,
        consumer: ConsumerId,
        invoice: &Invoice,
    ) -> Result<(), Self::Error> {
        self.invoices.insert((provider, consumer), invoice.clone());
        Ok(())
    }

    async fn store_r(
        &self,
        provider: ProviderId,
        agreement_id: AgreementId,
        r_hex: &str,
    ) -> Result<(), Self::Error> {
        self.preimages
            .insert((provider, agreement_id), r_hex.to_string());
        Ok(())
    }

    async fn get_r(&self, provider: ProviderId, agreement_id: AgreementId) -> Result<String, Self::Error> {
        self.preimages
            .get(&(provider, agreement_id))
            .map(|e| e.clone())
            .ok_or(StorageMiss)
    }
}

#[derive(Debug, Default)]
pub struct MemoryAccountantPromiseStorage {
    promises: DashMap<(ProviderId, AccountantId), AccountantPromise>,
}

#[async_trait]
impl AccountantPromiseStorage for MemoryAccountantPromiseStorage {
    type Error = Infallible;

    async fn get(
        &self,
        provider: ProviderId,
        accountant: AccountantId,
    ) -> Result<Option<AccountantPromise>, Self::Error> {
        Ok(self.promises.get(&(provider, accountant)).map(|e| e.clone()))
    }

    async fn store(
        &self,
        provider: ProviderId,
        accountant: AccountantId,
        promise: &AccountantPromise,
    ) -> Result<(), Self::Error> {
        self.promises.insert((provider, accountant), promise.clone());
        Ok(())
    }
}

/// Scripted accountant: each call pops the next canned response off its
/// queue. An empty queue is a test bug, not a retryable condition, so it
/// fails loudly rather than guessing at a default.
#[derive(Debug, Default)]
pub struct MemoryAccountantCaller {
    pub request_promise_responses: Mutex<VecDeque<Result<Promise, AccountantError>>>,
    pub reveal_r_responses: Mutex<VecDeque<Result<(), AccountantError>>>,
    pub reveal_calls: Mutex<Vec<(String, ProviderId, AgreementId)>>,
}

#[async_trait]
impl AccountantCaller for MemoryAccountantCaller {
    async fn request_promise(&self, _msg: &ExchangeMessage) -> Result<Promise, AccountantError> {
        self.request_promise_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AccountantError::unknown("no scripted response queued")))
    }

    async fn reveal_r(
        &self,
        r_hex: &str,
        provider: ProviderId,
        agreement_id: AgreementId,
    ) -> Result<(), AccountantError> {
        self.reveal_calls
            .lock()
            .unwrap()
            .push((r_hex.to_string(), provider, agreement_id));
        self.reveal_r_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[derive(Debug)]
pub struct MemoryFeeProvider(pub Amount);

#[async_trait]
impl FeeProvider for MemoryFeeProvider {
    type Error = Infallible;

    async fn fetch_settle_fees(&self) -> Result<Amount, Self::Error> {
        Ok(self.0)
    }
}

#[derive(Debug)]
pub struct MemoryBlockchainHelper {
    pub registered: bool,
    pub accountant_fee: u16,
}

#[async_trait]
impl BlockchainHelper for MemoryBlockchainHelper {
    type Error = Infallible;

    async fn get_accountant_fee(&self, _accountant: AccountantId) -> Result<u16, Self::Error> {
        Ok(self.accountant_fee)
    }

    async fn is_registered(&self, _registry: &str, _consumer: ConsumerId) -> Result<bool, Self::Error> {
        Ok(self.registered)
    }
}

#[derive(Debug)]
pub struct MemoryChannelAddressCalculator(pub [u8; 20]);

#[async_trait]
impl ChannelAddressCalculator for MemoryChannelAddressCalculator {
    type Error = Infallible;

    async fn channel_address(&self, _peer: ConsumerId) -> Result<[u8; 20], Self::Error> {
        Ok(self.0)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPublisher {
    pub accountant_promises: Mutex<Vec<AccountantPromiseEvent>>,
    pub session_tokens_earned: Mutex<Vec<SessionTokensEarnedEvent>>,
}

impl Publisher for MemoryPublisher {
    fn publish_accountant_promise(&self, event: AccountantPromiseEvent) {
        self.accountant_promises.lock().unwrap().push(event);
    }

    fn publish_session_tokens_earned(&self, event: SessionTokensEarnedEvent) {
        self.session_tokens_earned.lock().unwrap().push(event);
    }
}

/// Backed by `tokio::time::Instant` so it honors `tokio::time::pause()` /
/// `advance()` in tests without a real clock ever being read.
#[derive(Debug, Default)]
pub struct MemoryTimeTracker {
    start: Mutex<Option<tokio::time::Instant>>,
}

impl TimeTracker for MemoryTimeTracker {
    fn start_tracking(&self) {
        *self.start.lock().unwrap() = Some(tokio::time::Instant::now());
    }

    fn elapsed(&self) -> Duration {
        match *self.start.lock().unwrap() {
            Some(start) => tokio::time::Instant::now().saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySettler {
    pub calls: Mutex<Vec<(ProviderId, AccountantId)>>,
}

#[async_trait]
impl Settler for MemorySettler {
    type Error = Infallible;

    async fn settle(&self, provider: ProviderId, accountant: AccountantId) -> Result<(), Self::Error> {
        self.calls.lock().unwrap().push((provider, accountant));
        Ok(())
    }
}

/// Deterministic stand-in for [`crate::ports::OsRng`].
#[derive(Debug, Clone, Copy)]
pub struct FixedRng {
    pub agreement_id: u64,
    pub r: [u8; 32],
}

impl Rng for FixedRng {
    fn agreement_id(&self) -> u64 {
        self.agreement_id
    }

    fn r(&self) -> [u8; 32] {
        self.r
    }
}
