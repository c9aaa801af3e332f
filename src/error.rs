//! Error taxonomy for the tracker, and the `Disposition` type used to
//! avoid sentinel-error inspection when classifying accountant failures.

use thiserror::Error;

/// Errors surfaced by the tracker. Stable variant identity matters here:
/// callers (and tests) match on these, not on message text.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("consumer not registered")]
    ConsumerNotRegistered,

    #[error("accountant fee too large: {fee} exceeds limit {limit}")]
    AccountantFeeTooLarge { fee: u16, limit: u16 },

    #[error("did not get a new exchange message in time")]
    ExchangeWaitTimeout,

    /// Benign: the listener filters this out and never surfaces it further.
    #[error("invoice expired")]
    InvoiceExpired,

    #[error("exchange validation failed")]
    ExchangeValidationFailed,

    #[error("consumer promise validation failed: {0}")]
    ConsumerPromiseValidationFailed(String),

    #[error("accountant error: {0}")]
    Accountant(String),

    #[error("could not send invoice: {0}")]
    Send(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("blockchain query failed: {0}")]
    Blockchain(String),
}

/// Outcome of classifying an accountant call (C5).
///
/// Modeled as a distinct three-way type rather than a sentinel error value
/// so callers never need to inspect an error's cause chain to know whether
/// to retry: `Ok` carries the accountant's successful response through,
/// `Retry` means the failure was absorbed into a retry counter and the
/// caller should skip straight to the next tick, and `Fatal` means the
/// session must terminate with the wrapped error.
#[derive(Debug)]
pub enum Disposition<T> {
    Ok(T),
    Retry,
    Fatal(TrackerError),
}
