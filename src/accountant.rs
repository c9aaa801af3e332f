//! Maps a classified accountant error into retry/settle/fatal behavior (C5).

use crate::error::{Disposition, TrackerError};
use crate::failure_counters::FailureCounter;
use std::fmt;

/// The accountant-specific error classes from spec.md §4.5. `HashlockMismatch`
/// and `PreviousRNotRevealed` are tracked as an upstream TODO: a real
/// implementation should expose R-recovery as a configuration hook so that
/// subsystem can plug in later. For now they are treated as recoverable,
/// same as the plain retry classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountantErrorKind {
    InvalidSignature,
    PaymentValueTooLow,
    PromiseValueTooLow,
    Overspend,
    HashlockMismatch,
    PreviousRNotRevealed,
    Internal,
    NotFound,
    NoPreviousPromise,
    MalformedJson,
    ProviderBalanceExhausted,
}

/// An error returned by [`crate::ports::AccountantCaller`], classified (or
/// not — `kind: None` maps to the "unknown" row, which is fatal).
#[derive(Debug, Clone)]
pub struct AccountantError {
    pub kind: Option<AccountantErrorKind>,
    pub message: String,
}

impl fmt::Display for AccountantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind:?}: {}", self.message),
            None => write!(f, "unknown accountant error: {}", self.message),
        }
    }
}

impl AccountantError {
    pub fn new(kind: AccountantErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }
}

/// Classifies the outcome of an accountant call and folds it into the
/// shared failure counter, invoking `on_balance_exhausted` for the one
/// class that should also kick off an asynchronous settlement attempt.
pub fn classify<T>(
    result: Result<T, AccountantError>,
    counter: &FailureCounter,
    max_failures: u64,
    on_balance_exhausted: impl FnOnce(),
) -> Disposition<T> {
    use AccountantErrorKind::*;

    let err = match result {
        Ok(value) => {
            counter.reset();
            return Disposition::Ok(value);
        }
        Err(err) => err,
    };

    match err.kind {
        Some(InvalidSignature) | Some(PaymentValueTooLow) | Some(PromiseValueTooLow)
        | Some(Overspend) => Disposition::Fatal(TrackerError::Accountant(err.to_string())),

        // Deferred R-recovery (spec.md §9 Open Question): fall through to
        // the same retry-with-counter handling as the plain retryable
        // classes until a recovery hook exists.
        Some(HashlockMismatch) | Some(PreviousRNotRevealed) | Some(Internal) | Some(NotFound)
        | Some(NoPreviousPromise) | Some(MalformedJson) => {
            retry_or_fatal(err, counter, max_failures)
        }

        Some(ProviderBalanceExhausted) => {
            on_balance_exhausted();
            retry_or_fatal(err, counter, max_failures)
        }

        None => Disposition::Fatal(TrackerError::Accountant(err.to_string())),
    }
}

fn retry_or_fatal<T>(err: AccountantError, counter: &FailureCounter, max_failures: u64) -> Disposition<T> {
    let count = counter.inc_and_get();
    if count > max_failures {
        Disposition::Fatal(TrackerError::Accountant(err.to_string()))
    } else {
        tracing::warn!(error = %err, %count, %max_failures, "accountant error, will retry");
        Disposition::Retry
    }
}
