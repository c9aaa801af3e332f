//! Provider-side payment session controller for a peer-to-peer VPN
//! marketplace.
//!
//! An [`InvoiceTracker`](tracker::InvoiceTracker) owns one consumer session:
//! it issues signed invoices on a fixed cadence, validates the consumer's
//! exchange messages (signed payment promises), and redeems accepted
//! promises with a third-party accountant settlement authority. Everything
//! the tracker talks to — the peer connection, persistent storage, the
//! accountant RPC, the blockchain, the event bus — is injected through the
//! traits in [`ports`], so this crate never dials out on its own.

pub mod accountant;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod failure_counters;
pub mod ids;
pub mod invoice_table;
pub mod ports;
pub mod tracker;
pub mod types;
pub mod validator;

/// In-memory reference port implementations, for this crate's own tests and
/// for downstream integration tests (enable the `test-util` feature).
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use config::{ConfigError, SessionRate, TrackerConfig};
pub use error::{Disposition, TrackerError};
pub use tracker::{InvoiceTracker, Ports};
