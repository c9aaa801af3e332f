//! Identity newtypes for the parties in a payment session.
//!
//! All three identities are 20-byte blockchain addresses, but are kept as
//! distinct types so a provider id can never be passed where a consumer id
//! is expected.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

macro_rules! address_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Address);

        impl $name {
            pub fn new(address: Address) -> Self {
                Self(address)
            }

            pub fn address(&self) -> Address {
                self.0
            }
        }

        impl From<Address> for $name {
            fn from(address: Address) -> Self {
                Self(address)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

address_id!(ProviderId);
address_id!(ConsumerId);
address_id!(AccountantId);

/// Per-session label tying every invoice and promise together.
///
/// Generated once in [`crate::tracker::InvoiceTracker::start`] and fixed for
/// the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgreementId(pub u64);

impl Display for AgreementId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
