//! Thread-safe hashlock -> sent-invoice map (C2).
//!
//! An entry exists iff the corresponding invoice has been sent and is
//! neither paid nor timed out. Backed by [`DashMap`] rather than a
//! `Mutex<HashMap<_>>` so lookups don't contend with unrelated sends —
//! the same reasoning the teacher applies to its per-network provider
//! and nonce caches.

use crate::types::Invoice;
use dashmap::DashMap;

/// An in-flight invoice together with the preimage that unlocks it.
/// `r` is never part of the wire-transmitted [`Invoice`]; it lives only here
/// until the invoice is paid (and then travels on to the accountant).
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub invoice: Invoice,
    pub r: [u8; 32],
}

#[derive(Debug, Default)]
pub struct InvoiceTable {
    entries: DashMap<String, TableEntry>,
}

impl InvoiceTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Records a freshly sent invoice, keyed by its hashlock.
    pub fn mark_sent(&self, entry: TableEntry) {
        self.entries.insert(entry.invoice.hashlock.clone(), entry);
    }

    /// Removes the entry for `hashlock`, if present. Idempotent: calling
    /// this on an absent key is a no-op and returns `false`.
    pub fn mark_paid(&self, hashlock: &str) -> bool {
        self.entries.remove(hashlock).is_some()
    }

    /// Returns a clone of the entry for `hashlock`, if still in flight.
    pub fn lookup(&self, hashlock: &str) -> Option<TableEntry> {
        self.entries.get(hashlock).map(|e| e.clone())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AgreementId, ProviderId};
    use alloy_primitives::Address;

    fn entry(hashlock: &str) -> TableEntry {
        TableEntry {
            invoice: Invoice {
                agreement_id: AgreementId(1),
                amount_owed: 10,
                transactor_fee: 1,
                hashlock: hashlock.to_string(),
                provider: ProviderId::new(Address::ZERO),
            },
            r: [0u8; 32],
        }
    }

    #[test]
    fn mark_paid_is_idempotent() {
        let table = InvoiceTable::new();
        table.mark_sent(entry("abc"));
        assert!(table.mark_paid("abc"));
        assert!(!table.mark_paid("abc"));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn lookup_misses_after_paid() {
        let table = InvoiceTable::new();
        table.mark_sent(entry("abc"));
        assert!(table.lookup("abc").is_some());
        table.mark_paid("abc");
        assert!(table.lookup("abc").is_none());
    }
}
