// kavach/src/store/blacklist.rs
//
// Scammer-identifier blacklist, keyed by scammerId with reverse indexes on
// UPI ids and phone numbers. Upserts are set-unions — entries only grow.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tokio::sync::mpsc::UnboundedSender;

use super::persist::PersistOp;
use crate::types::BlacklistEntry;

/// Reserved sentinel under which the pay-validation path records flagged
/// receiver UPIs. Never a real scammer identifier.
pub const PAY_VALIDATION_SCAMMER_ID: &str = "pay-validation";

pub struct BlacklistStore {
    entries:   DashMap<String, BlacklistEntry>,
    upi_idx:   DashMap<String, String>, // upi → scammer_id
    phone_idx: DashMap<String, String>, // phone → scammer_id
    persist:   OnceLock<UnboundedSender<PersistOp>>,
}

impl BlacklistStore {
    pub fn new() -> Self {
        Self {
            entries:   DashMap::new(),
            upi_idx:   DashMap::new(),
            phone_idx: DashMap::new(),
            persist:   OnceLock::new(),
        }
    }

    pub fn attach_persistence(&self, tx: UnboundedSender<PersistOp>) {
        let _ = self.persist.set(tx);
    }

    /// First entry matching the scammer id, any of the UPIs, or any of the
    /// phone numbers.
    pub fn find_matching(
        &self,
        scammer_id: &str,
        upi_ids: &BTreeSet<String>,
        phone_numbers: &BTreeSet<String>,
    ) -> Option<BlacklistEntry> {
        if let Some(e) = self.entries.get(scammer_id) {
            return Some(e.clone());
        }
        for upi in upi_ids {
            if let Some(owner) = self.upi_idx.get(upi.as_str()) {
                if let Some(e) = self.entries.get(owner.value()) {
                    return Some(e.clone());
                }
            }
        }
        for phone in phone_numbers {
            if let Some(owner) = self.phone_idx.get(phone.as_str()) {
                if let Some(e) = self.entries.get(owner.value()) {
                    return Some(e.clone());
                }
            }
        }
        None
    }

    /// Pay-validation lookups query by receiver UPI only.
    pub fn find_by_upi(&self, upi: &str) -> Option<BlacklistEntry> {
        let key = upi.to_lowercase();
        let owner = self.upi_idx.get(key.as_str())?;
        self.entries.get(owner.value()).map(|e| e.clone())
    }

    pub fn upsert(
        &self,
        scammer_id: &str,
        upi_ids: impl IntoIterator<Item = String>,
        phone_numbers: impl IntoIterator<Item = String>,
        reason: &str,
    ) -> BlacklistEntry {
        let mut entry = self
            .entries
            .entry(scammer_id.to_string())
            .or_insert_with(|| BlacklistEntry {
                scammer_id:    scammer_id.to_string(),
                upi_ids:       BTreeSet::new(),
                phone_numbers: BTreeSet::new(),
                reason:        reason.to_string(),
                added_at:      Utc::now(),
            });

        for upi in upi_ids {
            let upi = upi.to_lowercase();
            self.upi_idx.insert(upi.clone(), scammer_id.to_string());
            entry.upi_ids.insert(upi);
        }
        for phone in phone_numbers {
            self.phone_idx.insert(phone.clone(), scammer_id.to_string());
            entry.phone_numbers.insert(phone);
        }

        let snapshot = entry.clone();
        drop(entry);

        if let Some(tx) = self.persist.get() {
            let _ = tx.send(PersistOp::Blacklist(snapshot.clone()));
        }
        snapshot
    }

    pub fn restore(&self, entry: BlacklistEntry) {
        for upi in &entry.upi_ids {
            self.upi_idx.insert(upi.clone(), entry.scammer_id.clone());
        }
        for phone in &entry.phone_numbers {
            self.phone_idx.insert(phone.clone(), entry.scammer_id.clone());
        }
        self.entries.insert(entry.scammer_id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BlacklistStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn upsert_unions_sets() {
        let store = BlacklistStore::new();
        store.upsert("scammer-1", vec!["a@ybl".into()], vec![], "test");
        let e = store.upsert(
            "scammer-1",
            vec!["a@ybl".into(), "b@ybl".into()],
            vec!["+919876500000".into()],
            "test again",
        );
        assert_eq!(e.upi_ids, set(&["a@ybl", "b@ybl"]));
        assert_eq!(e.phone_numbers, set(&["+919876500000"]));
        // original reason survives
        assert_eq!(e.reason, "test");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn find_matching_checks_all_criteria() {
        let store = BlacklistStore::new();
        store.upsert("scammer-1", vec!["bad@ybl".into()], vec!["+919876500000".into()], "r");

        assert!(store.find_matching("scammer-1", &set(&[]), &set(&[])).is_some());
        assert!(store.find_matching("other", &set(&["bad@ybl"]), &set(&[])).is_some());
        assert!(store
            .find_matching("other", &set(&[]), &set(&["+919876500000"]))
            .is_some());
        assert!(store.find_matching("other", &set(&["ok@ybl"]), &set(&[])).is_none());
    }

    #[test]
    fn pay_validation_sentinel_records_upis() {
        let store = BlacklistStore::new();
        store.upsert(
            PAY_VALIDATION_SCAMMER_ID,
            vec!["9876543210@ybl".into()],
            vec![],
            "Flagged during payment validation",
        );
        let hit = store.find_by_upi("9876543210@YBL").unwrap();
        assert_eq!(hit.scammer_id, PAY_VALIDATION_SCAMMER_ID);
    }
}
