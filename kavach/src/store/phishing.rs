// kavach/src/store/phishing.rs
//
// Phishing-domain set — lower-cased unique domains, shared read-mostly.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::OnceLock;
use tokio::sync::mpsc::UnboundedSender;

use super::persist::PersistOp;

/// Seed of confirmed UPI-phishing hosts, loaded when the store starts empty.
const SEED_DOMAINS: &[&str] = &[
    "sbi-kyc-update.xyz",
    "upi-refund-portal.top",
    "kyc-verification-online.site",
    "paytm-cashback-offer.click",
    "bank-account-unlock.online",
];

pub struct PhishingStore {
    domains: DashMap<String, DateTime<Utc>>,
    persist: OnceLock<UnboundedSender<PersistOp>>,
}

impl PhishingStore {
    pub fn new() -> Self {
        Self { domains: DashMap::new(), persist: OnceLock::new() }
    }

    pub fn attach_persistence(&self, tx: UnboundedSender<PersistOp>) {
        let _ = self.persist.set(tx);
    }

    pub fn contains(&self, host: &str) -> bool {
        self.domains.contains_key(&host.to_lowercase())
    }

    pub fn add(&self, domain: &str) {
        let key = domain.to_lowercase();
        if self.domains.insert(key.clone(), Utc::now()).is_none() {
            if let Some(tx) = self.persist.get() {
                let _ = tx.send(PersistOp::Phishing(key));
            }
        }
    }

    /// Restore one domain from persistence without echoing it back.
    pub fn restore(&self, domain: &str, added_at: DateTime<Utc>) {
        self.domains.insert(domain.to_lowercase(), added_at);
    }

    pub fn seed_if_empty(&self) {
        if self.domains.is_empty() {
            for d in SEED_DOMAINS {
                self.add(d);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl Default for PhishingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let store = PhishingStore::new();
        store.add("Evil-KYC.com");
        assert!(store.contains("evil-kyc.com"));
        assert!(store.contains("EVIL-KYC.COM"));
        assert!(!store.contains("good.com"));
    }

    #[test]
    fn seed_only_fills_empty_store() {
        let store = PhishingStore::new();
        store.seed_if_empty();
        let n = store.len();
        assert!(n > 0);
        store.seed_if_empty();
        assert_eq!(store.len(), n);
    }

    #[test]
    fn duplicate_adds_are_idempotent() {
        let store = PhishingStore::new();
        store.add("a.xyz");
        store.add("a.xyz");
        assert_eq!(store.len(), 1);
    }
}
