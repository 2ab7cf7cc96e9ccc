// kavach/src/analyzers/url.rs
//
// URL risk analyzer. A hit on the phishing-domain store short-circuits at
// increment 80; everything else accumulates heuristic points capped at 40.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::store::phishing::PhishingStore;
use crate::types::dedup_ordered;

const SUSPICIOUS_TLDS: &[&str] = &[
    "xyz", "top", "click", "gq", "tk", "ru", "ml", "ga", "cf", "work", "link",
    "online", "site", "website", "space", "pw",
];

const PHISHING_URL_KEYWORDS: &[&str] = &[
    "verify", "verification", "update", "bank", "kyc", "reward", "rewards",
    "urgent", "secure", "login", "account", "confirm", "activation", "unlock",
    "suspend", "blocked", "refund",
];

const HEURISTIC_CAP: u8 = 40;
const KEYWORD_CAP: u8 = 15;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("url regex"))
}

#[derive(Debug, Clone, Default)]
pub struct UrlRisk {
    pub increment:  u8,
    pub indicators: Vec<String>,
}

pub fn analyze(text: &str, phishing: &PhishingStore) -> UrlRisk {
    let mut total: u32 = 0;
    let mut indicators: Vec<String> = Vec::new();

    for m in url_re().find_iter(text) {
        let raw = m.as_str().trim_end_matches(['.', ',', ')', ';', '!', '?']);
        let Some(host) = parse_host(raw) else { continue };

        if phishing.contains(&host) {
            return UrlRisk {
                increment:  80,
                indicators: vec!["Known phishing domain".to_string()],
            };
        }

        let mut scored = false;

        if let Some(tld) = host.rsplit('.').next() {
            if SUSPICIOUS_TLDS.contains(&tld) {
                total += 15;
                indicators.push(format!("Suspicious domain TLD: .{tld}"));
                scored = true;
            }
        }

        let lower = raw.to_lowercase();
        let mut kw_points: u8 = 0;
        for kw in PHISHING_URL_KEYWORDS {
            if lower.contains(kw) && kw_points < KEYWORD_CAP {
                kw_points += 5;
                indicators.push(format!("Phishing keyword in URL: {kw}"));
                scored = true;
            }
        }
        total += kw_points as u32;

        if !scored {
            total += 5;
            indicators.push("Message contains URL".to_string());
        }
    }

    UrlRisk {
        increment:  (total.min(HEURISTIC_CAP as u32)) as u8,
        indicators: dedup_ordered(indicators),
    }
}

fn parse_host(raw: &str) -> Option<String> {
    Url::parse(raw).ok()?.host_str().map(|h| h.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_store() -> PhishingStore {
        PhishingStore::new()
    }

    #[test]
    fn known_phishing_domain_short_circuits() {
        let store = empty_store();
        store.add("evil-kyc.com");
        let r = analyze("go to https://evil-kyc.com/verify", &store);
        assert_eq!(r.increment, 80);
        assert_eq!(r.indicators, vec!["Known phishing domain"]);
    }

    #[test]
    fn suspicious_tld_and_keywords_accumulate() {
        let r = analyze("click http://sbi-kyc-update.xyz now", &empty_store());
        // .xyz (15) + "kyc" (5) + "update" (5)
        assert_eq!(r.increment, 25);
        assert!(r.indicators.contains(&"Suspicious domain TLD: .xyz".to_string()));
    }

    #[test]
    fn keyword_points_cap_at_fifteen() {
        let r = analyze(
            "http://x.com/verify-bank-kyc-login-secure-account-update",
            &empty_store(),
        );
        assert_eq!(r.increment, 15);
    }

    #[test]
    fn plain_url_scores_five() {
        let r = analyze("see https://example.org/page", &empty_store());
        assert_eq!(r.increment, 5);
        assert_eq!(r.indicators, vec!["Message contains URL"]);
    }

    #[test]
    fn total_caps_at_forty() {
        let r = analyze(
            "http://a.xyz/kyc-verify-login http://b.top/bank-update-secure http://c.click/refund",
            &empty_store(),
        );
        assert_eq!(r.increment, 40);
    }

    #[test]
    fn no_urls_scores_zero() {
        let r = analyze("no links here", &empty_store());
        assert_eq!(r.increment, 0);
        assert!(r.indicators.is_empty());
    }
}
