// kavach/src/extract.rs
//
// Identifier extractor — structured payment identifiers out of free text.
//
// The rule path always runs: compiled-once regex tables for UPI handles,
// Indian mobile numbers, rupee amounts, context-qualified bank accounts and
// links. An optional LLM pass refines the result; on any LLM failure the
// rule result stands alone.
//
// Two deliberate asymmetries:
//   - bank accounts require a nearby "account/a-c/acct" qualifier, so long
//     digit runs are not misread as accounts;
//   - phone candidates overlapping an extracted bank account span are
//     dropped, so account digits are never re-emitted as phone numbers.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::analyzers::rules::SUSPICIOUS_KEYWORDS;
use crate::clients::llm::LlmClient;
use crate::types::{dedup_ordered, Extraction, TxSource, TxType};

// ── Pattern tables ────────────────────────────────────────────────────────────

/// Provider handles observed on the Indian UPI rails. A handle outside this
/// list is still accepted when it is 6 characters or shorter (new PSP
/// handles appear faster than this list is updated).
const KNOWN_PROVIDERS: &[&str] = &[
    "ybl", "oksbi", "paytm", "okicici", "okhdfcbank", "axl", "apl", "upi",
    "ibl", "sbi", "kotak", "idfcfirst", "okaxis", "ptyes", "ptaxis", "ptsbi",
    "yapl", "rapl", "abfspay", "freecharge", "ikwik", "jupiteraxis", "axisb",
    "pockets", "fbl", "dbs", "yesbank",
];

/// Hosts that show up constantly in benign forwarded messages.
const LEGIT_HOSTS: &[&str] = &["google.com", "facebook.com", "whatsapp.com"];

const MAX_AMOUNT: f64 = 100_000_000.0;

fn upi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._\-]+@[A-Za-z0-9]+").expect("upi regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\+91[\-\s]?|91|0)?[6-9][0-9]{9}").expect("phone regex"))
}

fn bank_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:account|a/c|acct|ac)\b\s*(?:no|number|#)?\.?\s*:?\s*([0-9]{9,18})\b")
            .expect("bank regex")
    })
}

fn amount_res() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?i)(?:\brs\.?|\binr\b|₹)\s*([0-9][0-9,]*(?:\.[0-9]+)?)").expect("amt1"),
            Regex::new(r"(?i)([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:rs\b|rupees\b|inr\b|₹)").expect("amt2"),
            Regex::new(
                r"(?i)\b(?:amount|pay|transfer|send|receive|debit|credit)[^0-9]{0,24}([0-9][0-9,]*(?:\.[0-9]+)?)",
            )
            .expect("amt3"),
        ]
    })
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("url regex"))
}

fn bare_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?\.)+(?:com|net|org|in|co|io|me|xyz|top|click|gq|tk|ru|ml|ga|cf|work|link|online|site|website|space|pw|info|app)\b(?:/[^\s]*)?",
        )
        .expect("bare url regex")
    })
}

// ── Rule path ─────────────────────────────────────────────────────────────────

pub fn extract_rules(text: &str) -> Extraction {
    let mut out = Extraction::empty(text);
    if text.trim().is_empty() {
        return out;
    }
    let bytes = text.as_bytes();

    // Bank accounts first — their spans veto phone candidates below.
    let mut bank_spans: Vec<(usize, usize)> = Vec::new();
    for cap in bank_re().captures_iter(text) {
        if let Some(m) = cap.get(1) {
            bank_spans.push((m.start(), m.end()));
            out.bank_accounts.push(m.as_str().to_string());
        }
    }

    // UPI handles — reject email-shaped tokens (provider continued by ".tld").
    for m in upi_re().find_iter(text) {
        let next = bytes.get(m.end()).copied();
        let next2 = bytes.get(m.end() + 1).copied();
        if next == Some(b'.') && next2.map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
            continue;
        }
        let token = m.as_str().to_lowercase();
        let Some(provider) = token.split('@').nth(1) else { continue };
        if KNOWN_PROVIDERS.contains(&provider) || provider.len() <= 6 {
            out.all_upi_ids.push(token);
        }
    }
    out.all_upi_ids = dedup_ordered(out.all_upi_ids);

    // Sender vs receiver: "from <id>" marks the sender; the first remaining
    // handle is the receiver (scam texts tell the victim where to send).
    let lower = text.to_lowercase();
    for id in &out.all_upi_ids {
        if let Some(pos) = lower.find(id.as_str()) {
            let lead = &lower[pos.saturating_sub(30)..pos];
            if lead.contains("from") && out.sender_upi.is_none() {
                out.sender_upi = Some(id.clone());
            }
        }
    }
    out.receiver_upi = out
        .all_upi_ids
        .iter()
        .find(|id| Some(id.as_str()) != out.sender_upi.as_deref())
        .cloned();

    // Phone numbers.
    for m in phone_re().find_iter(text) {
        // Not part of a longer digit run and not a UPI local part.
        let before_alnum = m.start() > 0
            && bytes[m.start() - 1].is_ascii_alphanumeric();
        let after = bytes.get(m.end()).copied();
        if before_alnum || after == Some(b'@') || after.map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            continue;
        }
        if bank_spans.iter().any(|&(s, e)| m.start() < e && m.end() > s) {
            continue;
        }
        let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
        let last10 = &digits[digits.len() - 10..];
        out.phone_numbers.push(format!("+91{last10}"));
    }
    out.phone_numbers = dedup_ordered(out.phone_numbers);

    // Amount — first pattern class that produces a valid value wins.
    'amount: for re in amount_res().iter() {
        for cap in re.captures_iter(text) {
            if let Some(m) = cap.get(1) {
                let cleaned = m.as_str().replace(',', "");
                if let Ok(n) = cleaned.parse::<f64>() {
                    if n > 0.0 && n < MAX_AMOUNT {
                        out.amount = Some(n);
                        break 'amount;
                    }
                }
            }
        }
    }

    // Links — explicit scheme first, then bare domain.tld forms.
    let mut url_spans: Vec<(usize, usize)> = Vec::new();
    for m in url_re().find_iter(text) {
        let trimmed = m.as_str().trim_end_matches(['.', ',', ')', ';', '!', '?']);
        url_spans.push((m.start(), m.end()));
        if !is_legit_host(trimmed) {
            out.links.push(trimmed.to_string());
        }
    }
    for m in bare_url_re().find_iter(text) {
        if url_spans.iter().any(|&(s, e)| m.start() < e && m.end() > s) {
            continue;
        }
        let prev = if m.start() > 0 { bytes.get(m.start() - 1).copied() } else { None };
        if prev == Some(b'@') || prev == Some(b'/') || prev == Some(b'.') {
            continue;
        }
        let trimmed = m.as_str().trim_end_matches(['.', ',', ')', ';', '!', '?']);
        if !is_legit_host(trimmed) {
            out.links.push(trimmed.to_string());
        }
    }
    out.links = dedup_ordered(out.links);

    // Quick keyword flags — the scorer does the real weighting.
    for kw in SUSPICIOUS_KEYWORDS {
        if lower.contains(kw) {
            out.fraud_indicators.push(format!("Suspicious keyword: {kw}"));
        }
    }

    out.transaction_type = if out.all_upi_ids.is_empty() { TxType::Unknown } else { TxType::P2p };
    out.source = TxSource::Sms;
    out
}

fn is_legit_host(link: &str) -> bool {
    let host = link
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .split('/')
        .next()
        .unwrap_or("");
    LEGIT_HOSTS.iter().any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

// ── LLM path ──────────────────────────────────────────────────────────────────

/// Full extraction: rule path, refined by the LLM when one is configured.
/// LLM scalar values win on conflict; list fields are unioned.
pub async fn extract(text: &str, llm: Option<&LlmClient>) -> Extraction {
    let mut out = extract_rules(text);
    let Some(llm) = llm else { return out };

    match llm.extract_identifiers(text).await {
        Some(ai) => {
            if let Some(s) = ai.sender_upi {
                out.sender_upi = Some(s.to_lowercase());
            }
            if let Some(r) = ai.receiver_upi {
                out.receiver_upi = Some(r.to_lowercase());
            }
            if let Some(a) = ai.amount {
                if a > 0.0 && a < MAX_AMOUNT {
                    out.amount = Some(a);
                }
            }
            out.all_upi_ids.extend(ai.upi_ids.into_iter().map(|u| u.to_lowercase()));
            out.all_upi_ids = dedup_ordered(out.all_upi_ids);
            out.phone_numbers.extend(ai.phone_numbers.into_iter().filter_map(normalize_phone));
            out.phone_numbers = dedup_ordered(out.phone_numbers);
            out.bank_accounts.extend(ai.bank_accounts);
            out.bank_accounts = dedup_ordered(out.bank_accounts);
            out.links.extend(ai.links);
            out.links = dedup_ordered(out.links);
            out.fraud_indicators.extend(ai.fraud_indicators);
            out.fraud_indicators = dedup_ordered(out.fraud_indicators);
            if ai.scam_type.is_some() {
                out.scam_type = ai.scam_type;
            }
            if let Some(t) = ai.transaction_type.as_deref() {
                out.transaction_type = match t.to_uppercase().as_str() {
                    "P2P" => TxType::P2p,
                    "P2M" => TxType::P2m,
                    "COLLECT" => TxType::Collect,
                    "REFUND" => TxType::Refund,
                    _ => out.transaction_type,
                };
            }
            out.ai_extracted = true;
        }
        None => debug!("LLM extraction unavailable, rule result stands"),
    }
    out
}

/// Accept the LLM's loose phone formats; emit `+91XXXXXXXXXX` or nothing.
fn normalize_phone(raw: String) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    let last10 = &digits[digits.len() - 10..];
    if !matches!(last10.as_bytes()[0], b'6'..=b'9') {
        return None;
    }
    Some(format!("+91{last10}"))
}
