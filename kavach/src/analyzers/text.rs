// kavach/src/analyzers/text.rs
//
// Scam text classifier — weighted category lexicon over the raw message.
//
// Aho-Corasick automaton over all category keywords, O(n) per message.
// Each category counts once; the rule score is the capped weight sum.
// Keywords are phrase-anchored where a bare stem would misfire on benign
// morphology ("send " does not match "sending").
//
// Fusion order: lexicon → LLM verdict → URL increment → OTP increment.
// When the lexicon alone clears 0.4, an LLM "not scam" verdict is
// overridden — rule dominates.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

use crate::analyzers::{otp, url};
use crate::clients::llm::LlmClient;
use crate::store::phishing::PhishingStore;
use crate::types::dedup_ordered;

// ── Category lexicon ──────────────────────────────────────────────────────────

pub struct Category {
    pub name:     &'static str,
    pub weight:   f32,
    pub keywords: &'static [&'static str],
}

pub const LEXICON: &[Category] = &[
    Category {
        name: "urgency",
        weight: 0.4,
        keywords: &[
            "urgent", "immediately", "right now", "act now", "expire",
            "last chance", "within 24 hours", "asap", "jaldi", "turant",
        ],
    },
    Category {
        name: "threats",
        weight: 0.5,
        keywords: &[
            "blocked", "suspended", "legal action", "police", "arrest",
            "court", "lawsuit", "penalty", "account will be closed",
        ],
    },
    Category {
        name: "financialRequest",
        weight: 0.5,
        keywords: &[
            "send ", "pay me", "pay now", "transfer ", "upi pin",
            "processing fee", "registration fee", "advance payment",
            "google pay", "phonepe number", "paytm number",
        ],
    },
    Category {
        name: "impersonation",
        weight: 0.4,
        keywords: &[
            "bank officer", "customer care", "rbi", "income tax", "customs",
            "kyc team", "army", "courier company", "electricity board",
        ],
    },
    Category {
        name: "rewards",
        weight: 0.3,
        keywords: &[
            "lottery", "prize", "winner", "cashback", "lucky draw",
            "congratulations", "you have been selected", "gift card", "reward",
        ],
    },
    Category {
        name: "verification",
        weight: 0.3,
        keywords: &[
            "verify", "kyc", "confirm your", "update your", "validate",
            "re-activate", "reactivate", "otp",
        ],
    },
    Category {
        name: "jobScam",
        weight: 0.5,
        keywords: &[
            "work from home", "part time job", "earn daily", "per day salary",
            "telegram task", "easy income", "no experience needed", "hiring now",
        ],
    },
];

fn lexicon_ac() -> &'static (AhoCorasick, Vec<usize>) {
    static AC: OnceLock<(AhoCorasick, Vec<usize>)> = OnceLock::new();
    AC.get_or_init(|| {
        let mut patterns: Vec<&str> = Vec::new();
        let mut cat_of: Vec<usize> = Vec::new();
        for (idx, cat) in LEXICON.iter().enumerate() {
            for kw in cat.keywords {
                patterns.push(kw);
                cat_of.push(idx);
            }
        }
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .expect("lexicon automaton build failed");
        (ac, cat_of)
    })
}

// ── Rule scan ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RuleScan {
    pub score:      f32,
    pub categories: Vec<&'static str>,
    pub indicators: Vec<String>,
}

pub fn rule_scan(text: &str) -> RuleScan {
    let (ac, cat_of) = lexicon_ac();

    let mut hit: BTreeSet<usize> = BTreeSet::new();
    for m in ac.find_overlapping_iter(text) {
        hit.insert(cat_of[m.pattern().as_usize()]);
    }

    let mut score = 0.0f32;
    let mut categories = Vec::new();
    let mut indicators = Vec::new();
    for idx in hit {
        let cat = &LEXICON[idx];
        score += cat.weight;
        categories.push(cat.name);
        indicators.push(format!("Scam language: {}", cat.name));
    }

    RuleScan { score: score.min(1.0), categories, indicators }
}

// ── Full analysis ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TextAnalysis {
    pub is_scam:    bool,
    pub confidence: f32,
    pub scam_type:  Option<String>,
    pub indicators: Vec<String>,
    pub reasoning:  String,
}

pub async fn analyze(
    text: &str,
    llm: Option<&LlmClient>,
    phishing: &PhishingStore,
    threshold: f32,
) -> TextAnalysis {
    let rule = rule_scan(text);
    let mut confidence = rule.score;
    let mut indicators = rule.indicators.clone();
    let mut scam_type: Option<String> = top_category(&rule);
    let mut reasoning = if rule.categories.is_empty() {
        "No scam language detected".to_string()
    } else {
        format!("Scam language categories: {}", rule.categories.join(", "))
    };

    if let Some(llm) = llm {
        match llm.classify_message(text).await {
            Some(v) => {
                let llm_score = if v.is_scam { v.confidence.clamp(0.0, 1.0) } else { 0.0 };
                if rule.score > 0.4 && !v.is_scam {
                    // Rule evidence dominates a dissenting LLM.
                    confidence = rule.score;
                } else {
                    confidence = confidence.max(llm_score);
                }
                indicators.extend(v.indicators);
                if v.scam_type.is_some() {
                    scam_type = v.scam_type;
                }
                if !v.reasoning.is_empty() {
                    reasoning = format!("{reasoning}; {}", v.reasoning);
                }
            }
            None => debug!("LLM message classification unavailable"),
        }
    }

    let url_risk = url::analyze(text, phishing);
    confidence += url_risk.increment as f32 / 100.0;
    indicators.extend(url_risk.indicators);

    let otp_risk = otp::analyze(text);
    confidence += otp_risk.increment as f32 / 100.0;
    indicators.extend(otp_risk.indicators);

    let confidence = ((confidence * 100.0).round() / 100.0).min(1.0);

    TextAnalysis {
        is_scam:    confidence >= threshold,
        confidence,
        scam_type,
        indicators: dedup_ordered(indicators),
        reasoning,
    }
}

/// Highest-weight category among the hits.
fn top_category(rule: &RuleScan) -> Option<String> {
    rule.categories
        .iter()
        .max_by(|a, b| {
            let wa = LEXICON.iter().find(|c| c.name == **a).map(|c| c.weight).unwrap_or(0.0);
            let wb = LEXICON.iter().find(|c| c.name == **b).map(|c| c.weight).unwrap_or(0.0);
            wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|s| (*s).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kyc_scam_maxes_out() {
        let text = "Dear Customer, your SBI account will be blocked. Complete KYC \
            immediately by sending Rs 9,999 to 9876543210@ybl or click \
            http://sbi-kyc-update.xyz. Call 8765432109 for help.";
        let a = analyze(text, None, &PhishingStore::new(), 0.4).await;
        assert!(a.is_scam);
        assert!((a.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn friendly_dinner_message_is_clean() {
        let a = analyze(
            "Hi Priya, sending Rs 500 for dinner. My UPI: amit@oksbi.",
            None,
            &PhishingStore::new(),
            0.4,
        )
        .await;
        assert!(!a.is_scam);
        assert!(a.confidence < 0.4, "confidence was {}", a.confidence);
    }

    #[tokio::test]
    async fn pay_me_request_lands_midband() {
        let a = analyze("please pay me 500 for the book", None, &PhishingStore::new(), 0.4).await;
        assert!((a.confidence - 0.5).abs() < f32::EPSILON);
        assert!(a.is_scam);
    }

    #[test]
    fn sending_does_not_trigger_financial_request() {
        let scan = rule_scan("I am sending the documents tomorrow");
        assert!(!scan.categories.contains(&"financialRequest"));
    }

    #[test]
    fn each_category_counts_once() {
        let scan = rule_scan("urgent urgent urgent act now immediately");
        assert!((scan.score - 0.4).abs() < f32::EPSILON);
        assert_eq!(scan.categories, vec!["urgency"]);
    }

    #[test]
    fn score_caps_at_one() {
        let scan = rule_scan(
            "urgent: account blocked, pay now the processing fee, you are a lottery \
             winner, verify kyc, bank officer calling, work from home hiring now",
        );
        assert!((scan.score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn otp_boost_raises_confidence() {
        let clean = analyze("hello there friend", None, &PhishingStore::new(), 0.4).await;
        assert_eq!(clean.confidence, 0.0);

        let otp = analyze("please share otp 123456", None, &PhishingStore::new(), 0.4).await;
        assert!(otp.confidence >= 0.4);
        assert!(otp.is_scam);
    }

    #[tokio::test]
    async fn confidence_rounds_to_two_decimals() {
        let a = analyze("see https://example.org/page", None, &PhishingStore::new(), 0.4).await;
        assert!((a.confidence - 0.05).abs() < f32::EPSILON);
    }
}
