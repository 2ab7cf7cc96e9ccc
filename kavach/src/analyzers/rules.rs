// kavach/src/analyzers/rules.rs
//
// Transaction rule scorer — fixed pattern library over a normalized
// transaction, plus the fraud-category classifier.
//
// Each pattern contributes a fixed weight; the sum is capped at 100.
// Severity buckets: weight ≥ 15 HIGH, ≥ 10 MEDIUM, else LOW.

use chrono::Timelike;
use tracing::debug;

use crate::clients::llm::LlmClient;
use crate::types::{
    FraudCategory, RuleIndicator, Severity, Transaction, TxSource, TxType,
};

/// Keywords that mark a description as scam-adjacent. Shared with the
/// extractor's quick-flag pass.
pub const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "urgent", "immediately", "otp", "kyc", "verify", "blocked", "suspended",
    "lottery", "prize", "winner", "claim", "refund", "cashback", "reward",
    "lucky", "selected", "offer", "fine", "penalty", "police", "arrest",
    "court", "legal",
];

// ── Pattern library ───────────────────────────────────────────────────────────

struct Pattern {
    id:        &'static str,
    label:     &'static str,
    weight:    u8,
    predicate: fn(&Transaction) -> bool,
}

const PATTERNS: &[Pattern] = &[
    Pattern {
        id: "highAmount",
        label: "Amount above ₹50,000",
        weight: 15,
        predicate: |t| t.amount > 50_000.0,
    },
    Pattern {
        id: "veryHighAmount",
        label: "Amount above ₹2,00,000",
        weight: 25,
        predicate: |t| t.amount > 200_000.0,
    },
    Pattern {
        id: "roundAmount",
        label: "Suspiciously round amount",
        weight: 5,
        predicate: |t| t.amount >= 1000.0 && (t.amount % 1000.0).abs() < f64::EPSILON,
    },
    Pattern {
        id: "midnightTransaction",
        label: "Transaction between midnight and 5 AM",
        weight: 15,
        predicate: |t| t.timestamp.hour() < 5,
    },
    Pattern {
        id: "lateNightTransaction",
        label: "Late-night transaction",
        weight: 8,
        predicate: |t| {
            let h = t.timestamp.hour();
            h >= 22 || h < 6
        },
    },
    Pattern {
        id: "newPayee",
        label: "First payment to this payee",
        weight: 12,
        predicate: |t| t.is_new_payee,
    },
    Pattern {
        id: "suspiciousDescription",
        label: "Description contains scam keywords",
        weight: 20,
        predicate: |t| {
            let d = t.description.to_lowercase();
            SUSPICIOUS_KEYWORDS.iter().any(|kw| d.contains(kw))
        },
    },
    Pattern {
        id: "p2pLargeTransfer",
        label: "Large P2P transfer",
        weight: 8,
        predicate: |t| t.tx_type == TxType::P2p && t.amount > 10_000.0,
    },
    Pattern {
        id: "rapidSuccession",
        label: "Several transactions in quick succession",
        weight: 18,
        predicate: |t| t.is_rapid,
    },
    Pattern {
        id: "autoGeneratedUPI",
        label: "Receiver UPI looks auto-generated",
        weight: 10,
        predicate: |t| {
            t.receiver_upi
                .as_deref()
                .and_then(|u| u.split('@').next())
                .map(|local| {
                    local.chars().take_while(|c| c.is_ascii_digit()).count() > 8
                })
                .unwrap_or(false)
        },
    },
    Pattern {
        id: "qrCodeTransaction",
        label: "Payment initiated from a QR scan",
        weight: 10,
        predicate: |t| t.source == TxSource::QrScan,
    },
];

#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub score:      u8,
    pub indicators: Vec<RuleIndicator>,
    pub category:   Option<FraudCategory>,
    pub reasoning:  String,
}

impl RuleOutcome {
    pub fn indicator_labels(&self) -> Vec<String> {
        self.indicators.iter().map(|i| i.label.clone()).collect()
    }
}

pub fn analyze(tx: &Transaction) -> RuleOutcome {
    let mut total: u32 = 0;
    let mut indicators = Vec::new();

    for p in PATTERNS {
        if (p.predicate)(tx) {
            total += p.weight as u32;
            indicators.push(RuleIndicator {
                id:       p.id.to_string(),
                label:    p.label.to_string(),
                severity: severity_of(p.weight),
            });
        }
    }

    let score = total.min(100) as u8;
    let category = classify_category(tx);
    let reasoning = if indicators.is_empty() {
        "No risk patterns triggered".to_string()
    } else {
        format!(
            "{} risk pattern(s) triggered: {}",
            indicators.len(),
            indicators.iter().map(|i| i.id.as_str()).collect::<Vec<_>>().join(", ")
        )
    };

    RuleOutcome { score, indicators, category, reasoning }
}

fn severity_of(weight: u8) -> Severity {
    match weight {
        w if w >= 15 => Severity::High,
        w if w >= 10 => Severity::Medium,
        _ => Severity::Low,
    }
}

// ── Fraud-category taxonomy ───────────────────────────────────────────────────

pub struct CategoryDef {
    pub name:     &'static str,
    pub icon:     &'static str,
    pub keywords: &'static [&'static str],
}

pub const CATEGORIES: &[CategoryDef] = &[
    CategoryDef {
        name: "PHISHING",
        icon: "🎣",
        keywords: &["link", "click", "verify", "kyc", "update", "blocked", "suspended", "bank", "login"],
    },
    CategoryDef {
        name: "QR_SCAM",
        icon: "📷",
        keywords: &["qr", "scan", "code"],
    },
    CategoryDef {
        name: "OTP_FRAUD",
        icon: "🔐",
        keywords: &["otp", "one time password", "verification code", "pin"],
    },
    CategoryDef {
        name: "VISHING",
        icon: "📞",
        keywords: &["call", "phone", "customer care", "helpline", "executive"],
    },
    CategoryDef {
        name: "LOTTERY_SCAM",
        icon: "🎰",
        keywords: &["lottery", "prize", "winner", "lucky", "draw", "claim", "congratulations"],
    },
    CategoryDef {
        name: "JOB_SCAM",
        icon: "💼",
        keywords: &["job", "salary", "work from home", "part time", "hiring", "earn"],
    },
    CategoryDef {
        name: "IMPERSONATION",
        icon: "🎭",
        keywords: &["officer", "police", "rbi", "income tax", "customs", "bank manager", "army"],
    },
    CategoryDef {
        name: "REMOTE_ACCESS",
        icon: "🖥️",
        keywords: &["anydesk", "teamviewer", "screen share", "remote access", "install app"],
    },
    CategoryDef {
        name: "INVESTMENT_SCAM",
        icon: "📈",
        keywords: &["investment", "trading", "returns", "profit", "double your", "crypto", "stock"],
    },
];

pub fn category_by_name(name: &str) -> Option<FraudCategory> {
    CATEGORIES
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .map(|c| FraudCategory::new(c.name, c.icon))
}

/// Best-matching taxonomy entry by keyword overlap over the transaction's
/// text surface. A QR-sourced transaction is always QR_SCAM.
pub fn classify_category(tx: &Transaction) -> Option<FraudCategory> {
    if tx.source == TxSource::QrScan {
        return category_by_name("QR_SCAM");
    }

    let haystack = format!(
        "{} {} {} {}",
        tx.sender_upi.as_deref().unwrap_or(""),
        tx.receiver_upi.as_deref().unwrap_or(""),
        tx.description,
        tx.source,
    )
    .to_lowercase();

    let mut best: Option<(&CategoryDef, usize)> = None;
    for def in CATEGORIES {
        let hits = def.keywords.iter().filter(|kw| haystack.contains(*kw)).count();
        if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
            best = Some((def, hits));
        }
    }
    best.map(|(def, _)| FraudCategory::new(def.name, def.icon))
}

// ── LLM augmentation ──────────────────────────────────────────────────────────

/// Rule scoring plus an optional LLM assessment. The final score is the max
/// of both; LLM indicators are appended. Any LLM failure leaves the rule
/// outcome untouched.
pub async fn analyze_with_llm(tx: &Transaction, llm: Option<&LlmClient>) -> RuleOutcome {
    let mut outcome = analyze(tx);
    let Some(llm) = llm else { return outcome };

    match llm.assess_transaction(tx).await {
        Some(ai) => {
            if ai.risk_score > outcome.score {
                outcome.score = ai.risk_score.min(100);
            }
            for ind in ai.indicators {
                outcome.indicators.push(RuleIndicator {
                    id:       "llmAssessment".to_string(),
                    label:    ind,
                    severity: if ai.is_high_risk { Severity::High } else { Severity::Medium },
                });
            }
            if outcome.category.is_none() {
                outcome.category = ai.fraud_category;
            }
            if !ai.reasoning.is_empty() {
                outcome.reasoning = format!("{}; {}", outcome.reasoning, ai.reasoning);
            }
        }
        None => debug!("LLM transaction assessment unavailable"),
    }
    outcome
}
