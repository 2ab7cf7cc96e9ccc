// kavach/src/types.rs
//
// Shared domain types flowing through the fraud-defense pipeline.
// Wire JSON keeps the camelCase field names the mobile/web clients expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Incoming chat text is clipped to this many characters before processing.
pub const MAX_CHAT_TEXT: usize = 4000;

// ── Risk bands ────────────────────────────────────────────────────────────────

pub const BAND_CRITICAL: u8 = 85;
pub const BAND_HIGH: u8 = 70;
pub const BAND_MEDIUM: u8 = 40;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel { Low, Medium, High, Critical }

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= BAND_CRITICAL => Self::Critical,
            s if s >= BAND_HIGH     => Self::High,
            s if s >= BAND_MEDIUM   => Self::Medium,
            _                       => Self::Low,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low      => write!(f, "LOW"),
            Self::Medium   => write!(f, "MEDIUM"),
            Self::High     => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

// ── Transactions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType { P2p, P2m, Collect, Refund, Unknown }

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxSource {
    Sms, Whatsapp, Email, AppNotification, PhoneCall, QrScan, Link, UserPay, Unknown,
}

impl std::fmt::Display for TxSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sms             => write!(f, "SMS"),
            Self::Whatsapp        => write!(f, "WHATSAPP"),
            Self::Email           => write!(f, "EMAIL"),
            Self::AppNotification => write!(f, "APP_NOTIFICATION"),
            Self::PhoneCall       => write!(f, "PHONE_CALL"),
            Self::QrScan          => write!(f, "QR_SCAN"),
            Self::Link            => write!(f, "LINK"),
            Self::UserPay         => write!(f, "USER_PAY"),
            Self::Unknown         => write!(f, "UNKNOWN"),
        }
    }
}

/// Normalized transaction handed to the rule scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "senderUPI")]
    pub sender_upi:   Option<String>,
    #[serde(rename = "receiverUPI")]
    pub receiver_upi: Option<String>,
    pub amount:       f64,
    #[serde(rename = "type")]
    pub tx_type:      TxType,
    pub description:  String,
    pub source:       TxSource,
    pub is_new_payee: bool,
    /// Set by callers that track turn cadence (several turns inside a minute).
    #[serde(default)]
    pub is_rapid:     bool,
    pub timestamp:    DateTime<Utc>,
}

impl Transaction {
    pub fn new(amount: f64, source: TxSource) -> Self {
        Self {
            sender_upi:   None,
            receiver_upi: None,
            amount:       amount.max(0.0),
            tx_type:      TxType::Unknown,
            description:  String::new(),
            source,
            is_new_payee: true,
            is_rapid:     false,
            timestamp:    Utc::now(),
        }
    }
}

// ── Verdicts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FraudCategory {
    pub name: String,
    pub icon: String,
}

impl FraudCategory {
    pub fn new(name: &str, icon: &str) -> Self {
        Self { name: name.to_string(), icon: icon.to_string() }
    }
}

/// The single verdict shape every entry point returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskVerdict {
    pub risk_score:          u8,
    pub risk_level:          RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_category:      Option<FraudCategory>,
    pub indicators:          Vec<String>,
    pub recommended_actions: Vec<String>,
    pub reasoning:           String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_probability:      Option<f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity { Low, Medium, High }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleIndicator {
    pub id:       String,
    pub label:    String,
    pub severity: Severity,
}

// ── Chat ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole { Scammer, Honeypot, Victim }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender:              ChatRole,
    pub text:                String,
    pub delivered_to_victim: bool,
    pub timestamp:           DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: ChatRole, text: &str, delivered: bool) -> Self {
        Self {
            sender,
            text: text.to_string(),
            delivered_to_victim: delivered,
            timestamp: Utc::now(),
        }
    }
}

/// Identifier sets harvested across a conversation. BTreeSet keeps projection
/// output stable across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDetails {
    pub upi_ids:       BTreeSet<String>,
    pub phone_numbers: BTreeSet<String>,
    pub links:         BTreeSet<String>,
    pub bank_accounts: BTreeSet<String>,
}

impl ExtractedDetails {
    pub fn absorb(&mut self, ex: &Extraction) {
        self.upi_ids.extend(ex.all_upi_ids.iter().cloned());
        self.phone_numbers.extend(ex.phone_numbers.iter().cloned());
        self.links.extend(ex.links.iter().cloned());
        self.bank_accounts.extend(ex.bank_accounts.iter().cloned());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id:           String,
    pub scammer_id:           String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_id:            Option<String>,
    pub messages:             Vec<ChatMessage>,
    pub extracted_details:    ExtractedDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_risk:            Option<RiskVerdict>,
    pub diverted_to_honeypot: bool,
    pub is_scam_confirmed:    bool,
    pub created_at:           DateTime<Utc>,
}

impl ChatSession {
    pub fn new(session_id: &str, scammer_id: &str, victim_id: Option<String>) -> Self {
        Self {
            session_id:           session_id.to_string(),
            scammer_id:           scammer_id.to_string(),
            victim_id,
            messages:             Vec::new(),
            extracted_details:    ExtractedDetails::default(),
            last_risk:            None,
            diverted_to_honeypot: false,
            is_scam_confirmed:    false,
            created_at:           Utc::now(),
        }
    }

    pub fn scammer_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.sender == ChatRole::Scammer).count()
    }
}

// ── Blacklist ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    pub scammer_id:    String,
    pub upi_ids:       BTreeSet<String>,
    pub phone_numbers: BTreeSet<String>,
    pub reason:        String,
    pub added_at:      DateTime<Utc>,
}

// ── Extraction (message parser output) ────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    #[serde(rename = "senderUPI")]
    pub sender_upi:       Option<String>,
    #[serde(rename = "receiverUPI")]
    pub receiver_upi:     Option<String>,
    pub all_upi_ids:      Vec<String>,
    pub amount:           Option<f64>,
    pub phone_numbers:    Vec<String>,
    pub bank_accounts:    Vec<String>,
    pub links:            Vec<String>,
    pub transaction_type: TxType,
    pub source:           TxSource,
    pub description:      String,
    pub is_new_payee:     bool,
    pub fraud_indicators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scam_type:        Option<String>,
    #[serde(skip_serializing)]
    pub raw_message:      String,
    pub ai_extracted:     bool,
}

impl Extraction {
    pub fn empty(raw: &str) -> Self {
        Self {
            sender_upi:       None,
            receiver_upi:     None,
            all_upi_ids:      Vec::new(),
            amount:           None,
            phone_numbers:    Vec::new(),
            bank_accounts:    Vec::new(),
            links:            Vec::new(),
            transaction_type: TxType::Unknown,
            source:           TxSource::Unknown,
            description:      raw.to_string(),
            is_new_payee:     true,
            fraud_indicators: Vec::new(),
            scam_type:        None,
            raw_message:      raw.to_string(),
            ai_extracted:     false,
        }
    }

    /// Build the transaction the rule scorer sees for this message.
    pub fn to_transaction(&self, source: TxSource) -> Transaction {
        Transaction {
            sender_upi:   self.sender_upi.clone(),
            receiver_upi: self.receiver_upi.clone()
                .or_else(|| self.all_upi_ids.first().cloned()),
            amount:       self.amount.unwrap_or(0.0),
            tx_type:      self.transaction_type,
            description:  self.description.clone(),
            source,
            is_new_payee: self.is_new_payee,
            is_rapid:     false,
            timestamp:    Utc::now(),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// De-duplicate preserving first-occurrence order.
pub fn dedup_ordered(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Truncate on a char boundary.
pub fn clip_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_match_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(84), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn tx_enums_serialize_to_wire_names() {
        assert_eq!(serde_json::to_string(&TxType::P2p).unwrap(), "\"P2P\"");
        assert_eq!(serde_json::to_string(&TxSource::QrScan).unwrap(), "\"QR_SCAN\"");
        assert_eq!(serde_json::to_string(&TxSource::AppNotification).unwrap(),
                   "\"APP_NOTIFICATION\"");
        assert_eq!(serde_json::to_string(&ChatRole::Honeypot).unwrap(), "\"honeypot\"");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let v = dedup_ordered(vec!["a".into(), "b".into(), "a".into(), "c".into()]);
        assert_eq!(v, vec!["a", "b", "c"]);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip_chars("₹₹₹₹", 2), "₹₹");
        assert_eq!(clip_chars("abc", 10), "abc");
    }

    #[test]
    fn verdict_serializes_camel_case() {
        let v = RiskVerdict {
            risk_score:          42,
            risk_level:          RiskLevel::Medium,
            fraud_category:      None,
            indicators:          vec![],
            recommended_actions: vec![],
            reasoning:           String::new(),
            ml_probability:      None,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("riskScore").is_some());
        assert!(json.get("riskLevel").is_some());
        assert!(json.get("recommendedActions").is_some());
        assert!(json.get("fraudCategory").is_none());
    }
}
