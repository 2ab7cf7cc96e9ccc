// kavach/src/clients/llm.rs
//
// OpenAI-compatible chat-completions client.
//
// Every call is best-effort: network faults, provider errors, and malformed
// model output all collapse to None and the caller proceeds on rule signals
// alone. Model output is requested as strict JSON but parsed leniently
// (code fences stripped, loose field types coerced).

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::analyzers::rules::category_by_name;
use crate::types::{FraudCategory, Transaction};

pub struct LlmClient {
    client:   Client,
    base_url: String,
    api_key:  String,
    model:    String,
}

// ── Structured outputs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LlmExtraction {
    pub sender_upi:       Option<String>,
    pub receiver_upi:     Option<String>,
    pub upi_ids:          Vec<String>,
    pub amount:           Option<f64>,
    pub phone_numbers:    Vec<String>,
    pub bank_accounts:    Vec<String>,
    pub links:            Vec<String>,
    pub transaction_type: Option<String>,
    pub scam_type:        Option<String>,
    pub fraud_indicators: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LlmTextVerdict {
    pub is_scam:    bool,
    pub confidence: f32,
    pub scam_type:  Option<String>,
    pub indicators: Vec<String>,
    pub reasoning:  String,
}

#[derive(Debug, Clone)]
pub struct LlmTxAssessment {
    pub risk_score:     u8,
    pub is_high_risk:   bool,
    pub fraud_category: Option<FraudCategory>,
    pub reasoning:      String,
    pub indicators:     Vec<String>,
}

// ── Client ────────────────────────────────────────────────────────────────────

impl LlmClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("kavach/0.4")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key:  api_key.to_string(),
            model:    model.to_string(),
        })
    }

    async fn chat(&self, system: &str, user: &str) -> Option<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| warn!("LLM request failed: {e}"))
            .ok()?;

        if !resp.status().is_success() {
            warn!("LLM provider returned {}", resp.status());
            return None;
        }

        let v: Value = resp.json().await.map_err(|e| warn!("LLM body parse: {e}")).ok()?;
        v.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
    }

    async fn chat_json(&self, system: &str, user: &str) -> Option<Value> {
        let content = self.chat(system, user).await?;
        let stripped = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        match serde_json::from_str(stripped) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("LLM returned non-JSON content: {e}");
                None
            }
        }
    }

    // ── Task prompts ──────────────────────────────────────────────────────────

    pub async fn extract_identifiers(&self, text: &str) -> Option<LlmExtraction> {
        let system = "You extract payment identifiers from Indian UPI-related messages. \
            Respond with ONLY a JSON object with keys: senderUPI, receiverUPI, upiIds, \
            amount, phoneNumbers, bankAccounts, links, transactionType \
            (P2P|P2M|COLLECT|REFUND|UNKNOWN), scamType, fraudIndicators. \
            Use null for unknown scalars and [] for empty lists.";
        let v = self.chat_json(system, text).await?;

        Some(LlmExtraction {
            sender_upi:       str_field(&v, "senderUPI"),
            receiver_upi:     str_field(&v, "receiverUPI"),
            upi_ids:          list_field(&v, "upiIds"),
            amount:           num_field(&v, "amount"),
            phone_numbers:    list_field(&v, "phoneNumbers"),
            bank_accounts:    list_field(&v, "bankAccounts"),
            links:            list_field(&v, "links"),
            transaction_type: str_field(&v, "transactionType"),
            scam_type:        str_field(&v, "scamType"),
            fraud_indicators: list_field(&v, "fraudIndicators"),
        })
    }

    pub async fn classify_message(&self, text: &str) -> Option<LlmTextVerdict> {
        let system = "You classify Indian payment-related messages as scam or legitimate. \
            Respond with ONLY a JSON object: {\"isScam\": bool, \"confidence\": 0..1, \
            \"scamType\": string|null, \"indicators\": [string], \"reasoning\": string}.";
        let v = self.chat_json(system, text).await?;

        Some(LlmTextVerdict {
            is_scam:    bool_field(&v, "isScam"),
            confidence: num_field(&v, "confidence").unwrap_or(0.0) as f32,
            scam_type:  str_field(&v, "scamType"),
            indicators: list_field(&v, "indicators"),
            reasoning:  str_field(&v, "reasoning").unwrap_or_default(),
        })
    }

    pub async fn assess_transaction(&self, tx: &Transaction) -> Option<LlmTxAssessment> {
        let system = "You assess UPI transactions for fraud risk. Respond with ONLY a \
            JSON object: {\"riskScore\": 0..100, \"isHighRisk\": bool, \
            \"fraudCategory\": string|{\"name\":string,\"icon\":string}|null, \
            \"reasoning\": string, \"indicators\": [string], \
            \"recommendedAction\": string, \"confidence\": 0..1}.";
        let user = format!(
            "receiver={} amount=₹{} type={:?} newPayee={} description={:?}",
            tx.receiver_upi.as_deref().unwrap_or("unknown"),
            tx.amount,
            tx.tx_type,
            tx.is_new_payee,
            tx.description,
        );
        let v = self.chat_json(system, &user).await?;

        Some(LlmTxAssessment {
            risk_score:     num_field(&v, "riskScore").unwrap_or(0.0).clamp(0.0, 100.0) as u8,
            is_high_risk:   bool_field(&v, "isHighRisk"),
            fraud_category: category_field(&v),
            reasoning:      str_field(&v, "reasoning").unwrap_or_default(),
            indicators:     list_field(&v, "indicators"),
        })
    }

    /// Free-form honeypot reply — plain text, not JSON.
    pub async fn honeypot_reply(
        &self,
        scammer_message: &str,
        history_tail: &[String],
        stage: &str,
    ) -> Option<String> {
        let system = format!(
            "You are an ordinary Indian person replying to a suspicious payment \
             conversation on chat. Current demeanor: {stage}. Reply in 2-4 short \
             sentences of simple Indian English. Never confirm any payment, never \
             reveal you suspect anything, never share an OTP or PIN, and ask one \
             natural follow-up question. Respond with the reply text only."
        );
        let user = if history_tail.is_empty() {
            scammer_message.to_string()
        } else {
            format!(
                "Earlier messages:\n{}\n\nLatest message: {scammer_message}",
                history_tail.join("\n")
            )
        };
        self.chat(&system, &user).await.map(|s| s.trim().to_string())
    }
}

// ── Lenient JSON field access ─────────────────────────────────────────────────

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)?.as_str().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn num_field(v: &Value, key: &str) -> Option<f64> {
    match v.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_field(v: &Value, key: &str) -> bool {
    match v.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn list_field(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|e| e.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// `fraudCategory` arrives as either a bare string or a {name, icon} object.
fn category_field(v: &Value) -> Option<FraudCategory> {
    match v.get("fraudCategory")? {
        Value::String(s) => {
            category_by_name(s).or_else(|| Some(FraudCategory::new(s, "⚠️")))
        }
        Value::Object(o) => {
            let name = o.get("name")?.as_str()?;
            let icon = o.get("icon").and_then(Value::as_str).unwrap_or("⚠️");
            Some(FraudCategory::new(name, icon))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_field_accepts_both_shapes() {
        let obj: Value =
            serde_json::json!({ "fraudCategory": { "name": "PHISHING", "icon": "🎣" } });
        assert_eq!(category_field(&obj).unwrap().name, "PHISHING");

        let loose: Value = serde_json::json!({ "fraudCategory": "OTP_FRAUD" });
        let cat = category_field(&loose).unwrap();
        assert_eq!(cat.name, "OTP_FRAUD");
        assert_eq!(cat.icon, "🔐");

        let unknown: Value = serde_json::json!({ "fraudCategory": "NOVEL_SCAM" });
        assert_eq!(category_field(&unknown).unwrap().icon, "⚠️");
    }

    #[test]
    fn lenient_fields_coerce_strings() {
        let v: Value = serde_json::json!({
            "confidence": "0.85", "isScam": "true", "amount": 42,
            "indicators": ["a", "b"],
        });
        assert_eq!(num_field(&v, "confidence"), Some(0.85));
        assert!(bool_field(&v, "isScam"));
        assert_eq!(num_field(&v, "amount"), Some(42.0));
        assert_eq!(list_field(&v, "indicators"), vec!["a", "b"]);
        assert_eq!(str_field(&v, "missing"), None);
    }
}
