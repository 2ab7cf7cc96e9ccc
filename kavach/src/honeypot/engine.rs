// kavach/src/honeypot/engine.rs
//
// Standalone honeypot engine — in-memory sessions for the single-turn
// /honeypot endpoint. No persistence: these sessions exist to keep a
// scammer typing while intelligence accumulates, and evaporate after
// 30 idle minutes.
//
// Monotonic flags: scam_detected and callback_sent only ever go up, so a
// re-delivered turn cannot un-detect a scam or re-arm the callback.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::analyzers::text;
use crate::clients::llm::LlmClient;
use crate::extract;
use crate::honeypot::persona;
use crate::metrics::Metrics;
use crate::store::phishing::PhishingStore;

const SWEEP_INTERVAL_SECS: u64 = 300;
const CALLBACK_TIMEOUT_SECS: u64 = 5;
const MAX_SESSIONS: usize = 10_000;
const HISTORY_TAIL: usize = 6;

// ── Session state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub sender:    String,
    pub text:      String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intelligence {
    pub bank_accounts:       BTreeSet<String>,
    pub upi_ids:             BTreeSet<String>,
    pub phishing_links:      BTreeSet<String>,
    pub phone_numbers:       BTreeSet<String>,
    pub suspicious_keywords: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoneypotSession {
    pub session_id:             String,
    pub created_at:             DateTime<Utc>,
    pub last_activity:          DateTime<Utc>,
    pub scam_scores:            Vec<f32>,
    pub scam_detected:          bool,
    pub scam_confidence:        f32,
    pub message_count:          usize,
    pub conversation_history:   Vec<HistoryEntry>,
    pub extracted_intelligence: Intelligence,
    pub tactics:                BTreeSet<String>,
    pub agent_notes:            Vec<String>,
    pub callback_sent:          bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scam_type:              Option<String>,
    pub metadata:               Value,
}

impl HoneypotSession {
    fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id:             session_id.to_string(),
            created_at:             now,
            last_activity:          now,
            scam_scores:            Vec::new(),
            scam_detected:          false,
            scam_confidence:        0.0,
            message_count:          0,
            conversation_history:   Vec::new(),
            extracted_intelligence: Intelligence::default(),
            tactics:                BTreeSet::new(),
            agent_notes:            Vec::new(),
            callback_sent:          false,
            scam_type:              None,
            metadata:               Value::Null,
        }
    }

    fn mean_score(&self) -> f32 {
        if self.scam_scores.is_empty() {
            0.0
        } else {
            self.scam_scores.iter().sum::<f32>() / self.scam_scores.len() as f32
        }
    }

    fn absorb_intelligence(&mut self, text: &str) {
        let ex = extract::extract_rules(text);
        let intel = &mut self.extracted_intelligence;
        intel.upi_ids.extend(ex.all_upi_ids);
        intel.phone_numbers.extend(ex.phone_numbers);
        intel.bank_accounts.extend(ex.bank_accounts);
        intel.phishing_links.extend(ex.links);

        let lower = text.to_lowercase();
        for kw in crate::analyzers::rules::SUSPICIOUS_KEYWORDS {
            if lower.contains(kw) {
                intel.suspicious_keywords.insert(kw.to_string());
            }
        }
    }

    fn record_tactics(&mut self) {
        for (tactic, keywords) in TACTIC_KEYWORDS {
            let seen = self
                .conversation_history
                .iter()
                .filter(|h| h.sender == "scammer")
                .any(|h| {
                    let lower = h.text.to_lowercase();
                    keywords.iter().any(|kw| lower.contains(kw))
                });
            if seen && self.tactics.insert(tactic.to_string()) {
                self.agent_notes.push(format!("Observed tactic: {tactic}"));
            }
        }
    }
}

const TACTIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("urgency", &["urgent", "immediately", "hurry", "act now", "right now", "jaldi"]),
    ("threats", &["blocked", "police", "arrest", "legal", "suspend", "court"]),
    ("information_request", &["otp", "pin", "password", "account number", "card number", "cvv", "aadhaar"]),
    ("reward_bait", &["lottery", "prize", "winner", "cashback", "reward", "gift"]),
    ("impersonation", &["bank officer", "rbi", "customer care", "income tax", "army"]),
];

// ── Callback payload ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackPayload {
    session_id:              String,
    scam_detected:           bool,
    total_messages_exchanged: usize,
    extracted_intelligence:  Intelligence,
    agent_notes:             String,
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub sender:    String,
    pub text:      String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOutcome {
    pub reply:                   String,
    pub session_id:              String,
    pub scam_detected:           bool,
    pub confidence:              f32,
    pub last_message_confidence: f32,
    pub message_count:           usize,
    pub callback_sent:           bool,
}

pub struct HoneypotEngine {
    sessions:       DashMap<String, Arc<RwLock<HoneypotSession>>>,
    llm:            Option<Arc<LlmClient>>,
    phishing:       Arc<PhishingStore>,
    metrics:        Arc<Metrics>,
    http:           reqwest::Client,
    callback_url:   Option<String>,
    scam_threshold: f32,
    min_messages:   usize,
    idle_timeout:   chrono::Duration,
}

impl HoneypotEngine {
    pub fn new(
        llm: Option<Arc<LlmClient>>,
        phishing: Arc<PhishingStore>,
        metrics: Arc<Metrics>,
        callback_url: Option<String>,
        scam_threshold: f32,
        min_messages: usize,
        idle_timeout_mins: i64,
    ) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CALLBACK_TIMEOUT_SECS))
            .user_agent("kavach/0.4")
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            sessions: DashMap::new(),
            llm,
            phishing,
            metrics,
            http,
            callback_url,
            scam_threshold,
            min_messages,
            idle_timeout: chrono::Duration::minutes(idle_timeout_mins),
        })
    }

    pub async fn handle(
        &self,
        session_id: &str,
        msg: IncomingMessage,
        seed_history: Option<Vec<HistoryEntry>>,
        metadata: Option<Value>,
    ) -> EngineOutcome {
        let doc = self.touch(session_id, seed_history, metadata);
        let is_scammer = msg.sender == "scammer";
        let mut last_confidence = 0.0f32;

        if is_scammer {
            let analysis = text::analyze(
                &msg.text,
                self.llm.as_deref(),
                &self.phishing,
                self.scam_threshold,
            )
            .await;
            last_confidence = analysis.confidence;

            let mut s = doc.write();
            s.conversation_history.push(HistoryEntry {
                sender:    "scammer".to_string(),
                text:      msg.text.clone(),
                timestamp: msg.timestamp.unwrap_or_else(Utc::now),
            });
            s.message_count += 1;
            s.absorb_intelligence(&msg.text);
            s.scam_scores.push(analysis.confidence);
            if s.scam_type.is_none() {
                s.scam_type = analysis.scam_type.clone();
            }

            let avg = s.mean_score();
            s.scam_confidence = avg;
            if avg >= self.scam_threshold && !s.scam_detected {
                s.scam_detected = true;
                let message_count = s.message_count;
                s.agent_notes.push(format!(
                    "Scam confirmed at message {} (confidence {:.2})",
                    message_count, avg
                ));
                info!(session = session_id, confidence = avg, "honeypot scam detected");
            }
            s.record_tactics();
        }

        // Reply generation happens outside the lock — the LLM may take seconds.
        let (tail, count, note_needed) = {
            let s = doc.read();
            let tail: Vec<String> = s
                .conversation_history
                .iter()
                .rev()
                .take(HISTORY_TAIL)
                .rev()
                .map(|h| format!("{}: {}", h.sender, h.text))
                .collect();
            (tail, s.message_count, is_scammer)
        };

        let generated = persona::generate(&msg.text, &tail, count, self.llm.as_deref()).await;
        {
            let mut s = doc.write();
            s.conversation_history.push(HistoryEntry {
                sender:    "user".to_string(),
                text:      generated.reply.clone(),
                timestamp: Utc::now(),
            });
            if note_needed {
                s.agent_notes.push(generated.agent_note.clone());
            }
        }
        self.metrics.honeypot_messages.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        self.maybe_callback(&doc).await;

        let s = doc.read();
        EngineOutcome {
            reply:                   generated.reply,
            session_id:              session_id.to_string(),
            scam_detected:           s.scam_detected,
            confidence:              s.scam_confidence,
            last_message_confidence: last_confidence,
            message_count:           s.message_count,
            callback_sent:           s.callback_sent,
        }
    }

    fn touch(
        &self,
        session_id: &str,
        seed_history: Option<Vec<HistoryEntry>>,
        metadata: Option<Value>,
    ) -> Arc<RwLock<HoneypotSession>> {
        if !self.sessions.contains_key(session_id) && self.sessions.len() >= MAX_SESSIONS {
            self.evict_oldest_idle();
        }

        let doc = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let mut s = HoneypotSession::new(session_id);
                if let Some(history) = seed_history {
                    s.message_count =
                        history.iter().filter(|h| h.sender == "scammer").count();
                    s.conversation_history = history;
                }
                Arc::new(RwLock::new(s))
            })
            .clone();

        {
            let mut s = doc.write();
            s.last_activity = Utc::now();
            if let Some(meta) = metadata {
                if !meta.is_null() {
                    s.metadata = meta;
                }
            }
        }
        doc
    }

    fn evict_oldest_idle(&self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|e| e.value().read().last_activity)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            warn!("Honeypot session cap reached — evicting {key}");
            self.sessions.remove(&key);
        }
    }

    // ── Callback ──────────────────────────────────────────────────────────────

    async fn maybe_callback(&self, doc: &Arc<RwLock<HoneypotSession>>) {
        let eligible = {
            let s = doc.read();
            s.scam_detected && !s.callback_sent && s.message_count >= self.min_messages
        };
        if !eligible {
            return;
        }
        self.send_callback(doc).await;
    }

    /// Fold full-history intelligence, POST to the sink, and latch
    /// callback_sent on success. Failure leaves the flag down so the next
    /// eligible turn retries.
    async fn send_callback(&self, doc: &Arc<RwLock<HoneypotSession>>) -> bool {
        let Some(url) = self.callback_url.as_deref() else { return false };

        let payload = {
            let mut s = doc.write();
            let scammer_texts: Vec<String> = s
                .conversation_history
                .iter()
                .filter(|h| h.sender == "scammer")
                .map(|h| h.text.clone())
                .collect();
            for text in &scammer_texts {
                s.absorb_intelligence(text);
            }
            CallbackPayload {
                session_id:               s.session_id.clone(),
                scam_detected:            s.scam_detected,
                total_messages_exchanged: s.conversation_history.len(),
                extracted_intelligence:   s.extracted_intelligence.clone(),
                agent_notes:              s.agent_notes.join("; "),
            }
        };

        match self.http.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                doc.write().callback_sent = true;
                self.metrics
                    .callbacks_sent
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                info!(session = %payload.session_id, "intelligence callback delivered");
                true
            }
            Ok(resp) => {
                warn!("Callback sink returned {} — will retry", resp.status());
                false
            }
            Err(e) => {
                warn!("Callback delivery failed: {e} — will retry");
                false
            }
        }
    }

    /// Operator-forced callback. Errors when the session is unknown or no
    /// scam has been detected yet.
    pub async fn force_callback(&self, session_id: &str) -> Result<bool, &'static str> {
        let doc = self
            .sessions
            .get(session_id)
            .map(|d| d.clone())
            .ok_or("session not found")?;
        if !doc.read().scam_detected {
            return Err("no scam detected for this session");
        }
        Ok(self.send_callback(&doc).await)
    }

    // ── Introspection & lifecycle ─────────────────────────────────────────────

    pub fn session_view(&self, session_id: &str) -> Option<HoneypotSession> {
        self.sessions.get(session_id).map(|d| d.read().clone())
    }

    pub fn evict(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub async fn sweeper_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
            let cutoff = Utc::now() - self.idle_timeout;
            let before = self.sessions.len();
            self.sessions.retain(|_, doc| doc.read().last_activity >= cutoff);
            let evicted = before - self.sessions.len();
            if evicted > 0 {
                info!("Honeypot sweeper evicted {evicted} idle sessions");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Arc<HoneypotEngine> {
        HoneypotEngine::new(
            None,
            Arc::new(PhishingStore::new()),
            Metrics::new(),
            None,
            0.4,
            3,
            30,
        )
    }

    fn scammer_msg(text: &str) -> IncomingMessage {
        IncomingMessage { sender: "scammer".into(), text: text.into(), timestamp: None }
    }

    const SCAM_TEXT: &str =
        "Your account is blocked! Pay me urgent processing fee, share otp 123456 \
         to verify kyc immediately";

    #[tokio::test]
    async fn confidence_is_mean_of_scores() {
        let eng = engine();
        let a = eng.handle("h1", scammer_msg(SCAM_TEXT), None, None).await;
        let b = eng.handle("h1", scammer_msg("hello ji, good morning"), None, None).await;

        let s = eng.session_view("h1").unwrap();
        assert_eq!(s.scam_scores.len(), 2);
        let mean = s.scam_scores.iter().sum::<f32>() / 2.0;
        assert!((b.confidence - mean).abs() < 1e-6);
        assert!(a.confidence >= b.confidence);
    }

    #[tokio::test]
    async fn scam_detection_is_monotonic() {
        let eng = engine();
        eng.handle("h2", scammer_msg(SCAM_TEXT), None, None).await;
        assert!(eng.session_view("h2").unwrap().scam_detected);

        // A flood of benign turns can drag the mean down but never un-detect.
        for _ in 0..10 {
            eng.handle("h2", scammer_msg("ok fine no problem"), None, None).await;
        }
        let s = eng.session_view("h2").unwrap();
        assert!(s.scam_detected);
        assert!(s.scam_confidence < 0.4);
    }

    #[tokio::test]
    async fn intelligence_accumulates_across_turns() {
        let eng = engine();
        eng.handle("h3", scammer_msg("Send to 9876543210@ybl now"), None, None).await;
        eng.handle("h3", scammer_msg("Or call 8765432109, account no 123456789012"), None, None)
            .await;

        let intel = eng.session_view("h3").unwrap().extracted_intelligence;
        assert!(intel.upi_ids.contains("9876543210@ybl"));
        assert!(intel.phone_numbers.contains("+918765432109"));
        assert!(intel.bank_accounts.contains("123456789012"));
    }

    #[tokio::test]
    async fn tactics_are_recorded_once() {
        let eng = engine();
        eng.handle("h4", scammer_msg("urgent! police will arrest you"), None, None).await;
        eng.handle("h4", scammer_msg("this is urgent, act now"), None, None).await;

        let s = eng.session_view("h4").unwrap();
        assert!(s.tactics.contains("urgency"));
        assert!(s.tactics.contains("threats"));
        let urgency_notes = s
            .agent_notes
            .iter()
            .filter(|n| n.contains("tactic: urgency"))
            .count();
        assert_eq!(urgency_notes, 1);
    }

    #[tokio::test]
    async fn non_scammer_sender_does_not_score() {
        let eng = engine();
        let out = eng
            .handle(
                "h5",
                IncomingMessage { sender: "user".into(), text: "hi".into(), timestamp: None },
                None,
                None,
            )
            .await;
        assert_eq!(out.message_count, 0);
        assert!(eng.session_view("h5").unwrap().scam_scores.is_empty());
        assert!(!out.reply.is_empty());
    }

    #[tokio::test]
    async fn callback_needs_minimum_messages() {
        // No callback URL configured — flag must stay down even when eligible.
        let eng = engine();
        for _ in 0..4 {
            eng.handle("h6", scammer_msg(SCAM_TEXT), None, None).await;
        }
        let s = eng.session_view("h6").unwrap();
        assert!(s.scam_detected);
        assert!(!s.callback_sent);
    }

    #[tokio::test]
    async fn eviction_and_views() {
        let eng = engine();
        eng.handle("h7", scammer_msg("hello"), None, None).await;
        assert!(eng.session_view("h7").is_some());
        assert!(eng.evict("h7"));
        assert!(eng.session_view("h7").is_none());
        assert!(!eng.evict("h7"));
    }

    #[tokio::test]
    async fn force_callback_requires_detection() {
        let eng = engine();
        eng.handle("h8", scammer_msg("good morning ji"), None, None).await;
        assert!(eng.force_callback("h8").await.is_err());
        assert!(eng.force_callback("missing").await.is_err());
    }
}
