// kavach/src/chat.rs
//
// Session orchestrator — the state machine behind the scammer↔victim chat.
//
// Each scammer turn: load/create session → extract identifiers → blacklist
// lookup → branch (live vs diverted) → fuse risk → optionally generate a
// honeypot reply → save. The session mutex is held for the whole turn, so
// turns on one session serialize and readers never see a honeypot reply
// without its causally preceding scammer message.
//
// Once diverted_to_honeypot or is_scam_confirmed goes up it stays up; a
// later low-risk turn only lowers last_risk, never the flags.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::analyzers;
use crate::audit::Audit;
use crate::clients::llm::LlmClient;
use crate::engine::fusion;
use crate::extract;
use crate::honeypot::persona;
use crate::metrics::Metrics;
use crate::store::blacklist::BlacklistStore;
use crate::store::phishing::PhishingStore;
use crate::store::sessions::SessionStore;
use crate::types::{
    clip_chars, ChatMessage, ChatRole, ChatSession, RiskVerdict, TxSource, BAND_HIGH,
    MAX_CHAT_TEXT,
};

const RAPID_WINDOW_SECS: i64 = 60;
const RAPID_TURNS: usize = 3;
const BLACKLIST_REASON: &str = "Confirmed scam activity";

pub struct Orchestrator {
    sessions:       Arc<SessionStore>,
    blacklist:      Arc<BlacklistStore>,
    phishing:       Arc<PhishingStore>,
    llm:            Option<Arc<LlmClient>>,
    metrics:        Arc<Metrics>,
    audit:          Arc<Audit>,
    scam_threshold: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub diverted:          bool,
    pub is_scam_confirmed: bool,
    pub risk:              RiskVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub honeypot_reply:    Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VictimReplyError {
    SessionNotFound,
    Blocked,
}

/// Victim-safe view: only delivered messages, never the harvested
/// identifier sets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProjection {
    pub session_id:        String,
    pub messages:          Vec<ChatMessage>,
    pub is_scam_confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_risk:         Option<RiskVerdict>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        blacklist: Arc<BlacklistStore>,
        phishing: Arc<PhishingStore>,
        llm: Option<Arc<LlmClient>>,
        metrics: Arc<Metrics>,
        audit: Arc<Audit>,
        scam_threshold: f32,
    ) -> Arc<Self> {
        Arc::new(Self { sessions, blacklist, phishing, llm, metrics, audit, scam_threshold })
    }

    pub async fn scammer_turn(
        &self,
        session_id: &str,
        scammer_id: &str,
        victim_id: Option<String>,
        text: &str,
    ) -> TurnOutcome {
        let text = clip_chars(text.trim(), MAX_CHAT_TEXT).to_string();
        self.metrics
            .chat_turns_total
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let doc = self.sessions.get_or_create(session_id, scammer_id, victim_id);
        let mut session = doc.lock().await;

        let extraction = extract::extract(&text, self.llm.as_deref()).await;
        session.extracted_details.absorb(&extraction);

        let blacklist_hit = self.blacklist.find_matching(
            scammer_id,
            &session.extracted_details.upi_ids,
            &session.extracted_details.phone_numbers,
        );
        if blacklist_hit.is_some() {
            self.metrics
                .blacklist_hits
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        session.messages.push(ChatMessage::new(ChatRole::Scammer, &text, false));
        let msg_idx = session.messages.len() - 1;

        let mut tx = extraction.to_transaction(TxSource::Unknown);
        tx.is_rapid = is_rapid(&session);

        let (text_a, rule_o, qr_o) = analyzers::run_scan(
            &text,
            &tx,
            self.llm.as_deref(),
            &self.phishing,
            self.scam_threshold,
        )
        .await;
        let risk = fusion::fuse_signals(Some(&text_a), Some(&rule_o), qr_o.as_ref());
        self.metrics.record_verdict(risk.risk_score, risk.risk_level);
        session.last_risk = Some(risk.clone());

        let already_diverted = session.diverted_to_honeypot;
        let outcome = if already_diverted || blacklist_hit.is_some() {
            self.diverted_turn(&mut session, msg_idx, &text, risk).await
        } else {
            self.live_turn(&mut session, msg_idx, scammer_id, &text, risk).await
        };

        self.sessions.save(&session);
        outcome
    }

    /// Known-scammer branch: the session is (or becomes) a honeypot stage.
    /// The scammer still sees a "victim" — our persona — but only when the
    /// current turn itself looks risky enough to be worth engaging.
    async fn diverted_turn(
        &self,
        session: &mut ChatSession,
        msg_idx: usize,
        text: &str,
        risk: RiskVerdict,
    ) -> TurnOutcome {
        session.diverted_to_honeypot = true;
        session.is_scam_confirmed = true;
        session.messages[msg_idx].delivered_to_victim = true;

        let honeypot_reply = if risk.risk_score >= BAND_HIGH {
            Some(self.append_honeypot_reply(session, text).await)
        } else {
            None
        };

        TurnOutcome {
            diverted: true,
            is_scam_confirmed: true,
            risk,
            honeypot_reply,
        }
    }

    async fn live_turn(
        &self,
        session: &mut ChatSession,
        msg_idx: usize,
        scammer_id: &str,
        text: &str,
        risk: RiskVerdict,
    ) -> TurnOutcome {
        session.messages[msg_idx].delivered_to_victim = true;

        let mut honeypot_reply = None;
        if risk.risk_score >= BAND_HIGH {
            let entry = self.blacklist.upsert(
                scammer_id,
                session.extracted_details.upi_ids.iter().cloned(),
                session.extracted_details.phone_numbers.iter().cloned(),
                BLACKLIST_REASON,
            );
            self.audit.record_blacklist("chat", &entry).await;
            info!(
                session = %session.session_id,
                scammer = scammer_id,
                score = risk.risk_score,
                "scam confirmed — diverting session to honeypot"
            );

            session.diverted_to_honeypot = true;
            session.is_scam_confirmed = true;
            self.metrics
                .diversions_total
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            honeypot_reply = Some(self.append_honeypot_reply(session, text).await);
        }

        TurnOutcome {
            diverted: session.diverted_to_honeypot,
            is_scam_confirmed: session.is_scam_confirmed,
            risk,
            honeypot_reply,
        }
    }

    async fn append_honeypot_reply(&self, session: &mut ChatSession, text: &str) -> String {
        let tail: Vec<String> = session
            .messages
            .iter()
            .rev()
            .take(6)
            .rev()
            .map(|m| format!("{:?}: {}", m.sender, m.text))
            .collect();
        let reply =
            persona::generate(text, &tail, session.scammer_turns(), self.llm.as_deref()).await;
        session
            .messages
            .push(ChatMessage::new(ChatRole::Honeypot, &reply.reply, true));
        reply.reply
    }

    // ── Victim side ───────────────────────────────────────────────────────────

    pub async fn victim_reply(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<(), VictimReplyError> {
        let doc = self
            .sessions
            .find(session_id)
            .ok_or(VictimReplyError::SessionNotFound)?;
        let mut session = doc.lock().await;

        let high_risk = session
            .last_risk
            .as_ref()
            .map(|r| r.risk_score >= BAND_HIGH)
            .unwrap_or(false);
        if session.diverted_to_honeypot && high_risk {
            return Err(VictimReplyError::Blocked);
        }

        let text = clip_chars(text.trim(), MAX_CHAT_TEXT);
        session.messages.push(ChatMessage::new(ChatRole::Victim, text, true));
        self.sessions.save(&session);
        Ok(())
    }

    pub async fn victim_view(&self, session_id: &str) -> SessionProjection {
        match self.sessions.find(session_id) {
            Some(doc) => {
                let session = doc.lock().await;
                SessionProjection {
                    session_id: session.session_id.clone(),
                    messages: session
                        .messages
                        .iter()
                        .filter(|m| m.delivered_to_victim)
                        .cloned()
                        .collect(),
                    is_scam_confirmed: session.is_scam_confirmed,
                    last_risk: session.last_risk.clone(),
                }
            }
            None => SessionProjection {
                session_id:        session_id.to_string(),
                messages:          Vec::new(),
                is_scam_confirmed: false,
                last_risk:         None,
            },
        }
    }
}

fn is_rapid(session: &ChatSession) -> bool {
    let cutoff = Utc::now() - Duration::seconds(RAPID_WINDOW_SECS);
    session
        .messages
        .iter()
        .filter(|m| m.sender == ChatRole::Scammer && m.timestamp >= cutoff)
        .count()
        >= RAPID_TURNS
}
