// kavach/src/api.rs
//
// HTTP surface — axum router, x-api-key auth, the §-style JSON endpoints
// the mobile/web clients call. Handlers translate between wire shapes and
// the pipeline; all risk logic lives in the analyzers/engine/orchestrator.
//
// QR image decoding is an external concern: the handler enforces the size
// and mime bounds, then delegates to the injected decoder. The default
// decoder finds nothing, which surfaces as the documented 400.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::analyzers::{self, qr};
use crate::audit::Audit;
use crate::chat::{Orchestrator, VictimReplyError};
use crate::clients::llm::LlmClient;
use crate::clients::ml::{MlClient, MlRequest};
use crate::config::Settings;
use crate::engine::fusion;
use crate::extract;
use crate::honeypot::engine::{HistoryEntry, HoneypotEngine, IncomingMessage};
use crate::metrics::Metrics;
use crate::store::blacklist::{BlacklistStore, PAY_VALIDATION_SCAMMER_ID};
use crate::store::phishing::PhishingStore;
use crate::store::sessions::SessionStore;
use crate::types::{TxSource, TxType, BAND_HIGH};

const MAX_QR_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub const BLACKLIST_MESSAGE: &str =
    "This UPI ID is in our blacklist of known scammers. Do NOT proceed with this payment.";

// ── QR decoder boundary ───────────────────────────────────────────────────────

pub trait QrDecoder: Send + Sync {
    /// Decode an image into its QR payload string, None when no code found.
    fn decode(&self, image: &[u8]) -> anyhow::Result<Option<String>>;
}

/// Default decoder: no decoding backend wired in.
pub struct NoQrDecoder;

impl QrDecoder for NoQrDecoder {
    fn decode(&self, _image: &[u8]) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

// ── Application state ─────────────────────────────────────────────────────────

pub struct AppState {
    pub settings:     Settings,
    pub orchestrator: Arc<Orchestrator>,
    pub honeypot:     Arc<HoneypotEngine>,
    pub sessions:     Arc<SessionStore>,
    pub blacklist:    Arc<BlacklistStore>,
    pub phishing:     Arc<PhishingStore>,
    pub llm:          Option<Arc<LlmClient>>,
    pub ml:           Option<Arc<MlClient>>,
    pub metrics:      Arc<Metrics>,
    pub audit:        Arc<Audit>,
    pub qr_decoder:   Arc<dyn QrDecoder>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let authed = Router::new()
        .route("/api/upi/scan", post(scan))
        .route("/api/upi/scan-qr", post(scan_qr))
        .route("/api/upi/validate-transaction", post(validate_transaction))
        .route("/api/chat/send", post(chat_send))
        .route("/api/chat/victim-reply", post(victim_reply))
        .route("/api/chat/session/:session_id", get(chat_session))
        .route("/api/honeypot", post(honeypot_message))
        .route(
            "/api/honeypot/session/:session_id",
            get(honeypot_session).delete(honeypot_delete),
        )
        .route("/api/honeypot/session/:session_id/callback", post(honeypot_callback))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(DefaultBodyLimit::max(MAX_QR_UPLOAD_BYTES + 256 * 1024));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .merge(authed)
        .with_state(state)
}

// ── Auth ──────────────────────────────────────────────────────────────────────

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !state.settings.auth_enabled() {
        return next.run(req).await;
    }
    match req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        None => api_error(StatusCode::UNAUTHORIZED, "Missing x-api-key header"),
        Some(key) if key == state.settings.api_key => next.run(req).await,
        Some(_) => api_error(StatusCode::FORBIDDEN, "Invalid API key"),
    }
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "error": message }))).into_response()
}

// ── Scan message ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ScanRequest {
    message: Option<String>,
}

async fn scan(State(state): State<Arc<AppState>>, Json(body): Json<ScanRequest>) -> Response {
    let started = Instant::now();
    let Some(message) = body.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())
    else {
        return api_error(StatusCode::BAD_REQUEST, "Empty message");
    };

    state.metrics.scans_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    let extraction = extract::extract(&message, state.llm.as_deref()).await;
    let tx = extraction.to_transaction(TxSource::Sms);
    let (text_a, rule_o, qr_o) = analyzers::run_scan(
        &message,
        &tx,
        state.llm.as_deref(),
        &state.phishing,
        state.settings.scam_threshold,
    )
    .await;
    let analysis = fusion::fuse_signals(Some(&text_a), Some(&rule_o), qr_o.as_ref());

    state.metrics.record_verdict(analysis.risk_score, analysis.risk_level);
    let subject = extraction
        .receiver_upi
        .clone()
        .unwrap_or_else(|| "message".to_string());
    state.audit.record_verdict("scan", &subject, &analysis).await;

    Json(json!({
        "status":         "success",
        "extracted":      extraction,
        "analysis":       analysis,
        "responseTimeMs": started.elapsed().as_millis() as u64,
    }))
    .into_response()
}

// ── Scan QR image ─────────────────────────────────────────────────────────────

async fn scan_qr(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let started = Instant::now();
    state.metrics.qr_scans_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    let mut image: Option<Vec<u8>> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("qrImage") {
            continue;
        }
        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return api_error(StatusCode::BAD_REQUEST, "qrImage must be an image upload");
        }
        match field.bytes().await {
            Ok(bytes) if bytes.len() <= MAX_QR_UPLOAD_BYTES => image = Some(bytes.to_vec()),
            Ok(_) => return api_error(StatusCode::BAD_REQUEST, "QR image exceeds 5 MB limit"),
            Err(_) => return api_error(StatusCode::BAD_REQUEST, "QR image exceeds 5 MB limit"),
        }
    }
    let Some(image) = image else {
        return api_error(StatusCode::BAD_REQUEST, "qrImage field is required");
    };

    // Decoding is CPU-bound — keep it off the request workers.
    let decoder = state.qr_decoder.clone();
    let payload = match tokio::task::spawn_blocking(move || decoder.decode(&image)).await {
        Ok(Ok(Some(payload))) => payload,
        Ok(Ok(None)) => return api_error(StatusCode::BAD_REQUEST, "No QR code found in image"),
        Ok(Err(e)) => {
            error!("QR decoder failed: {e}");
            return api_error(StatusCode::BAD_REQUEST, "No QR code found in image");
        }
        Err(e) => {
            error!("QR decode task panicked: {e}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let verdict = match qr::analyze(&payload) {
        Ok(v) => v,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, &e),
    };
    let analysis = fusion::fuse_signals(None, None, Some(&verdict));
    state.metrics.record_verdict(analysis.risk_score, analysis.risk_level);
    let subject = verdict.payload.payee_upi.clone().unwrap_or_else(|| "qr".into());
    state.audit.record_verdict("scan-qr", &subject, &analysis).await;

    Json(json!({
        "status": "success",
        "extracted": {
            "upiId":        verdict.payload.payee_upi,
            "merchantName": verdict.payload.payee_name,
            "amount":       verdict.payload.amount,
        },
        "analysis":       analysis,
        "responseTimeMs": started.elapsed().as_millis() as u64,
    }))
    .into_response()
}

// ── Validate transaction ──────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    amount: Option<f64>,
    #[serde(rename = "receiverUPI")]
    receiver_upi: Option<String>,
    description: Option<String>,
    new_payee: Option<bool>,
}

async fn validate_transaction(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateRequest>,
) -> Response {
    let started = Instant::now();
    let Some(receiver) = body
        .receiver_upi
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
    else {
        return api_error(StatusCode::BAD_REQUEST, "receiverUPI is required");
    };

    state
        .metrics
        .validations_total
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    // Blacklist short-circuit.
    if state.blacklist.find_by_upi(&receiver).is_some() {
        state.metrics.blacklist_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let score = fusion::fuse_advanced(0, 0.0, true);
        let actions = crate::engine::actions::recommended(score, None);
        state.metrics.record_verdict(score, crate::types::RiskLevel::from_score(score));
        return Json(json!({
            "riskScore":           score,
            "riskLevel":           crate::types::RiskLevel::from_score(score),
            "isFraud":             true,
            "shouldBlock":         true,
            "blacklisted":         true,
            "message":             BLACKLIST_MESSAGE,
            "triggeredIndicators": [ { "id": "blacklistedReceiver",
                                       "label": "Receiver UPI is blacklisted",
                                       "severity": "HIGH" } ],
            "recommendations":     actions,
            "responseTimeMs":      started.elapsed().as_millis() as u64,
        }))
        .into_response();
    }

    let amount = body.amount.unwrap_or(0.0).max(0.0);
    let description = body.description.unwrap_or_default();

    let mut tx = crate::types::Transaction::new(amount, TxSource::UserPay);
    tx.receiver_upi = Some(receiver.clone());
    tx.tx_type = TxType::P2p;
    tx.description = description.clone();
    tx.is_new_payee = body.new_payee.unwrap_or(true);

    let rule = analyzers::rules::analyze_with_llm(&tx, state.llm.as_deref()).await;
    let concat = format!("{description} {receiver} {amount}");
    let text_a = analyzers::text::analyze(
        &concat,
        state.llm.as_deref(),
        &state.phishing,
        state.settings.scam_threshold,
    )
    .await;

    let rule_score = rule.score.max((text_a.confidence * 100.0).round() as u8);

    let ml = match &state.ml {
        Some(client) => {
            let prediction = client
                .predict(&MlRequest {
                    text:         concat.clone(),
                    amount:       Some(amount),
                    receiver_upi: Some(receiver.clone()),
                    description:  Some(description.clone()),
                    new_payee:    tx.is_new_payee,
                })
                .await;
            if prediction.is_none() {
                state.metrics.ml_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            prediction
        }
        None => None,
    };

    let verdict = fusion::advanced_verdict(rule_score, ml.as_ref(), false, &rule, &text_a);
    state.metrics.record_verdict(verdict.risk_score, verdict.risk_level);
    state.audit.record_verdict("validate-pay", &receiver, &verdict).await;

    let should_block = verdict.risk_score >= BAND_HIGH;
    if should_block {
        let entry = state.blacklist.upsert(
            PAY_VALIDATION_SCAMMER_ID,
            vec![receiver.clone()],
            vec![],
            "Flagged during payment validation",
        );
        state.audit.record_blacklist("pay-validation", &entry).await;
    }

    let message = if should_block {
        "High fraud risk detected. Do NOT proceed with this payment."
    } else if verdict.risk_score >= 40 {
        "Caution: this payment shows warning signs. Verify the receiver before paying."
    } else {
        "This payment looks safe. Always double-check the receiver UPI."
    };

    Json(json!({
        "riskScore":           verdict.risk_score,
        "riskLevel":           verdict.risk_level,
        "isFraud":             should_block,
        "shouldBlock":         should_block,
        "blacklisted":         false,
        "message":             message,
        "triggeredIndicators": rule.indicators,
        "recommendations":     verdict.recommended_actions,
        "mlProbability":       verdict.ml_probability,
        "responseTimeMs":      started.elapsed().as_millis() as u64,
    }))
    .into_response()
}

// ── Chat ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatSendRequest {
    session_id: Option<String>,
    scammer_id: Option<String>,
    victim_id:  Option<String>,
    text:       Option<String>,
}

async fn chat_send(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatSendRequest>,
) -> Response {
    let (Some(session_id), Some(scammer_id), Some(text)) = (
        body.session_id.filter(|s| !s.is_empty()),
        body.scammer_id.filter(|s| !s.is_empty()),
        body.text.filter(|t| !t.trim().is_empty()),
    ) else {
        return api_error(StatusCode::BAD_REQUEST, "sessionId, scammerId and text are required");
    };

    let outcome = state
        .orchestrator
        .scammer_turn(&session_id, &scammer_id, body.victim_id, &text)
        .await;

    let mut response = serde_json::to_value(&outcome).unwrap_or_else(|_| json!({}));
    response["status"] = json!("success");
    Json(response).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VictimReplyRequest {
    session_id: Option<String>,
    text:       Option<String>,
}

async fn victim_reply(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VictimReplyRequest>,
) -> Response {
    let (Some(session_id), Some(text)) = (
        body.session_id.filter(|s| !s.is_empty()),
        body.text.filter(|t| !t.trim().is_empty()),
    ) else {
        return api_error(StatusCode::BAD_REQUEST, "sessionId and text are required");
    };

    match state.orchestrator.victim_reply(&session_id, &text).await {
        Ok(()) => Json(json!({ "status": "success" })).into_response(),
        Err(VictimReplyError::SessionNotFound) => {
            api_error(StatusCode::NOT_FOUND, "Session not found")
        }
        Err(VictimReplyError::Blocked) => api_error(
            StatusCode::FORBIDDEN,
            "Message blocked: this conversation is under fraud review. \
             Do not send money or share any codes.",
        ),
    }
}

async fn chat_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    Json(state.orchestrator.victim_view(&session_id).await).into_response()
}

// ── Honeypot ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoneypotMessageBody {
    sender:    Option<String>,
    text:      Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoneypotRequest {
    session_id:           Option<String>,
    message:              Option<HoneypotMessageBody>,
    conversation_history: Option<Vec<HistoryEntry>>,
    metadata:             Option<serde_json::Value>,
}

async fn honeypot_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<HoneypotRequest>,
) -> Response {
    let started = Instant::now();
    let Some(session_id) = body.session_id.filter(|s| !s.is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "sessionId is required");
    };
    let Some(message) = body.message else {
        return api_error(StatusCode::BAD_REQUEST, "message is required");
    };
    let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "message.text is required");
    };

    let outcome = state
        .honeypot
        .handle(
            &session_id,
            IncomingMessage {
                sender:    message.sender.unwrap_or_else(|| "scammer".to_string()),
                text,
                timestamp: message.timestamp,
            },
            body.conversation_history,
            body.metadata,
        )
        .await;

    Json(json!({
        "reply": outcome.reply,
        "debug": {
            "sessionId":             outcome.session_id,
            "scamDetected":          outcome.scam_detected,
            "confidence":            outcome.confidence,
            "lastMessageConfidence": outcome.last_message_confidence,
            "messageCount":          outcome.message_count,
            "responseTimeMs":        started.elapsed().as_millis() as u64,
            "callbackSent":          outcome.callback_sent,
        },
    }))
    .into_response()
}

async fn honeypot_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.honeypot.session_view(&session_id) {
        Some(session) => Json(session).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Session not found"),
    }
}

async fn honeypot_callback(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.honeypot.force_callback(&session_id).await {
        Ok(sent) => Json(json!({ "status": "success", "callbackSent": sent })).into_response(),
        Err(msg) => api_error(StatusCode::BAD_REQUEST, msg),
    }
}

async fn honeypot_delete(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    if state.honeypot.evict(&session_id) {
        Json(json!({ "status": "success" })).into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "Session not found")
    }
}

// ── Ops endpoints ─────────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status":        "ok",
        "version":       env!("CARGO_PKG_VERSION"),
        "llmConfigured": state.llm.is_some(),
        "mlConfigured":  state.ml.is_some(),
    }))
    .into_response()
}

async fn metrics_text(State(state): State<Arc<AppState>>) -> Response {
    let body = state.metrics.prometheus_text(
        state.honeypot.active_sessions(),
        state.sessions.len(),
        state.blacklist.len(),
        state.phishing.len(),
    );
    ([("content-type", "text/plain; version=0.0.4")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Orchestrator;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn test_state(api_key: &str) -> Arc<AppState> {
        let mut settings = Settings::from_env();
        settings.api_key = api_key.to_string();
        settings.scam_threshold = 0.4;

        let sessions = Arc::new(SessionStore::new());
        let blacklist = Arc::new(BlacklistStore::new());
        let phishing = Arc::new(PhishingStore::new());
        let metrics = Metrics::new();
        let audit = Arc::new(Audit::new(
            std::env::temp_dir().join(format!("kavach_api_test_{}", std::process::id())),
        ));
        let orchestrator = Orchestrator::new(
            sessions.clone(),
            blacklist.clone(),
            phishing.clone(),
            None,
            metrics.clone(),
            audit.clone(),
            0.4,
        );
        let honeypot = HoneypotEngine::new(
            None,
            phishing.clone(),
            metrics.clone(),
            None,
            0.4,
            3,
            30,
        );

        Arc::new(AppState {
            settings,
            orchestrator,
            honeypot,
            sessions,
            blacklist,
            phishing,
            llm: None,
            ml: None,
            metrics,
            audit,
            qr_decoder: Arc::new(NoQrDecoder),
        })
    }

    async fn post_json(
        app: Router,
        path: &str,
        key: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = HttpRequest::post(path).header("content-type", "application/json");
        if let Some(key) = key {
            req = req.header("x-api-key", key);
        }
        let resp = app
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    const KYC_SCAM: &str = "Dear Customer, your SBI account will be blocked. Complete KYC \
        immediately by sending Rs 9,999 to 9876543210@ybl or click \
        http://sbi-kyc-update.xyz. Call 8765432109 for help.";

    #[tokio::test]
    async fn auth_is_enforced() {
        let state = test_state("secret");
        let app = router(state);

        let (status, _) = post_json(
            app.clone(),
            "/api/upi/scan",
            None,
            json!({ "message": "hi" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = post_json(
            app.clone(),
            "/api/upi/scan",
            Some("wrong"),
            json!({ "message": "hi" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = post_json(
            app,
            "/api/upi/scan",
            Some("secret"),
            json!({ "message": "hi" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_and_metrics_skip_auth() {
        let state = test_state("secret");
        let app = router(state);
        let resp = app
            .clone()
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(HttpRequest::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_scan_message_is_rejected() {
        let app = router(test_state(""));
        let (status, body) = post_json(app, "/api/upi/scan", None, json!({ "message": " " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Empty message");
    }

    #[tokio::test]
    async fn scan_flags_kyc_scam_and_clears_dinner_money() {
        let app = router(test_state(""));

        let (status, body) =
            post_json(app.clone(), "/api/upi/scan", None, json!({ "message": KYC_SCAM })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["extracted"]["allUpiIds"][0], "9876543210@ybl");
        assert_eq!(body["extracted"]["amount"], 9999.0);
        let level = body["analysis"]["riskLevel"].as_str().unwrap();
        assert!(level == "HIGH" || level == "CRITICAL");
        let actions: Vec<String> = body["analysis"]["recommendedActions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(actions.contains(&"BLOCK this transaction immediately".to_string()));

        let (status, body) = post_json(
            app,
            "/api/upi/scan",
            None,
            json!({ "message": "Hi Priya, sending Rs 500 for dinner. My UPI: amit@oksbi." }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"]["riskLevel"], "LOW");
        let score = body["analysis"]["riskScore"].as_u64().unwrap();
        let actions: Vec<String> = body["analysis"]["recommendedActions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        // time-of-day rule patterns can lift the score into the caution band
        if score < 25 {
            assert!(actions.contains(&"Transaction appears safe".to_string()));
        } else {
            assert!(actions.contains(&"Review transaction details carefully".to_string()));
        }
    }

    #[tokio::test]
    async fn validate_safe_payment_passes() {
        let app = router(test_state(""));
        let (status, body) = post_json(
            app,
            "/api/upi/validate-transaction",
            None,
            json!({
                "receiverUPI": "friend@oksbi",
                "amount": 500,
                "description": "Dinner share",
                "newPayee": false,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["shouldBlock"], false);
        assert_eq!(body["riskLevel"], "LOW");
        assert_eq!(body["blacklisted"], false);
    }

    #[tokio::test]
    async fn validate_high_risk_blocks_then_blacklists() {
        let app = router(test_state(""));
        let req = json!({
            "receiverUPI": "9876543210@ybl",
            "amount": 9999,
            "description": "KYC update urgent send immediately",
            "newPayee": true,
        });

        let (status, body) =
            post_json(app.clone(), "/api/upi/validate-transaction", None, req.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["riskScore"].as_u64().unwrap() >= 70, "score {}", body["riskScore"]);
        assert_eq!(body["shouldBlock"], true);

        // Same receiver again — now served from the blacklist.
        let (status, body) = post_json(app, "/api/upi/validate-transaction", None, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["riskScore"], 100);
        assert_eq!(body["blacklisted"], true);
        assert!(body["message"].as_str().unwrap().contains("blacklist"));
    }

    #[tokio::test]
    async fn validate_requires_receiver() {
        let app = router(test_state(""));
        let (status, _) =
            post_json(app, "/api/upi/validate-transaction", None, json!({ "amount": 10 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_flow_end_to_end() {
        let app = router(test_state(""));

        // High-risk scammer turn → diverted with honeypot reply.
        let (status, body) = post_json(
            app.clone(),
            "/api/chat/send",
            None,
            json!({ "sessionId": "c1", "scammerId": "sc-1", "text": KYC_SCAM }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["diverted"], true);
        assert!(body["honeypotReply"].is_string());

        // Victim reply is blocked while risk is high.
        let (status, _) = post_json(
            app.clone(),
            "/api/chat/victim-reply",
            None,
            json!({ "sessionId": "c1", "text": "should I pay?" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Victim-safe projection shows delivered messages only.
        let resp = app
            .clone()
            .oneshot(HttpRequest::get("/api/chat/session/c1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let view: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(view["isScamConfirmed"], true);
        assert!(view.get("extractedDetails").is_none());

        // Unknown session → empty shell, still 200.
        let resp = app
            .oneshot(HttpRequest::get("/api/chat/session/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn victim_reply_unknown_session_is_404() {
        let app = router(test_state(""));
        let (status, _) = post_json(
            app,
            "/api/chat/victim-reply",
            None,
            json!({ "sessionId": "ghost", "text": "hello" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn honeypot_endpoint_validates_and_replies() {
        let app = router(test_state(""));

        let (status, _) = post_json(app.clone(), "/api/honeypot", None, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json(
            app.clone(),
            "/api/honeypot",
            None,
            json!({
                "sessionId": "h1",
                "message": { "sender": "scammer", "text": KYC_SCAM },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["reply"].is_string());
        assert_eq!(body["debug"]["scamDetected"], true);
        assert_eq!(body["debug"]["messageCount"], 1);

        // Debug view and eviction.
        let resp = app
            .clone()
            .oneshot(
                HttpRequest::get("/api/honeypot/session/h1").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                HttpRequest::delete("/api/honeypot/session/h1").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(
                HttpRequest::get("/api/honeypot/session/h1").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forced_callback_requires_detection() {
        let app = router(test_state(""));
        post_json(
            app.clone(),
            "/api/honeypot",
            None,
            json!({ "sessionId": "h2", "message": { "sender": "scammer", "text": "good morning" } }),
        )
        .await;

        let (status, _) = post_json(
            app,
            "/api/honeypot/session/h2/callback",
            None,
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
