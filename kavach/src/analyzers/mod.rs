pub mod otp;
pub mod qr;
pub mod rules;
pub mod text;
pub mod url;

use crate::clients::llm::LlmClient;
use crate::store::phishing::PhishingStore;
use crate::types::Transaction;

/// Run the text classifier and rule scorer concurrently for one message,
/// plus the QR analyzer when the message embeds a `upi://pay` payload.
pub async fn run_scan(
    text: &str,
    tx: &Transaction,
    llm: Option<&LlmClient>,
    phishing: &PhishingStore,
    scam_threshold: f32,
) -> (text::TextAnalysis, rules::RuleOutcome, Option<qr::QrVerdict>) {
    let (text_out, rule_out) = tokio::join!(
        text::analyze(text, llm, phishing, scam_threshold),
        rules::analyze_with_llm(tx, llm),
    );

    let qr_out = if text.to_lowercase().contains("upi://pay") {
        text.split_whitespace()
            .find(|t| t.to_lowercase().starts_with("upi://pay"))
            .and_then(|t| qr::analyze(t).ok())
    } else {
        None
    };

    (text_out, rule_out, qr_out)
}
