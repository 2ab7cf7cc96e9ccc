// kavach/src/analyzers/qr.rs
//
// UPI QR payload analyzer. Parses a `upi://pay` URI and scores the payment
// intent; the parsed payload is also dispatched through the transaction
// rule scorer as a synthetic QR-sourced transaction and the higher score
// wins.

use chrono::Utc;
use url::Url;

use crate::analyzers::rules;
use crate::types::{dedup_ordered, FraudCategory, Transaction, TxSource, TxType};

pub const QR_WARNING: &str = "QR codes are used to SEND money, not receive money.";

/// Payee handles that imitate support desks to lure refund-seeking victims.
const BAIT_HANDLE_WORDS: &[&str] = &["support", "help", "refund", "cashback", "prize"];

#[derive(Debug, Clone, Default)]
pub struct QrPayload {
    pub payee_upi:     Option<String>,
    pub payee_name:    Option<String>,
    pub amount:        Option<f64>,
    pub currency:      Option<String>,
}

#[derive(Debug, Clone)]
pub struct QrVerdict {
    pub payload:    QrPayload,
    pub risk_score: u8,
    pub indicators: Vec<String>,
    pub category:   Option<FraudCategory>,
}

pub fn parse(raw: &str) -> Result<QrPayload, String> {
    let trimmed = raw.trim();
    if !trimmed.to_lowercase().starts_with("upi://pay") {
        return Err("Not a UPI payment QR code".to_string());
    }
    let uri = Url::parse(trimmed).map_err(|e| format!("Malformed UPI URI: {e}"))?;

    let mut payload = QrPayload::default();
    for (k, v) in uri.query_pairs() {
        match k.as_ref() {
            "pa" => payload.payee_upi = Some(v.to_lowercase()),
            "pn" => payload.payee_name = Some(v.to_string()).filter(|s| !s.is_empty()),
            "am" => payload.amount = v.parse::<f64>().ok().filter(|a| *a > 0.0),
            "cu" => payload.currency = Some(v.to_string()),
            _ => {}
        }
    }
    Ok(payload)
}

pub fn analyze(raw: &str) -> Result<QrVerdict, String> {
    let payload = parse(raw)?;

    let mut score: u32 = 0;
    let mut indicators = Vec::new();

    if let Some(amount) = payload.amount {
        score += 30;
        indicators.push("QR pre-fills a payment amount".to_string());
        if amount > 5000.0 {
            score += 40;
            indicators.push(format!("Large pre-filled amount: ₹{amount}"));
        }
    }

    if let Some(handle) = payload.payee_upi.as_deref() {
        if BAIT_HANDLE_WORDS.iter().any(|w| handle.contains(w)) {
            score += 30;
            indicators.push("Payee handle imitates a support/refund desk".to_string());
        }
    }

    if payload.payee_name.is_none() {
        score += 20;
        indicators.push("No merchant name in QR payload".to_string());
    }

    // Cross-check via the rule scorer as a synthetic QR transaction.
    let tx = Transaction {
        sender_upi:   None,
        receiver_upi: payload.payee_upi.clone(),
        amount:       payload.amount.unwrap_or(0.0),
        tx_type:      TxType::P2p,
        description:  raw.to_string(),
        source:       TxSource::QrScan,
        is_new_payee: true,
        is_rapid:     false,
        timestamp:    Utc::now(),
    };
    let rule = rules::analyze(&tx);

    let risk_score = (score.min(100) as u8).max(rule.score);
    indicators.extend(rule.indicator_labels());
    indicators.push(QR_WARNING.to_string());

    Ok(QrVerdict {
        payload,
        risk_score,
        indicators: dedup_ordered(indicators),
        category: rule.category.or_else(|| rules::category_by_name("QR_SCAM")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_upi_strings_are_rejected() {
        assert!(parse("https://example.com").is_err());
        assert!(parse("hello world").is_err());
    }

    #[test]
    fn payload_fields_parse() {
        let p = parse("upi://pay?pa=shop@ybl&pn=Corner%20Store&am=250&cu=INR").unwrap();
        assert_eq!(p.payee_upi.as_deref(), Some("shop@ybl"));
        assert_eq!(p.payee_name.as_deref(), Some("Corner Store"));
        assert_eq!(p.amount, Some(250.0));
        assert_eq!(p.currency.as_deref(), Some("INR"));
    }

    #[test]
    fn large_nameless_refund_qr_scores_critical() {
        let v = analyze("upi://pay?pa=refund-desk@upi&am=9000").unwrap();
        // amount(30) + large(40) + bait handle(30) + no name(20), capped
        assert_eq!(v.risk_score, 100);
        assert_eq!(v.category.as_ref().unwrap().name, "QR_SCAM");
    }

    #[test]
    fn named_small_merchant_qr_scores_low_band() {
        let v = analyze("upi://pay?pa=store@oksbi&pn=Tea%20Stall&am=40").unwrap();
        // amount present (30) + QR-source rule patterns; stays below HIGH
        assert!(v.risk_score < 70, "score was {}", v.risk_score);
    }

    #[test]
    fn warning_is_always_present() {
        let v = analyze("upi://pay?pa=store@oksbi&pn=Shop").unwrap();
        assert!(v.indicators.contains(&QR_WARNING.to_string()));
    }

    #[test]
    fn zero_amount_is_ignored() {
        let p = parse("upi://pay?pa=x@ybl&am=0").unwrap();
        assert_eq!(p.amount, None);
    }
}
