// kavach/src/engine/actions.rs
//
// Recommended-actions policy: band actions by final score, plus adjuncts
// for the identified fraud category. Order-preserving de-duplication.

use crate::types::{dedup_ordered, FraudCategory};

pub fn recommended(score: u8, category: Option<&FraudCategory>) -> Vec<String> {
    let mut actions: Vec<String> = Vec::new();

    let band: &[&str] = if score >= 75 {
        &[
            "BLOCK this transaction immediately",
            "Call your bank's fraud helpline",
            "Report to Cyber Crime helpline: 1930",
            "Change your UPI PIN immediately",
        ]
    } else if score >= 50 {
        &[
            "Hold this transaction and verify the payee",
            "Confirm the request through a known phone number",
            "Never share OTP or UPI PIN",
        ]
    } else if score >= 25 {
        &[
            "Review transaction details carefully",
            "Verify the receiver",
            "Ensure you are on official app",
        ]
    } else {
        &[
            "Transaction appears safe",
            "Always verify before large transfers",
        ]
    };
    actions.extend(band.iter().map(|s| s.to_string()));

    if let Some(cat) = category {
        let adjunct: &[&str] = match cat.name.as_str() {
            "QR_SCAM" => &[
                "Never scan QR codes sent by strangers",
                "QR codes are for PAYING, not RECEIVING",
            ],
            "OTP_FRAUD" => &["NEVER share OTP"],
            "PHISHING" => &["Do NOT click suspicious links"],
            "VISHING" => &["Hang up and call your bank on the official number"],
            _ => &[],
        };
        actions.extend(adjunct.iter().map(|s| s.to_string()));
    }

    dedup_ordered(actions)
}
