// kavach/src/analyzers/otp.rs
//
// OTP-solicitation detector. A direct request scores 40; a request wrapped
// in urgency language scores 60. Numeric 4–8 digit sightings are reported
// as indicators whether or not a request was found.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use regex::Regex;
use std::sync::OnceLock;

const OTP_PHRASES: &[&str] = &[
    "share otp", "send otp", "tell me otp", "tell otp", "verification code",
    "one time password", "enter otp", "provide otp", "give otp", "give me otp",
    "share the otp", "read out the otp", "otp received",
];

fn phrase_ac() -> &'static AhoCorasick {
    static AC: OnceLock<AhoCorasick> = OnceLock::new();
    AC.get_or_init(|| {
        AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(OTP_PHRASES)
            .expect("OTP phrase automaton build failed")
    })
}

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[0-9]{4,8}\b").expect("code regex"))
}

fn otp_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\botp\b").expect("otp token regex"))
}

fn urgency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:urgent|now|fast|immediately|asap|right now|quick)\b")
            .expect("urgency regex")
    })
}

#[derive(Debug, Clone, Default)]
pub struct OtpRisk {
    pub increment:  u8,
    pub indicators: Vec<String>,
}

pub fn analyze(text: &str) -> OtpRisk {
    let mut out = OtpRisk::default();
    if text.trim().is_empty() {
        return out;
    }

    let codes: Vec<String> = code_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    for code in &codes {
        out.indicators.push(format!("Numeric code in message: {code}"));
    }

    let phrase_hit = phrase_ac().is_match(text);
    let bare_otp_with_code = otp_token_re().is_match(text) && !codes.is_empty();

    if phrase_hit || bare_otp_with_code {
        out.indicators.push("OTP solicitation detected".to_string());
        if urgency_re().is_match(text) {
            out.indicators.push("Urgency pressure around OTP request".to_string());
            out.increment = 60;
        } else {
            out.increment = 40;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_request_scores_forty() {
        let r = analyze("Please share OTP to complete verification");
        assert_eq!(r.increment, 40);
    }

    #[test]
    fn urgent_request_scores_sixty() {
        let r = analyze("Share OTP immediately or account closes");
        assert_eq!(r.increment, 60);
        assert!(r.indicators.iter().any(|i| i.contains("Urgency")));
    }

    #[test]
    fn bare_otp_token_needs_a_code() {
        assert_eq!(analyze("your otp is confidential").increment, 0);
        assert_eq!(analyze("your otp is 482913").increment, 40);
    }

    #[test]
    fn know_does_not_trigger_urgency() {
        let r = analyze("send otp if you know it");
        assert_eq!(r.increment, 40);
    }

    #[test]
    fn numeric_sightings_reported_without_request() {
        let r = analyze("ticket number 48291 confirmed");
        assert_eq!(r.increment, 0);
        assert_eq!(r.indicators, vec!["Numeric code in message: 48291"]);
    }

    #[test]
    fn empty_input_is_quiet() {
        let r = analyze("");
        assert_eq!(r.increment, 0);
        assert!(r.indicators.is_empty());
    }
}
