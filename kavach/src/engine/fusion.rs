// kavach/src/engine/fusion.rs
//
// Risk fusion — merges per-signal outputs into one verdict.
//
// Mode A (max-signal): scan-message and chat turns. Signals already carry
// their own weighting internally; the fused score is the strongest signal.
//
// Mode B (ML-fused): pay validation. Weighted rule/ML blend with a
// high-ML-confidence weight swap and a rule-strong boost. A blacklist hit
// overrides everything at 100.

use crate::analyzers::qr::QrVerdict;
use crate::analyzers::rules::RuleOutcome;
use crate::analyzers::text::TextAnalysis;
use crate::clients::ml::MlPrediction;
use crate::engine::actions;
use crate::types::{dedup_ordered, FraudCategory, RiskLevel, RiskVerdict};

// ── Mode A — max-signal fusion ────────────────────────────────────────────────

pub fn fuse_signals(
    text: Option<&TextAnalysis>,
    rule: Option<&RuleOutcome>,
    qr: Option<&QrVerdict>,
) -> RiskVerdict {
    let text_score = text.map(|t| (t.confidence * 100.0).round() as u8);
    let rule_score = rule.map(|r| r.score);
    let qr_score = qr.map(|q| q.risk_score);

    let risk_score = [text_score, rule_score, qr_score]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0);

    let mut indicators: Vec<String> = Vec::new();
    let mut reasoning: Vec<String> = Vec::new();

    if let Some(t) = text {
        indicators.extend(t.indicators.iter().cloned());
        if !t.reasoning.is_empty() {
            reasoning.push(t.reasoning.clone());
        }
    }
    if let Some(r) = rule {
        indicators.extend(r.indicator_labels());
        if !r.indicators.is_empty() {
            reasoning.push(r.reasoning.clone());
        }
    }
    if let Some(q) = qr {
        indicators.extend(q.indicators.iter().cloned());
    }

    let fraud_category: Option<FraudCategory> = rule
        .and_then(|r| r.category.clone())
        .or_else(|| qr.and_then(|q| q.category.clone()));

    let recommended_actions = actions::recommended(risk_score, fraud_category.as_ref());

    RiskVerdict {
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
        fraud_category,
        indicators: dedup_ordered(indicators),
        recommended_actions,
        reasoning: if reasoning.is_empty() {
            "No risk signals available".to_string()
        } else {
            reasoning.join("; ")
        },
        ml_probability: None,
    }
}

// ── Mode B — advanced ML-fused scoring ────────────────────────────────────────

const W_RULE_DEFAULT: f32 = 0.6;
const W_ML_DEFAULT: f32 = 0.4;
const ML_CONFIDENT: f32 = 0.9;
const RULE_STRONG: u8 = 80;
const RULE_STRONG_BOOST: f32 = 10.0;

pub fn fuse_advanced(rule_score: u8, ml_probability: f32, is_blacklisted: bool) -> u8 {
    if is_blacklisted {
        return 100;
    }

    let ml_score = ml_probability.clamp(0.0, 1.0) * 100.0;
    let (w_rule, w_ml) = if ml_probability > ML_CONFIDENT {
        (W_ML_DEFAULT, W_RULE_DEFAULT) // high-ML-confidence swap: (0.4, 0.6)
    } else {
        (W_RULE_DEFAULT, W_ML_DEFAULT)
    };

    let mut score = w_rule * rule_score as f32 + w_ml * ml_score;
    if rule_score > RULE_STRONG {
        score += RULE_STRONG_BOOST;
    }

    score.clamp(0.0, 100.0).round() as u8
}

/// Unboosted linear blend for callers that want the plain form.
pub fn fuse_linear(existing: u8, ml_probability: f32) -> u8 {
    let blended =
        existing as f32 * W_RULE_DEFAULT + ml_probability.clamp(0.0, 1.0) * 100.0 * W_ML_DEFAULT;
    blended.clamp(0.0, 100.0).round() as u8
}

/// Build the full pay-validation verdict around a Mode-B score.
pub fn advanced_verdict(
    rule_score: u8,
    ml: Option<&MlPrediction>,
    is_blacklisted: bool,
    rule: &RuleOutcome,
    text: &TextAnalysis,
) -> RiskVerdict {
    let ml_probability = ml.map(|m| m.probability).unwrap_or(0.0);
    let risk_score = fuse_advanced(rule_score, ml_probability, is_blacklisted);

    let mut indicators = rule.indicator_labels();
    indicators.extend(text.indicators.iter().cloned());
    if is_blacklisted {
        indicators.insert(0, "Receiver UPI is blacklisted".to_string());
    }
    if let Some(m) = ml {
        indicators.extend(m.indicators.iter().map(|i| format!("ML: {i}")));
    }

    let fraud_category = rule.category.clone();
    let recommended_actions = actions::recommended(risk_score, fraud_category.as_ref());

    RiskVerdict {
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
        fraud_category,
        indicators: dedup_ordered(indicators),
        recommended_actions,
        reasoning: format!(
            "rule={rule_score} ml={ml_probability:.2} blacklisted={is_blacklisted}"
        ),
        ml_probability: ml.map(|m| m.probability),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_overrides_everything() {
        assert_eq!(fuse_advanced(0, 0.0, true), 100);
        assert_eq!(fuse_advanced(100, 1.0, true), 100);
    }

    #[test]
    fn default_weights_favor_rules() {
        // 0.6*50 + 0.4*50 = 50
        assert_eq!(fuse_advanced(50, 0.5, false), 50);
        // 0.6*70 + 0.4*0 = 42
        assert_eq!(fuse_advanced(70, 0.0, false), 42);
    }

    #[test]
    fn confident_ml_swaps_weights() {
        // 0.4*50 + 0.6*95 = 77
        assert_eq!(fuse_advanced(50, 0.95, false), 77);
        // exactly 0.9 keeps default weights: 0.6*50 + 0.4*90 = 66
        assert_eq!(fuse_advanced(50, 0.9, false), 66);
    }

    #[test]
    fn strong_rules_get_boosted() {
        // 0.6*100 + 10 = 70
        assert_eq!(fuse_advanced(100, 0.0, false), 70);
        // boundary: 80 is not "above 80"
        assert_eq!(fuse_advanced(80, 0.0, false), 48);
        assert_eq!(fuse_advanced(81, 0.0, false), 59);
    }

    #[test]
    fn output_stays_in_range_everywhere() {
        for rule in (0..=100).step_by(5) {
            for p10 in 0..=10 {
                let p = p10 as f32 / 10.0;
                for bl in [false, true] {
                    let s = fuse_advanced(rule, p, bl);
                    assert!(s <= 100, "rule={rule} p={p} bl={bl} → {s}");
                    if bl {
                        assert_eq!(s, 100);
                    }
                }
            }
        }
    }

    #[test]
    fn linear_blend_is_unboosted() {
        assert_eq!(fuse_linear(100, 0.0), 60);
        assert_eq!(fuse_linear(50, 1.0), 70);
    }

    #[test]
    fn max_fusion_takes_strongest_signal() {
        let text = TextAnalysis {
            is_scam:    true,
            confidence: 0.62,
            scam_type:  None,
            indicators: vec!["Scam language: urgency".into()],
            reasoning:  "Scam language categories: urgency".into(),
        };
        let rule = RuleOutcome {
            score:      35,
            indicators: vec![],
            category:   None,
            reasoning:  "No risk patterns triggered".into(),
        };
        let v = fuse_signals(Some(&text), Some(&rule), None);
        assert_eq!(v.risk_score, 62);
        assert_eq!(v.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn empty_signal_set_is_low() {
        let v = fuse_signals(None, None, None);
        assert_eq!(v.risk_score, 0);
        assert_eq!(v.risk_level, RiskLevel::Low);
        assert!(!v.recommended_actions.is_empty());
    }

    #[test]
    fn indicators_deduplicate_across_signals() {
        let text = TextAnalysis {
            is_scam:    true,
            confidence: 0.8,
            scam_type:  None,
            indicators: vec!["dup".into(), "dup".into(), "one".into()],
            reasoning:  String::new(),
        };
        let v = fuse_signals(Some(&text), None, None);
        assert_eq!(
            v.indicators.iter().filter(|i| i.as_str() == "dup").count(),
            1
        );
    }
}
