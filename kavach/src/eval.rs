// kavach/src/eval.rs
//
// Labeled dataset evaluation — benchmarks the rule-only scan pipeline
// (LLM and ML collaborators disabled, as in degraded production mode).
//
// Dataset format, one JSON object per line:
//   { "text": "message body", "isScam": true }
//
// Run:
//   kavach --mode eval --path labeled_messages.jsonl
//   kavach --mode eval --path labeled_messages.jsonl --eval-threshold 50

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use tracing::info;

use crate::analyzers::{rules, text};
use crate::engine::fusion;
use crate::extract;
use crate::store::phishing::PhishingStore;
use crate::types::TxSource;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabeledMessage {
    text:    String,
    is_scam: bool,
}

// ── Counters ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct EvalMetrics {
    pub tp:  u64,
    pub fp:  u64,
    pub tn:  u64,
    pub fn_: u64,
}

impl EvalMetrics {
    pub fn precision(&self) -> f64 {
        let denom = self.tp + self.fp;
        if denom == 0 { 1.0 } else { self.tp as f64 / denom as f64 }
    }

    pub fn recall(&self) -> f64 {
        let denom = self.tp + self.fn_;
        if denom == 0 { 0.0 } else { self.tp as f64 / denom as f64 }
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn fpr(&self) -> f64 {
        let denom = self.fp + self.tn;
        if denom == 0 { 0.0 } else { self.fp as f64 / denom as f64 }
    }

    fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true)   => self.tp += 1,
            (true, false)  => self.fp += 1,
            (false, true)  => self.fn_ += 1,
            (false, false) => self.tn += 1,
        }
    }
}

// ── Result ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct EvalResult {
    pub n_messages:  usize,
    pub n_positive:  usize,
    pub n_negative:  usize,
    pub threshold:   u8,
    pub global:      EvalMetrics,
    pub per_signal:  HashMap<&'static str, EvalMetrics>,
    pub band_counts: HashMap<String, u64>,
    /// 5-point-wide score bins.
    pub score_bins:  Vec<usize>,
}

impl EvalResult {
    /// Approximate AUC from TPR/FPR at the single operating threshold.
    pub fn auc_approx(&self) -> f64 {
        (1.0 + self.global.recall() - self.global.fpr()) / 2.0
    }

    pub fn print_report(&self) {
        println!("\n## Kavach Scan-Pipeline Evaluation\n");
        println!("| Metric    | Value  |");
        println!("|-----------|--------|");
        println!("| Messages  | {}     |", self.n_messages);
        println!("| Positive  | {}     |", self.n_positive);
        println!("| Negative  | {}     |", self.n_negative);
        println!("| Threshold | {}     |", self.threshold);
        println!("| Precision | {:.4} |", self.global.precision());
        println!("| Recall    | {:.4} |", self.global.recall());
        println!("| F1        | {:.4} |", self.global.f1());
        println!("| FPR       | {:.4} |", self.global.fpr());
        println!("| AUC≈      | {:.4} |", self.auc_approx());

        println!("\n### Per-Signal Performance\n");
        println!("| Signal | P | R | F1 | FPR |");
        println!("|--------|---|---|----|-----|");
        let mut signals: Vec<_> = self.per_signal.iter().collect();
        signals.sort_by(|a, b| b.1.f1().partial_cmp(&a.1.f1()).unwrap());
        for (name, m) in signals {
            println!(
                "| {:12} | {:.3} | {:.3} | {:.3} | {:.4} |",
                name, m.precision(), m.recall(), m.f1(), m.fpr()
            );
        }

        println!("\n### Risk Levels\n");
        for (band, count) in &self.band_counts {
            println!("  {band:8} {count}");
        }

        println!("\n### Score Distribution\n");
        for (i, count) in self.score_bins.iter().enumerate() {
            let bar: String =
                "#".repeat((*count as f64 / self.n_messages.max(1) as f64 * 80.0) as usize);
            println!("{:3}–{:3} | {:5} | {}", i * 5, i * 5 + 5, count, bar);
        }
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

pub struct Evaluator {
    threshold: u8,
}

impl Evaluator {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub async fn run_dataset(&self, path: &Path) -> Result<EvalResult> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut messages = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LabeledMessage>(line) {
                Ok(m) => messages.push(m),
                Err(e) => tracing::warn!("Dataset parse error: {e}"),
            }
        }
        info!("Loaded {} labeled messages from {}", messages.len(), path.display());
        self.evaluate(messages).await
    }

    async fn evaluate(&self, messages: Vec<LabeledMessage>) -> Result<EvalResult> {
        let phishing = PhishingStore::new();
        phishing.seed_if_empty();

        let n_messages = messages.len();
        let n_positive = messages.iter().filter(|m| m.is_scam).count();
        let n_negative = n_messages - n_positive;

        let mut global = EvalMetrics::default();
        let mut per_signal: HashMap<&'static str, EvalMetrics> = HashMap::new();
        let mut band_counts: HashMap<String, u64> = HashMap::new();
        let mut score_bins = vec![0usize; 20];

        for msg in &messages {
            let extraction = extract::extract_rules(&msg.text);
            let tx = extraction.to_transaction(TxSource::Sms);

            let text_a = text::analyze(&msg.text, None, &phishing, 0.4).await;
            let rule_o = rules::analyze(&tx);
            let verdict = fusion::fuse_signals(Some(&text_a), Some(&rule_o), None);

            global.record(verdict.risk_score >= self.threshold, msg.is_scam);
            per_signal
                .entry("text")
                .or_default()
                .record(text_a.confidence >= 0.4, msg.is_scam);
            per_signal
                .entry("transaction")
                .or_default()
                .record(rule_o.score >= 40, msg.is_scam);

            *band_counts.entry(verdict.risk_level.to_string()).or_default() += 1;
            score_bins[(verdict.risk_score as usize / 5).min(19)] += 1;
        }

        Ok(EvalResult {
            n_messages,
            n_positive,
            n_negative,
            threshold: self.threshold,
            global,
            per_signal,
            band_counts,
            score_bins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_formulas() {
        let m = EvalMetrics { tp: 8, fp: 2, tn: 88, fn_: 2 };
        assert!((m.precision() - 0.8).abs() < 1e-9);
        assert!((m.recall() - 0.8).abs() < 1e-9);
        assert!((m.f1() - 0.8).abs() < 1e-9);
        assert!((m.fpr() - 2.0 / 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn evaluator_separates_obvious_cases() {
        let messages = vec![
            LabeledMessage {
                text: "Your account is blocked! Complete KYC immediately, share otp 123456 \
                       or police will arrest you"
                    .into(),
                is_scam: true,
            },
            LabeledMessage {
                text: "Hi Priya, sending Rs 500 for dinner. My UPI: amit@oksbi.".into(),
                is_scam: false,
            },
            LabeledMessage {
                text: "Congratulations lottery winner! pay now the processing fee urgent".into(),
                is_scam: true,
            },
        ];

        let result = Evaluator::new(40).evaluate(messages).await.unwrap();
        assert_eq!(result.n_messages, 3);
        assert_eq!(result.n_positive, 2);
        assert_eq!(result.global.tp, 2);
        assert_eq!(result.global.fp, 0);
        assert!(result.auc_approx() > 0.9);
    }
}
