// kavach/src/metrics.rs
//
// Operational metrics in Prometheus text exposition format.
//
//   kavach_scans_total              Counter — message scans served
//   kavach_qr_scans_total           Counter — QR scans served
//   kavach_validations_total        Counter — pay validations served
//   kavach_chat_turns_total         Counter — chat turns processed
//   kavach_diversions_total         Counter — sessions diverted to honeypot
//   kavach_blacklist_hits_total     Counter — blacklist matches
//   kavach_honeypot_messages_total  Counter — standalone honeypot turns
//   kavach_callbacks_sent_total     Counter — intelligence callbacks delivered
//   kavach_ml_failures_total        Counter — ML service timeouts/errors
//   kavach_verdicts_total{level}    Counter — verdicts by risk level
//   kavach_risk_score_bucket        Counter — verdict score distribution
//   kavach_*_active                 Gauge   — live store sizes
//
// Endpoint: GET /metrics (unauthenticated).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::RiskLevel;

pub struct Metrics {
    pub scans_total:        AtomicU64,
    pub qr_scans_total:     AtomicU64,
    pub validations_total:  AtomicU64,
    pub chat_turns_total:   AtomicU64,
    pub diversions_total:   AtomicU64,
    pub blacklist_hits:     AtomicU64,
    pub honeypot_messages:  AtomicU64,
    pub callbacks_sent:     AtomicU64,
    pub ml_failures:        AtomicU64,
    pub verdicts_low:       AtomicU64,
    pub verdicts_medium:    AtomicU64,
    pub verdicts_high:      AtomicU64,
    pub verdicts_critical:  AtomicU64,
    /// Verdict score buckets [0,10), [10,20), … [90,100].
    pub score_buckets:      [AtomicU64; 10],
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scans_total:       AtomicU64::new(0),
            qr_scans_total:    AtomicU64::new(0),
            validations_total: AtomicU64::new(0),
            chat_turns_total:  AtomicU64::new(0),
            diversions_total:  AtomicU64::new(0),
            blacklist_hits:    AtomicU64::new(0),
            honeypot_messages: AtomicU64::new(0),
            callbacks_sent:    AtomicU64::new(0),
            ml_failures:       AtomicU64::new(0),
            verdicts_low:      AtomicU64::new(0),
            verdicts_medium:   AtomicU64::new(0),
            verdicts_high:     AtomicU64::new(0),
            verdicts_critical: AtomicU64::new(0),
            score_buckets:     Default::default(),
        })
    }

    pub fn record_verdict(&self, score: u8, level: RiskLevel) {
        match level {
            RiskLevel::Low      => self.verdicts_low.fetch_add(1, Ordering::Relaxed),
            RiskLevel::Medium   => self.verdicts_medium.fetch_add(1, Ordering::Relaxed),
            RiskLevel::High     => self.verdicts_high.fetch_add(1, Ordering::Relaxed),
            RiskLevel::Critical => self.verdicts_critical.fetch_add(1, Ordering::Relaxed),
        };
        let bucket = (score as usize / 10).min(9);
        self.score_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Render in Prometheus text exposition format.
    pub fn prometheus_text(
        &self,
        honeypot_active: usize,
        chat_sessions: usize,
        blacklist_size: usize,
        phishing_domains: usize,
    ) -> String {
        let mut out = String::with_capacity(4096);

        macro_rules! counter {
            ($name:expr, $help:expr, $val:expr) => {
                out.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
                    $name, $help, $name, $name, $val
                ));
            };
        }
        macro_rules! gauge {
            ($name:expr, $help:expr, $val:expr) => {
                out.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
                    $name, $help, $name, $name, $val
                ));
            };
        }

        counter!("kavach_scans_total", "Message scans served",
                 self.scans_total.load(Ordering::Relaxed));
        counter!("kavach_qr_scans_total", "QR scans served",
                 self.qr_scans_total.load(Ordering::Relaxed));
        counter!("kavach_validations_total", "Pay validations served",
                 self.validations_total.load(Ordering::Relaxed));
        counter!("kavach_chat_turns_total", "Chat turns processed",
                 self.chat_turns_total.load(Ordering::Relaxed));
        counter!("kavach_diversions_total", "Sessions diverted to honeypot",
                 self.diversions_total.load(Ordering::Relaxed));
        counter!("kavach_blacklist_hits_total", "Blacklist matches",
                 self.blacklist_hits.load(Ordering::Relaxed));
        counter!("kavach_honeypot_messages_total", "Standalone honeypot turns",
                 self.honeypot_messages.load(Ordering::Relaxed));
        counter!("kavach_callbacks_sent_total", "Intelligence callbacks delivered",
                 self.callbacks_sent.load(Ordering::Relaxed));
        counter!("kavach_ml_failures_total", "ML service failures",
                 self.ml_failures.load(Ordering::Relaxed));

        out.push_str("# HELP kavach_verdicts_total Verdicts by risk level\n");
        out.push_str("# TYPE kavach_verdicts_total counter\n");
        for (label, val) in [
            ("low", &self.verdicts_low),
            ("medium", &self.verdicts_medium),
            ("high", &self.verdicts_high),
            ("critical", &self.verdicts_critical),
        ] {
            out.push_str(&format!(
                "kavach_verdicts_total{{level=\"{}\"}} {}\n",
                label,
                val.load(Ordering::Relaxed)
            ));
        }

        out.push_str("# HELP kavach_risk_score_bucket Verdict score distribution (10-wide buckets)\n");
        out.push_str("# TYPE kavach_risk_score_bucket counter\n");
        for (i, bucket) in self.score_buckets.iter().enumerate() {
            out.push_str(&format!(
                "kavach_risk_score_bucket{{le=\"{}\"}} {}\n",
                (i + 1) * 10,
                bucket.load(Ordering::Relaxed)
            ));
        }

        gauge!("kavach_honeypot_sessions_active", "Live in-memory honeypot sessions",
               honeypot_active);
        gauge!("kavach_chat_sessions_active", "Chat sessions in store", chat_sessions);
        gauge!("kavach_blacklist_entries", "Blacklist entries", blacklist_size);
        gauge!("kavach_phishing_domains", "Phishing domains", phishing_domains);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts_land_in_level_and_bucket() {
        let m = Metrics::new();
        m.record_verdict(95, RiskLevel::Critical);
        m.record_verdict(12, RiskLevel::Low);
        m.record_verdict(100, RiskLevel::Critical);

        assert_eq!(m.verdicts_critical.load(Ordering::Relaxed), 2);
        assert_eq!(m.verdicts_low.load(Ordering::Relaxed), 1);
        // 100 clamps into the top bucket
        assert_eq!(m.score_buckets[9].load(Ordering::Relaxed), 2);
        assert_eq!(m.score_buckets[1].load(Ordering::Relaxed), 1);
    }

    #[test]
    fn exposition_format_parses_visually() {
        let m = Metrics::new();
        m.scans_total.fetch_add(3, Ordering::Relaxed);
        let text = m.prometheus_text(1, 2, 3, 4);
        assert!(text.contains("kavach_scans_total 3"));
        assert!(text.contains("kavach_honeypot_sessions_active 1"));
        assert!(text.contains("# TYPE kavach_verdicts_total counter"));
    }
}
