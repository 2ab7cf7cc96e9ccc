// kavach/src/audit.rs
//
// Append-only JSONL audit trail. One file per event kind plus a combined
// log; wire these to your SIEM ingestion in production.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::types::{BlacklistEntry, RiskVerdict};

pub struct Audit {
    out: PathBuf,
}

impl Audit {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let out: PathBuf = output_dir.into();
        std::fs::create_dir_all(&out).expect("Failed to create output directory");
        Self { out }
    }

    pub async fn record_verdict(&self, entry_point: &str, subject: &str, verdict: &RiskVerdict) {
        let line = json!({
            "ts":         Utc::now(),
            "entryPoint": entry_point,
            "subject":    subject,
            "riskScore":  verdict.risk_score,
            "riskLevel":  verdict.risk_level,
            "category":   verdict.fraud_category,
            "indicators": verdict.indicators,
        });
        self.append("verdicts.jsonl", &line.to_string()).await;
    }

    pub async fn record_blacklist(&self, origin: &str, entry: &BlacklistEntry) {
        let line = json!({
            "ts":     Utc::now(),
            "origin": origin,
            "entry":  entry,
        });
        self.append("blacklist_writes.jsonl", &line.to_string()).await;
    }

    async fn append(&self, file: &str, line: &str) {
        if let Err(e) = self.write(file, line).await {
            warn!("Audit write to {file} failed: {e}");
        }
    }

    async fn write(&self, file: &str, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.out.join(file))
            .await?;
        f.write_all(format!("{line}\n").as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verdict_lines_are_jsonl() {
        let dir = std::env::temp_dir().join("kavach_audit_test");
        let _ = std::fs::remove_dir_all(&dir);
        let audit = Audit::new(&dir);

        let v = crate::engine::fusion::fuse_signals(None, None, None);
        audit.record_verdict("scan", "msg", &v).await;
        audit.record_verdict("scan", "msg2", &v).await;

        let content = std::fs::read_to_string(dir.join("verdicts.jsonl")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("riskScore").is_some());
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
