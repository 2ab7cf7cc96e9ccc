// kavach/src/store/persist.rs
//
// Redis persistence — write-through plus startup restore.
//
// Data layout:
//   kv:session:{session_id}     — JSON ChatSession   (TTL = 30 days)
//   kv:blacklist:{scammer_id}   — JSON BlacklistEntry (no TTL)
//   kv:phishing:{domain}        — RFC3339 added-at    (no TTL)
//   kv:meta:checkpoint          — Unix timestamp of last writer tick
//
// Stores push whole documents through an unbounded channel; a single writer
// task drains it. Without a live Redis every operation degrades gracefully
// (log once, keep serving from memory) — durability is lost, correctness
// is not.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use super::blacklist::BlacklistStore;
use super::phishing::PhishingStore;
use super::sessions::SessionStore;
use crate::types::{BlacklistEntry, ChatSession};

const SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const CHECKPOINT_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub enum PersistOp {
    Session(ChatSession),
    Blacklist(BlacklistEntry),
    Phishing(String),
}

pub fn channel() -> (UnboundedSender<PersistOp>, UnboundedReceiver<PersistOp>) {
    mpsc::unbounded_channel()
}

pub async fn connect(url: &str) -> Option<redis::aio::MultiplexedConnection> {
    let client = match redis::Client::open(url) {
        Ok(c) => c,
        Err(e) => {
            warn!("Redis URL invalid ({e}) — running without persistence");
            return None;
        }
    };
    match client.get_multiplexed_tokio_connection().await {
        Ok(con) => {
            info!("Redis persistence connected: {url}");
            Some(con)
        }
        Err(e) => {
            warn!("Redis unreachable ({e}) — running without persistence");
            None
        }
    }
}

// ── Startup restore ───────────────────────────────────────────────────────────

pub async fn restore_all(
    con: &redis::aio::MultiplexedConnection,
    sessions: &SessionStore,
    blacklist: &BlacklistStore,
    phishing: &PhishingStore,
) -> Result<(usize, usize, usize)> {
    let n_sessions = restore_sessions(con.clone(), sessions).await?;
    let n_blacklist = restore_blacklist(con.clone(), blacklist).await?;
    let n_phishing = restore_phishing(con.clone(), phishing).await?;
    info!(
        "Restored state: {n_sessions} sessions, {n_blacklist} blacklist entries, \
         {n_phishing} phishing domains"
    );
    Ok((n_sessions, n_blacklist, n_phishing))
}

async fn scan_keys(
    mut con: redis::aio::MultiplexedConnection,
    pattern: &str,
) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut iter: redis::AsyncIter<String> = con.scan_match(pattern).await?;
    while let Some(k) = iter.next_item().await {
        keys.push(k);
    }
    Ok(keys)
}

async fn restore_sessions(
    con: redis::aio::MultiplexedConnection,
    store: &SessionStore,
) -> Result<usize> {
    let keys = scan_keys(con.clone(), "kv:session:*").await?;
    let mut con = con;
    let mut n = 0;
    for key in keys {
        let raw: Option<String> = con.get(&key).await?;
        let Some(raw) = raw else { continue };
        match serde_json::from_str::<ChatSession>(&raw) {
            Ok(s) => {
                store.restore(s);
                n += 1;
            }
            Err(e) => warn!("Skipping corrupt session document {key}: {e}"),
        }
    }
    Ok(n)
}

async fn restore_blacklist(
    con: redis::aio::MultiplexedConnection,
    store: &BlacklistStore,
) -> Result<usize> {
    let keys = scan_keys(con.clone(), "kv:blacklist:*").await?;
    let mut con = con;
    let mut n = 0;
    for key in keys {
        let raw: Option<String> = con.get(&key).await?;
        let Some(raw) = raw else { continue };
        match serde_json::from_str::<BlacklistEntry>(&raw) {
            Ok(e) => {
                store.restore(e);
                n += 1;
            }
            Err(e) => warn!("Skipping corrupt blacklist document {key}: {e}"),
        }
    }
    Ok(n)
}

async fn restore_phishing(
    con: redis::aio::MultiplexedConnection,
    store: &PhishingStore,
) -> Result<usize> {
    let keys = scan_keys(con.clone(), "kv:phishing:*").await?;
    let mut con = con;
    let mut n = 0;
    for key in keys {
        let domain = key.trim_start_matches("kv:phishing:").to_string();
        let raw: Option<String> = con.get(&key).await?;
        let added_at = raw
            .and_then(|r| DateTime::parse_from_rfc3339(&r).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        store.restore(&domain, added_at);
        n += 1;
    }
    Ok(n)
}

// ── Writer task ───────────────────────────────────────────────────────────────

pub fn spawn_writer(
    con: Option<redis::aio::MultiplexedConnection>,
    mut rx: UnboundedReceiver<PersistOp>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(mut con) = con else {
            // Degraded mode: drain and discard so senders never block or error.
            while rx.recv().await.is_some() {}
            return;
        };

        let mut tick = tokio::time::interval(std::time::Duration::from_secs(
            CHECKPOINT_INTERVAL_SECS,
        ));
        loop {
            tokio::select! {
                op = rx.recv() => match op {
                    Some(op) => {
                        if let Err(e) = write_op(&mut con, &op).await {
                            warn!("Persistence write failed: {e}");
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => {
                    let ts = Utc::now().timestamp();
                    if let Err(e) = con
                        .set::<_, _, ()>("kv:meta:checkpoint", ts)
                        .await
                    {
                        warn!("Checkpoint write failed: {e}");
                    }
                }
            }
        }
    })
}

async fn write_op(
    con: &mut redis::aio::MultiplexedConnection,
    op: &PersistOp,
) -> Result<()> {
    match op {
        PersistOp::Session(s) => {
            let key = format!("kv:session:{}", s.session_id);
            let val = serde_json::to_string(s)?;
            con.set_ex::<_, _, ()>(key, val, SESSION_TTL_SECS).await?;
        }
        PersistOp::Blacklist(e) => {
            let key = format!("kv:blacklist:{}", e.scammer_id);
            let val = serde_json::to_string(e)?;
            con.set::<_, _, ()>(key, val).await?;
        }
        PersistOp::Phishing(domain) => {
            let key = format!("kv:phishing:{domain}");
            con.set::<_, _, ()>(key, Utc::now().to_rfc3339()).await?;
        }
    }
    Ok(())
}

/// Wire the write-through channel into all three stores and start the
/// writer. Returns the writer handle so shutdown can await the drain.
pub fn start(
    con: Option<redis::aio::MultiplexedConnection>,
    sessions: &Arc<SessionStore>,
    blacklist: &Arc<BlacklistStore>,
    phishing: &Arc<PhishingStore>,
) -> tokio::task::JoinHandle<()> {
    let (tx, rx) = channel();
    sessions.attach_persistence(tx.clone());
    blacklist.attach_persistence(tx.clone());
    phishing.attach_persistence(tx);
    spawn_writer(con, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatSession;

    #[test]
    fn session_documents_round_trip() {
        let s = ChatSession::new("s1", "scammer-1", Some("victim-1".into()));
        let json = serde_json::to_string(&s).unwrap();
        let back: ChatSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, "s1");
        assert_eq!(back.victim_id.as_deref(), Some("victim-1"));
        assert!(!back.diverted_to_honeypot);
    }

    #[tokio::test]
    async fn degraded_writer_discards_without_error() {
        let (tx, rx) = channel();
        let handle = spawn_writer(None, rx);
        tx.send(PersistOp::Phishing("a.xyz".into())).unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
