// kavach/src/store/sessions.rs
//
// Chat-session store. Each session document lives behind its own async
// mutex: the orchestrator holds the lock for a whole turn, which serializes
// concurrent turns on one session while leaving other sessions untouched.
// A reader never observes a honeypot reply without its preceding scammer
// message because both are appended under the same lock before save.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

use super::persist::PersistOp;
use crate::types::ChatSession;

pub struct SessionStore {
    sessions:    DashMap<String, Arc<Mutex<ChatSession>>>,
    scammer_idx: DashMap<String, BTreeSet<String>>, // scammer_id → session_ids
    persist:     OnceLock<UnboundedSender<PersistOp>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions:    DashMap::new(),
            scammer_idx: DashMap::new(),
            persist:     OnceLock::new(),
        }
    }

    pub fn attach_persistence(&self, tx: UnboundedSender<PersistOp>) {
        let _ = self.persist.set(tx);
    }

    pub fn find(&self, session_id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn get_or_create(
        &self,
        session_id: &str,
        scammer_id: &str,
        victim_id: Option<String>,
    ) -> Arc<Mutex<ChatSession>> {
        let doc = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ChatSession::new(session_id, scammer_id, victim_id)))
            })
            .clone();
        self.scammer_idx
            .entry(scammer_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        doc
    }

    /// Write the whole document through to persistence. The in-memory copy
    /// is already current — callers mutate under the session mutex.
    pub fn save(&self, session: &ChatSession) {
        if let Some(tx) = self.persist.get() {
            let _ = tx.send(PersistOp::Session(session.clone()));
        }
    }

    pub fn restore(&self, session: ChatSession) {
        self.scammer_idx
            .entry(session.scammer_id.clone())
            .or_default()
            .insert(session.session_id.clone());
        self.sessions
            .insert(session.session_id.clone(), Arc::new(Mutex::new(session)));
    }

    pub fn sessions_for_scammer(&self, scammer_id: &str) -> BTreeSet<String> {
        self.scammer_idx
            .get(scammer_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ChatRole};

    #[tokio::test]
    async fn get_or_create_returns_same_document() {
        let store = SessionStore::new();
        let a = store.get_or_create("s1", "scammer-1", None);
        let b = store.get_or_create("s1", "scammer-1", None);
        a.lock().await.messages.push(ChatMessage::new(ChatRole::Scammer, "hi", false));
        assert_eq!(b.lock().await.messages.len(), 1);
    }

    #[tokio::test]
    async fn scammer_index_tracks_sessions() {
        let store = SessionStore::new();
        store.get_or_create("s1", "scammer-1", None);
        store.get_or_create("s2", "scammer-1", None);
        store.get_or_create("s3", "scammer-2", None);
        assert_eq!(store.sessions_for_scammer("scammer-1").len(), 2);
        assert_eq!(store.sessions_for_scammer("scammer-2").len(), 1);
    }

    #[tokio::test]
    async fn concurrent_turns_serialize_per_session() {
        let store = Arc::new(SessionStore::new());
        let doc = store.get_or_create("s1", "scammer-1", None);

        let mut handles = Vec::new();
        for i in 0..16 {
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                let mut s = doc.lock().await;
                let text = format!("turn {i}");
                s.messages.push(ChatMessage::new(ChatRole::Scammer, &text, false));
                if i % 2 == 0 {
                    s.diverted_to_honeypot = true;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let s = doc.lock().await;
        assert_eq!(s.messages.len(), 16);
        assert!(s.diverted_to_honeypot);
    }
}
