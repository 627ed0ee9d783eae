use codetidy_core::Language;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredCode {
    pub language: Language,
    pub code: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    pub email: String,
    pub standardized: Option<StoredCode>,
}

/// In-memory per-visit state, keyed by an opaque cookie id. Discarded with
/// the process; nothing is persisted.
#[derive(Default)]
pub(crate) struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    counter: AtomicU64,
}

impl SessionStore {
    pub fn create(&self, email: &str) -> String {
        let nonce = self.counter.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(nonce.to_le_bytes());
        hasher.update(nanos.to_le_bytes());
        hasher.update(email.as_bytes());
        let id = format!("{:x}", hasher.finalize());

        let session = Session {
            email: email.to_string(),
            standardized: None,
        };
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id.clone(), session);
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().ok()?.get(id).cloned()
    }

    pub fn store_code(&self, id: &str, stored: StoredCode) {
        if let Ok(mut sessions) = self.sessions.lock()
            && let Some(session) = sessions.get_mut(id)
        {
            session.standardized = Some(stored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionStore, StoredCode};
    use codetidy_core::Language;

    #[test]
    fn created_sessions_are_distinct() {
        let store = SessionStore::default();
        let a = store.create("a@example.com");
        let b = store.create("a@example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn stored_code_round_trips() {
        let store = SessionStore::default();
        let id = store.create("user@example.com");
        store.store_code(
            &id,
            StoredCode {
                language: Language::Python,
                code: "print(1)".to_string(),
                system_prompt: "sys".to_string(),
            },
        );

        let session = store.get(&id).expect("session should exist");
        assert_eq!(session.email, "user@example.com");
        let stored = session.standardized.expect("code should be stored");
        assert_eq!(stored.code, "print(1)");
        assert_eq!(stored.language, Language::Python);
    }

    #[test]
    fn unknown_id_yields_no_session() {
        let store = SessionStore::default();
        assert!(store.get("missing").is_none());
    }
}
