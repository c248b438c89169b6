use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// The active document of a session. Text and chunks always belong together.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub text: String,
    pub chunks: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(filename: impl Into<String>, text: String, chunks: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            text,
            chunks,
            uploaded_at: Utc::now(),
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

struct Entry {
    document: Arc<Document>,
    last_access: Instant,
}

/// Session-scoped document store. Each session holds at most one document;
/// entries idle for longer than the TTL are dropped.
pub struct DocumentStore {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl DocumentStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Replaces the session's document, discarding the previous one.
    pub async fn replace(&self, session_id: &str, document: Document) -> Arc<Document> {
        let document = Arc::new(document);
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.last_access) < self.ttl);
        let expired = before - entries.len();
        if expired > 0 {
            tracing::debug!("Evicted {expired} expired document session(s)");
        }

        entries.insert(
            session_id.to_string(),
            Entry {
                document: document.clone(),
                last_access: now,
            },
        );
        document
    }

    /// Returns the session's document and refreshes its idle timer.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Document>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match entries.get_mut(session_id) {
            None => return None,
            Some(entry) if now.duration_since(entry.last_access) < self.ttl => {
                entry.last_access = now;
                return Some(entry.document.clone());
            }
            Some(_) => {}
        }

        entries.remove(session_id);
        tracing::debug!("Document session {session_id} expired");
        None
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("test.pdf", text.to_string(), vec![text.to_string()])
    }

    #[tokio::test]
    async fn test_replace_discards_previous_document() {
        let store = DocumentStore::new(Duration::from_secs(60));
        store.replace("s1", doc("first")).await;
        store.replace("s1", doc("second")).await;

        let current = store.get("s1").await.unwrap();
        assert_eq!(current.text, "second");
        assert_eq!(current.chunks, vec!["second"]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = DocumentStore::new(Duration::from_secs(60));
        store.replace("s1", doc("mine")).await;

        assert!(store.get("s2").await.is_none());
        assert_eq!(store.get("s1").await.unwrap().text, "mine");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let store = DocumentStore::new(Duration::from_secs(10));
        store.replace("s1", doc("old")).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.get("s1").await.is_some());

        // The read above refreshed the timer.
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("s1").await.is_some());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(store.get("s1").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_sweeps_expired_sessions() {
        let store = DocumentStore::new(Duration::from_secs(10));
        store.replace("stale", doc("a")).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        store.replace("fresh", doc("b")).await;

        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_char_count_counts_characters() {
        assert_eq!(doc("héllo").char_count(), 5);
    }
}
