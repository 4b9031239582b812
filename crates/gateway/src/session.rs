//! Session lifecycle and the process-wide session map.
//!
//! The only process-wide mutable state: sessionId → [`SessionState`],
//! guarded single-writer/many-readers. Entries are added when a transport
//! opens a session and removed on its close signal; closing cancels the
//! session token so in-flight upstream calls abort and their results are
//! discarded.

use crate::config::GatewayConfig;
use crate::jsonrpc::JsonRpcError;
use crate::registry::ToolRegistry;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-session state: captured auth headers, the lazily compiled registry,
/// and (for the SSE transport) the outbound frame channel.
pub struct SessionState {
    pub id: String,
    pub created_at: Instant,
    pub cancel: CancellationToken,
    headers: Vec<(String, String)>,
    registry: tokio::sync::OnceCell<Arc<ToolRegistry>>,
    outbox: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl SessionState {
    /// Headers captured at session start; forwarded verbatim upstream.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The session's tool registry, compiled on first use.
    ///
    /// Compilation runs once per session; a failed attempt is not cached,
    /// so a later call retries.
    ///
    /// # Errors
    ///
    /// Propagates the mapped compile error of the underlying source.
    pub async fn registry(
        &self,
        config: &GatewayConfig,
    ) -> Result<Arc<ToolRegistry>, JsonRpcError> {
        self.registry
            .get_or_try_init(|| async {
                let registry = ToolRegistry::compile(config, &self.headers).await?;
                Ok(Arc::new(registry))
            })
            .await
            .cloned()
    }

    /// Attach the SSE outbox; response frames for this session flow there.
    pub fn attach_outbox(&self, tx: mpsc::UnboundedSender<String>) {
        *self.outbox.lock() = Some(tx);
    }

    /// Push a serialized frame to the session's event stream.
    ///
    /// Returns `false` when no stream is attached or the client is gone.
    pub fn push_frame(&self, frame: String) -> bool {
        match self.outbox.lock().as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}

/// The process-wide session map.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionState>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session, capturing the credential-bearing inbound headers.
    pub fn create(&self, headers: Vec<(String, String)>) -> Arc<SessionState> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(SessionState {
            id: id.clone(),
            created_at: Instant::now(),
            cancel: CancellationToken::new(),
            headers,
            registry: tokio::sync::OnceCell::new(),
            outbox: Mutex::new(None),
        });
        self.sessions.write().insert(id.clone(), session.clone());
        tracing::info!(session_id = %id, "session opened");
        session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<SessionState>> {
        self.sessions.read().get(id).cloned()
    }

    /// Existing session for `id`, or a fresh one when unknown/absent.
    pub fn get_or_create(
        &self,
        id: Option<&str>,
        headers: Vec<(String, String)>,
    ) -> Arc<SessionState> {
        if let Some(session) = id.and_then(|id| self.get(id)) {
            return session;
        }
        self.create(headers)
    }

    /// Close signal: drop the session and cancel its in-flight calls.
    pub fn close(&self, id: &str) {
        if let Some(session) = self.sessions.write().remove(id) {
            session.cancel.cancel();
            tracing::info!(
                session_id = %id,
                age_secs = session.created_at.elapsed().as_secs(),
                "session closed"
            );
        }
    }

    /// Cancel every session (global shutdown drain).
    pub fn shutdown_all(&self) {
        let mut sessions = self.sessions.write();
        for session in sessions.values() {
            session.cancel.cancel();
        }
        sessions.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_removes_and_cancels() {
        let registry = SessionRegistry::new();
        let session = registry.create(vec![("x-api-key".to_string(), "k".to_string())]);
        assert_eq!(registry.len(), 1);
        assert_eq!(session.headers()[0].0, "x-api-key");

        let token = session.cancel.clone();
        registry.close(&session.id);
        assert!(registry.is_empty());
        assert!(token.is_cancelled());
    }

    #[test]
    fn get_or_create_reuses_known_ids() {
        let registry = SessionRegistry::new();
        let session = registry.create(Vec::new());
        let again = registry.get_or_create(Some(&session.id), Vec::new());
        assert_eq!(session.id, again.id);

        let fresh = registry.get_or_create(Some("unknown"), Vec::new());
        assert_ne!(fresh.id, session.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn shutdown_cancels_everything() {
        let registry = SessionRegistry::new();
        let a = registry.create(Vec::new());
        let b = registry.create(Vec::new());
        registry.shutdown_all();
        assert!(registry.is_empty());
        assert!(a.cancel.is_cancelled());
        assert!(b.cancel.is_cancelled());
    }
}
