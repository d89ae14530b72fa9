//! Gateway session cache and credential capability
//!
//! [`SessionManager`] keeps at most one live [`Session`] per server type for
//! the lifetime of a gateway connection. Credentials are not read here: they
//! are obtained through a [`CredentialProvider`] supplied by the caller.
//!
//! The cache is keyed by server type alone. Calling
//! [`SessionManager::ensure_session`] with different credentials for a type
//! that is already cached returns the existing session unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};

use crate::error::Result;
use crate::mcp::transport::gateway::GatewayTransport;
use crate::mcp::types::Session;

/// Source of the environment variables injected into a new gateway session.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Variables to inject for `server_type`, keyed by variable name.
    async fn credentials(&self, server_type: &str) -> Result<HashMap<String, String>>;
}

/// In-memory credentials, fixed at construction.
///
/// Server types without an entry get an empty map.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    by_server_type: HashMap<String, HashMap<String, String>>,
}

impl StaticCredentials {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one variable for `server_type`.
    pub fn with(
        mut self,
        server_type: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.by_server_type
            .entry(server_type.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, server_type: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .by_server_type
            .get(server_type)
            .cloned()
            .unwrap_or_default())
    }
}

/// Credentials read from this process's environment at session creation.
///
/// Each server type maps injected variable names to the environment
/// variable that supplies the value, e.g.
/// `CONFLUENCE_API_TOKEN -> ATLASSIAN_API_TOKEN`. Unset sources are skipped
/// with a warning.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    mappings: HashMap<String, HashMap<String, String>>,
}

impl EnvCredentials {
    /// Create a provider from `server_type -> {injected -> source}` mappings.
    pub fn new(mappings: HashMap<String, HashMap<String, String>>) -> Self {
        Self { mappings }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn credentials(&self, server_type: &str) -> Result<HashMap<String, String>> {
        let Some(mapping) = self.mappings.get(server_type) else {
            return Ok(HashMap::new());
        };

        let mut resolved = HashMap::with_capacity(mapping.len());
        for (injected, source) in mapping {
            match std::env::var(source) {
                Ok(value) => {
                    resolved.insert(injected.clone(), value);
                }
                Err(_) => tracing::warn!(
                    server_type,
                    variable = %source,
                    "credential source variable not set; skipping {injected}"
                ),
            }
        }
        Ok(resolved)
    }
}

/// One server type's slot: empty until its `create-session` succeeds.
type SessionSlot = Arc<OnceCell<Session>>;

/// Per-connection cache of gateway sessions.
///
/// The map lock only guards slot lookup and removal. Creation runs on the
/// server type's own slot, so a slow `create-session` for one type never
/// delays callers for another.
#[derive(Debug)]
pub struct SessionManager {
    transport: Arc<GatewayTransport>,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionManager {
    /// Create a manager over an open gateway connection.
    pub fn new(transport: Arc<GatewayTransport>) -> Self {
        Self {
            transport,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying gateway connection.
    pub fn transport(&self) -> &Arc<GatewayTransport> {
        &self.transport
    }

    async fn slot(&self, server_type: &str) -> SessionSlot {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(sessions.entry(server_type.to_string()).or_default())
    }

    /// Return the cached session for `server_type`, creating it if needed.
    ///
    /// Concurrent callers for the same type wait on one creation; callers
    /// for other types proceed independently.
    ///
    /// # Errors
    ///
    /// Propagates credential and `create-session` failures; nothing is
    /// cached in that case and the next call retries.
    pub async fn ensure_session(
        &self,
        server_type: &str,
        credentials: &dyn CredentialProvider,
    ) -> Result<Session> {
        let slot = self.slot(server_type).await;
        if let Some(session) = slot.get() {
            tracing::debug!(server_type, session_id = %session.session_id, "reusing session");
            return Ok(session.clone());
        }

        let session = slot
            .get_or_try_init(|| async {
                let injected = credentials.credentials(server_type).await?;
                let session =
                    Session::from(self.transport.create_session(server_type, injected).await?);
                tracing::info!(server_type, session_id = %session.session_id, "created session");
                Ok::<_, anyhow::Error>(session)
            })
            .await?;
        Ok(session.clone())
    }

    /// Destroy and forget the session for `server_type`.
    ///
    /// Returns `Ok(false)` when no session was cached or the gateway had
    /// already dropped it.
    pub async fn destroy_session(&self, server_type: &str) -> Result<bool> {
        let Some(slot) = self.sessions.lock().await.remove(server_type) else {
            return Ok(false);
        };
        let Some(session) = slot.get() else {
            return Ok(false);
        };
        self.transport.destroy_session(&session.session_id).await
    }

    /// Best-effort destroy of every cached session.
    ///
    /// Every session is attempted even if some fail; failures are logged.
    /// The cache is empty afterwards. Returns the number of sessions the
    /// gateway confirmed destroyed.
    pub async fn destroy_all(&self) -> usize {
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .drain()
                .filter_map(|(_, slot)| slot.get().cloned())
                .collect()
        };

        let mut destroyed = 0;
        for session in drained {
            match self.transport.destroy_session(&session.session_id).await {
                Ok(true) => destroyed += 1,
                Ok(false) => tracing::debug!(
                    session_id = %session.session_id,
                    "session already gone"
                ),
                Err(e) => tracing::warn!(
                    server_type = %session.server_type,
                    session_id = %session.session_id,
                    "failed to destroy session: {e:#}"
                ),
            }
        }
        destroyed
    }

    /// Snapshot of the cached sessions.
    pub async fn cached_sessions(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .await
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }
}
