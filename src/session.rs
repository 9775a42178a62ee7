//! Per-caller provider sessions.
//!
//! Requests without a session token act as the local identity. A Synology
//! login creates a dedicated [`SynologyProvider`] and hands back an opaque
//! token that selects it on later requests. Sessions are never shared
//! between identities.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::SynologyConfig;
use crate::error::{Error, Result};
use crate::provider::{LocalProvider, Provider, SynologyLogin, SynologyProvider};

pub struct SessionRegistry {
    local: Arc<LocalProvider>,
    synology: SynologyConfig,
    sessions: RwLock<HashMap<String, Arc<SynologyProvider>>>,
}

/// A freshly opened remote session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: String,
    pub provider_id: String,
}

impl SessionRegistry {
    pub fn new(local: Arc<LocalProvider>, synology: SynologyConfig) -> Self {
        Self {
            local,
            synology,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn local(&self) -> Arc<LocalProvider> {
        self.local.clone()
    }

    pub async fn login_synology(&self, login: &SynologyLogin) -> Result<NewSession> {
        let provider = SynologyProvider::new(login, &self.synology)?;
        provider.login(login.otp_code.as_deref()).await?;

        let session_id = Uuid::new_v4().to_string();
        let provider_id = provider.provider_id().to_string();
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(provider));

        Ok(NewSession {
            session_id,
            provider_id,
        })
    }

    /// Provider for `token`, or the local provider when no token is given.
    pub async fn resolve(&self, token: Option<&str>) -> Result<Arc<dyn Provider>> {
        let Some(token) = token else {
            let local: Arc<dyn Provider> = self.local.clone();
            return Ok(local);
        };
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .map(|p| p as Arc<dyn Provider>)
            .ok_or_else(|| Error::PermissionDenied("unknown or expired session".to_string()))
    }

    /// Close and forget a session. Returns `false` for unknown tokens.
    pub async fn logout(&self, token: &str) -> Result<bool> {
        let removed = self.sessions.write().await.remove(token);
        match removed {
            Some(provider) => {
                provider.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, provider) in sessions {
            if let Err(e) = provider.close().await {
                tracing::warn!(provider = provider.provider_id(), error = %e, "failed to close session");
            }
        }
    }
}
