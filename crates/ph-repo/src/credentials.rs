// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Credential lookup

use async_trait::async_trait;
use ph_domain_types::Credential;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Resolves a named secret to basic-auth credentials
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Returns `None` when no secret with that name exists
    async fn resolve(&self, secret_name: &str) -> Option<Credential>;
}

/// Secret store held in memory
#[derive(Default)]
pub struct InMemoryCredentials {
    secrets: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, credential: Credential) -> Self {
        self.secrets.get_mut().insert(name.into(), credential);
        self
    }

    pub async fn insert(&self, name: impl Into<String>, credential: Credential) {
        self.secrets.write().await.insert(name.into(), credential);
    }

    pub async fn remove(&self, name: &str) -> Option<Credential> {
        self.secrets.write().await.remove(name)
    }
}

#[async_trait]
impl CredentialResolver for InMemoryCredentials {
    async fn resolve(&self, secret_name: &str) -> Option<Credential> {
        self.secrets.read().await.get(secret_name).cloned()
    }
}
