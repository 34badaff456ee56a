// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Repository registry

use ph_domain_types::{Function, Repository, RepositoryContent, RepositoryType};
use ph_repo::OciBackend;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::context::OperationContext;
use crate::error::{Error, Result};

/// Thread-safe map of registered repositories, keyed by name
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    repositories: Arc<RwLock<BTreeMap<String, Repository>>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository; names are unique
    pub async fn register(&self, repository: Repository) -> Result<()> {
        validate_repository(&repository)?;

        let mut repositories = self.repositories.write().await;
        if repositories.contains_key(&repository.name) {
            return Err(Error::already_exists("repository", &repository.name));
        }

        info!(
            repository = %repository.name,
            kind = %repository.kind,
            content = %repository.content,
            "registered repository"
        );
        repositories.insert(repository.name.clone(), repository);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Repository> {
        self.repositories
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("repository", name))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.repositories.read().await.contains_key(name)
    }

    /// All registered repositories, ordered by name
    pub async fn list(&self) -> Vec<Repository> {
        self.repositories.read().await.values().cloned().collect()
    }

    pub async fn unregister(&self, name: &str) -> Result<Repository> {
        let removed = self
            .repositories
            .write()
            .await
            .remove(name)
            .ok_or_else(|| Error::not_found("repository", name))?;
        info!(repository = %name, "unregistered repository");
        Ok(removed)
    }

    /// Scan a function repository for the functions its registry publishes
    pub async fn scan_functions(
        &self,
        name: &str,
        backend: &dyn OciBackend,
        ctx: &OperationContext,
    ) -> Result<Vec<Function>> {
        let repository = self.get(name).await?;
        let registry = match (&repository.oci, repository.content) {
            (Some(oci), RepositoryContent::Function) => oci.registry.clone(),
            _ => {
                return Err(Error::Validation(format!(
                    "repository '{}' is not an OCI function repository",
                    name
                )))
            }
        };

        let images = ctx
            .run(async { backend.list_functions(&registry).await.map_err(Error::from) })
            .await?;

        Ok(images
            .into_iter()
            .map(|image| Function {
                name: format!("{}:{}:{}", repository.name, image.name, image.tag),
                image: image.image(&registry),
                repository_name: repository.name.clone(),
                description: image.description,
                function_types: image.function_types,
                keywords: Vec::new(),
            })
            .collect())
    }
}

fn validate_repository(repository: &Repository) -> Result<()> {
    if repository.name.is_empty() {
        return Err(Error::Validation("repository name must not be empty".to_string()));
    }
    if repository.name.contains(':') {
        return Err(Error::Validation(format!(
            "repository name '{}' must not contain ':'",
            repository.name
        )));
    }

    match repository.kind {
        RepositoryType::Git => {
            let git = repository.git.as_ref().ok_or_else(|| {
                Error::Validation(format!("git repository '{}' has no git spec", repository.name))
            })?;
            if git.repo.is_empty() {
                return Err(Error::Validation(format!(
                    "git repository '{}' has no repo address",
                    repository.name
                )));
            }
            if repository.oci.is_some() {
                return Err(Error::Validation(format!(
                    "git repository '{}' must not carry an oci spec",
                    repository.name
                )));
            }
        }
        RepositoryType::Oci => {
            let oci = repository.oci.as_ref().ok_or_else(|| {
                Error::Validation(format!("oci repository '{}' has no oci spec", repository.name))
            })?;
            if oci.registry.is_empty() {
                return Err(Error::Validation(format!(
                    "oci repository '{}' has no registry address",
                    repository.name
                )));
            }
            if repository.git.is_some() {
                return Err(Error::Validation(format!(
                    "oci repository '{}' must not carry a git spec",
                    repository.name
                )));
            }
        }
    }

    Ok(())
}
