// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Package service facade
//!
//! Wires the registry, resolver, evaluator, executor, store and index
//! together and exposes the create/get/list/update/delete verbs.

use ph_domain_types::{
    Function, Kptfile, PackageRevision, PackageRevisionKey, PackageRevisionResources, Repository,
    RepositoryContent, RepositoryType,
};
use ph_repo::{CredentialResolver, GitBackend, OciBackend};
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::context::OperationContext;
use crate::error::{Error, ErrorKind, Result};
use crate::function::FunctionEvaluator;
use crate::index::{PackageRevisionSummary, RevisionFilter, RevisionIndex};
use crate::pipeline::TaskPipelineExecutor;
use crate::registry::RepositoryRegistry;
use crate::resolver::{RevisionLookup, UpstreamResolver};
use crate::store::{InMemoryResourceStore, StoredRevision, WriteIntent};

/// External collaborators consumed by the service
#[derive(Clone)]
pub struct Backends {
    pub git: Arc<dyn GitBackend>,
    pub oci: Arc<dyn OciBackend>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub functions: Arc<dyn FunctionEvaluator>,
}

/// A package revision as read back from the service
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRevisionView {
    pub resources: PackageRevisionResources,
    /// Parsed manifest; `None` for a discovered package without a usable one
    pub kptfile: Option<Kptfile>,
}

pub struct PackageService {
    config: EngineConfig,
    registry: RepositoryRegistry,
    store: InMemoryResourceStore,
    index: Arc<RevisionIndex>,
    executor: TaskPipelineExecutor,
}

impl PackageService {
    pub fn new(config: EngineConfig, backends: Backends) -> Self {
        let registry = RepositoryRegistry::new();
        let store = InMemoryResourceStore::new();
        let index = Arc::new(
            RevisionIndex::new(
                registry.clone(),
                store.clone(),
                Arc::clone(&backends.git),
                backends.oci,
                Arc::clone(&backends.credentials),
            )
            .with_manifest_file(config.manifest_file.clone()),
        );
        let resolver = Arc::new(UpstreamResolver::new(
            registry.clone(),
            backends.git,
            backends.credentials,
            index.clone(),
        ));
        let executor = TaskPipelineExecutor::new(config.clone(), resolver, backends.functions);

        Self {
            config,
            registry,
            store,
            index,
            executor,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn register_repository(&self, repository: Repository) -> Result<()> {
        self.registry.register(repository).await
    }

    pub async fn get_repository(&self, name: &str) -> Result<Repository> {
        self.registry.get(name).await
    }

    pub async fn list_repositories(&self) -> Vec<Repository> {
        self.registry.list().await
    }

    /// Unregister a repository and purge every revision created in it
    pub async fn unregister_repository(&self, name: &str) -> Result<()> {
        self.registry.unregister(name).await?;
        self.store.purge_repository(name).await;
        Ok(())
    }

    /// Run the task pipeline of a new revision and commit the result
    ///
    /// Succeeds only when every task succeeded; otherwise nothing is stored
    /// and the error carries the failing task index.
    pub async fn create_package_revision(
        &self,
        revision: PackageRevision,
        ctx: &OperationContext,
    ) -> Result<PackageRevisionResources> {
        self.write(revision, WriteIntent::Create, ctx).await
    }

    /// Replay a new task list over an existing created revision
    ///
    /// The prior committed state stays in place if the replay fails.
    pub async fn update_package_revision(
        &self,
        revision: PackageRevision,
        ctx: &OperationContext,
    ) -> Result<PackageRevisionResources> {
        self.write(revision, WriteIntent::Replace, ctx).await
    }

    async fn write(
        &self,
        revision: PackageRevision,
        intent: WriteIntent,
        ctx: &OperationContext,
    ) -> Result<PackageRevisionResources> {
        let repository = self.registry.get(&revision.repository_name).await?;
        if repository.kind != RepositoryType::Git
            || repository.content != RepositoryContent::Package
        {
            return Err(Error::Validation(format!(
                "repository '{}' does not hold packages",
                repository.name
            )));
        }

        let key = revision.key();
        let lease = self.store.reserve(&key, intent).await?;
        if intent == WriteIntent::Create && self.index.is_discovered(&key, ctx).await? {
            return Err(Error::already_exists("package revision", key.to_string()));
        }
        info!(
            revision = %key,
            intent = ?intent,
            tasks = revision.tasks.len(),
            "running package pipeline"
        );

        let snapshot = self.executor.execute(&revision, ctx).await?;
        let stored = lease.commit(revision, snapshot).await?;
        Ok(to_resources(&key, stored))
    }

    /// Read a revision's bundle, created or discovered
    pub async fn get_package_revision(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<PackageRevisionView> {
        if let Ok(stored) = self.store.get(key).await {
            let kptfile = stored.kptfile.clone();
            return Ok(PackageRevisionView {
                resources: to_resources(key, stored),
                kptfile: Some(kptfile),
            });
        }

        let content = self.index.lookup(key, ctx).await?;
        let kptfile = content
            .resources
            .get(&self.config.manifest_file)
            .and_then(|m| Kptfile::from_yaml(m).ok());
        Ok(PackageRevisionView {
            resources: PackageRevisionResources::new(key, content.resources),
            kptfile,
        })
    }

    pub async fn get_package_revision_resources(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<PackageRevisionResources> {
        Ok(self.get_package_revision(key, ctx).await?.resources)
    }

    /// The stored request of a created revision
    pub async fn get_package_revision_spec(
        &self,
        key: &PackageRevisionKey,
    ) -> Result<PackageRevision> {
        Ok(self.store.get(key).await?.spec)
    }

    pub async fn list_package_revisions(
        &self,
        filter: &RevisionFilter,
        ctx: &OperationContext,
    ) -> Result<Vec<PackageRevisionSummary>> {
        self.index.list(filter, ctx).await
    }

    /// Delete a created revision; discovered revisions are read-only
    pub async fn delete_package_revision(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<()> {
        match self.store.delete(key).await {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // An unreachable repository keeps the NotFound answer
                if matches!(self.index.is_discovered(key, ctx).await, Ok(true)) {
                    return Err(Error::Validation(format!(
                        "package revision '{}' is published and read-only",
                        key
                    )));
                }
                Err(err)
            }
            outcome => outcome,
        }
    }

    pub async fn list_functions(&self, ctx: &OperationContext) -> Result<Vec<Function>> {
        self.index.list_functions(ctx).await
    }
}

fn to_resources(key: &PackageRevisionKey, stored: StoredRevision) -> PackageRevisionResources {
    PackageRevisionResources::new(key, stored.resources)
}
