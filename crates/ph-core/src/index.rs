// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Revision index
//!
//! Aggregates package revisions across registered repositories: revisions
//! created through the pipeline come from the store, published packages are
//! discovered by scanning git package repositories, and function repositories
//! are scanned for the functions they publish.

use async_trait::async_trait;
use futures::future::join_all;
use ph_domain_types::{
    Function, GitLock, PackageRevisionKey, Repository, RepositoryContent, RepositoryType,
    UpstreamLock, KPTFILE_NAME,
};
use ph_repo::{CredentialResolver, DiscoveredPackage, GitBackend, GitCoordinates, OciBackend};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::registry::RepositoryRegistry;
use crate::resolver::{resolve_credential, RevisionContent, RevisionLookup};
use crate::store::InMemoryResourceStore;

/// Restricts a revision listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionFilter {
    pub repository: Option<String>,
    pub content: Option<RepositoryContent>,
}

impl RevisionFilter {
    pub fn repository(name: impl Into<String>) -> Self {
        Self {
            repository: Some(name.into()),
            content: None,
        }
    }

    fn matches(&self, repository: &Repository) -> bool {
        self.repository.as_deref().map_or(true, |name| repository.name == name)
            && self.content.map_or(true, |content| repository.content == content)
    }
}

/// Where an indexed revision comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionOrigin {
    /// Built by the task pipeline and held in the store
    Created,
    /// Published in a registered repository; read-only
    Discovered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageRevisionSummary {
    pub key: PackageRevisionKey,
    pub origin: RevisionOrigin,
    pub upstream_lock: Option<UpstreamLock>,
}

impl PackageRevisionSummary {
    pub fn name(&self) -> String {
        self.key.to_string()
    }
}

/// Discovered packages carry their own location as lineage
fn discovered_lock(package: &DiscoveredPackage) -> UpstreamLock {
    UpstreamLock::git(GitLock {
        repo: package.location.repo.clone(),
        directory: package.location.directory.clone(),
        git_ref: package.location.git_ref.clone(),
        commit: package.commit.clone(),
    })
}

pub struct RevisionIndex {
    registry: RepositoryRegistry,
    store: InMemoryResourceStore,
    git: Arc<dyn GitBackend>,
    oci: Arc<dyn OciBackend>,
    credentials: Arc<dyn CredentialResolver>,
    manifest_file: String,
}

impl RevisionIndex {
    pub fn new(
        registry: RepositoryRegistry,
        store: InMemoryResourceStore,
        git: Arc<dyn GitBackend>,
        oci: Arc<dyn OciBackend>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            registry,
            store,
            git,
            oci,
            credentials,
            manifest_file: KPTFILE_NAME.to_string(),
        }
    }

    /// Discover packages by a manifest other than `Kptfile`
    pub fn with_manifest_file(mut self, manifest_file: impl Into<String>) -> Self {
        self.manifest_file = manifest_file.into();
        self
    }

    /// List the revisions of every registered repository matching `filter`
    ///
    /// Only committed revisions appear. A repository whose scan fails is
    /// logged and skipped so one unreachable backend does not hide the rest.
    pub async fn list(
        &self,
        filter: &RevisionFilter,
        ctx: &OperationContext,
    ) -> Result<Vec<PackageRevisionSummary>> {
        let repositories: Vec<_> =
            self.registry.list().await.into_iter().filter(|r| filter.matches(r)).collect();

        let scans = join_all(repositories.iter().map(|repository| async move {
            (repository, self.discover(repository, ctx).await)
        }))
        .await;

        let mut summaries = Vec::new();
        for (repository, scanned) in scans {
            let created = self.store.list(Some(&repository.name)).await;
            let created_keys: HashSet<_> = created.iter().map(|r| r.key()).collect();

            summaries.extend(created.into_iter().map(|stored| PackageRevisionSummary {
                key: stored.key(),
                origin: RevisionOrigin::Created,
                upstream_lock: stored.kptfile.upstream_lock,
            }));

            match scanned {
                Ok(discovered) => summaries.extend(
                    discovered
                        .iter()
                        .map(|package| PackageRevisionSummary {
                            key: PackageRevisionKey::new(
                                &repository.name,
                                &package.package,
                                &package.revision,
                            ),
                            origin: RevisionOrigin::Discovered,
                            upstream_lock: Some(discovered_lock(package)),
                        })
                        .filter(|summary| !created_keys.contains(&summary.key)),
                ),
                Err(err) if err.kind() == crate::ErrorKind::Cancelled => return Err(err),
                Err(err) => {
                    warn!(repository = %repository.name, error = %err, "repository scan failed");
                }
            }
        }

        Ok(summaries)
    }

    /// Functions published by every registered function repository
    pub async fn list_functions(&self, ctx: &OperationContext) -> Result<Vec<Function>> {
        let filter = RevisionFilter {
            repository: None,
            content: Some(RepositoryContent::Function),
        };
        let mut functions = Vec::new();
        for repository in self.registry.list().await.iter().filter(|r| filter.matches(r)) {
            if repository.kind != RepositoryType::Oci {
                continue;
            }
            match self.registry.scan_functions(&repository.name, self.oci.as_ref(), ctx).await {
                Ok(found) => functions.extend(found),
                Err(err) if err.kind() == crate::ErrorKind::Cancelled => return Err(err),
                Err(err) => {
                    warn!(repository = %repository.name, error = %err, "function scan failed");
                }
            }
        }
        Ok(functions)
    }

    /// Packages published in a git package repository
    async fn discover(
        &self,
        repository: &Repository,
        ctx: &OperationContext,
    ) -> Result<Vec<DiscoveredPackage>> {
        let git = match (&repository.git, repository.content) {
            (Some(git), RepositoryContent::Package) => git,
            _ => return Ok(Vec::new()),
        };
        let credential = resolve_credential(git, self.credentials.as_ref()).await?;
        ctx.run(async {
            self.git
                .discover(git, &self.manifest_file, credential.as_ref())
                .await
                .map_err(Error::from)
        })
        .await
    }

    /// Whether `key` names a package published in its registered repository
    pub async fn is_discovered(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<bool> {
        match self.find_discovered(key, ctx).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == crate::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn find_discovered(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<(Repository, DiscoveredPackage)> {
        let repository = self
            .registry
            .get(&key.repository)
            .await
            .map_err(|_| Error::not_found("package revision", key.to_string()))?;

        let package = self
            .discover(&repository, ctx)
            .await?
            .into_iter()
            .find(|p| p.package == key.package && p.revision == key.revision)
            .ok_or_else(|| Error::not_found("package revision", key.to_string()))?;
        Ok((repository, package))
    }

    async fn lookup_discovered(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<RevisionContent> {
        let (repository, package) = self.find_discovered(key, ctx).await?;

        let git = repository
            .git
            .as_ref()
            .ok_or_else(|| Error::not_found("package revision", key.to_string()))?;
        let credential = resolve_credential(git, self.credentials.as_ref()).await?;
        let coordinates: GitCoordinates = package.location.clone();
        let fetched = ctx
            .run(async {
                self.git.fetch(&coordinates, credential.as_ref()).await.map_err(Error::from)
            })
            .await?;

        Ok(RevisionContent {
            resources: fetched.resources,
            upstream_lock: Some(discovered_lock(&package)),
        })
    }
}

#[async_trait]
impl RevisionLookup for RevisionIndex {
    /// Created revisions take precedence over discovered ones with the same key
    async fn lookup(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<RevisionContent> {
        match self.store.get(key).await {
            Ok(stored) => Ok(RevisionContent {
                resources: stored.resources,
                upstream_lock: stored.kptfile.upstream_lock,
            }),
            Err(_) => self.lookup_discovered(key, ctx).await,
        }
    }
}
