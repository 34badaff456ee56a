// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Upstream resolution
//!
//! Turns the upstream of a clone task into a pinned lineage record plus the
//! content to seed the bundle with. Explicit git coordinates are fetched from
//! the git backend. A reference to another package revision copies that
//! revision's own lock, so lineage always points at the external source.
//!
//! Each call makes exactly one attempt; retries belong to the caller.

use async_trait::async_trait;
use ph_domain_types::{
    Credential, GitLock, GitRepository, PackageRevisionKey, Resources, Upstream, UpstreamLock,
    UpstreamPackage,
};
use ph_repo::{CredentialResolver, GitBackend, GitCoordinates};
use std::sync::Arc;
use tracing::debug;

use crate::context::OperationContext;
use crate::error::{Error, ErrorKind, Result};
use crate::registry::RepositoryRegistry;

/// Content and lineage of an existing package revision
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionContent {
    pub resources: Resources,
    /// `None` when the revision was never cloned from anywhere
    pub upstream_lock: Option<UpstreamLock>,
}

/// Read access to existing package revisions, by key
#[async_trait]
pub trait RevisionLookup: Send + Sync {
    async fn lookup(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<RevisionContent>;
}

/// A resolved upstream
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUpstream {
    /// Declared source, as recorded in the manifest
    pub upstream: Upstream,
    pub lock: UpstreamLock,
    pub resources: Resources,
}

/// Look up the credential a git repository declares, if any
pub async fn resolve_credential(
    git: &GitRepository,
    credentials: &dyn CredentialResolver,
) -> Result<Option<Credential>> {
    match git.secret_name() {
        None => Ok(None),
        Some(name) => credentials.resolve(name).await.map(Some).ok_or_else(|| {
            Error::Resolution(format!("secret '{}' for {} not found", name, git.repo))
        }),
    }
}

pub struct UpstreamResolver {
    registry: RepositoryRegistry,
    git: Arc<dyn GitBackend>,
    credentials: Arc<dyn CredentialResolver>,
    revisions: Arc<dyn RevisionLookup>,
}

impl UpstreamResolver {
    pub fn new(
        registry: RepositoryRegistry,
        git: Arc<dyn GitBackend>,
        credentials: Arc<dyn CredentialResolver>,
        revisions: Arc<dyn RevisionLookup>,
    ) -> Self {
        Self {
            registry,
            git,
            credentials,
            revisions,
        }
    }

    pub async fn resolve(
        &self,
        upstream: &UpstreamPackage,
        ctx: &OperationContext,
    ) -> Result<ResolvedUpstream> {
        match (&upstream.git, &upstream.upstream_ref) {
            (Some(git), None) => {
                self.resolve_git(
                    GitCoordinates {
                        repo: git.repo.clone(),
                        git_ref: git.git_ref.clone(),
                        directory: git.directory.clone(),
                    },
                    ctx,
                )
                .await
            }
            (None, Some(reference)) => {
                let key: PackageRevisionKey = reference
                    .name
                    .parse()
                    .map_err(|e: ph_domain_types::ParseRevisionKeyError| {
                        Error::Resolution(e.to_string())
                    })?;
                self.resolve_revision(&key, ctx).await
            }
            _ => Err(Error::Validation(
                "upstream must name either git coordinates or an upstreamRef".to_string(),
            )),
        }
    }

    async fn resolve_git(
        &self,
        coordinates: GitCoordinates,
        ctx: &OperationContext,
    ) -> Result<ResolvedUpstream> {
        let credential = self.credential_for_url(&coordinates.repo).await?;
        let fetched = ctx
            .run(async {
                self.git.fetch(&coordinates, credential.as_ref()).await.map_err(Error::from)
            })
            .await?;

        if fetched.commit.is_empty() {
            return Err(Error::Resolution(format!(
                "backend reported no commit for {}@{}",
                coordinates.repo, coordinates.git_ref
            )));
        }

        debug!(
            repo = %coordinates.repo,
            git_ref = %coordinates.git_ref,
            directory = %coordinates.directory,
            commit = %fetched.commit,
            "resolved git upstream"
        );

        let lock = UpstreamLock::git(GitLock {
            repo: coordinates.repo,
            directory: coordinates.directory,
            git_ref: coordinates.git_ref,
            commit: fetched.commit,
        });

        Ok(ResolvedUpstream {
            upstream: lock.to_upstream(),
            lock,
            resources: fetched.resources,
        })
    }

    async fn resolve_revision(
        &self,
        key: &PackageRevisionKey,
        ctx: &OperationContext,
    ) -> Result<ResolvedUpstream> {
        let content = self.revisions.lookup(key, ctx).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                Error::Resolution(format!("upstream package revision '{}' does not exist", key))
            }
            _ => err,
        })?;

        let lock = match content.upstream_lock {
            Some(lock) if !lock.version().is_empty() => lock,
            _ => {
                return Err(Error::Resolution(format!(
                    "upstream package revision '{}' has no upstream lock",
                    key
                )))
            }
        };

        debug!(upstream = %key, commit = %lock.version(), "resolved upstream reference");

        Ok(ResolvedUpstream {
            upstream: lock.to_upstream(),
            lock,
            resources: content.resources,
        })
    }

    /// Credentials of the registered repository serving `url`, if any
    async fn credential_for_url(&self, url: &str) -> Result<Option<Credential>> {
        let registered = self
            .registry
            .list()
            .await
            .into_iter()
            .filter_map(|r| r.git)
            .find(|git| git.repo == url);

        match registered {
            Some(git) => resolve_credential(&git, self.credentials.as_ref()).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ph_domain_types::{Repository, SecretRef};
    use ph_repo::{InMemoryCredentials, InMemoryGitBackend};
    use std::collections::HashMap;

    const BLUEPRINTS: &str = "https://github.com/GoogleCloudPlatform/blueprints.git";

    #[derive(Default)]
    struct FixedRevisions(HashMap<String, RevisionContent>);

    #[async_trait]
    impl RevisionLookup for FixedRevisions {
        async fn lookup(
            &self,
            key: &PackageRevisionKey,
            _ctx: &OperationContext,
        ) -> Result<RevisionContent> {
            self.0
                .get(&key.to_string())
                .cloned()
                .ok_or_else(|| Error::not_found("package revision", key.to_string()))
        }
    }

    fn resolver(revisions: FixedRevisions) -> UpstreamResolver {
        let git = InMemoryGitBackend::new().with_commit(
            BLUEPRINTS,
            "bucket-blueprint-v0.4.3",
            "4c0ffee",
            [("catalog/bucket/Kptfile", "kind: Kptfile"), ("catalog/bucket/bucket.yaml", "a: b")],
        );
        UpstreamResolver::new(
            RepositoryRegistry::new(),
            Arc::new(git),
            Arc::new(InMemoryCredentials::new()),
            Arc::new(revisions),
        )
    }

    fn lock(commit: &str) -> UpstreamLock {
        UpstreamLock::git(GitLock {
            repo: BLUEPRINTS.to_string(),
            directory: "catalog/bucket".to_string(),
            git_ref: "bucket-blueprint-v0.4.3".to_string(),
            commit: commit.to_string(),
        })
    }

    #[tokio::test]
    async fn explicit_coordinates_pin_the_commit() {
        let upstream =
            UpstreamPackage::git(BLUEPRINTS, "bucket-blueprint-v0.4.3", "catalog/bucket");
        let resolved = resolver(FixedRevisions::default())
            .resolve(&upstream, &Default::default())
            .await
            .unwrap();

        assert_eq!(resolved.lock, lock("4c0ffee"));
        assert_eq!(resolved.upstream, lock("4c0ffee").to_upstream());
        assert!(resolved.resources.contains_key("bucket.yaml"));
    }

    #[tokio::test]
    async fn missing_ref_is_a_resolution_error() {
        let upstream = UpstreamPackage::git(BLUEPRINTS, "no-such-tag", "catalog/bucket");
        let err = resolver(FixedRevisions::default())
            .resolve(&upstream, &Default::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[tokio::test]
    async fn upstream_ref_copies_the_referenced_lock() {
        let mut revisions = FixedRevisions::default();
        revisions.0.insert(
            "blueprints:bucket:v1".to_string(),
            RevisionContent {
                resources: Resources::from([("Kptfile".to_string(), "kind: Kptfile".to_string())]),
                upstream_lock: Some(lock("4c0ffee")),
            },
        );
        revisions.0.insert(
            "blueprints:scratch:v1".to_string(),
            RevisionContent {
                resources: Resources::new(),
                upstream_lock: None,
            },
        );
        let resolver = resolver(revisions);
        let ctx = OperationContext::background();

        let resolved = resolver
            .resolve(&UpstreamPackage::revision_ref("blueprints:bucket:v1"), &ctx)
            .await
            .unwrap();
        assert_eq!(resolved.lock, lock("4c0ffee"));

        for name in ["blueprints:scratch:v1", "blueprints:missing:v1", "not-a-key"] {
            let err =
                resolver.resolve(&UpstreamPackage::revision_ref(name), &ctx).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Resolution, "{}", name);
        }
    }

    #[tokio::test]
    async fn registered_repository_secret_is_required() {
        let mut git = ph_domain_types::GitRepository::new(BLUEPRINTS);
        git.secret_ref = SecretRef {
            name: "blueprints-auth".to_string(),
        };
        let resolver = resolver(FixedRevisions::default());
        resolver.registry.register(Repository::git("blueprints", git)).await.unwrap();

        let upstream =
            UpstreamPackage::git(BLUEPRINTS, "bucket-blueprint-v0.4.3", "catalog/bucket");
        let err = resolver.resolve(&upstream, &Default::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.to_string().contains("blueprints-auth"));
    }
}
