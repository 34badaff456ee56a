// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory backends
//!
//! These hold repository content as plain maps. They are used by the test
//! suites and by the offline CLI, which seeds them from a fixture file.

use async_trait::async_trait;
use ph_domain_types::{Credential, GitRepository, Resources};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::{BackendError, BackendResult};
use crate::git::{DiscoveredPackage, FetchedPackage, GitBackend, GitCoordinates};
use crate::oci::{FunctionImage, OciBackend};

#[derive(Debug, Clone)]
struct MemoryCommit {
    commit: String,
    files: Resources,
}

#[derive(Debug, Clone, Default)]
struct MemoryRepo {
    refs: BTreeMap<String, MemoryCommit>,
    credential: Option<Credential>,
    offline: bool,
}

impl MemoryRepo {
    fn check_access(&self, url: &str, credential: Option<&Credential>) -> BackendResult<()> {
        if self.offline {
            return Err(BackendError::Unreachable(url.to_string()));
        }
        match &self.credential {
            Some(required) if Some(required) != credential => {
                Err(BackendError::Unauthorized(url.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn new_commit_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn subtree(files: &Resources, directory: &str) -> Resources {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        return files.clone();
    }
    let prefix = format!("{}/", directory);
    files
        .iter()
        .filter_map(|(path, contents)| {
            path.strip_prefix(&prefix).map(|rest| (rest.to_string(), contents.clone()))
        })
        .collect()
}

/// Git server held in memory, keyed by repository URL
#[derive(Default)]
pub struct InMemoryGitBackend {
    repos: RwLock<HashMap<String, MemoryRepo>>,
}

impl InMemoryGitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `git_ref` of `repo` with `files`, generating a commit id
    pub fn with_ref<I, K, V>(self, repo: &str, git_ref: &str, files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_commit(repo, git_ref, &new_commit_id(), files)
    }

    /// Seed `git_ref` of `repo` with `files` at an explicit commit id
    pub fn with_commit<I, K, V>(mut self, repo: &str, git_ref: &str, commit: &str, files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        insert_ref(self.repos.get_mut(), repo, git_ref, commit, collect(files));
        self
    }

    /// Require `credential` for every access to `repo`
    pub fn with_credential(mut self, repo: &str, credential: Credential) -> Self {
        self.repos.get_mut().entry(repo.to_string()).or_default().credential = Some(credential);
        self
    }

    /// Point `git_ref` at new content; returns the new commit id
    pub async fn publish<I, K, V>(&self, repo: &str, git_ref: &str, files: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let commit = new_commit_id();
        insert_ref(&mut *self.repos.write().await, repo, git_ref, &commit, collect(files));
        commit
    }

    /// Simulate a network partition towards `repo`
    pub async fn set_offline(&self, repo: &str, offline: bool) {
        self.repos.write().await.entry(repo.to_string()).or_default().offline = offline;
    }
}

fn collect<I, K, V>(files: I) -> Resources
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    files.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

fn insert_ref(
    repos: &mut HashMap<String, MemoryRepo>,
    repo: &str,
    git_ref: &str,
    commit: &str,
    files: Resources,
) {
    repos.entry(repo.to_string()).or_default().refs.insert(
        git_ref.to_string(),
        MemoryCommit {
            commit: commit.to_string(),
            files,
        },
    );
}

#[async_trait]
impl GitBackend for InMemoryGitBackend {
    async fn fetch(
        &self,
        coordinates: &GitCoordinates,
        credential: Option<&Credential>,
    ) -> BackendResult<FetchedPackage> {
        let repos = self.repos.read().await;
        let repo = repos
            .get(&coordinates.repo)
            .ok_or_else(|| BackendError::RepositoryNotFound(coordinates.repo.clone()))?;
        repo.check_access(&coordinates.repo, credential)?;

        let commit =
            repo.refs.get(&coordinates.git_ref).ok_or_else(|| BackendError::RefNotFound {
                repo: coordinates.repo.clone(),
                git_ref: coordinates.git_ref.clone(),
            })?;

        let resources = subtree(&commit.files, &coordinates.directory);
        if resources.is_empty() {
            return Err(BackendError::PathNotFound {
                repo: coordinates.repo.clone(),
                git_ref: coordinates.git_ref.clone(),
                directory: coordinates.directory.clone(),
            });
        }

        tracing::debug!(
            repo = %coordinates.repo,
            git_ref = %coordinates.git_ref,
            commit = %commit.commit,
            files = resources.len(),
            "fetched package"
        );

        Ok(FetchedPackage {
            commit: commit.commit.clone(),
            resources,
        })
    }

    async fn discover(
        &self,
        repository: &GitRepository,
        manifest_file: &str,
        credential: Option<&Credential>,
    ) -> BackendResult<Vec<DiscoveredPackage>> {
        let repos = self.repos.read().await;
        let repo = repos
            .get(&repository.repo)
            .ok_or_else(|| BackendError::RepositoryNotFound(repository.repo.clone()))?;
        repo.check_access(&repository.repo, credential)?;

        let base = repository.directory.trim_matches('/');
        let mut found = Vec::new();

        // The working branch holds drafts; published revisions are the other refs
        for (git_ref, commit) in repo.refs.iter().filter(|(r, _)| **r != repository.branch) {
            for path in commit.files.keys() {
                let package_dir = if path == manifest_file {
                    ""
                } else {
                    match path.strip_suffix(manifest_file).and_then(|p| p.strip_suffix('/')) {
                        Some(dir) => dir,
                        None => continue,
                    }
                };
                let package = if base.is_empty() {
                    package_dir
                } else {
                    match package_dir.strip_prefix(base).and_then(|p| p.strip_prefix('/')) {
                        Some(rest) => rest,
                        None => continue,
                    }
                };
                if package.is_empty() {
                    continue;
                }
                found.push(DiscoveredPackage {
                    package: package.to_string(),
                    revision: git_ref.clone(),
                    location: GitCoordinates {
                        repo: repository.repo.clone(),
                        git_ref: git_ref.clone(),
                        directory: package_dir.to_string(),
                    },
                    commit: commit.commit.clone(),
                });
            }
        }

        Ok(found)
    }
}

/// OCI registry held in memory, keyed by registry address
#[derive(Default)]
pub struct InMemoryOciBackend {
    registries: RwLock<HashMap<String, Vec<FunctionImage>>>,
}

impl InMemoryOciBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_functions(
        mut self,
        registry: &str,
        images: impl IntoIterator<Item = FunctionImage>,
    ) -> Self {
        self.registries.get_mut().entry(registry.to_string()).or_default().extend(images);
        self
    }

    pub async fn push(&self, registry: &str, image: FunctionImage) {
        self.registries.write().await.entry(registry.to_string()).or_default().push(image);
    }
}

#[async_trait]
impl OciBackend for InMemoryOciBackend {
    async fn list_functions(&self, registry: &str) -> BackendResult<Vec<FunctionImage>> {
        self.registries
            .read()
            .await
            .get(registry)
            .cloned()
            .ok_or_else(|| BackendError::RegistryNotFound(registry.to_string()))
    }
}
