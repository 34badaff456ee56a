// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! YAML fixture describing an offline world
//!
//! ```yaml
//! repositories:
//!   - name: blueprints
//!     kind: git
//!     git: { repo: https://example.com/blueprints.git, secretRef: { name: token } }
//! secrets:
//!   token: { username: deployer, password: s3cret }
//! git:
//!   https://example.com/blueprints.git:
//!     v1:
//!       bucket/Kptfile: "..."
//! registries:
//!   gcr.io/kpt-fn:
//!     - { name: set-namespace, tag: v0.4.1 }
//! revisions:
//!   - { repositoryName: blueprints, packageName: bucket, revision: v2, tasks: [...] }
//! ```

use anyhow::Context;
use ph_core::{Backends, BuiltinFunctionRuntime, EngineConfig, PackageService};
use ph_domain_types::{Credential, FunctionType, PackageRevision, Repository, Resources};
use ph_repo::{FunctionImage, InMemoryCredentials, InMemoryGitBackend, InMemoryOciBackend};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionImageSpec {
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub function_types: Vec<FunctionType>,
}

impl From<FunctionImageSpec> for FunctionImage {
    fn from(spec: FunctionImageSpec) -> Self {
        let mut image = FunctionImage::new(spec.name, spec.tag).with_description(spec.description);
        if !spec.function_types.is_empty() {
            image.function_types = spec.function_types;
        }
        image
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub secrets: BTreeMap<String, Credential>,
    /// Repository URL → ref → files
    #[serde(default)]
    pub git: BTreeMap<String, BTreeMap<String, Resources>>,
    /// Registry address → published function images
    #[serde(default)]
    pub registries: BTreeMap<String, Vec<FunctionImageSpec>>,
    #[serde(default)]
    pub revisions: Vec<PackageRevision>,
}

impl Fixture {
    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(contents).context("invalid fixture")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        Self::from_yaml(&contents).with_context(|| format!("in {}", path.display()))
    }

    pub fn backends(&self) -> Backends {
        let git = self.git.iter().fold(InMemoryGitBackend::new(), |backend, (repo, refs)| {
            refs.iter().fold(backend, |backend, (git_ref, files)| {
                backend.with_ref(repo, git_ref, files.clone())
            })
        });
        let oci =
            self.registries.iter().fold(InMemoryOciBackend::new(), |backend, (registry, images)| {
                backend.with_functions(registry, images.iter().cloned().map(FunctionImage::from))
            });
        let credentials = self
            .secrets
            .iter()
            .fold(InMemoryCredentials::new(), |creds, (name, credential)| {
                creds.with_secret(name.clone(), credential.clone())
            });

        Backends {
            git: Arc::new(git),
            oci: Arc::new(oci),
            credentials: Arc::new(credentials),
            functions: Arc::new(BuiltinFunctionRuntime::with_defaults()),
        }
    }

    /// A service over this fixture's backends with every repository registered
    pub async fn service(&self, config: EngineConfig) -> anyhow::Result<PackageService> {
        let service = PackageService::new(config, self.backends());
        for repository in &self.repositories {
            service
                .register_repository(repository.clone())
                .await
                .with_context(|| format!("registering repository '{}'", repository.name))?;
        }
        Ok(service)
    }
}
