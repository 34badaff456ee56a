// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Package manifest (Kptfile)
//!
//! The manifest lives at a well-known path inside every package bundle and
//! records the package identity, descriptive metadata, the declared upstream
//! and the resolved upstream lock.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known manifest path inside a bundle
pub const KPTFILE_NAME: &str = "Kptfile";
pub const KPTFILE_API_VERSION: &str = "kpt.dev/v1";
pub const KPTFILE_KIND: &str = "Kptfile";
/// Annotation marking resources that are never applied to a cluster
pub const LOCAL_CONFIG_ANNOTATION: &str = "config.kubernetes.io/local-config";

#[derive(Debug, thiserror::Error)]
pub enum KptfileError {
    #[error("package has no {KPTFILE_NAME}")]
    Missing,

    #[error("malformed {KPTFILE_NAME}: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Kind of origin an upstream points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginType {
    Git,
}

impl fmt::Display for OriginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginType::Git => write!(f, "git"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KptfileMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Descriptive package metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub site: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl PackageInfo {
    pub fn is_empty(&self) -> bool {
        self.site.is_empty() && self.description.is_empty() && self.keywords.is_empty()
    }
}

/// Declared git source of a package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Git {
    pub repo: String,
    #[serde(default)]
    pub directory: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(rename = "type")]
    pub origin: OriginType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<Git>,
}

/// Resolved git source, pinned to an immutable commit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitLock {
    pub repo: String,
    #[serde(default)]
    pub directory: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamLock {
    #[serde(rename = "type")]
    pub origin: OriginType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitLock>,
}

impl UpstreamLock {
    pub fn git(lock: GitLock) -> Self {
        Self {
            origin: OriginType::Git,
            git: Some(lock),
        }
    }

    /// The pinned version identifier, empty when unresolved
    pub fn version(&self) -> &str {
        self.git.as_ref().map(|g| g.commit.as_str()).unwrap_or_default()
    }

    /// Declared form of this lock (same coordinates, no commit)
    pub fn to_upstream(&self) -> Upstream {
        Upstream {
            origin: self.origin,
            git: self.git.as_ref().map(|g| Git {
                repo: g.repo.clone(),
                directory: g.directory.clone(),
                git_ref: g.git_ref.clone(),
            }),
        }
    }
}

/// Package manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kptfile {
    pub api_version: String,
    pub kind: String,
    pub metadata: KptfileMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Upstream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_lock: Option<UpstreamLock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<PackageInfo>,
    /// Fields this crate does not model (pipeline, inventory, ...), kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Kptfile {
    pub fn new(name: impl Into<String>) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(LOCAL_CONFIG_ANNOTATION.to_string(), "true".to_string());
        Self {
            api_version: KPTFILE_API_VERSION.to_string(),
            kind: KPTFILE_KIND.to_string(),
            metadata: KptfileMetadata {
                name: name.into(),
                annotations,
            },
            upstream: None,
            upstream_lock: None,
            info: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn from_yaml(contents: &str) -> Result<Self, KptfileError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn to_yaml(&self) -> Result<String, KptfileError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
