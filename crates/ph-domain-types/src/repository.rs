// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Repository-related domain types
//!
//! A repository names a backend (git or OCI) together with the kind of
//! content it serves (packages or functions).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend kind of a registered repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Source-control repository
    Git,
    /// Artifact registry
    Oci,
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryType::Git => write!(f, "git"),
            RepositoryType::Oci => write!(f, "oci"),
        }
    }
}

/// What a repository holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryContent {
    #[default]
    Package,
    Function,
}

impl fmt::Display for RepositoryContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryContent::Package => write!(f, "package"),
            RepositoryContent::Function => write!(f, "function"),
        }
    }
}

/// Reference to a named credential secret
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecretRef {
    #[serde(default)]
    pub name: String,
}

impl SecretRef {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// Git backend coordinates
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepository {
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub directory: String,
    #[serde(default, skip_serializing_if = "SecretRef::is_empty")]
    pub secret_ref: SecretRef,
}

fn default_branch() -> String {
    "main".to_string()
}

impl GitRepository {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: default_branch(),
            directory: String::new(),
            secret_ref: SecretRef::default(),
        }
    }

    /// Secret name, if the repository declares one
    pub fn secret_name(&self) -> Option<&str> {
        (!self.secret_ref.is_empty()).then_some(self.secret_ref.name.as_str())
    }
}

/// OCI registry coordinates
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OciRepository {
    pub registry: String,
}

/// A registered repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(alias = "type")]
    pub kind: RepositoryType,
    #[serde(default)]
    pub content: RepositoryContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitRepository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci: Option<OciRepository>,
}

impl Repository {
    /// Package repository backed by git
    pub fn git(name: impl Into<String>, git: GitRepository) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            description: String::new(),
            kind: RepositoryType::Git,
            content: RepositoryContent::Package,
            git: Some(git),
            oci: None,
        }
    }

    /// Function repository backed by an OCI registry
    pub fn oci_functions(name: impl Into<String>, registry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            description: String::new(),
            kind: RepositoryType::Oci,
            content: RepositoryContent::Function,
            git: None,
            oci: Some(OciRepository {
                registry: registry.into(),
            }),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_content(mut self, content: RepositoryContent) -> Self {
        self.content = content;
        self
    }
}
