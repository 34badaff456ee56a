// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for backend operations

use thiserror::Error;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("ref '{git_ref}' not found in {repo}")]
    RefNotFound { repo: String, git_ref: String },

    #[error("path '{directory}' not found at {repo}@{git_ref}")]
    PathNotFound {
        repo: String,
        git_ref: String,
        directory: String,
    },

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("access denied to {0}")]
    Unauthorized(String),

    #[error("registry not found: {0}")]
    RegistryNotFound(String),
}
