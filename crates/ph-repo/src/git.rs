// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Git backend contract

use async_trait::async_trait;
use ph_domain_types::{Credential, GitRepository, Resources};

use crate::error::BackendResult;

/// Where to fetch a package from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCoordinates {
    pub repo: String,
    pub git_ref: String,
    /// Subdirectory holding the package; empty means the repository root
    pub directory: String,
}

/// Package content at a resolved commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPackage {
    /// Immutable identifier the backend reports for the requested ref
    pub commit: String,
    /// Files under the requested directory, keyed relative to it
    pub resources: Resources,
}

/// A package found while scanning a registered repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPackage {
    /// Package path relative to the repository's configured directory
    pub package: String,
    pub revision: String,
    /// Location of the package inside the backing repository
    pub location: GitCoordinates,
    pub commit: String,
}

#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Fetch the files of `coordinates.directory` at `coordinates.git_ref`
    async fn fetch(
        &self,
        coordinates: &GitCoordinates,
        credential: Option<&Credential>,
    ) -> BackendResult<FetchedPackage>;

    /// Enumerate package revisions published in a registered repository
    ///
    /// A package is a directory holding `manifest_file`.
    async fn discover(
        &self,
        repository: &GitRepository,
        manifest_file: &str,
        credential: Option<&Credential>,
    ) -> BackendResult<Vec<DiscoveredPackage>>;
}
