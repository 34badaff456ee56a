// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Backend client contracts for Package Harbor.
//!
//! The orchestration core never talks to git servers, OCI registries or
//! secret stores directly. It consumes them through the narrow traits in
//! this crate. The in-memory implementations back the test suites and the
//! offline CLI.

pub mod credentials;
pub mod error;
pub mod git;
pub mod memory;
pub mod oci;

pub use credentials::{CredentialResolver, InMemoryCredentials};
pub use error::{BackendError, BackendResult};
pub use git::{DiscoveredPackage, FetchedPackage, GitBackend, GitCoordinates};
pub use memory::{InMemoryGitBackend, InMemoryOciBackend};
pub use oci::{FunctionImage, OciBackend};
