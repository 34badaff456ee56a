// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Package Harbor orchestration core
//!
//! Turns declarative package revisions into concrete resource bundles:
//! upstreams are resolved to pinned lineage, tasks are applied in order,
//! functions transform the bundle, and only complete results are committed.
//!
//! [`PackageService`] is the entry point; the components behind it can also
//! be used on their own.

pub mod config;
pub mod context;
pub mod error;
pub mod function;
pub mod index;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod store;

pub use config::EngineConfig;
pub use context::OperationContext;
pub use error::{Error, ErrorKind, Result};
pub use function::{BuiltinFunctionRuntime, FunctionEvaluator};
pub use index::{PackageRevisionSummary, RevisionFilter, RevisionIndex, RevisionOrigin};
pub use pipeline::{PackageSnapshot, PipelineState, TaskPipelineExecutor};
pub use registry::RepositoryRegistry;
pub use resolver::{ResolvedUpstream, RevisionContent, RevisionLookup, UpstreamResolver};
pub use service::{Backends, PackageRevisionView, PackageService};
pub use store::{InMemoryResourceStore, StoredRevision, WriteIntent, WriteLease};
