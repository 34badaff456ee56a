// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Domain types for the Package Harbor orchestration service
//!
//! This crate contains the boundary schema shared by the registry, the task
//! pipeline, the resource store and the binaries. Field names follow the wire
//! format exactly (camelCase), so values can be exchanged as YAML or JSON
//! without any mapping layer.

pub mod credential;
pub mod function;
pub mod kptfile;
pub mod package;
pub mod repository;

// Re-export commonly used types
pub use credential::*;
pub use function::*;
pub use kptfile::*;
pub use package::*;
pub use repository::*;
