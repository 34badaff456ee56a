// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! OCI registry contract

use async_trait::async_trait;
use ph_domain_types::FunctionType;

use crate::error::BackendResult;

/// A function image published in a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionImage {
    /// Short function name, e.g. `set-namespace`
    pub name: String,
    pub tag: String,
    pub description: String,
    pub function_types: Vec<FunctionType>,
}

impl FunctionImage {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            description: String::new(),
            function_types: vec![FunctionType::Mutator],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Fully qualified image reference within `registry`
    pub fn image(&self, registry: &str) -> String {
        format!("{}/{}:{}", registry.trim_end_matches('/'), self.name, self.tag)
    }
}

#[async_trait]
pub trait OciBackend: Send + Sync {
    /// List the function images available in `registry`
    async fn list_functions(&self, registry: &str) -> BackendResult<Vec<FunctionImage>>;
}
