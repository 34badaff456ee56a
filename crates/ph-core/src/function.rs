// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Function evaluation
//!
//! A function transforms a bundle given an opaque configuration map. The
//! evaluator never mutates its input: it returns a new bundle, and files the
//! function did not change are passed through byte for byte.

use async_trait::async_trait;
use ph_domain_types::{Resources, LOCAL_CONFIG_ANNOTATION};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::{Error, Result};

/// Evaluates a function image against a bundle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FunctionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        resources: &Resources,
        image: &str,
        config: &BTreeMap<String, String>,
    ) -> Result<Resources>;
}

/// Mutation applied to one resource; returns whether the resource changed
pub type MutateFn = fn(&mut Mapping, &BTreeMap<String, String>) -> bool;

#[derive(Clone, Copy)]
pub struct BuiltinFunction {
    /// Config keys that must be present
    pub required_config: &'static [&'static str],
    pub mutate: MutateFn,
}

/// Kinds that are never namespaced
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// Function runtime backed by a registration table of in-process functions
///
/// Images resolve by their short name, so `gcr.io/kpt-fn/set-namespace:v0.2.0`
/// and `set-namespace` run the same function.
#[derive(Clone, Default)]
pub struct BuiltinFunctionRuntime {
    functions: HashMap<String, BuiltinFunction>,
}

impl BuiltinFunctionRuntime {
    /// Empty runtime; every image is "not found" until registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime with `set-namespace`, `set-labels` and `set-annotations`
    pub fn with_defaults() -> Self {
        Self::new()
            .with_function("set-namespace", &["namespace"], set_namespace)
            .with_function("set-labels", &[], set_labels)
            .with_function("set-annotations", &[], set_annotations)
    }

    pub fn with_function(
        mut self,
        name: &str,
        required_config: &'static [&'static str],
        mutate: MutateFn,
    ) -> Self {
        self.functions.insert(
            name.to_string(),
            BuiltinFunction {
                required_config,
                mutate,
            },
        );
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// `gcr.io/kpt-fn/set-namespace:v0.2.0` → `set-namespace`
pub fn function_name(image: &str) -> &str {
    let last = image.rsplit('/').next().unwrap_or(image);
    let last = last.split('@').next().unwrap_or(last);
    last.split(':').next().unwrap_or(last)
}

#[async_trait]
impl FunctionEvaluator for BuiltinFunctionRuntime {
    async fn evaluate(
        &self,
        resources: &Resources,
        image: &str,
        config: &BTreeMap<String, String>,
    ) -> Result<Resources> {
        let name = function_name(image);
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| Error::Function(format!("function '{}' not found", image)))?;

        if let Some(missing) = function.required_config.iter().find(|k| !config.contains_key(**k))
        {
            return Err(Error::Function(format!(
                "{} exited abnormally: missing required config '{}'",
                name, missing
            )));
        }

        let mut output = Resources::new();
        for (path, contents) in resources {
            let transformed = if is_yaml(path) {
                apply_to_file(path, contents, function.mutate, config)?
            } else {
                None
            };
            output.insert(path.clone(), transformed.unwrap_or_else(|| contents.clone()));
        }

        debug!(function = %name, files = output.len(), "evaluated function");
        Ok(output)
    }
}

fn is_yaml(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

/// Apply `mutate` to every eligible document; `None` when nothing changed
fn apply_to_file(
    path: &str,
    contents: &str,
    mutate: MutateFn,
    config: &BTreeMap<String, String>,
) -> Result<Option<String>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(contents) {
        let value = Value::deserialize(document)
            .map_err(|e| Error::Function(format!("cannot parse {}: {}", path, e)))?;
        documents.push(value);
    }

    let mut changed = false;
    for document in documents.iter_mut() {
        if let Value::Mapping(resource) = document {
            if is_eligible(resource) {
                changed |= mutate(resource, config);
            }
        }
    }

    if !changed {
        return Ok(None);
    }

    let mut rendered = Vec::with_capacity(documents.len());
    for document in documents.iter().filter(|d| !d.is_null()) {
        rendered.push(
            serde_yaml::to_string(document)
                .map_err(|e| Error::Function(format!("cannot render {}: {}", path, e)))?,
        );
    }
    Ok(Some(rendered.join("---\n")))
}

fn is_eligible(resource: &Mapping) -> bool {
    let kind = match resource.get("kind").and_then(Value::as_str) {
        Some(kind) => kind,
        None => return false,
    };
    if resource.get("apiVersion").is_none() || CLUSTER_SCOPED_KINDS.contains(&kind) {
        return false;
    }
    let local_config = resource
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(LOCAL_CONFIG_ANNOTATION))
        .and_then(Value::as_str)
        .map(|v| v == "true")
        .unwrap_or(false);
    !local_config
}

fn metadata_mut(resource: &mut Mapping) -> Option<&mut Mapping> {
    child_mapping_mut(resource, "metadata")
}

/// Mapping stored under `field`, created (or replaced if not a mapping) as needed
fn child_mapping_mut<'a>(parent: &'a mut Mapping, field: &str) -> Option<&'a mut Mapping> {
    let entry = parent.entry(Value::from(field)).or_insert(Value::Mapping(Mapping::new()));
    if !entry.is_mapping() {
        *entry = Value::Mapping(Mapping::new());
    }
    entry.as_mapping_mut()
}

fn merge_string_map(
    resource: &mut Mapping,
    field: &str,
    entries: &BTreeMap<String, String>,
) -> bool {
    if entries.is_empty() {
        return false;
    }
    let Some(target) = metadata_mut(resource).and_then(|m| child_mapping_mut(m, field)) else {
        return false;
    };

    let mut changed = false;
    for (k, v) in entries {
        let value = Value::from(v.as_str());
        if target.get(k.as_str()) != Some(&value) {
            target.insert(Value::from(k.as_str()), value);
            changed = true;
        }
    }
    changed
}

fn set_namespace(resource: &mut Mapping, config: &BTreeMap<String, String>) -> bool {
    let (Some(namespace), Some(metadata)) = (config.get("namespace"), metadata_mut(resource)) else {
        return false;
    };
    let value = Value::from(namespace.as_str());
    if metadata.get("namespace") == Some(&value) {
        return false;
    }
    metadata.insert(Value::from("namespace"), value);
    true
}

fn set_labels(resource: &mut Mapping, config: &BTreeMap<String, String>) -> bool {
    merge_string_map(resource, "labels", config)
}

fn set_annotations(resource: &mut Mapping, config: &BTreeMap<String, String>) -> bool {
    merge_string_map(resource, "annotations", config)
}
