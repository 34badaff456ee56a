// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Package revision and task types
//!
//! A package revision is built by an ordered list of tasks. Each task carries
//! exactly one payload matching its `type`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::kptfile::{Kptfile, KptfileError, OriginType, KPTFILE_NAME};

/// Materialized package content: relative path to file contents
pub type Resources = BTreeMap<String, String>;

/// Task discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Clone,
    Init,
    Eval,
    Edit,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Clone => write!(f, "clone"),
            TaskType::Init => write!(f, "init"),
            TaskType::Eval => write!(f, "eval"),
            TaskType::Edit => write!(f, "edit"),
        }
    }
}

/// Explicit git coordinates of an upstream package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitPackage {
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub directory: String,
}

/// Reference to another package revision by name (`repo:package:revision`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageRevisionRef {
    pub name: String,
}

/// Source of a clone task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamPackage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OriginType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitPackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_ref: Option<PackageRevisionRef>,
}

impl UpstreamPackage {
    pub fn git(
        repo: impl Into<String>,
        git_ref: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            origin: Some(OriginType::Git),
            git: Some(GitPackage {
                repo: repo.into(),
                git_ref: git_ref.into(),
                directory: directory.into(),
            }),
            upstream_ref: None,
        }
    }

    pub fn revision_ref(name: impl Into<String>) -> Self {
        Self {
            origin: None,
            git: None,
            upstream_ref: Some(PackageRevisionRef { name: name.into() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageCloneTaskSpec {
    pub upstream: UpstreamPackage,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageInitTaskSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub site: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEvalTaskSpec {
    pub image: String,
    #[serde(default)]
    pub config_map: BTreeMap<String, String>,
}

/// How an edit patch changes a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchType {
    CreateFile,
    ReplaceFile,
    DeleteFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSpec {
    pub file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contents: String,
    pub patch_type: PatchType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageEditTaskSpec {
    #[serde(default)]
    pub patches: Vec<PatchSpec>,
}

/// One ordered step of a package revision's pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone: Option<PackageCloneTaskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<PackageInitTaskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<FunctionEvalTaskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<PackageEditTaskSpec>,
}

impl Task {
    fn empty(task_type: TaskType) -> Self {
        Self {
            task_type,
            clone: None,
            init: None,
            eval: None,
            edit: None,
        }
    }

    pub fn cloned_from(upstream: UpstreamPackage) -> Self {
        Self {
            clone: Some(PackageCloneTaskSpec { upstream }),
            ..Self::empty(TaskType::Clone)
        }
    }

    pub fn init(spec: PackageInitTaskSpec) -> Self {
        Self {
            init: Some(spec),
            ..Self::empty(TaskType::Init)
        }
    }

    pub fn eval<I, K, V>(image: impl Into<String>, config: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            eval: Some(FunctionEvalTaskSpec {
                image: image.into(),
                config_map: config.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            }),
            ..Self::empty(TaskType::Eval)
        }
    }

    pub fn edit(patches: Vec<PatchSpec>) -> Self {
        Self {
            edit: Some(PackageEditTaskSpec { patches }),
            ..Self::empty(TaskType::Edit)
        }
    }

    /// Number of populated payloads
    pub fn payload_count(&self) -> usize {
        [
            self.clone.is_some(),
            self.init.is_some(),
            self.eval.is_some(),
            self.edit.is_some(),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count()
    }
}

/// Error produced when a revision name is not `repository:package:revision`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid package revision name '{0}': expected <repository>:<package>:<revision>")]
pub struct ParseRevisionKeyError(pub String);

/// Identity of a package revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageRevisionKey {
    pub repository: String,
    pub package: String,
    pub revision: String,
}

impl PackageRevisionKey {
    pub fn new(
        repository: impl Into<String>,
        package: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            package: package.into(),
            revision: revision.into(),
        }
    }
}

impl fmt::Display for PackageRevisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.repository, self.package, self.revision)
    }
}

impl FromStr for PackageRevisionKey {
    type Err = ParseRevisionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(repo), Some(package), Some(revision))
                if !repo.is_empty()
                    && !package.is_empty()
                    && !revision.is_empty()
                    && !revision.contains(':') =>
            {
                Ok(Self::new(repo, package, revision))
            }
            _ => Err(ParseRevisionKeyError(s.to_string())),
        }
    }
}

/// A client request describing how to build a package revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRevision {
    pub package_name: String,
    pub revision: String,
    pub repository_name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl PackageRevision {
    pub fn new(
        repository_name: impl Into<String>,
        package_name: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            revision: revision.into(),
            repository_name: repository_name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn key(&self) -> PackageRevisionKey {
        PackageRevisionKey::new(&self.repository_name, &self.package_name, &self.revision)
    }
}

/// The materialized bundle of a package revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRevisionResources {
    pub name: String,
    pub package_name: String,
    pub revision: String,
    pub repository_name: String,
    pub resources: Resources,
}

impl PackageRevisionResources {
    pub fn new(key: &PackageRevisionKey, resources: Resources) -> Self {
        Self {
            name: key.to_string(),
            package_name: key.package.clone(),
            revision: key.revision.clone(),
            repository_name: key.repository.clone(),
            resources,
        }
    }

    /// Parse the manifest stored at the well-known path
    pub fn kptfile(&self) -> Result<Kptfile, KptfileError> {
        self.manifest(KPTFILE_NAME)
    }

    /// Parse the manifest stored at `manifest_file`
    pub fn manifest(&self, manifest_file: &str) -> Result<Kptfile, KptfileError> {
        let contents = self.resources.get(manifest_file).ok_or(KptfileError::Missing)?;
        Kptfile::from_yaml(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_key_round_trips_through_display() {
        let key: PackageRevisionKey = "git:test-bucket:v1".parse().unwrap();
        assert_eq!(key.repository, "git");
        assert_eq!(key.package, "test-bucket");
        assert_eq!(key.revision, "v1");
        assert_eq!(key.to_string(), "git:test-bucket:v1");

        assert!("git:test-bucket".parse::<PackageRevisionKey>().is_err());
        assert!("git::v1".parse::<PackageRevisionKey>().is_err());
        assert!("a:b:c:d".parse::<PackageRevisionKey>().is_err());
    }

    #[test]
    fn task_list_deserializes_from_wire_format() {
        let yaml = r#"
packageName: test-bucket
revision: v1
repositoryName: git
tasks:
  - type: clone
    clone:
      upstream:
        type: git
        git:
          repo: https://github.com/GoogleCloudPlatform/blueprints.git
          ref: bucket-blueprint-v0.4.3
          directory: catalog/bucket
  - type: eval
    eval:
      image: gcr.io/kpt-fn/set-namespace:v0.2.0
      configMap:
        namespace: bucket-namespace
"#;
        let pr: PackageRevision = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(pr.key().to_string(), "git:test-bucket:v1");
        assert_eq!(pr.tasks.len(), 2);

        let clone = pr.tasks[0].clone.as_ref().unwrap();
        let git = clone.upstream.git.as_ref().unwrap();
        assert_eq!(clone.upstream.origin, Some(OriginType::Git));
        assert_eq!(git.git_ref, "bucket-blueprint-v0.4.3");
        assert_eq!(git.directory, "catalog/bucket");

        let eval = pr.tasks[1].eval.as_ref().unwrap();
        assert_eq!(eval.config_map["namespace"], "bucket-namespace");
        assert_eq!(pr.tasks[1].payload_count(), 1);
    }

    #[test]
    fn upstream_ref_serializes_without_type() {
        let task = Task::cloned_from(UpstreamPackage::revision_ref("test-blueprints:basens:v1"));
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "clone");
        assert_eq!(
            json["clone"]["upstream"]["upstreamRef"]["name"],
            "test-blueprints:basens:v1"
        );
        assert!(json["clone"]["upstream"].get("type").is_none());
    }

    #[test]
    fn manifest_reads_the_given_path() {
        let key = PackageRevisionKey::new("git", "bucket", "v1");
        let resources: Resources = [(
            "package.yaml".to_string(),
            "apiVersion: kpt.dev/v1\nkind: Kptfile\nmetadata:\n  name: bucket\n".to_string(),
        )]
        .into_iter()
        .collect();
        let revision = PackageRevisionResources::new(&key, resources);

        assert_eq!(revision.manifest("package.yaml").unwrap().name(), "bucket");
        assert!(matches!(revision.kptfile(), Err(KptfileError::Missing)));
    }
}
