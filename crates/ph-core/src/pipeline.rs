// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Task pipeline executor
//!
//! A package revision is materialized by folding its task list over an
//! immutable [`PackageSnapshot`]. Every step takes the previous snapshot by
//! reference and returns a new one, so a failing step leaves nothing half
//! applied and nothing reaches the store until the whole fold succeeds.
//!
//! ```text
//! Start -> AfterTask(0) -> ... -> AfterTask(n-1) -> Complete
//!    \__________________________________________/
//!                        any error -> Failed
//! ```

use ph_domain_types::{
    Kptfile, PackageInfo, PackageInitTaskSpec, PackageRevision, PatchSpec, PatchType, Resources,
    Task, TaskType,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::function::FunctionEvaluator;
use crate::resolver::UpstreamResolver;

/// Execution state of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    AfterTask(usize),
    Failed,
    Complete,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Start => write!(f, "Start"),
            PipelineState::AfterTask(i) => write!(f, "AfterTask[{}]", i),
            PipelineState::Failed => write!(f, "Failed"),
            PipelineState::Complete => write!(f, "Complete"),
        }
    }
}

/// Bundle and parsed manifest at one point of the fold
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSnapshot {
    resources: Resources,
    kptfile: Kptfile,
}

impl PackageSnapshot {
    /// Build a snapshot, writing `kptfile` to `manifest_file` inside `resources`
    pub fn new(mut resources: Resources, kptfile: Kptfile, manifest_file: &str) -> Result<Self> {
        let rendered = kptfile
            .to_yaml()
            .map_err(|e| Error::Validation(format!("cannot render manifest: {}", e)))?;
        resources.insert(manifest_file.to_string(), rendered);
        Ok(Self { resources, kptfile })
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn kptfile(&self) -> &Kptfile {
        &self.kptfile
    }

    pub fn into_parts(self) -> (Resources, Kptfile) {
        (self.resources, self.kptfile)
    }
}

/// Check a revision's shape before any task runs
pub fn validate(revision: &PackageRevision) -> Result<()> {
    for (field, value) in [
        ("packageName", &revision.package_name),
        ("revision", &revision.revision),
        ("repositoryName", &revision.repository_name),
    ] {
        if value.is_empty() {
            return Err(Error::Validation(format!("{} must not be empty", field)));
        }
        if value.contains(':') {
            return Err(Error::Validation(format!("{} '{}' must not contain ':'", field, value)));
        }
    }

    for (index, task) in revision.tasks.iter().enumerate() {
        validate_task(index, task).map_err(|e| e.at_task(index, task.task_type))?;
    }
    Ok(())
}

fn validate_task(index: usize, task: &Task) -> Result<()> {
    let payload_matches = match task.task_type {
        TaskType::Clone => task.clone.is_some(),
        TaskType::Init => task.init.is_some(),
        TaskType::Eval => task.eval.is_some(),
        TaskType::Edit => task.edit.is_some(),
    };
    if task.payload_count() != 1 || !payload_matches {
        return Err(Error::Validation(format!(
            "{} task must carry exactly one '{}' payload",
            task.task_type, task.task_type
        )));
    }

    if matches!(task.task_type, TaskType::Clone | TaskType::Init) && index != 0 {
        return Err(Error::Validation(format!(
            "{} task must be the first task of the pipeline",
            task.task_type
        )));
    }

    if let Some(clone) = &task.clone {
        let upstream = &clone.upstream;
        match (&upstream.git, &upstream.upstream_ref) {
            (Some(git), None) => {
                if git.repo.is_empty() || git.git_ref.is_empty() {
                    return Err(Error::Validation(
                        "clone upstream git requires repo and ref".to_string(),
                    ));
                }
            }
            (None, Some(reference)) => {
                reference
                    .name
                    .parse::<ph_domain_types::PackageRevisionKey>()
                    .map_err(|e| Error::Validation(e.to_string()))?;
            }
            _ => {
                return Err(Error::Validation(
                    "clone upstream must set exactly one of git or upstreamRef".to_string(),
                ))
            }
        }
    }

    if let Some(eval) = &task.eval {
        if eval.image.is_empty() {
            return Err(Error::Validation("eval task requires an image".to_string()));
        }
    }

    if let Some(edit) = &task.edit {
        if let Some(patch) = edit.patches.iter().find(|p| p.file.is_empty()) {
            return Err(Error::Validation(format!(
                "edit patch ({:?}) must name a file",
                patch.patch_type
            )));
        }
    }

    Ok(())
}

/// Applies task lists to build package revisions
pub struct TaskPipelineExecutor {
    config: EngineConfig,
    resolver: Arc<UpstreamResolver>,
    evaluator: Arc<dyn FunctionEvaluator>,
}

impl TaskPipelineExecutor {
    pub fn new(
        config: EngineConfig,
        resolver: Arc<UpstreamResolver>,
        evaluator: Arc<dyn FunctionEvaluator>,
    ) -> Self {
        Self {
            config,
            resolver,
            evaluator,
        }
    }

    /// Run every task of `revision` and return the final snapshot
    ///
    /// Errors carry the index of the failing task. A pipeline without a
    /// leading clone or init starts from an implicit init with empty metadata.
    pub async fn execute(
        &self,
        revision: &PackageRevision,
        ctx: &OperationContext,
    ) -> Result<PackageSnapshot> {
        validate(revision)?;

        let key = revision.key();
        debug!(revision = %key, state = %PipelineState::Start, "pipeline transition");

        let seeded = matches!(
            revision.tasks.first().map(|t| t.task_type),
            Some(TaskType::Clone | TaskType::Init)
        );
        let mut snapshot = if seeded {
            None
        } else {
            Some(self.init(&revision.package_name, &PackageInitTaskSpec::default())?)
        };

        for (index, task) in revision.tasks.iter().enumerate() {
            let step_ctx = match self.config.task_timeout() {
                Some(timeout) => ctx.child().with_timeout(timeout),
                None => ctx.clone(),
            };

            match self.apply(revision, snapshot.as_ref(), task, &step_ctx).await {
                Ok(next) => {
                    snapshot = Some(next);
                    debug!(
                        revision = %key,
                        state = %PipelineState::AfterTask(index),
                        task = %task.task_type,
                        "pipeline transition"
                    );
                }
                Err(err) => {
                    debug!(
                        revision = %key,
                        state = %PipelineState::Failed,
                        task = %task.task_type,
                        index,
                        error = %err,
                        "pipeline transition"
                    );
                    return Err(err.at_task(index, task.task_type));
                }
            }
        }

        let snapshot = snapshot
            .ok_or_else(|| Error::Validation(format!("pipeline for {} produced no package", key)))?;
        debug!(revision = %key, state = %PipelineState::Complete, "pipeline transition");
        Ok(snapshot)
    }

    async fn apply(
        &self,
        revision: &PackageRevision,
        current: Option<&PackageSnapshot>,
        task: &Task,
        ctx: &OperationContext,
    ) -> Result<PackageSnapshot> {
        ctx.check()?;

        match (task.task_type, current) {
            (TaskType::Clone, _) => {
                let spec = task.clone.as_ref().ok_or_else(|| missing_payload(task))?;
                self.clone_upstream(&revision.package_name, &spec.upstream, ctx).await
            }
            (TaskType::Init, _) => {
                let spec = task.init.as_ref().ok_or_else(|| missing_payload(task))?;
                self.init(&revision.package_name, spec)
            }
            (TaskType::Eval, Some(current)) => {
                let spec = task.eval.as_ref().ok_or_else(|| missing_payload(task))?;
                let image = self.config.expand_image(&spec.image);
                self.eval(current, &image, &spec.config_map, ctx).await
            }
            (TaskType::Edit, Some(current)) => {
                let spec = task.edit.as_ref().ok_or_else(|| missing_payload(task))?;
                self.edit(current, &spec.patches)
            }
            (task_type, None) => Err(Error::Validation(format!(
                "{} task has no package to operate on",
                task_type
            ))),
        }
    }

    async fn clone_upstream(
        &self,
        package_name: &str,
        upstream: &ph_domain_types::UpstreamPackage,
        ctx: &OperationContext,
    ) -> Result<PackageSnapshot> {
        let resolved = self.resolver.resolve(upstream, ctx).await?;

        let mut kptfile = match resolved.resources.get(&self.config.manifest_file) {
            Some(contents) => Kptfile::from_yaml(contents).map_err(|e| {
                Error::Resolution(format!("upstream manifest is unusable: {}", e))
            })?,
            None => Kptfile::new(package_name),
        };
        kptfile.metadata.name = package_name.to_string();
        kptfile.upstream = Some(resolved.upstream);
        kptfile.upstream_lock = Some(resolved.lock);

        PackageSnapshot::new(resolved.resources, kptfile, &self.config.manifest_file)
    }

    fn init(&self, package_name: &str, spec: &PackageInitTaskSpec) -> Result<PackageSnapshot> {
        let info = PackageInfo {
            site: spec.site.clone(),
            description: spec.description.clone(),
            keywords: spec.keywords.clone(),
        };

        let mut kptfile = Kptfile::new(package_name);
        kptfile.info = (!info.is_empty()).then_some(info);

        PackageSnapshot::new(Resources::new(), kptfile, &self.config.manifest_file)
    }

    async fn eval(
        &self,
        current: &PackageSnapshot,
        image: &str,
        config: &BTreeMap<String, String>,
        ctx: &OperationContext,
    ) -> Result<PackageSnapshot> {
        let resources =
            ctx.run(self.evaluator.evaluate(current.resources(), image, config)).await?;

        let manifest = resources.get(&self.config.manifest_file).ok_or_else(|| {
            Error::Function(format!("{} removed {}", image, self.config.manifest_file))
        })?;
        let kptfile = Kptfile::from_yaml(manifest).map_err(|e| {
            Error::Function(format!("{} produced an unusable manifest: {}", image, e))
        })?;
        if kptfile.name() != current.kptfile().name() {
            return Err(Error::Function(format!(
                "{} renamed package '{}' to '{}'",
                image,
                current.kptfile().name(),
                kptfile.name()
            )));
        }

        Ok(PackageSnapshot { resources, kptfile })
    }

    fn edit(&self, current: &PackageSnapshot, patches: &[PatchSpec]) -> Result<PackageSnapshot> {
        let manifest_file = &self.config.manifest_file;
        let mut resources = current.resources().clone();

        for patch in patches {
            let exists = resources.contains_key(&patch.file);
            match patch.patch_type {
                PatchType::CreateFile if exists => {
                    return Err(Error::Validation(format!("{} already exists", patch.file)))
                }
                PatchType::ReplaceFile | PatchType::DeleteFile if !exists => {
                    return Err(Error::Validation(format!("{} does not exist", patch.file)))
                }
                PatchType::DeleteFile if &patch.file == manifest_file => {
                    return Err(Error::Validation(format!("{} cannot be deleted", manifest_file)))
                }
                PatchType::DeleteFile => {
                    resources.remove(&patch.file);
                }
                PatchType::CreateFile | PatchType::ReplaceFile => {
                    resources.insert(patch.file.clone(), patch.contents.clone());
                }
            }
        }

        let manifest = resources
            .get(manifest_file)
            .ok_or_else(|| Error::Validation(format!("{} is missing", manifest_file)))?;
        let kptfile = Kptfile::from_yaml(manifest)
            .map_err(|e| Error::Validation(format!("edited manifest is unusable: {}", e)))?;
        if kptfile.name() != current.kptfile().name() {
            return Err(Error::Validation(format!(
                "edit must not rename package '{}'",
                current.kptfile().name()
            )));
        }

        Ok(PackageSnapshot { resources, kptfile })
    }
}

fn missing_payload(task: &Task) -> Error {
    Error::Validation(format!("{} task has no payload", task.task_type))
}
