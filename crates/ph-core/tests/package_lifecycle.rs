// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end package lifecycle against in-memory backends

use async_trait::async_trait;
use futures::FutureExt;
use ph_core::{
    Backends, BuiltinFunctionRuntime, EngineConfig, ErrorKind, FunctionEvaluator,
    OperationContext, PackageService, RevisionFilter, RevisionOrigin,
};
use ph_domain_types::{
    GitLock, GitRepository, OriginType, PackageInfo, PackageInitTaskSpec, PackageRevision,
    PackageRevisionKey, Repository, Resources, Task, UpstreamLock, UpstreamPackage,
};
use ph_repo::{FunctionImage, InMemoryCredentials, InMemoryGitBackend, InMemoryOciBackend};
use ph_test_utils::{CaseContext, CaseFuture, Suite, SuiteConfig, TestLogger};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DEPLOYMENTS: &str = "https://github.com/platkrm/deployments.git";
const BLUEPRINTS: &str = "https://github.com/GoogleCloudPlatform/blueprints.git";
const TEST_BLUEPRINTS: &str = "https://github.com/platkrm/test-blueprints.git";
const FUNCTION_REGISTRY: &str = "gcr.io/kpt-fn";

const BUCKET_KPTFILE: &str = "\
apiVersion: kpt.dev/v1
kind: Kptfile
metadata:
  name: bucket
info:
  description: A Google Cloud Storage bucket
";

const BUCKET_YAML: &str = "\
apiVersion: storage.cnrm.cloud.google.com/v1beta1
kind: StorageBucket
metadata:
  name: blueprints-project-bucket
  namespace: config-control
spec:
  storageClass: standard
";

const BASENS_KPTFILE: &str = "\
apiVersion: kpt.dev/v1
kind: Kptfile
metadata:
  name: basens
";

const BASENS_NAMESPACE: &str = "\
apiVersion: v1
kind: Namespace
metadata:
  name: example
";

struct Harness {
    service: Arc<PackageService>,
    git: Arc<InMemoryGitBackend>,
    ctx: OperationContext,
}

/// Function runtime whose invocations never return
struct StalledEvaluator;

#[async_trait]
impl FunctionEvaluator for StalledEvaluator {
    async fn evaluate(
        &self,
        _resources: &Resources,
        _image: &str,
        _config: &BTreeMap<String, String>,
    ) -> ph_core::Result<Resources> {
        std::future::pending().await
    }
}

impl Harness {
    fn new() -> Self {
        Self::with(
            EngineConfig::default(),
            Arc::new(BuiltinFunctionRuntime::with_defaults()),
        )
    }

    fn with(config: EngineConfig, functions: Arc<dyn FunctionEvaluator>) -> Self {
        let git = Arc::new(
            InMemoryGitBackend::new()
                .with_ref(DEPLOYMENTS, "main", [("README.md", "deployments\n")])
                .with_ref(
                    BLUEPRINTS,
                    "bucket-blueprint-v0.4.3",
                    [
                        ("catalog/bucket/Kptfile", BUCKET_KPTFILE),
                        ("catalog/bucket/bucket.yaml", BUCKET_YAML),
                        ("catalog/sql/Kptfile", "kind: Kptfile\n"),
                    ],
                )
                .with_ref(TEST_BLUEPRINTS, "main", [("README.md", "drafts\n")])
                .with_ref(
                    TEST_BLUEPRINTS,
                    "v1",
                    [
                        ("basens/Kptfile", BASENS_KPTFILE),
                        ("basens/namespace.yaml", BASENS_NAMESPACE),
                    ],
                ),
        );
        let oci = InMemoryOciBackend::new().with_functions(
            FUNCTION_REGISTRY,
            [
                FunctionImage::new("set-namespace", "v0.4.1")
                    .with_description("Sets the namespace of namespaced resources"),
                FunctionImage::new("set-labels", "v0.1.5"),
            ],
        );
        let backends = Backends {
            git: git.clone(),
            oci: Arc::new(oci),
            credentials: Arc::new(InMemoryCredentials::new()),
            functions,
        };

        Self {
            service: Arc::new(PackageService::new(config, backends)),
            git,
            ctx: OperationContext::background(),
        }
    }

    async fn register_deployments(&self) -> anyhow::Result<()> {
        self.service
            .register_repository(Repository::git("git", GitRepository::new(DEPLOYMENTS)))
            .await?;
        Ok(())
    }

    async fn register_test_blueprints(&self) -> anyhow::Result<()> {
        let repository = Repository::git("test-blueprints", GitRepository::new(TEST_BLUEPRINTS));
        self.service.register_repository(repository).await?;
        Ok(())
    }
}

fn init_task(description: &str) -> Task {
    Task::init(PackageInitTaskSpec {
        description: description.to_string(),
        ..Default::default()
    })
}

fn register_deployments(harness: &mut Harness) -> CaseFuture<'_> {
    async move { harness.register_deployments().await }.boxed()
}

fn clone_bucket_and_set_namespace(ctx: &mut CaseContext<Harness>) -> CaseFuture<'_> {
    async move {
        let harness = &ctx.fixture;
        let revision = PackageRevision::new("git", "test-bucket", "v1")
            .with_task(Task::cloned_from(UpstreamPackage::git(
                BLUEPRINTS,
                "bucket-blueprint-v0.4.3",
                "catalog/bucket",
            )))
            .with_task(Task::eval(
                "gcr.io/kpt-fn/set-namespace:v0.4.1",
                [("namespace", "bucket-namespace")],
            ));

        let service = harness.service.clone();
        let key = revision.key();
        ctx.cleanup.push("test-bucket revision", move || async move {
            service.delete_package_revision(&key, &OperationContext::background()).await?;
            Ok(())
        });

        let created = harness.service.create_package_revision(revision, &harness.ctx).await?;
        assert_eq!(created.name, "git:test-bucket:v1");
        assert!(!created.resources.contains_key("catalog/sql/Kptfile"));

        let bucket: serde_yaml::Value = serde_yaml::from_str(&created.resources["bucket.yaml"])?;
        assert_eq!(bucket["metadata"]["namespace"].as_str(), Some("bucket-namespace"));
        assert_eq!(bucket["metadata"]["name"].as_str(), Some("blueprints-project-bucket"));

        let kptfile = created.kptfile()?;
        assert_eq!(kptfile.name(), "test-bucket");
        let lock = kptfile.upstream_lock.clone().ok_or_else(|| anyhow::anyhow!("no upstreamLock"))?;
        let git = lock.git.clone().ok_or_else(|| anyhow::anyhow!("no git lock"))?;
        assert_eq!(lock.origin, OriginType::Git);
        assert_eq!(git.repo, BLUEPRINTS);
        assert_eq!(git.git_ref, "bucket-blueprint-v0.4.3");
        assert_eq!(git.directory, "catalog/bucket");
        assert!(!git.commit.is_empty());
        assert_eq!(kptfile.upstream, Some(lock.to_upstream()));
        assert_eq!(
            kptfile.info.map(|i| i.description),
            Some("A Google Cloud Storage bucket".to_string())
        );
        Ok(())
    }
    .boxed()
}

fn init_with_description_only(ctx: &mut CaseContext<Harness>) -> CaseFuture<'_> {
    async move {
        let harness = &ctx.fixture;
        let revision = PackageRevision::new("git", "empty-package", "v1")
            .with_task(init_task("Empty Package"));
        let key = revision.key();

        let service = harness.service.clone();
        let cleanup_key = key.clone();
        ctx.cleanup.push("empty-package revision", move || async move {
            service
                .delete_package_revision(&cleanup_key, &OperationContext::background())
                .await?;
            Ok(())
        });

        harness.service.create_package_revision(revision, &harness.ctx).await?;
        let view = harness.service.get_package_revision(&key, &harness.ctx).await?;
        let kptfile = view.kptfile.ok_or_else(|| anyhow::anyhow!("no Kptfile"))?;

        assert_eq!(kptfile.name(), "empty-package");
        assert_eq!(
            kptfile.info,
            Some(PackageInfo {
                description: "Empty Package".to_string(),
                ..Default::default()
            })
        );
        assert_eq!(kptfile.upstream, None);
        assert_eq!(kptfile.upstream_lock, None);
        Ok(())
    }
    .boxed()
}

fn clone_from_discovered_revision(ctx: &mut CaseContext<Harness>) -> CaseFuture<'_> {
    async move {
        let harness = &ctx.fixture;
        harness
            .service
            .register_repository(Repository::git(
                "test-blueprints",
                GitRepository::new(TEST_BLUEPRINTS),
            ))
            .await?;
        let service = harness.service.clone();
        ctx.cleanup.push("test-blueprints repository", move || async move {
            service.unregister_repository("test-blueprints").await?;
            Ok(())
        });

        let listed = harness
            .service
            .list_package_revisions(&RevisionFilter::repository("test-blueprints"), &harness.ctx)
            .await?;
        let basens = listed
            .iter()
            .find(|s| s.name() == "test-blueprints:basens:v1")
            .ok_or_else(|| anyhow::anyhow!("basens not discovered: {:?}", listed))?;
        assert_eq!(basens.origin, RevisionOrigin::Discovered);

        let revision = PackageRevision::new("git", "istions", "v1").with_task(Task::cloned_from(
            UpstreamPackage::revision_ref("test-blueprints:basens:v1"),
        ));
        let created = harness.service.create_package_revision(revision, &harness.ctx).await?;
        let kptfile = created.kptfile()?;

        let lock = kptfile.upstream_lock.clone().ok_or_else(|| anyhow::anyhow!("no upstreamLock"))?;
        let git = lock.git.clone().ok_or_else(|| anyhow::anyhow!("no git lock"))?;
        assert_eq!(git.repo, TEST_BLUEPRINTS);
        assert_eq!(git.git_ref, "v1");
        assert_eq!(git.directory, "basens");
        assert!(!git.commit.is_empty());
        assert_eq!(Some(lock.clone()), basens.upstream_lock);
        assert_eq!(kptfile.upstream, Some(lock.to_upstream()));
        assert_eq!(kptfile.name(), "istions");
        assert!(created.resources.contains_key("namespace.yaml"));
        Ok(())
    }
    .boxed()
}

fn list_functions_from_registry(ctx: &mut CaseContext<Harness>) -> CaseFuture<'_> {
    async move {
        let harness = &ctx.fixture;
        harness
            .service
            .register_repository(Repository::oci_functions("kpt-functions", FUNCTION_REGISTRY))
            .await?;

        let functions = harness.service.list_functions(&harness.ctx).await?;
        assert!(!functions.is_empty());
        let set_namespace = functions
            .iter()
            .find(|f| f.name == "kpt-functions:set-namespace:v0.4.1")
            .ok_or_else(|| anyhow::anyhow!("set-namespace missing: {:?}", functions))?;
        assert_eq!(set_namespace.image, "gcr.io/kpt-fn/set-namespace:v0.4.1");
        assert_eq!(set_namespace.repository_name, "kpt-functions");
        Ok(())
    }
    .boxed()
}

fn lifecycle_suite() -> Suite<Harness> {
    Suite::new(SuiteConfig::new("package-lifecycle").with_setup(register_deployments))
        .register("clone_bucket_and_set_namespace", clone_bucket_and_set_namespace)
        .register("init_with_description_only", init_with_description_only)
        .register("clone_from_discovered_revision", clone_from_discovered_revision)
        .register("list_functions_from_registry", list_functions_from_registry)
}

#[tokio::test]
async fn package_lifecycle_suite() {
    let mut logger = TestLogger::new("package_lifecycle_suite").unwrap();
    let report = lifecycle_suite().run(Harness::new).await;
    logger.log_json("suite report", &report).unwrap();

    match report.clone().into_result() {
        Ok(()) => {
            logger.finish_success().unwrap();
        }
        Err(err) => {
            logger.finish_failure(&err.to_string()).unwrap();
            panic!("{}", err);
        }
    }
    assert_eq!(report.cases.len(), 4);
}

#[tokio::test]
async fn init_with_full_metadata() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "described", "v1").with_task(Task::init(
        PackageInitTaskSpec {
            description: "Described package".to_string(),
            keywords: vec!["test".to_string(), "sample".to_string()],
            site: "https://kpt.dev/".to_string(),
        },
    ));
    let created = harness.service.create_package_revision(revision, &harness.ctx).await.unwrap();
    let info = created.kptfile().unwrap().info.unwrap();
    assert_eq!(info.description, "Described package");
    assert_eq!(info.keywords, vec!["test", "sample"]);
    assert_eq!(info.site, "https://kpt.dev/");
}

#[tokio::test]
async fn deleting_twice_reports_not_found() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "doomed", "v1").with_task(init_task("Doomed"));
    let key = revision.key();
    harness.service.create_package_revision(revision, &harness.ctx).await.unwrap();

    harness.service.delete_package_revision(&key, &harness.ctx).await.unwrap();
    let err = harness.service.delete_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unregister_removes_revisions_from_listing() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "transient", "v1").with_task(init_task("Transient"));
    let key = revision.key();
    harness.service.create_package_revision(revision, &harness.ctx).await.unwrap();

    let listed = harness
        .service
        .list_package_revisions(&RevisionFilter::default(), &harness.ctx)
        .await
        .unwrap();
    assert!(listed.iter().any(|s| s.key == key && s.origin == RevisionOrigin::Created));

    harness.service.unregister_repository("git").await.unwrap();
    let listed = harness
        .service
        .list_package_revisions(&RevisionFilter::default(), &harness.ctx)
        .await
        .unwrap();
    assert!(listed.iter().all(|s| s.key.repository != "git"));

    // Re-registering does not resurrect the purged revision
    harness.register_deployments().await.unwrap();
    let err = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_pipeline_commits_nothing() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "broken", "v1")
        .with_task(init_task("Broken"))
        .with_task(Task::eval(
            "gcr.io/kpt-fn/set-namespace:v0.4.1",
            Vec::<(String, String)>::new(),
        ));
    let key = revision.key();

    let err = harness.service.create_package_revision(revision, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Function);
    assert_eq!(err.task_index(), Some(1));

    let err = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let listed = harness
        .service
        .list_package_revisions(&RevisionFilter::repository("git"), &harness.ctx)
        .await
        .unwrap();
    assert!(listed.iter().all(|s| s.key != key));
}

#[tokio::test]
async fn clone_from_unreachable_upstream_fails_resolution() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();
    harness.git.set_offline(BLUEPRINTS, true).await;

    let revision = PackageRevision::new("git", "offline", "v1").with_task(Task::cloned_from(
        UpstreamPackage::git(BLUEPRINTS, "bucket-blueprint-v0.4.3", "catalog/bucket"),
    ));
    let err = harness.service.create_package_revision(revision, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert_eq!(err.task_index(), Some(0));
}

#[tokio::test]
async fn cancelled_operation_reports_cancelled() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let ctx = OperationContext::background();
    ctx.cancel();
    let revision = PackageRevision::new("git", "cancelled", "v1").with_task(init_task("Cancelled"));
    let key = revision.key();

    let err = harness.service.create_package_revision(revision, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let err = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn concurrent_creates_of_one_key_commit_once() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let first = PackageRevision::new("git", "raced", "v1").with_task(init_task("First"));
    let second = PackageRevision::new("git", "raced", "v1").with_task(init_task("Second"));
    let (a, b) = tokio::join!(
        harness.service.create_package_revision(first, &harness.ctx),
        harness.service.create_package_revision(second, &harness.ctx),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser.kind(), ErrorKind::Conflict | ErrorKind::AlreadyExists));
}

#[tokio::test]
async fn failed_update_keeps_committed_state() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let original = PackageRevision::new("git", "stable", "v1").with_task(init_task("Stable"));
    let key = original.key();
    let created = harness
        .service
        .create_package_revision(original.clone(), &harness.ctx)
        .await
        .unwrap();

    let update = original
        .clone()
        .with_task(Task::eval("gcr.io/kpt-fn/no-such-function:v1", [("a", "b")]));
    let err = harness.service.update_package_revision(update, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Function);

    let current = harness.service.get_package_revision_resources(&key, &harness.ctx).await.unwrap();
    assert_eq!(current.resources, created.resources);
    assert_eq!(harness.service.get_package_revision_spec(&key).await.unwrap(), original);
}

#[tokio::test]
async fn update_replays_tasks_against_the_moved_upstream() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "tracking", "v1").with_task(Task::cloned_from(
        UpstreamPackage::git(BLUEPRINTS, "bucket-blueprint-v0.4.3", "catalog/bucket"),
    ));
    let before = harness
        .service
        .create_package_revision(revision.clone(), &harness.ctx)
        .await
        .unwrap();
    let before_lock = before.kptfile().unwrap().upstream_lock.unwrap();

    let commit = harness
        .git
        .publish(
            BLUEPRINTS,
            "bucket-blueprint-v0.4.3",
            [
                ("catalog/bucket/Kptfile", BUCKET_KPTFILE),
                ("catalog/bucket/bucket.yaml", BUCKET_YAML),
                ("catalog/bucket/policy.yaml", "kind: Policy\n"),
            ],
        )
        .await;

    let after = harness.service.update_package_revision(revision, &harness.ctx).await.unwrap();
    let after_lock = after.kptfile().unwrap().upstream_lock.unwrap();
    assert_ne!(before_lock, after_lock);
    assert_eq!(
        after_lock,
        UpstreamLock::git(GitLock {
            repo: BLUEPRINTS.to_string(),
            directory: "catalog/bucket".to_string(),
            git_ref: "bucket-blueprint-v0.4.3".to_string(),
            commit,
        })
    );
    assert!(after.resources.contains_key("policy.yaml"));
}

#[tokio::test]
async fn update_of_missing_revision_is_not_found() {
    let harness = Harness::new();
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "ghost", "v1").with_task(init_task("Ghost"));
    let err = harness.service.update_package_revision(revision, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn create_in_unregistered_repository_is_not_found() {
    let harness = Harness::new();
    let revision = PackageRevision::new("nowhere", "pkg", "v1").with_task(init_task("Nowhere"));
    let err = harness.service.create_package_revision(revision, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let key: PackageRevisionKey = "nowhere:pkg:v1".parse().unwrap();
    let err = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn create_over_published_revision_already_exists() {
    let harness = Harness::new();
    harness.register_test_blueprints().await.unwrap();

    let revision =
        PackageRevision::new("test-blueprints", "basens", "v1").with_task(init_task("Shadow"));
    let key = revision.key();
    let err = harness.service.create_package_revision(revision, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let view = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap();
    assert!(view.resources.resources.contains_key("namespace.yaml"));
    let listed = harness
        .service
        .list_package_revisions(&RevisionFilter::repository("test-blueprints"), &harness.ctx)
        .await
        .unwrap();
    let origins: Vec<_> = listed.iter().filter(|s| s.key == key).map(|s| s.origin).collect();
    assert_eq!(origins, vec![RevisionOrigin::Discovered]);

    let downstream = PackageRevision::new("git", "istions", "v1").with_task(Task::cloned_from(
        UpstreamPackage::revision_ref("test-blueprints:basens:v1"),
    ));
    harness.register_deployments().await.unwrap();
    let created = harness.service.create_package_revision(downstream, &harness.ctx).await.unwrap();
    let lock = created.kptfile().unwrap().upstream_lock.unwrap();
    assert_eq!(lock.git.unwrap().directory, "basens");
}

#[tokio::test]
async fn deleting_published_revision_is_rejected() {
    let harness = Harness::new();
    harness.register_test_blueprints().await.unwrap();

    let key: PackageRevisionKey = "test-blueprints:basens:v1".parse().unwrap();
    let err = harness.service.delete_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("read-only"));
    assert!(harness.service.get_package_revision(&key, &harness.ctx).await.is_ok());

    let unknown: PackageRevisionKey = "test-blueprints:basens:v9".parse().unwrap();
    let err = harness.service.delete_package_revision(&unknown, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    harness.git.set_offline(TEST_BLUEPRINTS, true).await;
    let err = harness.service.delete_package_revision(&unknown, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn task_timeout_fails_a_stalled_function() {
    let config = EngineConfig {
        task_timeout_secs: Some(1),
        ..Default::default()
    };
    let harness = Harness::with(config, Arc::new(StalledEvaluator));
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "stalled", "v1")
        .with_task(init_task("Stalled"))
        .with_task(Task::eval("gcr.io/kpt-fn/set-namespace:v0.4.1", [("namespace", "slow")]));
    let key = revision.key();

    let err = harness.service.create_package_revision(revision, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.task_index(), Some(1));
    assert!(err.to_string().contains("deadline exceeded"));

    let err = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn cancelling_after_the_clone_commits_nothing() {
    let harness = Harness::with(EngineConfig::default(), Arc::new(StalledEvaluator));
    harness.register_deployments().await.unwrap();

    let revision = PackageRevision::new("git", "interrupted", "v1")
        .with_task(Task::cloned_from(UpstreamPackage::git(
            BLUEPRINTS,
            "bucket-blueprint-v0.4.3",
            "catalog/bucket",
        )))
        .with_task(Task::eval("gcr.io/kpt-fn/set-namespace:v0.4.1", [("namespace", "late")]));
    let key = revision.key();

    let ctx = OperationContext::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = harness.service.create_package_revision(revision, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.task_index(), Some(1));

    let err = harness.service.get_package_revision(&key, &harness.ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let listed = harness
        .service
        .list_package_revisions(&RevisionFilter::repository("git"), &harness.ctx)
        .await
        .unwrap();
    assert!(listed.iter().all(|s| s.key != key));
}
