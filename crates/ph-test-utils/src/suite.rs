// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end suite harness
//!
//! Cases are registered by name in an explicit table and run against a fresh
//! fixture each. A suite may declare a setup callback that runs before every
//! case. Cases register release actions on a [`CleanupStack`]; the stack is
//! drained in reverse registration order after the case, whether it passed,
//! failed or panicked.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;

/// Future returned by a case or setup callback
pub type CaseFuture<'a> = BoxFuture<'a, anyhow::Result<()>>;

/// A registered case
pub type CaseFn<C> = for<'a> fn(&'a mut CaseContext<C>) -> CaseFuture<'a>;

/// Setup callback, run on the fixture before each case
pub type SetupFn<C> = for<'a> fn(&'a mut C) -> CaseFuture<'a>;

type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Release actions, executed last-registered-first
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<(String, CleanupAction)>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release action under `label`
    pub fn push<F, Fut>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.actions.push((label.into(), Box::new(move || action().boxed())));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in reverse order; failures are collected, not fatal
    pub async fn run_all(&mut self) -> Vec<String> {
        let mut failures = Vec::new();
        while let Some((label, action)) = self.actions.pop() {
            let outcome = AssertUnwindSafe(action()).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => tracing::debug!(cleanup = %label, "released"),
                Ok(Err(err)) => failures.push(format!("{}: {:#}", label, err)),
                Err(_) => failures.push(format!("{}: panicked", label)),
            }
        }
        failures
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            eprintln!(
                "CleanupStack dropped with {} pending release action(s)",
                self.actions.len()
            );
        }
    }
}

/// What a running case gets: its fixture and its cleanup stack
pub struct CaseContext<C> {
    pub fixture: C,
    pub cleanup: CleanupStack,
}

pub struct SuiteConfig<C> {
    pub name: String,
    pub setup: Option<SetupFn<C>>,
    /// Run only cases whose name contains this string
    pub filter: Option<String>,
}

impl<C> SuiteConfig<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            filter: None,
        }
    }

    pub fn with_setup(mut self, setup: SetupFn<C>) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub error: Option<String>,
    pub cleanup_failures: Vec<String>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.cleanup_failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.passed())
    }

    pub fn into_result(self) -> anyhow::Result<()> {
        if self.failures().next().is_none() {
            return Ok(());
        }
        anyhow::bail!("{}", self)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        writeln!(f, "suite {}: {} case(s), {} failed", self.suite, self.cases.len(), failed)?;
        for case in self.failures() {
            if let Some(error) = &case.error {
                writeln!(f, "  {}: {}", case.name, error)?;
            }
            for cleanup in &case.cleanup_failures {
                writeln!(f, "  {} (cleanup): {}", case.name, cleanup)?;
            }
        }
        Ok(())
    }
}

/// Registration table of named cases sharing a fixture type
pub struct Suite<C> {
    config: SuiteConfig<C>,
    cases: Vec<(&'static str, CaseFn<C>)>,
}

impl<C: Send> Suite<C> {
    pub fn new(config: SuiteConfig<C>) -> Self {
        Self {
            config,
            cases: Vec::new(),
        }
    }

    pub fn register(mut self, name: &'static str, case: CaseFn<C>) -> Self {
        self.cases.push((name, case));
        self
    }

    /// Registered names that pass the configured filter, in registration order
    pub fn case_names(&self) -> Vec<&'static str> {
        self.cases
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| self.selected(name))
            .collect()
    }

    fn selected(&self, name: &str) -> bool {
        self.config.filter.as_deref().map_or(true, |f| name.contains(f))
    }

    /// Run every selected case, each against a fixture from `make_fixture`
    pub async fn run<F>(&self, mut make_fixture: F) -> SuiteReport
    where
        F: FnMut() -> C,
    {
        let mut report = SuiteReport {
            suite: self.config.name.clone(),
            cases: Vec::new(),
        };
        for (name, case) in self.cases.iter().filter(|(name, _)| self.selected(name)) {
            report.cases.push(self.run_one(name, *case, make_fixture()).await);
        }
        report
    }

    /// Run one registered case by name
    pub async fn run_case(&self, name: &str, fixture: C) -> Option<CaseReport> {
        let (name, case) = self.cases.iter().find(|(n, _)| *n == name)?;
        Some(self.run_one(name, *case, fixture).await)
    }

    async fn run_one(&self, name: &str, case: CaseFn<C>, fixture: C) -> CaseReport {
        let mut ctx = CaseContext {
            fixture,
            cleanup: CleanupStack::new(),
        };
        tracing::info!(suite = %self.config.name, case = %name, "running case");

        let setup = self.config.setup;
        let outcome = AssertUnwindSafe(async {
            if let Some(setup) = setup {
                setup(&mut ctx.fixture).await?;
            }
            case(&mut ctx).await
        })
        .catch_unwind()
        .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{:#}", err)),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        let cleanup_failures = ctx.cleanup.run_all().await;

        CaseReport {
            name: name.to_string(),
            error,
            cleanup_failures,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
