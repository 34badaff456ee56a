// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `ph render`: build every revision in a fixture and emit its resources

use anyhow::Context;
use clap::Args;
use ph_core::{EngineConfig, OperationContext};
use ph_domain_types::PackageRevisionResources;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use tracing::info;

use crate::fixture::Fixture;

#[derive(Args, Debug, Clone)]
#[command(about = "Render the package revisions declared in a fixture")]
pub struct RenderArgs {
    /// YAML fixture with repositories, upstream content and revisions
    #[arg(long)]
    pub fixture: PathBuf,

    /// Engine configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write `<repository>/<package>/<revision>/<file>` trees here instead of printing
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RenderArgs {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        let fixture = Fixture::load(&self.fixture)?;
        let rendered = render(&fixture, config, &OperationContext::background()).await?;

        match &self.output {
            Some(dir) => {
                for revision in &rendered {
                    write_revision(dir, revision)?;
                }
                info!(
                    revisions = rendered.len(),
                    output = %dir.display(),
                    "wrote rendered packages"
                );
            }
            None => print!("{}", to_stream(&rendered)),
        }
        Ok(())
    }
}

/// Create the fixture's revisions in order; a failure stops the run
pub async fn render(
    fixture: &Fixture,
    config: EngineConfig,
    ctx: &OperationContext,
) -> anyhow::Result<Vec<PackageRevisionResources>> {
    let service = fixture.service(config).await?;
    let mut rendered = Vec::with_capacity(fixture.revisions.len());
    for revision in &fixture.revisions {
        let key = revision.key();
        let resources = service
            .create_package_revision(revision.clone(), ctx)
            .await
            .with_context(|| format!("rendering {}", key))?;
        info!(revision = %key, files = resources.resources.len(), "rendered");
        rendered.push(resources);
    }
    Ok(rendered)
}

/// Multi-document stream, one document per file, headed by its origin
pub fn to_stream(rendered: &[PackageRevisionResources]) -> String {
    let mut out = String::new();
    for revision in rendered {
        for (path, contents) in &revision.resources {
            let _ = writeln!(out, "--- # {}/{}", revision.name, path);
            out.push_str(contents);
            if !contents.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

pub fn write_revision(root: &Path, revision: &PackageRevisionResources) -> anyhow::Result<()> {
    let base = root
        .join(&revision.repository_name)
        .join(&revision.package_name)
        .join(&revision.revision);
    for (path, contents) in &revision.resources {
        let relative = Path::new(path);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            anyhow::bail!("refusing to write {} outside the package directory", path);
        }
        let target = base.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&target, contents).with_context(|| format!("writing {}", target.display()))?;
    }
    Ok(())
}
