// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `ph functions`: list the functions published by a fixture's registries

use clap::Args;
use ph_core::{EngineConfig, OperationContext};
use ph_domain_types::Function;
use std::path::PathBuf;

use crate::fixture::Fixture;

#[derive(Args, Debug, Clone)]
#[command(about = "List functions published by the fixture's function repositories")]
pub struct FunctionsArgs {
    /// YAML fixture with repositories and registry catalogs
    #[arg(long)]
    pub fixture: PathBuf,
}

impl FunctionsArgs {
    pub async fn run(self) -> anyhow::Result<()> {
        let fixture = Fixture::load(&self.fixture)?;
        let functions = list_functions(&fixture).await?;
        print!("{}", to_table(&functions));
        Ok(())
    }
}

pub async fn list_functions(fixture: &Fixture) -> anyhow::Result<Vec<Function>> {
    let service = fixture.service(EngineConfig::default()).await?;
    Ok(service.list_functions(&OperationContext::background()).await?)
}

pub fn to_table(functions: &[Function]) -> String {
    let width = functions.iter().map(|f| f.name.len()).max().unwrap_or(0).max("NAME".len());
    let mut out = format!("{:<width$}  IMAGE\n", "NAME", width = width);
    for function in functions {
        out.push_str(&format!("{:<width$}  {}\n", function.name, function.image, width = width));
    }
    out
}
