// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use clap::Subcommand;
use ph_logging::CliLoggingArgs;

pub use clap::Parser;

pub mod fixture;
pub mod functions;
pub mod render;

#[derive(clap::Parser)]
#[command(
    name = "ph",
    about = "Package Harbor CLI",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub logging: CliLoggingArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Render(render::RenderArgs),
    Functions(functions::FunctionsArgs),
}
