// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use ph_cli::{Cli, Commands, Parser};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.clone().init("ph-cli")?;

    match cli.command {
        Commands::Render(args) => args.run().await,
        Commands::Functions(args) => args.run().await,
    }
}
