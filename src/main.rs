// file: src/main.rs
// version: 2.0.0
// guid: b8c9d0e1-f2a3-4456-8789-234567bcdef0

//! Node registrar - main entry point

use anyhow::Context;
use clap::Parser;
use node_registrar::{
    cli::{commands::*, Cli, Commands},
    logging::logger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger()?;
    } else {
        logger::init_logger(cli.verbose, cli.quiet)?;
    }

    match cli.command {
        Commands::Serve {
            config,
            install_id,
            listen,
            etcd_endpoints,
        } => serve_command(
            config,
            ServeOverrides {
                install_id,
                listen,
                etcd_endpoints,
            },
        )
        .await
        .context("registrar service failed")?,
        Commands::Fingerprint { report, raw } => fingerprint_command(&report, raw)
            .with_context(|| format!("cannot fingerprint {}", report.display()))?,
        Commands::Disks { report } => disks_command(&report)
            .with_context(|| format!("cannot list disks of {}", report.display()))?,
        Commands::Tree { report } => tree_command(&report)
            .with_context(|| format!("cannot describe {}", report.display()))?,
    }

    Ok(())
}
