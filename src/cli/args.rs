// file: src/cli/args.rs
// version: 2.0.0
// guid: f6a7b8c9-d0e1-4234-8567-012345fabcde

//! Command line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "registrar")]
#[command(about = "Hardware fingerprinting and node registration for private clusters")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit JSON log lines, filtered by RUST_LOG
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the registration service
    Serve {
        #[arg(short, long, env = "REGISTRAR_CONFIG", help = "YAML configuration file")]
        config: Option<PathBuf>,

        #[arg(long, env = "REGISTRAR_INSTALL_ID")]
        install_id: Option<String>,

        #[arg(short, long, help = "Address to listen on, e.g. 0.0.0.0:2680")]
        listen: Option<String>,

        #[arg(long = "etcd-endpoint", help = "etcd endpoint; repeat for several")]
        etcd_endpoints: Vec<String>,
    },

    /// Print the node id of a hardware report
    Fingerprint {
        report: PathBuf,

        #[arg(long, help = "Also print the raw fingerprint in hex")]
        raw: bool,
    },

    /// List disk identifiers of a hardware report as CSV
    Disks { report: PathBuf },

    /// Print the weighted device tree of a hardware report
    Tree { report: PathBuf },
}
