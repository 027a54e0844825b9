use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Clone, Debug, Parser)]
#[command(name = "repack", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "p", name = "process", about = "Unwrap, mark and rewrap nested archives")]
    Process(ProcessArg),
    #[command(alias = "v", name = "verify", about = "Check an archive's structure, checksums and names")]
    Verify(VerifyArg),
    #[command(alias = "ls", name = "list", about = "List the entries of an archive")]
    List(ListArg),
}

#[derive(Clone, Debug, Args)]
pub struct ProcessArg {
    /// A .zip file or a directory of them.
    pub input:     PathBuf,
    /// Output directory; overrides the config file.
    pub output:    Option<PathBuf>,
    /// TOML configuration file.
    #[arg(short, long)]
    pub config:    Option<PathBuf>,
    /// Parent directory for temporary work areas.
    #[arg(short, long)]
    pub work_root: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
pub struct VerifyArg {
    pub archive: PathBuf,
    /// Print the full report as JSON.
    #[arg(long)]
    pub json:    bool,
}

#[derive(Clone, Debug, Args)]
pub struct ListArg {
    pub archive: PathBuf,
}
