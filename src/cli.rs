use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::ROOT_URL;

#[derive(Debug, Parser)]
#[command(author, version, about = "Fetch EU ETS dataset releases from the EEA datahub")]
pub struct Cli {
    /// Datahub page listing the datasets.
    #[arg(long, global = true, default_value = ROOT_URL)]
    pub url: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List available datasets.
    Ls(LsArgs),
    /// Print the ID of the most recent dataset.
    Latest,
    /// Exit 0 and print the latest ID if it differs from --since; exit 1 otherwise.
    Check(CheckArgs),
    /// Print the URL of a dataset's zip archive.
    Url(SelectArgs),
    /// List the files inside a dataset's archive.
    Files(FilesArgs),
    /// Download a dataset's archive.
    Download(DownloadArgs),
    /// Extract files matching a glob pattern from a dataset's archive.
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
pub struct LsArgs {
    /// Drive a WebDriver browser session to collect all historical datasets.
    #[arg(short, long)]
    pub full: bool,

    /// Output JSON for scripting.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Dataset ID to compare against (prefix match).
    #[arg(short, long)]
    pub since: String,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Dataset ID (default: latest). Prefix match supported.
    #[arg(short, long)]
    pub id: Option<String>,
}

#[derive(Debug, Args)]
pub struct FilesArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Output JSON for scripting.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Destination path (local, or remote like gs://bucket/file.zip).
    #[arg(default_value = ".")]
    pub path: String,

    #[command(flatten)]
    pub select: SelectArgs,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Glob pattern matched against file names (e.g. '*.csv', 'Allowances*').
    pub pattern: String,

    /// Output directory (local, or remote like gs://bucket/data/).
    #[arg(default_value = ".")]
    pub output_dir: String,

    #[command(flatten)]
    pub select: SelectArgs,
}
