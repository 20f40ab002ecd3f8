use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use gdocs_backup::config::BackupConfig;
use gdocs_backup::prune::prune_directory;
use gdocs_backup::sync::local_fs::LocalFs;
use gdocs_backup::sync::retention::RetentionPolicy;
use gdocs_core::pointer::{read_pointer, require_file_id_from_url};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Versioned local backups of native cloud documents.
#[derive(Parser, Debug)]
#[command(name = "gdocs-backup", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a retention policy to captures already on disk
    Prune(PruneArgs),
    /// Print the remote id and kind behind a pointer file or document URL
    Pointer {
        /// Pointer file (.gdoc, .gsheet, .gslides) or document URL
        input: String,
    },
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Directory holding the captures
    dir: PathBuf,

    /// Only prune this base name (for example "Plan.gdoc")
    #[arg(long, requires = "ext")]
    base: Option<String>,

    /// Export extension of the lineage given by --base
    #[arg(long, requires = "base")]
    ext: Option<String>,

    /// Keep the N newest captures (wins over --staggered)
    #[arg(long)]
    keep_newest: Option<usize>,

    /// Keep N exponentially spaced captures
    #[arg(long)]
    staggered: Option<usize>,

    /// Report what would be deleted without deleting
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Prune(args) => prune(args).await,
        Command::Pointer { input } => pointer(&input),
    }
}

async fn prune(args: PruneArgs) -> anyhow::Result<()> {
    let config = BackupConfig::from_env()?;
    let policy = policy_from(&args, &config)?;
    if !policy.is_configured() {
        bail!("prune needs --keep-newest or --staggered (or GDOCS_KEEP_NEWEST / GDOCS_STAGGERED)");
    }
    let fs = LocalFs::new(args.dry_run || config.dry_run);
    let lineage = args.base.as_deref().zip(args.ext.as_deref());

    let results = prune_directory(&args.dir, lineage, policy, &fs)
        .await
        .with_context(|| format!("failed to prune {}", args.dir.display()))?;
    let removed: usize = results.iter().map(|r| r.plan.remove.len()).sum();
    info!(
        dir = %args.dir.display(),
        lineages = results.len(),
        removed,
        dry_run = fs.is_dry_run(),
        "prune finished"
    );
    for result in &results {
        println!(
            "{}.{}: kept {}, removed {}",
            result.base,
            result.ext,
            result.plan.keep.len(),
            result.plan.remove.len()
        );
    }
    Ok(())
}

/// Any retention count on the command line replaces both counts from the environment.
fn policy_from(args: &PruneArgs, config: &BackupConfig) -> anyhow::Result<RetentionPolicy> {
    if args.keep_newest.is_some() || args.staggered.is_some() {
        return Ok(RetentionPolicy::select(args.keep_newest, args.staggered)?);
    }
    config.retention_policy()
}

fn pointer(input: &str) -> anyhow::Result<()> {
    if input.starts_with("http://") || input.starts_with("https://") {
        let id = require_file_id_from_url(input)?;
        println!("{id}");
        return Ok(());
    }
    let pointer = read_pointer(input.as_ref())
        .with_context(|| format!("failed to read pointer file {input}"))?;
    match pointer.kind {
        Some(kind) => println!("{}\t{kind}", pointer.file_id),
        None => println!("{}", pointer.file_id),
    }
    Ok(())
}
