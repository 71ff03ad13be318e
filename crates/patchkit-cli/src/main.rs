mod config;
mod list;
mod locator;
mod postinstall;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use config::PatchKitConfig;
use locator::NodeModulesLocator;
use patchkit_core::blob_store::BlobStore;
use patchkit_core::gc;
use patchkit_core::manifest::Manifest;
use patchkit_core::orchestrator::{Operation, Orchestrator, OutcomeReport, RunSummary};
use patchkit_core::provider::{BlobProvider, NullProvider};
use patchkit_core::repair::{self, RepairOptions};
use patchkit_provider::HttpProvider;
use std::path::PathBuf;
use tracing::error;

#[derive(Parser, Debug)]
#[command(author, version, about = "Apply and manage curated security patches for installed dependencies", long_about = None)]
struct Cli {
    /// Path to the patch manifest (defaults to .socket/manifest.json)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,
    /// Path to the content-addressed blob cache (defaults to <manifest-dir>/blobs)
    #[arg(long, global = true)]
    blob_store: Option<PathBuf>,
    /// Path to the node_modules tree to search for package instances
    #[arg(long, global = true)]
    node_modules: Option<PathBuf>,
    /// Base URL of a remote blob provider; omitted means offline (NullProvider)
    #[arg(long, global = true)]
    provider_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply patches to every located instance of the given packages (or all)
    Apply {
        packages: Vec<String>,
        /// Process distinct package directories concurrently
        #[arg(long)]
        parallel: bool,
    },
    /// Roll patches back on every located instance of the given packages (or all)
    Rollback {
        packages: Vec<String>,
        #[arg(long)]
        parallel: bool,
    },
    /// Remove blobs no longer referenced by the manifest
    Gc {
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch missing referenced blobs, then garbage-collect
    Repair {
        /// Skip fetching; only report what is missing
        #[arg(long)]
        offline: bool,
        /// Also ensure beforeHash blobs are present, not just afterHash
        #[arg(long)]
        include_before_hashes: bool,
        /// Skip the garbage-collection phase
        #[arg(long)]
        download_only: bool,
        /// Report GC candidates without deleting them
        #[arg(long)]
        dry_run_gc: bool,
    },
    /// Administratively drop a package's patch record from the manifest
    Remove { package_key: String },
    /// List patch records, optionally filtered by a substring query
    List { query: Option<String> },
    /// Register patchkit's postinstall hook in a package.json
    PostinstallInstall {
        #[arg(long, default_value = "package.json")]
        package_json: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = PatchKitConfig::resolve(
        cli.manifest,
        cli.blob_store,
        cli.node_modules,
        cli.provider_url,
    )?;

    match cli.command {
        Commands::Apply { packages, parallel } => {
            run_orchestrated(&config, Operation::Apply, &packages, parallel).await
        }
        Commands::Rollback { packages, parallel } => {
            run_orchestrated(&config, Operation::Rollback, &packages, parallel).await
        }
        Commands::Gc { dry_run } => run_gc(&config, dry_run),
        Commands::Repair {
            offline,
            include_before_hashes,
            download_only,
            dry_run_gc,
        } => {
            run_repair(
                &config,
                RepairOptions {
                    include_before_hashes,
                    offline,
                    download_only,
                    dry_run_gc,
                },
            )
            .await
        }
        Commands::Remove { package_key } => run_remove(&config, &package_key),
        Commands::List { query } => run_list(&config, query.as_deref()),
        Commands::PostinstallInstall { package_json } => {
            let changed = postinstall::install_postinstall_hook(&package_json)?;
            if changed {
                println!("registered postinstall hook in {}", package_json.display());
            } else {
                println!("postinstall hook already present in {}", package_json.display());
            }
            Ok(())
        }
    }
}

fn build_provider(config: &PatchKitConfig) -> Box<dyn BlobProvider> {
    match &config.provider_base_url {
        Some(url) => Box::new(HttpProvider::new(url.clone())),
        None => Box::new(NullProvider),
    }
}

async fn run_orchestrated(
    config: &PatchKitConfig,
    operation: Operation,
    packages: &[String],
    parallel: bool,
) -> Result<()> {
    let manifest = Manifest::load(&config.manifest_path)?;
    let store = BlobStore::open(&config.blob_store_root)?;
    let provider = build_provider(config);
    let locator = NodeModulesLocator::new(&config.node_modules_root);
    let orchestrator = Orchestrator::new(&manifest, &store, provider.as_ref(), &locator);

    let summary = if parallel {
        orchestrator.run_parallel(operation, packages).await
    } else {
        orchestrator.run(operation, packages).await
    };

    report_summary(&summary);
    if summary.is_success() {
        Ok(())
    } else {
        Err(anyhow!("one or more packages failed"))
    }
}

fn report_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(OutcomeReport::Applied(report)) => println!(
                "{} @ {}: applied {}, skipped {}",
                outcome.package_key,
                outcome.instance.display(),
                report.applied.len(),
                report.skipped.len()
            ),
            Ok(OutcomeReport::RolledBack(report)) => println!(
                "{} @ {}: restored {}, skipped {}",
                outcome.package_key,
                outcome.instance.display(),
                report.restored.len(),
                report.skipped.len()
            ),
            Err(e) => error!(
                package = %outcome.package_key,
                instance = %outcome.instance.display(),
                error = %e,
                "operation failed"
            ),
        }
    }
}

fn run_gc(config: &PatchKitConfig, dry_run: bool) -> Result<()> {
    let manifest = Manifest::load(&config.manifest_path)?;
    let store = BlobStore::open(&config.blob_store_root)?;
    let report = gc::collect(&manifest, &store, dry_run)?;
    println!(
        "checked {}, removed {}, freed {} bytes{}",
        report.checked,
        report.removed,
        report.bytes_freed,
        if dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}

async fn run_repair(config: &PatchKitConfig, options: RepairOptions) -> Result<()> {
    let manifest = Manifest::load(&config.manifest_path)?;
    let store = BlobStore::open(&config.blob_store_root)?;
    let provider = build_provider(config);
    let report = repair::repair(&manifest, &store, provider.as_ref(), &options).await?;

    for attempt in &report.fetched {
        println!(
            "{} {}",
            attempt.digest,
            if attempt.ok { "fetched" } else { "missing" }
        );
    }
    if let Some(gc_report) = &report.gc {
        println!(
            "gc: checked {}, removed {}, freed {} bytes",
            gc_report.checked, gc_report.removed, gc_report.bytes_freed
        );
    }
    Ok(())
}

fn run_remove(config: &PatchKitConfig, package_key: &str) -> Result<()> {
    let mut manifest = Manifest::load(&config.manifest_path)?;
    if manifest.remove(package_key)? {
        println!("removed {package_key} from manifest");
        Ok(())
    } else {
        Err(anyhow!("{package_key} not found in manifest"))
    }
}

fn run_list(config: &PatchKitConfig, query: Option<&str>) -> Result<()> {
    let manifest = Manifest::load(&config.manifest_path)?;
    let summaries = list::list_patches(&manifest, query);
    if summaries.is_empty() {
        println!("no matching patches");
    }
    for summary in summaries {
        println!(
            "{}  [{} file(s), tier={}] {}",
            summary.package_key, summary.file_count, summary.tier, summary.description
        );
    }
    Ok(())
}
