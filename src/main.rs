use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use revidx::config::StoreConfig;
use revidx::diff::{DiffCalculator, IndexDiff, ThreeWayIndexDiff};
use revidx::engine::IndexStore;
use revidx::index::stats;
use revidx::index::types::CommitGeneration;
use revidx::index::StoreCommit;
use revidx::translog::{self, LogRecord};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "revidx")]
#[command(about = "Commit diffs and write-ahead log recovery for segmented document stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify documents changed between two commits
    Diff {
        /// Store root
        store: PathBuf,
        /// Source commit generation
        source: CommitGeneration,
        /// Target commit generation
        target: CommitGeneration,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Merge the diffs of two commits against a common ancestor
    ThreeWay {
        /// Store root
        store: PathBuf,
        ancestor: CommitGeneration,
        source: CommitGeneration,
        target: CommitGeneration,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List commits with their segments and metadata
    Commits {
        /// Store root
        store: PathBuf,
    },
    /// Dump translog generations and records
    Translog {
        /// Store root
        store: PathBuf,
    },
    /// Open a store and replay its translog
    Recover {
        /// Store root
        store: PathBuf,
        /// Store id the translog is bound to
        #[arg(long, default_value = "default")]
        id: String,
    },
    /// Show statistics of the latest commit
    Stats {
        /// Store root
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Diff {
            store,
            source,
            target,
            json,
        } => {
            let calculator = calculator(&store)?;
            let source = open_commit(&store, source)?;
            let target = open_commit(&store, target)?;
            let diff = calculator.calculate_diff(&source, &target)?;
            print_diff(&diff, json)?;
        }
        Commands::ThreeWay {
            store,
            ancestor,
            source,
            target,
            json,
        } => {
            let config = StoreConfig::load(&store)?;
            let calculator = DiffCalculator::from_config(&config.diff);
            let ancestor = open_commit(&store, ancestor)?;
            let source = open_commit(&store, source)?;
            let target = open_commit(&store, target)?;
            let diff = ThreeWayIndexDiff::calculate_with(
                &calculator,
                &ancestor,
                &source,
                &target,
                config.diff.merge_policy,
            )?;
            if !json {
                println!(
                    "source: {} ids, target: {} ids",
                    diff.source_diff().len(),
                    diff.target_diff().len()
                );
            }
            print_diff(diff.merged(), json)?;
        }
        Commands::Commits { store } => {
            stats::show_commits(&IndexStore::index_dir(&store))?;
        }
        Commands::Translog { store } => {
            show_translog(&store)?;
        }
        Commands::Recover { store, id } => {
            let mut opened = IndexStore::open(&id, &store)
                .with_context(|| format!("Failed to open store {}", store.display()))?;
            let recovered = opened.recover()?;
            println!(
                "Replayed {} records ({} operations) from {} generations{}",
                recovered.records,
                recovered.operations,
                recovered.generations,
                if recovered.committed { ", committed" } else { "" }
            );
            opened.close()?;
        }
        Commands::Stats { store } => {
            stats::show_stats(&IndexStore::index_dir(&store))?;
        }
    }

    Ok(())
}

fn calculator(store: &Path) -> Result<DiffCalculator> {
    let config = StoreConfig::load(store)?;
    Ok(DiffCalculator::from_config(&config.diff))
}

fn open_commit(store: &Path, generation: CommitGeneration) -> Result<StoreCommit> {
    StoreCommit::open(&IndexStore::index_dir(store), generation)
        .with_context(|| format!("Failed to open commit {} of {}", generation, store.display()))
}

fn print_diff(diff: &IndexDiff, json: bool) -> Result<()> {
    if json {
        let changes: Vec<_> = diff
            .iter_changes()
            .map(|(id, kind)| serde_json::json!({ "id": id, "change": kind }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    let join = |ids: &roaring::RoaringTreemap| {
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
    };
    println!("new:      {}", join(diff.new_ids()));
    println!("changed:  {}", join(diff.changed_ids()));
    println!("detached: {}", join(diff.detached_ids()));
    Ok(())
}

fn show_translog(store: &Path) -> Result<()> {
    let config = StoreConfig::load(store)?;
    let log_path = IndexStore::translog_dir(store);
    let (state, generations) = translog::inspect(&log_path, config.translog.max_record_bytes)
        .with_context(|| format!("Failed to read translog in {}", log_path.display()))?;

    println!("Translog");
    println!("========");
    println!();
    println!("Store:            {}", state.store_id);
    println!("UUID:             {}", state.uuid);
    println!("Generation:       {}", state.generation);
    println!("Oldest kept:      {}", state.min_generation);

    for dump in generations {
        println!();
        println!("Generation {} ({} records)", dump.generation, dump.records.len());
        for record in &dump.records {
            match record {
                LogRecord::Put(put) => println!("  put     {} ({})", put.key, put.payload.doc_type),
                LogRecord::Delete { key } => println!("  delete  {}", key),
                LogRecord::BulkPut { puts } => println!("  bulk    {} documents", puts.len()),
            }
        }
    }

    Ok(())
}
