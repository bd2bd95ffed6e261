use crate::index::reader::{list_commits, StoreCommit};
use crate::index::SEGMENTS_DIR;
use anyhow::{Context, Result};
use std::path::Path;

/// Display statistics of the latest commit
pub fn show_stats(index_path: &Path) -> Result<()> {
    let commit = StoreCommit::latest(index_path)?
        .with_context(|| format!("No commits in {}", index_path.display()))?;
    let manifest = commit.manifest();

    println!("Store Statistics");
    println!("================");
    println!();
    println!("Index location:   {}", index_path.display());
    println!("Commit:           {}", manifest.generation);
    println!("Commit count:     {}", list_commits(index_path)?.len());
    println!("Segment count:    {}", manifest.segments.len());
    println!("Document slots:   {}", manifest.max_doc());
    println!("Live documents:   {}", manifest.live_count());

    let deleted = manifest.max_doc() - manifest.live_count();
    if manifest.max_doc() > 0 {
        println!(
            "Deleted:          {} ({:.1}%)",
            deleted,
            deleted as f64 * 100.0 / manifest.max_doc() as f64
        );
    }

    println!();
    println!("Segments:");
    for segment in manifest.segments.iter().take(15) {
        println!(
            "  {:10} {:>8} docs {:>8} deleted  {}",
            segment.name,
            segment.max_doc,
            segment.del_count,
            segment.live_docs_file.as_deref().unwrap_or("-")
        );
    }
    if manifest.segments.len() > 15 {
        println!("  ... and {} more", manifest.segments.len() - 15);
    }

    if let Ok(size) = dir_size(&index_path.join(SEGMENTS_DIR)) {
        println!();
        println!("Segment data:     {}", format_size(size));
    }

    println!();
    println!("Created:          {}", format_timestamp(manifest.created_at));

    Ok(())
}

/// List every commit of a store directory
pub fn show_commits(index_path: &Path) -> Result<()> {
    let generations = list_commits(index_path)?;

    if generations.is_empty() {
        println!("No commits found.");
        return Ok(());
    }

    println!("Commits");
    println!("=======");
    println!();

    for generation in generations {
        let commit = StoreCommit::open(index_path, generation)
            .with_context(|| format!("Failed to read commit {}", generation))?;
        let manifest = commit.manifest();
        let parent = manifest
            .parent
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {:>6}  parent {:>6}  {:>4} segments  {:>8} live",
            generation,
            parent,
            manifest.segments.len(),
            manifest.live_count()
        );
        for (key, value) in &manifest.metadata {
            println!("          {} = {}", key, value);
        }
    }

    Ok(())
}

/// Calculate directory size recursively
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format unix timestamp
fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}
