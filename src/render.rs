use crate::ingest::BuildOutcome;
use crate::model::{Contributor, FileDetail, Metadata, TimelineBucket, TreeOutput};
use anyhow::Result;
use console::style;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Table,
    Json,
    Ndjson,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_ndjson<'a, T: Serialize + 'a>(items: impl IntoIterator<Item = &'a T>) -> Result<()> {
    for item in items {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}

pub fn build(outcome: &BuildOutcome, format: Format) -> Result<()> {
    if format != Format::Table {
        return print_json(outcome);
    }
    match outcome {
        BuildOutcome::Reused { store_path } => {
            println!("Using cached store: {}", style(store_path.display()).dim());
            println!("Pass --rebuild to regenerate it from history.");
        }
        BuildOutcome::Built(report) => {
            println!("{}", style("Store built").bold());
            println!("{}", "─".repeat(50));
            println!("Store: {}", style(report.store_path.display()).dim());
            println!("Commits: {}", style(report.ingest.commits).cyan());
            println!("Contributors: {}", style(report.ingest.contributors).cyan());
            println!("Files/Directories: {}", style(report.total_files).cyan());
            match report.removed_paths {
                Some(n) => println!("Removed (not in working tree): {}", style(n).yellow()),
                None => println!("{}", style("Working-tree reconciliation skipped").yellow()),
            }
            if report.malformed_headers > 0 {
                println!("Malformed headers skipped: {}", style(report.malformed_headers).red());
            }
        }
    }
    Ok(())
}

pub fn tree(tree: &TreeOutput, format: Format) -> Result<()> {
    match format {
        Format::Json => return print_json(tree),
        Format::Ndjson => return print_ndjson(&tree.files),
        Format::Table => {}
    }

    if let (Some(min), Some(max)) = (tree.date_range.min_date, tree.date_range.max_date) {
        println!("History spans {} to {}", style(min).dim(), style(max).dim());
    }
    let mut measured: Vec<_> = tree.files.iter().filter_map(|f| f.metrics.as_ref().map(|m| (f, m))).collect();
    if measured.is_empty() {
        println!("{} nodes; pass --start/--end for windowed metrics", tree.files.len());
        return Ok(());
    }
    measured.sort_by(|a, b| b.1.value.cmp(&a.1.value).then_with(|| a.0.node.path.cmp(&b.0.node.path)));

    println!(
        "{:<8} {:<50} {:>8} {:>8} {:>8} {:>8}",
        style("Id").bold(),
        style("Path").bold(),
        style("Value").bold(),
        style("Commits").bold(),
        style("Added").bold(),
        style("Deleted").bold()
    );
    println!("{}", "─".repeat(96));
    for (file, m) in measured.iter().take(50) {
        println!(
            "{:<8} {:<50} {:>8} {:>8} {:>8} {:>8}",
            file.node.id, file.node.path, m.value, m.commit_count, m.lines_added, m.lines_deleted
        );
    }
    if measured.len() > 50 {
        println!("\n... and {} more entries", measured.len() - 50);
    }
    Ok(())
}

pub fn timeline(buckets: &[TimelineBucket], format: Format) -> Result<()> {
    match format {
        Format::Json => return print_json(buckets),
        Format::Ndjson => return print_ndjson(buckets),
        Format::Table => {}
    }
    if buckets.is_empty() {
        println!("No data to display");
        return Ok(());
    }

    let max_commits = buckets.iter().map(|b| b.count).max().unwrap_or(1).max(1);
    println!("{}", style("Commit Timeline").bold());
    println!("{}", "─".repeat(50));
    for bucket in buckets {
        let intensity = ((bucket.count as f64 / max_commits as f64) * 5.0) as u32;
        let bar = match intensity {
            0 => " ",
            1 => "▁",
            2 => "▃",
            3 => "▅",
            4 => "▇",
            _ => "█",
        };
        println!("{} {} commits: {:>4}", bucket.date, style(bar).green(), bucket.count);
    }
    Ok(())
}

pub fn contributors(contributors: &[Contributor], format: Format) -> Result<()> {
    match format {
        Format::Json => return print_json(contributors),
        Format::Ndjson => return print_ndjson(contributors),
        Format::Table => {}
    }
    println!("{:<8} {:<30} {}", style("Id").bold(), style("Name").bold(), style("Email").bold());
    println!("{}", "─".repeat(70));
    for c in contributors {
        println!("{:<8} {:<30} {}", c.id, c.name, c.email);
    }
    Ok(())
}

pub fn file_detail(detail: &FileDetail, format: Format) -> Result<()> {
    if format != Format::Table {
        return print_json(detail);
    }
    let kind = if detail.node.is_directory { "directory" } else { "file" };
    println!("{} ({})", style(&detail.node.path).bold(), kind);
    if let Some(parent) = detail.node.parent_id {
        println!("Parent: {parent}");
    }
    println!("\n{}", style("Top contributors").bold());
    for c in &detail.top_contributors {
        println!("  {:>6}  {} <{}>", style(c.commits).cyan(), c.name, c.email);
    }
    Ok(())
}

pub fn metadata(metadata: &Metadata, format: Format) -> Result<()> {
    if format != Format::Table {
        return print_json(metadata);
    }
    for (key, value) in metadata {
        println!("{:<20} {}", style(key).bold(), value);
    }
    Ok(())
}
