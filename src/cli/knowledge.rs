//! CLI `knowledge` commands: list, search, export, import, delete, reset.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use vitalchat::config::VitalConfig;

/// Print every entry's id, category, and title.
pub fn list(config: &VitalConfig) -> Result<()> {
    let engine = super::open_engine(config)?;
    let knowledge = engine.knowledge();

    if knowledge.entries().is_empty() {
        println!("Knowledge base is empty.");
        return Ok(());
    }

    for entry in knowledge.entries() {
        let category = if entry.category.is_empty() {
            "-"
        } else {
            entry.category.as_str()
        };
        println!("  {:<20} {:<14} {}", entry.id, category, entry.title);
    }
    println!("\n{} entries", knowledge.entries().len());
    Ok(())
}

/// Show which entries a question would pull into the prompt.
pub fn search(config: &VitalConfig, query: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    let results = engine
        .knowledge()
        .retrieve(query, config.retrieval.max_results);

    if results.is_empty() {
        println!("No matching entries.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let preview: String = result.entry.content.chars().take(120).collect();
        let ellipsis = if result.entry.content.chars().count() > 120 { "..." } else { "" };
        println!(
            "  {}. [{}] {} (score: {})",
            i + 1,
            result.entry.id,
            result.entry.title,
            result.score
        );
        println!("     {}{ellipsis}", preview.replace('\n', " "));
    }
    Ok(())
}

/// Write the knowledge base as JSON to stdout.
pub fn export(config: &VitalConfig) -> Result<()> {
    let engine = super::open_engine(config)?;
    let knowledge = engine.knowledge();
    let json = knowledge.export_json()?;
    println!("{json}");
    eprintln!("Exported {} entries.", knowledge.entries().len());
    Ok(())
}

/// Replace the knowledge base with the entries in `file`.
pub fn import(config: &VitalConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;

    let engine = super::open_engine(config)?;
    let count = engine.knowledge().import_json(&json)?;
    println!("Imported {count} entries (previous entries replaced).");
    Ok(())
}

pub fn delete(config: &VitalConfig, id: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    engine.knowledge().delete(id)?;
    println!("Deleted entry {id}");
    Ok(())
}

/// Restore the built-in entries after user confirmation.
pub fn reset(config: &VitalConfig) -> Result<()> {
    println!("WARNING: This will replace ALL knowledge entries with the built-in defaults.");
    println!("Database: {}", config.resolved_db_path().display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let engine = super::open_engine(config)?;
    let mut knowledge = engine.knowledge();
    knowledge.reset_to_defaults();
    println!("Knowledge base reset ({} entries).", knowledge.entries().len());
    Ok(())
}
