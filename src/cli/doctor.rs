//! CLI `doctor` command: check storage health and backend reachability.

use std::sync::Arc;

use anyhow::{Context, Result};
use vitalchat::config::VitalConfig;
use vitalchat::model::{ModelOrchestrator, OllamaBackend};
use vitalchat::storage::{SqliteStorage, KNOWLEDGE_KEY, SESSIONS_KEY};

/// Run storage diagnostics, check the inference service, and print a report.
pub async fn doctor(config: &VitalConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("VitalChat Health Report");
    println!("=======================");
    println!();

    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("                   (created on first `vitalchat chat` or `vitalchat serve`)");
    } else {
        let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
        let storage = SqliteStorage::open(&db_path)
            .context("failed to open database (may be corrupt)")?;
        let report = storage.health().context("failed to run health check")?;

        println!("Database:          {}", db_path.display());
        println!("File size:         {}", format_bytes(file_size));
        println!(
            "Schema version:    {}",
            report
                .schema_version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "(not set)".to_string())
        );
        println!();
        println!("Stored keys:");
        for key in [SESSIONS_KEY, KNOWLEDGE_KEY] {
            match report.keys.iter().find(|usage| usage.key == key) {
                Some(usage) => println!(
                    "  {:<22} {} (updated {})",
                    usage.key,
                    format_bytes(usage.bytes),
                    usage.updated_at
                ),
                None => println!("  {key:<22} (not written yet)"),
            }
        }
        println!();
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
            println!();
            println!("Recovery steps:");
            println!("  1. Export the knowledge base: vitalchat knowledge export > knowledge.json");
            println!("  2. Move the database aside: mv {0} {0}.bad", db_path.display());
            println!("  3. Reimport: vitalchat knowledge import knowledge.json");
        }
    }

    println!();
    let backend = Arc::new(OllamaBackend::new(&config.model)?);
    let orchestrator = ModelOrchestrator::from_config(backend, &config.model);
    let models = orchestrator.refresh_models().await;
    let catalog = orchestrator.catalog();
    println!("Backend:           {}", orchestrator.endpoint());
    if models.is_empty() {
        println!("Reachable:         NO (or no models installed)");
        println!("Selected model:    {} (unverified)", catalog.selected);
    } else {
        println!("Reachable:         yes ({} models)", models.len());
        println!("Selected model:    {}", catalog.selected);
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
