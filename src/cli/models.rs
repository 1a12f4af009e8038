use anyhow::Result;
use vitalchat::config::VitalConfig;

/// Discover installed models and show which one chats would use.
pub async fn models(config: &VitalConfig) -> Result<()> {
    let engine = super::open_engine_with_models(config).await?;
    let catalog = engine.models().catalog();

    println!("Backend: {}", engine.models().endpoint());
    if catalog.available.is_empty() {
        println!("No models discovered (is the service running?).");
        println!("Configured default: {} (unverified)", catalog.selected);
        return Ok(());
    }

    for name in &catalog.available {
        let marker = if *name == catalog.selected { "*" } else { " " };
        println!("  {marker} {name}");
    }
    if catalog.selected != config.model.default_model {
        println!(
            "\nConfigured default '{}' is not installed; using '{}'.",
            config.model.default_model, catalog.selected
        );
    }
    Ok(())
}
