//! CLI `sessions` and `folders` commands.

use anyhow::Result;
use chrono::Local;
use vitalchat::chat::ChatSession;
use vitalchat::config::VitalConfig;

/// Print unfoldered sessions by recency bucket, then each folder's sessions.
pub fn sessions(config: &VitalConfig) -> Result<()> {
    let engine = super::open_engine(config)?;
    let store = engine.sessions();
    let active = store.active_session_id();

    for group in store.group_for_display(&Local::now()) {
        println!("{}", group.bucket);
        for session in group.sessions {
            print_session(session, active);
        }
        println!();
    }

    for folder in store.folders() {
        println!("[{}] {}", folder.name, folder.id);
        let sessions = store.sessions_in_folder(&folder.id);
        if sessions.is_empty() {
            println!("    (empty)");
        }
        for session in sessions {
            print_session(session, active);
        }
        println!();
    }

    Ok(())
}

fn print_session(session: &ChatSession, active: &str) {
    let marker = if session.id == active { "*" } else { " " };
    println!(
        "  {marker} {:<34} {}  ({} messages, updated {})",
        session.title,
        session.id,
        session.messages.len(),
        session.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
    );
}

pub fn create_folder(config: &VitalConfig, name: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    let folder = engine.sessions().create_folder(name)?;
    println!("Created folder {} ({})", folder.name, folder.id);
    Ok(())
}

pub fn rename_folder(config: &VitalConfig, id: &str, name: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    engine.sessions().rename_folder(id, name)?;
    println!("Renamed folder {id}");
    Ok(())
}

pub fn delete_folder(config: &VitalConfig, id: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    let removed = engine.delete_folder(id)?;
    println!("Deleted folder {id} and {removed} session(s) in it");
    Ok(())
}

pub fn delete_session(config: &VitalConfig, id: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    let active = engine.delete_session(id)?;
    println!("Deleted session {id}; active session is now {active}");
    Ok(())
}
