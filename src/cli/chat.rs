//! CLI `chat` command: send one message or run a line-by-line conversation.

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use vitalchat::chat::{ChatEngine, SendOutcome};
use vitalchat::config::VitalConfig;

pub async fn chat(
    config: &VitalConfig,
    session: Option<String>,
    new: bool,
    model: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let engine = super::open_engine_with_models(config).await?;
    if let Some(name) = model {
        engine.models().select_model(&name)?;
    }

    let mut session_id = {
        let mut sessions = engine.sessions();
        if new {
            sessions.create_session(None)?.id
        } else if let Some(id) = session {
            sessions.set_active(&id)?;
            id
        } else {
            sessions.active_session_id().to_string()
        }
    };

    if let Some(text) = message {
        return send(&engine, &session_id, &text).await;
    }

    print_transcript(&engine, &session_id);
    println!("(model: {}; /new starts a session, /quit exits)", engine.models().selected_model());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                session_id = engine.sessions().create_session(None)?.id;
                print_transcript(&engine, &session_id);
            }
            text => send(&engine, &session_id, text).await?,
        }
    }

    Ok(())
}

fn print_transcript(engine: &ChatEngine, session_id: &str) {
    let sessions = engine.sessions();
    if let Some(session) = sessions.session(session_id) {
        println!("== {} ({})", session.title, session.id);
        for message in &session.messages {
            println!("[{}] {}", message.role, message.content);
        }
        println!();
    }
}

async fn send(engine: &ChatEngine, session_id: &str, text: &str) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg}")
            .expect("valid template"),
    );
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = engine.send_message(session_id, text).await;
    spinner.finish_and_clear();

    match outcome? {
        SendOutcome::Replied {
            reply,
            model,
            context_ids,
        } => {
            println!("[assistant] {reply}");
            if context_ids.is_empty() {
                eprintln!("  ({model})");
            } else {
                eprintln!("  ({model}; context: {})", context_ids.join(", "));
            }
        }
        SendOutcome::Redirected { reply } => println!("[assistant] {reply}"),
        SendOutcome::Failed { failure, message } => {
            println!("[assistant] {message}");
            eprintln!("  (failed: {failure:?})");
        }
    }
    println!();
    Ok(())
}
