mod api;
mod config;
mod models;
mod services;
#[cfg(test)]
mod test_support;

use std::io::Write as _;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use api::ChatError;
use services::{export, ChatService, Database, Settings, SettingsService, TurnUpdate};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut settings = SettingsService::load();
    let db = Database::new().await?;
    let service = ChatService::new(db.clone());

    println!("{} — type a message, or /help for commands", config::APP_NAME);
    if settings.api_key.is_empty() {
        println!("No API key configured yet. Set one with /key <key>");
    }

    let mut current_chat: Option<i64> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt();
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !run_command(command, &db, &mut settings, &mut current_chat).await? {
                break;
            }
        } else {
            run_turn(&service, &db, &settings, &mut current_chat, input).await?;
        }
        prompt();
    }

    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn run_turn(
    service: &ChatService,
    db: &Database,
    settings: &Settings,
    current_chat: &mut Option<i64>,
    text: &str,
) -> Result<()> {
    if service.is_busy() {
        println!("Still generating a response, hang on");
        return Ok(());
    }

    let chat_id = match *current_chat {
        Some(id) => id,
        None => {
            let id = db
                .create_chat("New chat", &settings.model, None)
                .await?;
            *current_chat = Some(id);
            id
        }
    };

    let mut rx = match service.send_message(chat_id, text.to_string(), settings.clone()) {
        Ok(rx) => rx,
        Err(ChatError::MissingApiKey) => {
            // Configuration error: surfaced here, never inline in the transcript
            println!("No API key configured. Set one with /key <key>");
            return Ok(());
        }
        Err(e) => {
            println!("{}", e);
            return Ok(());
        }
    };

    let mut printed = 0;
    while let Some(update) = rx.recv().await {
        match update {
            TurnUpdate::Delta { accumulated } => {
                print!("{}", &accumulated[printed..]);
                let _ = std::io::stdout().flush();
                printed = accumulated.len();
            }
            TurnUpdate::Completed { .. } => {
                println!();
            }
            TurnUpdate::Failed { error, .. } => {
                if printed > 0 {
                    println!();
                }
                println!("[error] {}", error);
            }
        }
    }

    Ok(())
}

/// Returns Ok(false) when the loop should exit.
async fn run_command(
    command: &str,
    db: &Database,
    settings: &mut Settings,
    current_chat: &mut Option<i64>,
) -> Result<bool> {
    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "help" => {
            println!("/new                start a new chat");
            println!("/list               list chats");
            println!("/open <id>          switch to a chat");
            println!("/title <title>      rename the current chat");
            println!("/clear              delete the current chat's messages");
            println!("/delete <id>        delete a chat and its messages");
            println!("/export <fmt> <path>  export current chat (md, json, txt)");
            println!("/key <key>          set the API key");
            println!("/model [id]         set the model, or list free ones");
            println!("/quit               exit");
        }
        "quit" | "exit" => return Ok(false),
        "new" => {
            let id = db.create_chat("New chat", &settings.model, None).await?;
            *current_chat = Some(id);
            println!("Started chat {}", id);
        }
        "list" => {
            for chat in db.list_chats().await? {
                let marker = if *current_chat == Some(chat.id) { "*" } else { " " };
                println!(
                    "{} {:>4}  {}  [{}]",
                    marker,
                    chat.id,
                    chat.title,
                    chat.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        "open" => match arg.parse::<i64>() {
            Ok(id) => match db.get_chat(id).await? {
                Some(chat) => {
                    *current_chat = Some(id);
                    println!(
                        "{} — {} (created {})",
                        chat.id,
                        chat.title,
                        chat.created_at.format("%Y-%m-%d")
                    );
                    for msg in db.list_messages(id).await? {
                        println!("[{}] {}", msg.role.as_str(), msg.content);
                    }
                }
                None => println!("No such chat: {}", arg),
            },
            Err(_) => println!("Usage: /open <id>"),
        },
        "title" => match *current_chat {
            Some(id) if !arg.is_empty() => db.update_chat_title(id, arg).await?,
            Some(_) => println!("Usage: /title <title>"),
            None => println!("No chat open"),
        },
        "clear" => match *current_chat {
            Some(id) => db.clear_messages(id).await?,
            None => println!("No chat open"),
        },
        "delete" => match arg.parse::<i64>() {
            Ok(id) => {
                db.delete_chat(id).await?;
                if *current_chat == Some(id) {
                    *current_chat = None;
                }
            }
            Err(_) => println!("Usage: /delete <id>"),
        },
        "export" => export_chat(db, *current_chat, arg).await?,
        "key" => {
            settings.api_key = arg.to_string();
            SettingsService::save(settings)?;
            println!("API key saved");
        }
        "model" => {
            if arg.is_empty() {
                for (label, id) in config::FREE_MODELS {
                    println!("{:<18} {}", label, id);
                }
            } else {
                settings.model = arg.to_string();
                SettingsService::save(settings)?;
                println!("Model set to {}", arg);
            }
        }
        _ => println!("Unknown command: /{} (try /help)", name),
    }

    Ok(true)
}

async fn export_chat(db: &Database, current_chat: Option<i64>, arg: &str) -> Result<()> {
    let Some(chat_id) = current_chat else {
        println!("No chat open");
        return Ok(());
    };
    let Some((format, path)) = arg.split_once(' ') else {
        println!("Usage: /export <md|json|txt> <path>");
        return Ok(());
    };

    let Some(chat) = db.get_chat(chat_id).await? else {
        println!("Chat no longer exists");
        return Ok(());
    };
    let messages = db.list_messages(chat_id).await?;
    if messages.is_empty() {
        println!("Chat is empty");
        return Ok(());
    }

    let content = match format {
        "md" => export::to_markdown(&chat.title, &messages),
        "json" => export::to_json(&chat.title, &messages)?,
        "txt" => export::to_text(&chat.title, &messages),
        other => {
            println!("Unknown format: {} (md, json, txt)", other);
            return Ok(());
        }
    };

    std::fs::write(path.trim(), content)?;
    println!("Exported to {}", path.trim());
    Ok(())
}
