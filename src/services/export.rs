use anyhow::Result;
use chrono::Local;
use serde::Serialize;

use crate::models::{Message, Role};

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "System",
        Role::User => "User",
        Role::Assistant => "Assistant",
    }
}

pub fn to_markdown(title: &str, messages: &[Message]) -> String {
    let mut output = format!("# {}\n\n", title);
    output.push_str(&format!(
        "*Exported: {}*\n\n---\n\n",
        Local::now().format("%Y-%m-%d %H:%M")
    ));

    for msg in messages {
        output.push_str(&format!("## {}\n\n{}\n\n---\n\n", role_label(msg.role), msg.content));
    }

    output
}

pub fn to_text(title: &str, messages: &[Message]) -> String {
    let mut output = format!(
        "Chat: {}\nExported: {}\n{}\n\n",
        title,
        Local::now().format("%Y-%m-%d %H:%M"),
        "=".repeat(50)
    );

    for msg in messages {
        output.push_str(&format!(
            "[{}]\n{}\n{}\n\n",
            role_label(msg.role).to_uppercase(),
            msg.content,
            "-".repeat(30)
        ));
    }

    output
}

pub fn to_json(title: &str, messages: &[Message]) -> Result<String> {
    #[derive(Serialize)]
    struct ExportMessage<'a> {
        role: &'static str,
        content: &'a str,
        timestamp: String,
    }

    #[derive(Serialize)]
    struct ExportDocument<'a> {
        title: &'a str,
        exported_at: String,
        messages: Vec<ExportMessage<'a>>,
    }

    let doc = ExportDocument {
        title,
        exported_at: Local::now().to_rfc3339(),
        messages: messages
            .iter()
            .map(|m| ExportMessage {
                role: role_label(m.role),
                content: &m.content,
                timestamp: m.created_at.to_rfc3339(),
            })
            .collect(),
    };

    Ok(serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message {
                id: 1,
                chat_id: 1,
                role: Role::User,
                content: "What is Rust?".to_string(),
                created_at: Utc::now(),
            },
            Message {
                id: 2,
                chat_id: 1,
                role: Role::Assistant,
                content: "A systems language.".to_string(),
                created_at: Utc::now(),
            },
        ]
    }

    #[test]
    fn markdown_has_title_and_sections() {
        let out = to_markdown("My Chat", &sample_messages());
        assert!(out.starts_with("# My Chat\n"));
        assert!(out.contains("## User\n\nWhat is Rust?"));
        assert!(out.contains("## Assistant\n\nA systems language."));
    }

    #[test]
    fn text_uses_uppercase_labels() {
        let out = to_text("My Chat", &sample_messages());
        assert!(out.starts_with("Chat: My Chat\n"));
        assert!(out.contains("[USER]\nWhat is Rust?"));
        assert!(out.contains("[ASSISTANT]\nA systems language."));
    }

    #[test]
    fn json_round_trips() {
        let out = to_json("My Chat", &sample_messages()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["title"], "My Chat");
        assert_eq!(value["messages"][0]["role"], "User");
        assert_eq!(value["messages"][1]["content"], "A systems language.");
        assert!(value["exported_at"].is_string());
    }
}
