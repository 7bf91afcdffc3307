use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use super::{ExportFormat, ExportOptions, ExportOutcome, ExportService, Persistence};
use crate::artifact;
use crate::error::{ParleyError, Result};
use crate::llm::Role;
use crate::model::{Chat, Message};

/// Writes a stored chat to a file as Markdown, JSON or plain text.
pub struct FileExporter {
    persistence: Arc<dyn Persistence>,
}

#[derive(Serialize)]
struct ChatDocument<'a> {
    chat: &'a Chat,
    messages: &'a [Message],
}

impl FileExporter {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    async fn render(&self, chat_id: &str, format: ExportFormat, options: &ExportOptions) -> Result<String> {
        let chat = self
            .persistence
            .get_chats()
            .await?
            .into_iter()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| ParleyError::not_found("Chat", chat_id))?;
        let messages = self.persistence.get_messages_by_chat(chat_id).await?;

        match format {
            ExportFormat::Json => {
                let doc = ChatDocument {
                    chat: &chat,
                    messages: &messages,
                };
                Ok(serde_json::to_string_pretty(&doc)?)
            }
            ExportFormat::Markdown => Ok(render_markdown(&chat, &messages, options)),
            ExportFormat::Text => Ok(render_text(&chat, &messages, options)),
        }
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    }
}

fn render_markdown(chat: &Chat, messages: &[Message], options: &ExportOptions) -> String {
    let mut out = format!("# {}\n\n", chat.title);

    for message in messages {
        let shown = message.display();
        let _ = write!(out, "## {}", speaker(message.role));
        if options.include_timestamps {
            let _ = write!(out, " ({})", message.timestamp.format("%Y-%m-%d %H:%M"));
        }
        out.push_str("\n\n");
        out.push_str(&shown.clean_text);
        out.push_str("\n\n");

        for attachment in &message.attachments {
            let _ = writeln!(out, "> Attached: {}", attachment.name);
        }

        if options.include_artifacts {
            for art in &shown.artifacts {
                let fence = art.language.as_deref().unwrap_or("");
                let _ = write!(out, "### {}\n\n```{}\n{}\n```\n\n", art.title, fence, art.content);
            }
        }
    }

    out
}

fn render_text(chat: &Chat, messages: &[Message], options: &ExportOptions) -> String {
    let mut out = format!("{}\n\n", chat.title);

    for message in messages {
        if options.include_timestamps {
            let _ = write!(out, "[{}] ", message.timestamp.to_rfc3339());
        }
        let shown = message.display();
        let _ = write!(out, "{}: {}\n\n", speaker(message.role), shown.clean_text);
        if options.include_artifacts {
            for art in &shown.artifacts {
                let _ = write!(out, "{}\n\n", artifact::embed(art));
            }
        }
    }

    out
}

#[async_trait::async_trait]
impl ExportService for FileExporter {
    async fn export_chat(&self, chat_id: &str, format: ExportFormat, options: &ExportOptions) -> ExportOutcome {
        let result = async {
            let contents = self.render(chat_id, format, options).await?;
            if let Some(parent) = options.destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&options.destination, contents).await?;
            Ok::<_, ParleyError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!("exported chat {} to {}", chat_id, options.destination.display());
                ExportOutcome {
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("export of chat {} failed: {}", chat_id, e);
                ExportOutcome {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
