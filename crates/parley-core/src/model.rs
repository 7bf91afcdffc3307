use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{self, Extracted};
use crate::constants::defaults;
use crate::llm::Role;

/// Generate a unique record id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Title for a chat opened by its first message: the first 80 chars.
    pub fn title_from_text(text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return defaults::CHAT_TITLE.to_string();
        }
        let title: String = text.chars().take(defaults::TITLE_MAX_CHARS).collect();
        if text.chars().count() > defaults::TITLE_MAX_CHARS {
            format!("{}...", title.trim_end())
        } else {
            title
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPatch {
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    #[serde(default)]
    pub is_project_file: bool,
}

impl From<&ProjectFile> for Attachment {
    fn from(file: &ProjectFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            path: file.path.clone(),
            mime_type: file.mime_type.clone(),
            size: file.size,
            is_project_file: true,
        }
    }
}

/// A file picked for the next message. `uploaded` files already have a
/// stable stored path; the rest are copied through the file service first.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingFile {
    pub name: String,
    pub path: String,
    pub mime_type: Option<String>,
    pub size: u64,
    pub uploaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_edited: bool,
}

impl Message {
    pub fn new(chat_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            chat_id: chat_id.into(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            artifacts: Vec::new(),
            timestamp: Utc::now(),
            is_edited: false,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Keep timestamps monotonic within a chat.
    pub fn after(mut self, previous: Option<&Message>) -> Self {
        if let Some(prev) = previous {
            if self.timestamp <= prev.timestamp {
                self.timestamp = prev.timestamp + Duration::milliseconds(1);
            }
        }
        self
    }

    /// Text and artifacts as rendered. Only assistant text carries artifacts.
    pub fn display(&self) -> Extracted {
        match self.role {
            Role::Assistant => artifact::extract(&self.content),
            Role::User => Extracted {
                clean_text: self.content.clone(),
                artifacts: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<ProjectFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            title: title.into(),
            description: description.into(),
            files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFilePatch {
    pub name: Option<String>,
    pub path: Option<String>,
    pub mime_type: Option<String>,
}

/// One hit of a full-text message search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chat_id: String,
    pub chat_title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_text() {
        assert_eq!(Chat::title_from_text("  Plan a trip "), "Plan a trip");
        assert_eq!(Chat::title_from_text(""), "New Chat");

        let long = "a".repeat(100);
        let title = Chat::title_from_text(&long);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 83);
    }

    #[test]
    fn test_after_keeps_timestamps_monotonic() {
        let first = Message::new("c1", Role::User, "one");
        let mut second = Message::new("c1", Role::Assistant, "two");
        second.timestamp = first.timestamp - Duration::seconds(5);

        let second = second.after(Some(&first));
        assert!(second.timestamp > first.timestamp);
    }

    #[test]
    fn test_user_display_is_verbatim() {
        let msg = Message::new("c1", Role::User, "<artifact identifier=\"a\">x</artifact>");
        let shown = msg.display();
        assert_eq!(shown.clean_text, msg.content);
        assert!(shown.artifacts.is_empty());
    }
}
