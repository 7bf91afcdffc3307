//! Collaborators the stores talk to: record persistence, file blobs and export.

mod export;
mod files;
mod json_store;

pub use export::FileExporter;
pub use files::LocalFileService;
pub use json_store::JsonStore;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Chat, Message, Project, ProjectFile, SearchHit};

/// Opaque record store for chats, messages, projects and project files.
#[async_trait::async_trait]
pub trait Persistence: Send + Sync {
    async fn get_chats(&self) -> Result<Vec<Chat>>;
    async fn create_chat(&self, chat: &Chat) -> Result<()>;
    async fn update_chat(&self, chat: &Chat) -> Result<()>;
    /// Removes the chat and every message that belongs to it.
    async fn delete_chat(&self, id: &str) -> Result<()>;

    async fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<Message>>;
    async fn create_message(&self, message: &Message) -> Result<()>;

    /// Projects as stored; their `files` are fetched separately.
    async fn get_projects(&self) -> Result<Vec<Project>>;
    async fn create_project(&self, project: &Project) -> Result<()>;
    async fn update_project(&self, project: &Project) -> Result<()>;
    async fn delete_project(&self, id: &str) -> Result<()>;

    async fn get_project_files(&self, project_id: &str) -> Result<Vec<ProjectFile>>;
    async fn create_project_file(&self, file: &ProjectFile) -> Result<()>;
    async fn update_project_file(&self, file: &ProjectFile) -> Result<()>;
    async fn delete_project_file(&self, id: &str) -> Result<()>;

    async fn search_messages(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Outcome of copying a picked file into app storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub path: Option<String>,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn stored(path: impl Into<String>) -> Self {
        Self {
            success: true,
            path: Some(path.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: None,
            error: Some(error.into()),
        }
    }
}

/// File blobs and the picker dialogs. A `None` from a picker means cancel.
#[async_trait::async_trait]
pub trait FileService: Send + Sync {
    async fn upload_file(&self, source: &Path) -> UploadOutcome;
    async fn download_file(&self, stored: &Path, destination: &Path) -> Result<()>;
    async fn delete_file(&self, stored: &Path) -> Result<()>;
    async fn pick_files(&self) -> Vec<PathBuf>;
    async fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = crate::error::ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            other => Err(crate::error::ParleyError::Configuration(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub destination: PathBuf,
    pub include_timestamps: bool,
    pub include_artifacts: bool,
}

impl ExportOptions {
    pub fn to(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            include_timestamps: true,
            include_artifacts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub success: bool,
    pub error: Option<String>,
}

#[async_trait::async_trait]
pub trait ExportService: Send + Sync {
    async fn export_chat(
        &self,
        chat_id: &str,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> ExportOutcome;
}
