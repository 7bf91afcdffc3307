use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::Persistence;
use crate::error::{ParleyError, Result};
use crate::model::{Chat, Message, Project, ProjectFile, SearchHit};

/// Persists records as JSON files under one directory:
///
/// ```text
/// chats.json
/// projects.json
/// project_files.json
/// messages/<chat_id>.json
/// ```
pub struct JsonStore {
    base_dir: PathBuf,
    // Serializes read-modify-write cycles on the index files.
    lock: Mutex<()>,
}

impl JsonStore {
    /// Create a store rooted at `base_dir`, creating the directory tree.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join("messages")).map_err(|e| {
            ParleyError::Persistence(format!(
                "Failed to create data directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            base_dir,
            lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn chats_path(&self) -> PathBuf {
        self.base_dir.join("chats.json")
    }

    fn projects_path(&self) -> PathBuf {
        self.base_dir.join("projects.json")
    }

    fn project_files_path(&self) -> PathBuf {
        self.base_dir.join("project_files.json")
    }

    /// Chat ids name files under `messages/`, so they must be a single path component.
    fn messages_path(&self, chat_id: &str) -> Result<PathBuf> {
        if chat_id.is_empty() || chat_id == "." || chat_id == ".." || chat_id.contains(['/', '\\']) {
            return Err(ParleyError::Persistence(format!("Invalid chat id: {:?}", chat_id)));
        }
        Ok(self.base_dir.join("messages").join(format!("{}.json", chat_id)))
    }

    async fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ParleyError::Persistence(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            ParleyError::Persistence(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    async fn write_list<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
        let contents = serde_json::to_string_pretty(items)
            .map_err(|e| ParleyError::Persistence(format!("Failed to serialize records: {}", e)))?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, contents).await.map_err(|e| {
            ParleyError::Persistence(format!("Failed to write temporary file: {}", e))
        })?;

        tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
            ParleyError::Persistence(format!("Failed to rename {}: {}", path.display(), e))
        })?;

        Ok(())
    }

    async fn replace<T, F>(path: &Path, id: &str, entity: &'static str, item: &T, id_of: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: Fn(&T) -> &str,
    {
        let mut items: Vec<T> = Self::read_list(path).await?;
        let slot = items
            .iter_mut()
            .find(|existing| id_of(existing) == id)
            .ok_or_else(|| ParleyError::not_found(entity, id))?;
        *slot = item.clone();
        Self::write_list(path, &items).await
    }
}

#[async_trait::async_trait]
impl Persistence for JsonStore {
    async fn get_chats(&self) -> Result<Vec<Chat>> {
        let _guard = self.lock.lock().await;
        let mut chats: Vec<Chat> = Self::read_list(&self.chats_path()).await?;
        // Most recently updated first
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn create_chat(&self, chat: &Chat) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.chats_path();
        let mut chats: Vec<Chat> = Self::read_list(&path).await?;
        chats.retain(|c| c.id != chat.id);
        chats.push(chat.clone());
        Self::write_list(&path, &chats).await
    }

    async fn update_chat(&self, chat: &Chat) -> Result<()> {
        let _guard = self.lock.lock().await;
        Self::replace(&self.chats_path(), &chat.id, "Chat", chat, |c: &Chat| c.id.as_str()).await
    }

    async fn delete_chat(&self, id: &str) -> Result<()> {
        let messages_path = self.messages_path(id)?;
        let _guard = self.lock.lock().await;
        let path = self.chats_path();
        let mut chats: Vec<Chat> = Self::read_list(&path).await?;
        chats.retain(|c| c.id != id);
        Self::write_list(&path, &chats).await?;

        match tokio::fs::remove_file(&messages_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ParleyError::Persistence(format!(
                "Failed to delete messages of chat {}: {}",
                id, e
            ))),
        }
    }

    async fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        let _guard = self.lock.lock().await;
        let mut messages: Vec<Message> = Self::read_list(&self.messages_path(chat_id)?).await?;
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    async fn create_message(&self, message: &Message) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.messages_path(&message.chat_id)?;
        let mut messages: Vec<Message> = Self::read_list(&path).await?;
        messages.push(message.clone());
        Self::write_list(&path, &messages).await
    }

    async fn get_projects(&self) -> Result<Vec<Project>> {
        let _guard = self.lock.lock().await;
        let mut projects: Vec<Project> = Self::read_list(&self.projects_path()).await?;
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    async fn create_project(&self, project: &Project) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.projects_path();
        let mut projects: Vec<Project> = Self::read_list(&path).await?;
        let mut record = project.clone();
        record.files.clear();
        projects.retain(|p| p.id != project.id);
        projects.push(record);
        Self::write_list(&path, &projects).await
    }

    async fn update_project(&self, project: &Project) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut record = project.clone();
        record.files.clear();
        Self::replace(&self.projects_path(), &project.id, "Project", &record, |p: &Project| p.id.as_str())
            .await
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.projects_path();
        let mut projects: Vec<Project> = Self::read_list(&path).await?;
        projects.retain(|p| p.id != id);
        Self::write_list(&path, &projects).await?;

        let files_path = self.project_files_path();
        let mut files: Vec<ProjectFile> = Self::read_list(&files_path).await?;
        files.retain(|f| f.project_id != id);
        Self::write_list(&files_path, &files).await
    }

    async fn get_project_files(&self, project_id: &str) -> Result<Vec<ProjectFile>> {
        let _guard = self.lock.lock().await;
        let files: Vec<ProjectFile> = Self::read_list(&self.project_files_path()).await?;
        Ok(files
            .into_iter()
            .filter(|f| f.project_id == project_id)
            .collect())
    }

    async fn create_project_file(&self, file: &ProjectFile) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.project_files_path();
        let mut files: Vec<ProjectFile> = Self::read_list(&path).await?;
        files.retain(|f| f.id != file.id);
        files.push(file.clone());
        Self::write_list(&path, &files).await
    }

    async fn update_project_file(&self, file: &ProjectFile) -> Result<()> {
        let _guard = self.lock.lock().await;
        Self::replace(&self.project_files_path(), &file.id, "ProjectFile", file, |f: &ProjectFile| f.id.as_str())
            .await
    }

    async fn delete_project_file(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.project_files_path();
        let mut files: Vec<ProjectFile> = Self::read_list(&path).await?;
        files.retain(|f| f.id != id);
        Self::write_list(&path, &files).await
    }

    async fn search_messages(&self, query: &str) -> Result<Vec<SearchHit>> {
        let _guard = self.lock.lock().await;
        let query_lower = query.to_lowercase();
        let chats: Vec<Chat> = Self::read_list(&self.chats_path()).await?;

        let mut hits = Vec::new();
        for chat in &chats {
            let messages: Vec<Message> = Self::read_list(&self.messages_path(&chat.id)?).await?;
            hits.extend(
                messages
                    .into_iter()
                    .filter(|m| m.content.to_lowercase().contains(&query_lower))
                    .map(|m| SearchHit {
                        chat_id: chat.id.clone(),
                        chat_title: chat.title.clone(),
                        content: m.content,
                        timestamp: m.timestamp,
                    }),
            );
        }

        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(hits)
    }
}
