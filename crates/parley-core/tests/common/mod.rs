#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use parley_core::error::Result;
use parley_core::{
    Chat, Collaborators, Completion, ExportFormat, ExportOptions, ExportOutcome, ExportService,
    FileService, GenerationParams, Message, ModelProvider, ParleyError, Persistence, Project,
    ProjectFile, SearchHit, Settings, Turn, UploadOutcome,
};
use tokio::sync::Notify;

// ========================================================================
// Persistence
// ========================================================================

#[derive(Default)]
pub struct Records {
    pub chats: Vec<Chat>,
    pub messages: HashMap<String, Vec<Message>>,
    pub projects: Vec<Project>,
    pub project_files: Vec<ProjectFile>,
}

/// In-memory record store with call counters and scripted failures.
#[derive(Default)]
pub struct MockPersistence {
    pub records: Mutex<Records>,
    pub get_chats_calls: Mutex<usize>,
    pub get_messages_calls: Mutex<usize>,
    pub get_projects_calls: Mutex<usize>,
    /// Every create/update/delete fails when set.
    pub fail_writes: Mutex<bool>,
    /// Projects whose file listing fails.
    pub failing_file_lists: Mutex<HashSet<String>>,
    /// When set, chat and project listings take their snapshot, notify
    /// `fetch_entered`, then wait on `fetch_gate` before returning.
    pub hold_fetches: Mutex<bool>,
    pub fetch_entered: Notify,
    pub fetch_gate: Notify,
}

impl MockPersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_chat(&self, chat: Chat, messages: Vec<Message>) {
        let mut records = self.records.lock().unwrap();
        records.messages.insert(chat.id.clone(), messages);
        records.chats.push(chat);
    }

    pub fn seed_project(&self, project: Project, files: Vec<ProjectFile>) {
        let mut records = self.records.lock().unwrap();
        records.projects.push(project);
        records.project_files.extend(files);
    }

    pub fn stored_messages(&self, chat_id: &str) -> Vec<Message> {
        self.records
            .lock()
            .unwrap()
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_chat(&self, chat_id: &str) -> Option<Chat> {
        self.records
            .lock()
            .unwrap()
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    pub fn hold_fetches(&self) {
        *self.hold_fetches.lock().unwrap() = true;
    }

    async fn maybe_hold(&self) {
        let held = *self.hold_fetches.lock().unwrap();
        if held {
            self.fetch_entered.notify_one();
            self.fetch_gate.notified().await;
        }
    }

    fn check_write(&self) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            Err(ParleyError::Persistence("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Persistence for MockPersistence {
    async fn get_chats(&self) -> Result<Vec<Chat>> {
        *self.get_chats_calls.lock().unwrap() += 1;
        let chats = self.records.lock().unwrap().chats.clone();
        self.maybe_hold().await;
        Ok(chats)
    }

    async fn create_chat(&self, chat: &Chat) -> Result<()> {
        self.check_write()?;
        self.records.lock().unwrap().chats.push(chat.clone());
        Ok(())
    }

    async fn update_chat(&self, chat: &Chat) -> Result<()> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        match records.chats.iter_mut().find(|c| c.id == chat.id) {
            Some(slot) => {
                *slot = chat.clone();
                Ok(())
            }
            None => Err(ParleyError::not_found("Chat", &chat.id)),
        }
    }

    async fn delete_chat(&self, id: &str) -> Result<()> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        records.chats.retain(|c| c.id != id);
        records.messages.remove(id);
        Ok(())
    }

    async fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        *self.get_messages_calls.lock().unwrap() += 1;
        Ok(self.stored_messages(chat_id))
    }

    async fn create_message(&self, message: &Message) -> Result<()> {
        self.check_write()?;
        self.records
            .lock()
            .unwrap()
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_projects(&self) -> Result<Vec<Project>> {
        *self.get_projects_calls.lock().unwrap() += 1;
        let projects = self.records.lock().unwrap().projects.clone();
        self.maybe_hold().await;
        Ok(projects)
    }

    async fn create_project(&self, project: &Project) -> Result<()> {
        self.check_write()?;
        self.records.lock().unwrap().projects.push(project.clone());
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> Result<()> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        if let Some(slot) = records.projects.iter_mut().find(|p| p.id == project.id) {
            *slot = project.clone();
        }
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        records.projects.retain(|p| p.id != id);
        records.project_files.retain(|f| f.project_id != id);
        Ok(())
    }

    async fn get_project_files(&self, project_id: &str) -> Result<Vec<ProjectFile>> {
        // Yield so sibling fetches genuinely overlap.
        tokio::task::yield_now().await;
        if self.failing_file_lists.lock().unwrap().contains(project_id) {
            return Err(ParleyError::Persistence(format!("files of {project_id} unavailable")));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .project_files
            .iter()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn create_project_file(&self, file: &ProjectFile) -> Result<()> {
        self.check_write()?;
        self.records.lock().unwrap().project_files.push(file.clone());
        Ok(())
    }

    async fn update_project_file(&self, file: &ProjectFile) -> Result<()> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        if let Some(slot) = records.project_files.iter_mut().find(|f| f.id == file.id) {
            *slot = file.clone();
        }
        Ok(())
    }

    async fn delete_project_file(&self, id: &str) -> Result<()> {
        self.check_write()?;
        self.records.lock().unwrap().project_files.retain(|f| f.id != id);
        Ok(())
    }

    async fn search_messages(&self, query: &str) -> Result<Vec<SearchHit>> {
        let records = self.records.lock().unwrap();
        let mut hits = Vec::new();
        for chat in &records.chats {
            for message in records.messages.get(&chat.id).into_iter().flatten() {
                if message.content.contains(query) {
                    hits.push(SearchHit {
                        chat_id: chat.id.clone(),
                        chat_title: chat.title.clone(),
                        content: message.content.clone(),
                        timestamp: message.timestamp,
                    });
                }
            }
        }
        Ok(hits)
    }
}

// ========================================================================
// Model provider
// ========================================================================

/// Provider that replays scripted results and records what it was sent.
pub struct MockProvider {
    replies: Mutex<VecDeque<Result<Completion>>>,
    pub requests: Mutex<Vec<Vec<Turn>>>,
    /// Notified each time a request arrives.
    pub entered: Notify,
    /// When set, each request waits here before answering.
    gate: Option<Notify>,
}

impl MockProvider {
    pub fn new(replies: Vec<Result<Completion>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            entered: Notify::new(),
            gate: None,
        })
    }

    pub fn gated(replies: Vec<Result<Completion>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            entered: Notify::new(),
            gate: Some(Notify::new()),
        })
    }

    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.notify_one();
        }
    }

    pub fn last_request(&self) -> Vec<Turn> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn reply(text: &str) -> Result<Completion> {
    Ok(Completion {
        content: text.to_string(),
        model_id: "claude-3-5-sonnet-20241022".to_string(),
        stop_reason: Some("end_turn".to_string()),
        usage: None,
    })
}

#[async_trait::async_trait]
impl ModelProvider for MockProvider {
    async fn send_completion(
        &self,
        turns: &[Turn],
        _system_prompt: Option<&str>,
        _params: &GenerationParams,
        _credential: &str,
    ) -> Result<Completion> {
        self.requests.lock().unwrap().push(turns.to_vec());
        self.entered.notify_one();
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| reply("default reply"))
    }
}

// ========================================================================
// Files and export
// ========================================================================

#[derive(Default)]
pub struct MockFiles {
    pub uploads: Mutex<Vec<PathBuf>>,
    pub deleted: Mutex<Vec<PathBuf>>,
    pub failing_uploads: Mutex<HashSet<String>>,
    pub save_target: Mutex<Option<PathBuf>>,
}

impl MockFiles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl FileService for MockFiles {
    async fn upload_file(&self, source: &Path) -> UploadOutcome {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing_uploads.lock().unwrap().contains(&name) {
            return UploadOutcome::failed(format!("cannot read {name}"));
        }
        self.uploads.lock().unwrap().push(source.to_path_buf());
        // Keep the source readable by pointing at it directly.
        UploadOutcome::stored(source.to_string_lossy())
    }

    async fn download_file(&self, _stored: &Path, _destination: &Path) -> Result<()> {
        Ok(())
    }

    async fn delete_file(&self, stored: &Path) -> Result<()> {
        self.deleted.lock().unwrap().push(stored.to_path_buf());
        Ok(())
    }

    async fn pick_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    async fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
        self.save_target
            .lock()
            .unwrap()
            .as_ref()
            .map(|dir| dir.join(suggested_name))
    }
}

#[derive(Default)]
pub struct MockExporter {
    pub calls: Mutex<Vec<(String, ExportFormat, PathBuf)>>,
}

#[async_trait::async_trait]
impl ExportService for MockExporter {
    async fn export_chat(
        &self,
        chat_id: &str,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> ExportOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((chat_id.to_string(), format, options.destination.clone()));
        ExportOutcome {
            success: true,
            error: None,
        }
    }
}

// ========================================================================
// Wiring
// ========================================================================

pub struct Harness {
    pub persistence: Arc<MockPersistence>,
    pub provider: Arc<MockProvider>,
    pub files: Arc<MockFiles>,
    pub exporter: Arc<MockExporter>,
}

impl Harness {
    pub fn new(provider: Arc<MockProvider>) -> Self {
        Self {
            persistence: MockPersistence::new(),
            provider,
            files: MockFiles::new(),
            exporter: Arc::new(MockExporter::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            persistence: self.persistence.clone(),
            files: self.files.clone(),
            provider: self.provider.clone(),
            exporter: self.exporter.clone(),
        }
    }

    pub fn chat_store(&self) -> parley_core::ChatStore {
        parley_core::ChatStore::new(self.collaborators(), &Settings::default())
            .with_credential(Some("test-key".to_string()))
    }

    pub fn project_store(&self) -> parley_core::ProjectStore {
        parley_core::ProjectStore::new(self.collaborators())
    }
}
