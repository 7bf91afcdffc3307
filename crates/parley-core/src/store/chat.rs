use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{Collaborators, Reducer, Store};
use crate::artifact;
use crate::config::Settings;
use crate::context::{AssemblyInput, RequestAssembler};
use crate::error::{ErrorNotice, ParleyError, Result};
use crate::llm::{GenerationParams, HistoryEntry, Role};
use crate::media;
use crate::model::{generate_id, Attachment, Chat, ChatPatch, Message, OutgoingFile, ProjectFile, SearchHit};
use crate::services::{ExportFormat, ExportOptions};

/// Id accepted by [`ChatStore::load_chat`] for "start a blank chat".
pub const NEW_CHAT_ID: &str = "new";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Newest first.
    pub chats: Vec<Chat>,
    pub active_chat: Option<String>,
    /// Messages per chat, in timestamp order.
    pub messages: HashMap<String, Vec<Message>>,
    /// Requests currently awaiting the provider.
    pub pending: usize,
    pub error: Option<ErrorNotice>,
    pub chats_loaded: bool,
    pub loaded_messages: HashSet<String>,
    /// Chats deleted locally; keeps in-flight fetches from restoring them.
    pub deleted: HashSet<String>,
}

impl ChatState {
    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }

    pub fn chat(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn active(&self) -> Option<&Chat> {
        self.active_chat.as_deref().and_then(|id| self.chat(id))
    }

    pub fn messages_of(&self, chat_id: &str) -> &[Message] {
        self.messages.get(chat_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages of the active chat; empty when no chat is active.
    pub fn active_messages(&self) -> &[Message] {
        self.active_chat
            .as_deref()
            .map(|id| self.messages_of(id))
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub enum ChatAction {
    ChatsLoaded(Vec<Chat>),
    MessagesLoaded { chat_id: String, messages: Vec<Message> },
    ChatCreated(Chat),
    ChatUpdated { id: String, patch: ChatPatch, updated_at: DateTime<Utc> },
    ChatDeleted(String),
    ActiveChatSet(Option<String>),
    /// Appended to the chat named by `message.chat_id`.
    MessageAdded(Message),
    MessagesTruncated { chat_id: String, len: usize },
    RequestStarted,
    RequestFinished,
    ErrorRaised(ErrorNotice),
    ErrorDismissed,
    Invalidated,
}

pub struct ChatReducer;

impl Reducer for ChatReducer {
    type State = ChatState;
    type Action = ChatAction;

    fn reduce(state: &mut ChatState, action: ChatAction) {
        match action {
            ChatAction::ChatsLoaded(fetched) => {
                // Chats created while the fetch was in flight stay on top.
                let mut chats: Vec<Chat> = state
                    .chats
                    .drain(..)
                    .filter(|local| !fetched.iter().any(|c| c.id == local.id))
                    .collect();
                chats.extend(fetched.into_iter().filter(|c| !state.deleted.contains(&c.id)));
                state.chats = chats;
                state.chats_loaded = true;
            }
            ChatAction::MessagesLoaded { chat_id, messages } => {
                let local = state.messages.remove(&chat_id).unwrap_or_default();
                let unsaved: Vec<Message> = local
                    .into_iter()
                    .filter(|m| !messages.iter().any(|f| f.id == m.id))
                    .collect();
                let mut merged = messages;
                merged.extend(unsaved);
                merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                state.messages.insert(chat_id.clone(), merged);
                state.loaded_messages.insert(chat_id);
            }
            ChatAction::ChatCreated(chat) => {
                state.active_chat = Some(chat.id.clone());
                state.messages.entry(chat.id.clone()).or_default();
                state.loaded_messages.insert(chat.id.clone());
                state.chats.insert(0, chat);
            }
            ChatAction::ChatUpdated { id, patch, updated_at } => {
                if let Some(chat) = state.chats.iter_mut().find(|c| c.id == id) {
                    if let Some(title) = patch.title {
                        chat.title = title;
                    }
                    chat.updated_at = updated_at;
                }
            }
            ChatAction::ChatDeleted(id) => {
                state.chats.retain(|c| c.id != id);
                state.messages.remove(&id);
                state.loaded_messages.remove(&id);
                if state.active_chat.as_deref() == Some(id.as_str()) {
                    state.active_chat = None;
                }
                state.deleted.insert(id);
            }
            ChatAction::ActiveChatSet(id) => {
                state.active_chat = id;
            }
            ChatAction::MessageAdded(message) => {
                if state.chat(&message.chat_id).is_none() {
                    tracing::debug!("dropping message for unknown chat {}", message.chat_id);
                    return;
                }
                state
                    .messages
                    .entry(message.chat_id.clone())
                    .or_default()
                    .push(message);
            }
            ChatAction::MessagesTruncated { chat_id, len } => {
                if let Some(messages) = state.messages.get_mut(&chat_id) {
                    messages.truncate(len);
                }
            }
            ChatAction::RequestStarted => state.pending += 1,
            ChatAction::RequestFinished => state.pending = state.pending.saturating_sub(1),
            ChatAction::ErrorRaised(notice) => state.error = Some(notice),
            ChatAction::ErrorDismissed => state.error = None,
            ChatAction::Invalidated => {
                state.chats_loaded = false;
                state.loaded_messages.clear();
            }
        }
    }
}

/// Chats and their messages, plus the send/regenerate/export flows.
pub struct ChatStore {
    store: Store<ChatReducer>,
    services: Collaborators,
    assembler: RequestAssembler,
    credential: Option<String>,
    system_prompt: String,
    params: GenerationParams,
}

impl ChatStore {
    pub fn new(services: Collaborators, settings: &Settings) -> Self {
        Self {
            store: Store::spawn(ChatState::default()),
            services,
            assembler: RequestAssembler::new(),
            credential: settings.api_key(),
            system_prompt: settings.system_prompt().to_string(),
            params: settings.generation_params(),
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn state(&self) -> ChatState {
        self.store.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ChatState> {
        self.store.subscribe()
    }

    async fn raise(&self, err: &ParleyError) {
        self.store
            .dispatch(ChatAction::ErrorRaised(ErrorNotice::from(err)))
            .await;
    }

    /// Report a failed confirmation of an already-applied change.
    async fn unconfirmed(&self, what: &str, err: ParleyError) {
        tracing::warn!("{} was applied locally but not persisted: {}", what, err);
        self.raise(&err).await;
    }

    pub async fn dismiss_error(&self) {
        self.store.dispatch(ChatAction::ErrorDismissed).await;
    }

    /// Forget what has been loaded so the next loads refetch.
    pub async fn invalidate(&self) {
        self.store.dispatch(ChatAction::Invalidated).await;
    }

    pub async fn load_chats(&self) -> Result<()> {
        if self.store.read(|s| s.chats_loaded) {
            return Ok(());
        }

        match self.services.persistence.get_chats().await {
            Ok(chats) => {
                tracing::debug!("loaded {} chats", chats.len());
                self.store.dispatch(ChatAction::ChatsLoaded(chats)).await;
                Ok(())
            }
            Err(e) => {
                self.raise(&e).await;
                Err(e)
            }
        }
    }

    pub async fn load_messages(&self, chat_id: &str) -> Result<()> {
        if self.store.read(|s| s.loaded_messages.contains(chat_id)) {
            return Ok(());
        }

        match self.services.persistence.get_messages_by_chat(chat_id).await {
            Ok(messages) => {
                self.store
                    .dispatch(ChatAction::MessagesLoaded {
                        chat_id: chat_id.to_string(),
                        messages,
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.raise(&e).await;
                Err(e)
            }
        }
    }

    /// Make `id` the active chat. Returns `None` for [`NEW_CHAT_ID`] and for
    /// unknown ids; the latter also raises a not-found notice.
    pub async fn load_chat(&self, id: &str) -> Result<Option<Chat>> {
        if id == NEW_CHAT_ID {
            self.store.dispatch(ChatAction::ActiveChatSet(None)).await;
            return Ok(None);
        }

        let mut found = self.store.read(|s| s.chat(id).cloned());
        if found.is_none() && !self.store.read(|s| s.chats_loaded) {
            self.load_chats().await?;
            found = self.store.read(|s| s.chat(id).cloned());
        }

        let Some(chat) = found else {
            self.raise(&ParleyError::not_found("Chat", id)).await;
            return Ok(None);
        };

        self.store
            .dispatch(ChatAction::ActiveChatSet(Some(chat.id.clone())))
            .await;
        self.load_messages(&chat.id).await?;
        Ok(Some(chat))
    }

    pub async fn create_chat(&self, title: impl Into<String>) -> Result<Chat> {
        let chat = Chat::new(title);
        self.store.dispatch(ChatAction::ChatCreated(chat.clone())).await;
        tracing::info!("created chat {}", chat.id);

        if let Err(e) = self.services.persistence.create_chat(&chat).await {
            self.unconfirmed("chat creation", e).await;
        }
        Ok(chat)
    }

    pub async fn update_chat(&self, id: &str, patch: ChatPatch) -> Result<()> {
        if self.store.read(|s| s.chat(id).is_none()) {
            let err = ParleyError::not_found("Chat", id);
            self.raise(&err).await;
            return Err(err);
        }

        self.apply_patch(id, patch).await;
        Ok(())
    }

    /// Merge `patch`, bump `updated_at` and persist. Missing chats are skipped.
    async fn apply_patch(&self, id: &str, patch: ChatPatch) {
        self.store
            .dispatch(ChatAction::ChatUpdated {
                id: id.to_string(),
                patch,
                updated_at: Utc::now(),
            })
            .await;

        let Some(updated) = self.store.read(|s| s.chat(id).cloned()) else {
            return;
        };
        if let Err(e) = self.services.persistence.update_chat(&updated).await {
            self.unconfirmed("chat update", e).await;
        }
    }

    pub async fn delete_chat(&self, id: &str) -> Result<()> {
        self.store.dispatch(ChatAction::ChatDeleted(id.to_string())).await;
        tracing::info!("deleted chat {}", id);

        if let Err(e) = self.services.persistence.delete_chat(id).await {
            self.unconfirmed("chat deletion", e).await;
        }
        Ok(())
    }

    /// Send `text` with `files` in the active chat, creating a chat when none
    /// is active. Returns the assistant reply, or `None` when the chat was
    /// deleted before the reply arrived.
    pub async fn send_message(
        &self,
        text: &str,
        files: Vec<OutgoingFile>,
        project_files: &[ProjectFile],
    ) -> Result<Option<Message>> {
        let credential = self.require_credential().await?;

        let chat_id = match self.store.read(|s| s.active_chat.clone()) {
            Some(id) => id,
            None => self.create_chat(Chat::title_from_text(text)).await?.id,
        };

        self.tracked_exchange(&chat_id, text, files, project_files, &credential)
            .await
    }

    async fn require_credential(&self) -> Result<String> {
        match self.credential.clone() {
            Some(credential) => Ok(credential),
            None => {
                let err = ParleyError::Configuration(
                    "No API key configured. Set the key environment variable in settings."
                        .to_string(),
                );
                self.raise(&err).await;
                Err(err)
            }
        }
    }

    /// Run one exchange in `chat_id`, counted in `pending` and reported on failure.
    async fn tracked_exchange(
        &self,
        chat_id: &str,
        text: &str,
        files: Vec<OutgoingFile>,
        project_files: &[ProjectFile],
        credential: &str,
    ) -> Result<Option<Message>> {
        self.store.dispatch(ChatAction::RequestStarted).await;
        let result = self
            .exchange(chat_id, text, files, project_files, credential)
            .await;
        self.store.dispatch(ChatAction::RequestFinished).await;

        if let Err(ref e) = result {
            tracing::warn!("send in chat {} failed: {}", chat_id, e);
            self.raise(e).await;
        }
        result
    }

    async fn exchange(
        &self,
        chat_id: &str,
        text: &str,
        files: Vec<OutgoingFile>,
        project_files: &[ProjectFile],
        credential: &str,
    ) -> Result<Option<Message>> {
        let attachments = self.upload_files(files).await;

        let (history, previous) = self.store.read(|s| {
            let messages = s.messages_of(chat_id);
            (
                messages.iter().map(HistoryEntry::from).collect::<Vec<_>>(),
                messages.last().cloned(),
            )
        });

        let user_message = Message::new(chat_id, Role::User, text)
            .with_attachments(attachments)
            .after(previous.as_ref());
        self.store
            .dispatch(ChatAction::MessageAdded(user_message.clone()))
            .await;
        if let Err(e) = self.services.persistence.create_message(&user_message).await {
            self.unconfirmed("user message", e).await;
        }

        let project_context: Vec<Attachment> = project_files.iter().map(Attachment::from).collect();
        let turns = self
            .assembler
            .assemble(AssemblyInput {
                text,
                attachments: &user_message.attachments,
                project_files: &project_context,
                history: &history,
            })
            .await;

        let completion = self
            .services
            .provider
            .send_completion(&turns, Some(&self.system_prompt), &self.params, credential)
            .await?;

        if self.store.read(|s| s.chat(chat_id).is_none()) {
            tracing::info!("chat {} was deleted while awaiting a reply; discarding it", chat_id);
            return Ok(None);
        }

        let previous = self.store.read(|s| s.messages_of(chat_id).last().cloned());
        let mut reply = Message::new(chat_id, Role::Assistant, completion.content)
            .after(previous.as_ref().or(Some(&user_message)));
        reply.artifacts = artifact::extract(&reply.content).artifacts;

        self.store.dispatch(ChatAction::MessageAdded(reply.clone())).await;
        if let Err(e) = self.services.persistence.create_message(&reply).await {
            self.unconfirmed("assistant message", e).await;
        }

        self.apply_patch(chat_id, ChatPatch::default()).await;
        Ok(Some(reply))
    }

    async fn upload_files(&self, files: Vec<OutgoingFile>) -> Vec<Attachment> {
        let mut attachments = Vec::with_capacity(files.len());

        for file in files {
            let mime_type = media::classify(file.mime_type.as_deref(), &file.name);
            let path = if file.uploaded {
                file.path
            } else {
                let outcome = self.services.files.upload_file(Path::new(&file.path)).await;
                match outcome.path {
                    Some(path) if outcome.success => path,
                    _ => {
                        tracing::warn!(
                            "upload of {} failed: {}",
                            file.name,
                            outcome.error.unwrap_or_default()
                        );
                        continue;
                    }
                }
            };

            attachments.push(Attachment {
                id: generate_id(),
                name: file.name,
                path,
                mime_type,
                size: file.size,
                is_project_file: false,
            });
        }

        attachments
    }

    /// Drop everything from the last user message on and send it again in
    /// the chat that was active when called.
    pub async fn regenerate_last_response(&self, project_files: &[ProjectFile]) -> Result<Option<Message>> {
        let last_user = self.store.read(|s| {
            let chat_id = s.active_chat.clone()?;
            let messages = s.messages_of(&chat_id);
            let index = messages.iter().rposition(|m| m.role == Role::User)?;
            Some((chat_id, index, messages[index].clone()))
        });

        let Some((chat_id, index, user_message)) = last_user else {
            let err = ParleyError::NoUserMessage;
            self.raise(&err).await;
            return Err(err);
        };
        let credential = self.require_credential().await?;

        self.store
            .dispatch(ChatAction::MessagesTruncated {
                chat_id: chat_id.clone(),
                len: index,
            })
            .await;

        let files = user_message
            .attachments
            .into_iter()
            .filter(|a| !a.is_project_file)
            .map(|a| OutgoingFile {
                name: a.name,
                path: a.path,
                mime_type: Some(a.mime_type),
                size: a.size,
                uploaded: true,
            })
            .collect();

        self.tracked_exchange(&chat_id, &user_message.content, files, project_files, &credential)
            .await
    }

    /// Export a chat to a user-chosen file. `None` when the user cancels.
    pub async fn export_chat(&self, id: &str, format: ExportFormat) -> Result<Option<PathBuf>> {
        let title = self
            .store
            .read(|s| s.chat(id).map(|c| c.title.clone()))
            .unwrap_or_else(|| "chat".to_string());
        let suggested = format!("{}.{}", file_stem(&title), format.extension());

        let Some(destination) = self.services.files.pick_save_path(&suggested).await else {
            return Ok(None);
        };

        let outcome = self
            .services
            .exporter
            .export_chat(id, format, &ExportOptions::to(&destination))
            .await;

        if outcome.success {
            Ok(Some(destination))
        } else {
            let err = ParleyError::Other(outcome.error.unwrap_or_else(|| "export failed".to_string()));
            self.raise(&err).await;
            Err(err)
        }
    }

    pub async fn search_messages(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.services.persistence.search_messages(query).await
    }
}

fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "chat".to_string()
    } else {
        stem.to_string()
    }
}
