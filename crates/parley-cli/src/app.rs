use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parley_core::{
    Chat, ChatPatch, ChatStore, ClaudeTransport, Collaborators, FileExporter, JsonStore,
    LocalFileService, Message, OutgoingFile, Persistence, Project, ProjectStore, Role, SearchHit,
    Settings,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::cli::{Cli, Command, ProjectCommand};
use crate::commands::{handle_command, CommandResult};

/// What the REPL should do after a command ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Print(String),
    Quit,
}

/// Both stores plus the attachments queued for the next message.
pub struct App {
    chats: ChatStore,
    projects: ProjectStore,
    queued: Vec<OutgoingFile>,
}

impl App {
    /// Wire the file-backed collaborators under the configured data directory.
    /// Exports are written to `export_target` (a file, or a directory to put
    /// the suggested file name in).
    pub fn open(settings: &Settings, export_target: Option<PathBuf>) -> Result<Self> {
        let data_dir = &settings.storage.data_dir;
        let store = JsonStore::open(data_dir)
            .with_context(|| format!("cannot open data directory {}", data_dir.display()))?;
        let persistence: Arc<dyn Persistence> = Arc::new(store);

        let mut files = LocalFileService::new(data_dir);
        if let Some(target) = export_target {
            files = files.with_save_target(target);
        }

        let mut transport = ClaudeTransport::new();
        if let Some(ref url) = settings.llm.base_url {
            transport = transport.with_base_url(url.clone());
        }

        let services = Collaborators {
            persistence: persistence.clone(),
            files: Arc::new(files),
            provider: Arc::new(transport),
            exporter: Arc::new(FileExporter::new(persistence)),
        };
        Ok(Self::with_collaborators(services, settings))
    }

    pub fn with_collaborators(services: Collaborators, settings: &Settings) -> Self {
        Self {
            chats: ChatStore::new(services.clone(), settings),
            projects: ProjectStore::new(services),
            queued: Vec::new(),
        }
    }

    pub fn chats(&self) -> &ChatStore {
        &self.chats
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    pub fn queued(&self) -> &[OutgoingFile] {
        &self.queued
    }

    pub async fn load(&self) -> Result<()> {
        self.chats.load_chats().await?;
        self.projects.load_projects().await?;
        Ok(())
    }

    /// Queue a local file for the next message.
    pub async fn queue_file(&mut self, path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("cannot attach {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("not a file: {}", path.display()))?;

        self.queued.push(OutgoingFile {
            name,
            path: path.to_string_lossy().to_string(),
            mime_type: None,
            size: metadata.len(),
            uploaded: false,
        });
        Ok(())
    }

    /// Send `text` with the queued files and the active project's files.
    pub async fn send(&mut self, text: &str) -> Result<Option<Message>> {
        let files = std::mem::take(&mut self.queued);
        let context = self.projects.project_context();
        Ok(self.chats.send_message(text, files, &context).await?)
    }

    pub async fn execute(&mut self, command: CommandResult) -> Result<Step> {
        let output = match command {
            CommandResult::Quit => return Ok(Step::Quit),
            CommandResult::Message(text) => text,
            CommandResult::NotACommand => String::new(),
            CommandResult::NewChat => {
                self.chats.load_chat(parley_core::store::NEW_CHAT_ID).await?;
                "Started a new chat.".to_string()
            }
            CommandResult::ListChats => {
                self.chats.load_chats().await?;
                let state = self.chats.state();
                render_chat_list(&state.chats, state.active_chat.as_deref())
            }
            CommandResult::OpenChat(id) => match self.chats.load_chat(&id).await? {
                Some(chat) => render_transcript(&chat, self.chats.state().messages_of(&chat.id)),
                None => format!("No chat with id {id}."),
            },
            CommandResult::RenameChat(title) => {
                let id = self.active_chat_id()?;
                self.chats
                    .update_chat(&id, ChatPatch { title: Some(title.clone()) })
                    .await?;
                format!("Renamed to \"{title}\".")
            }
            CommandResult::DeleteChat(id) => {
                let id = match id {
                    Some(id) => id,
                    None => self.active_chat_id()?,
                };
                self.chats.delete_chat(&id).await?;
                format!("Deleted chat {id}.")
            }
            CommandResult::Attach(path) => {
                self.queue_file(Path::new(&path)).await?;
                format!("{} file(s) queued for the next message.", self.queued.len())
            }
            CommandResult::ClearAttachments => {
                self.queued.clear();
                "Attachments cleared.".to_string()
            }
            CommandResult::Regenerate => {
                let context = self.projects.project_context();
                match self.chats.regenerate_last_response(&context).await? {
                    Some(reply) => render_message(&reply),
                    None => String::new(),
                }
            }
            CommandResult::Export(format) => {
                let id = self.active_chat_id()?;
                match self.chats.export_chat(&id, format).await? {
                    Some(path) => format!("Exported to {}.", path.display()),
                    None => "Export cancelled.".to_string(),
                }
            }
            CommandResult::Search(query) => {
                render_search(&self.chats.search_messages(&query).await?)
            }
            CommandResult::ListProjects => {
                self.projects.load_projects().await?;
                let state = self.projects.state();
                render_projects(&state.projects, state.active_project.as_deref())
            }
            CommandResult::SelectProject(id) => {
                self.projects.load_projects().await?;
                self.projects.select_project(id.as_deref()).await?;
                match self.projects.state().active() {
                    Some(project) => format!(
                        "Using project \"{}\" ({} file(s)) as context.",
                        project.title,
                        project.files.len()
                    ),
                    None => "No project selected.".to_string(),
                }
            }
            CommandResult::Dismiss => {
                self.chats.dismiss_error().await;
                self.projects.dismiss_error().await;
                String::new()
            }
            CommandResult::Reload => {
                self.chats.invalidate().await;
                self.projects.invalidate().await;
                self.load().await?;
                "Reloaded.".to_string()
            }
            CommandResult::ShowStatus => self.status(),
        };
        Ok(Step::Print(output))
    }

    fn active_chat_id(&self) -> Result<String> {
        self.chats
            .state()
            .active_chat
            .context("no active chat; open one with /open <id>")
    }

    fn status(&self) -> String {
        let chats = self.chats.state();
        let projects = self.projects.state();
        let mut out = String::new();

        match chats.active() {
            Some(chat) => {
                let _ = writeln!(out, "Chat:     {} ({})", chat.title, chat.id);
            }
            None => out.push_str("Chat:     (new)\n"),
        }
        match projects.active() {
            Some(project) => {
                let _ = writeln!(out, "Project:  {} ({} file(s))", project.title, project.files.len());
            }
            None => out.push_str("Project:  (none)\n"),
        }
        let _ = writeln!(out, "Queued:   {} file(s)", self.queued.len());
        if let Some(notice) = chats.error.as_ref().or(projects.error.as_ref()) {
            let _ = writeln!(out, "Error:    {}", notice.message);
        }
        out.trim_end().to_string()
    }
}

// ── Rendering ───────────────────────────────────────────────────────────

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "claude",
    }
}

pub fn render_message(message: &Message) -> String {
    let display = message.display();
    let time = message
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M");
    let mut out = format!("[{time}] {}:\n{}", speaker(message.role), display.clean_text);

    for attachment in &message.attachments {
        let _ = write!(out, "\n  + {} ({})", attachment.name, attachment.mime_type);
    }
    for artifact in &display.artifacts {
        let language = artifact.language.as_deref().unwrap_or("");
        let _ = write!(
            out,
            "\n\n== {} [{}] ==\n```{language}\n{}\n```",
            artifact.title, artifact.kind, artifact.content
        );
    }
    out
}

pub fn render_transcript(chat: &Chat, messages: &[Message]) -> String {
    let mut out = format!("# {}\n", chat.title);
    for message in messages {
        out.push('\n');
        out.push_str(&render_message(message));
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn render_chat_list(chats: &[Chat], active: Option<&str>) -> String {
    if chats.is_empty() {
        return "No chats yet.".to_string();
    }
    chats
        .iter()
        .map(|chat| {
            let marker = if active == Some(chat.id.as_str()) { "*" } else { " " };
            format!(
                "{marker} {}  {}  {}",
                chat.id,
                chat.updated_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
                chat.title
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_projects(projects: &[Project], active: Option<&str>) -> String {
    if projects.is_empty() {
        return "No projects yet.".to_string();
    }
    let mut out = String::new();
    for project in projects {
        let marker = if active == Some(project.id.as_str()) { "*" } else { " " };
        let _ = writeln!(out, "{marker} {}  {}", project.id, project.title);
        if !project.description.is_empty() {
            let _ = writeln!(out, "    {}", project.description);
        }
        for file in &project.files {
            let _ = writeln!(out, "    - {} {} ({}, {} bytes)", file.id, file.name, file.mime_type, file.size);
        }
    }
    out.trim_end().to_string()
}

pub fn render_search(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No matches.".to_string();
    }
    hits.iter()
        .map(|hit| {
            let excerpt: String = hit.content.chars().take(120).collect();
            format!("{}  [{}]  {}", hit.chat_id, hit.chat_title, excerpt.replace('\n', " "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Entry points ────────────────────────────────────────────────────────

pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let export_target = match cli.command {
        Some(Command::Export { ref out, .. }) => Some(match out {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        }),
        _ => Some(std::env::current_dir()?),
    };
    let mut app = App::open(&settings, export_target)?;

    match cli.command {
        Some(command) => run_command(&mut app, command).await,
        None => {
            app.load().await?;
            if let Some(ref id) = cli.chat {
                if app.chats.load_chat(id).await?.is_none() {
                    anyhow::bail!("no chat with id {id}");
                }
            }
            if let Some(ref id) = cli.project {
                app.projects.select_project(Some(id)).await?;
            }
            for path in &cli.attachments {
                app.queue_file(path).await?;
            }

            match cli.prompt {
                Some(prompt) => run_single_prompt(&mut app, &prompt).await,
                None => run_repl(app).await,
            }
        }
    }
}

async fn run_command(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Chats { json } => {
            app.chats.load_chats().await?;
            let chats = app.chats.state().chats;
            if json {
                println!("{}", serde_json::to_string_pretty(&chats)?);
            } else {
                println!("{}", render_chat_list(&chats, None));
            }
        }
        Command::Show { chat } => {
            let Some(found) = app.chats.load_chat(&chat).await? else {
                anyhow::bail!("no chat with id {chat}");
            };
            println!("{}", render_transcript(&found, app.chats.state().messages_of(&found.id)));
        }
        Command::Regenerate { chat, project } => {
            if app.chats.load_chat(&chat).await?.is_none() {
                anyhow::bail!("no chat with id {chat}");
            }
            if let Some(ref id) = project {
                app.projects.load_projects().await?;
                app.projects.select_project(Some(id)).await?;
            }
            if let Step::Print(text) = app.execute(CommandResult::Regenerate).await? {
                println!("{text}");
            }
        }
        Command::Export { chat, format, .. } => {
            app.chats.load_chats().await?;
            match app.chats.export_chat(&chat, format).await? {
                Some(path) => println!("Exported to {}", path.display()),
                None => println!("Export cancelled"),
            }
        }
        Command::Delete { chat } => {
            app.chats.delete_chat(&chat).await?;
            println!("Deleted chat {chat}");
        }
        Command::Search { query } => {
            println!("{}", render_search(&app.chats.search_messages(&query).await?));
        }
        Command::Projects => {
            app.projects.load_projects().await?;
            println!("{}", render_projects(&app.projects.state().projects, None));
        }
        Command::Project(command) => run_project_command(app, command).await?,
    }
    Ok(())
}

async fn run_project_command(app: &mut App, command: ProjectCommand) -> Result<()> {
    app.projects.load_projects().await?;
    match command {
        ProjectCommand::Create { title, description } => {
            let project = app.projects.create_project(title, description).await?;
            println!("Created project {}", project.id);
        }
        ProjectCommand::AddFile { project, path } => {
            let file = app.projects.add_file(&project, &path, None).await?;
            println!("Added {} ({}) as {}", file.name, file.mime_type, file.id);
        }
        ProjectCommand::RemoveFile { project, file } => {
            app.projects.delete_file(&project, &file).await?;
            println!("Removed file {file}");
        }
        ProjectCommand::Delete { project } => {
            app.projects.delete_project(&project).await?;
            println!("Deleted project {project}");
        }
    }
    Ok(())
}

pub async fn run_single_prompt(app: &mut App, prompt: &str) -> Result<()> {
    match app.send(prompt).await? {
        Some(reply) => println!("{}", reply.display().clean_text),
        None => eprintln!("The chat was deleted before the reply arrived."),
    }
    if let Some(chat) = app.chats.state().active() {
        eprintln!("chat: {}", chat.id);
    }
    Ok(())
}

// ── Interactive loop ────────────────────────────────────────────────────

pub async fn run_repl(mut app: App) -> Result<()> {
    println!("Parley v{} - type /help for commands.", env!("CARGO_PKG_VERSION"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let result = match handle_command(input) {
            CommandResult::NotACommand => app.send(input).await.map(|reply| {
                Step::Print(reply.map(|m| render_message(&m)).unwrap_or_default())
            }),
            command => app.execute(command).await,
        };

        match result {
            Ok(Step::Quit) => break,
            Ok(Step::Print(text)) if text.is_empty() => {}
            Ok(Step::Print(text)) => println!("{text}\n"),
            Err(e) => {
                tracing::debug!("command failed: {e:#}");
                eprintln!("Error: {e}\n");
            }
        }
    }

    Ok(())
}
