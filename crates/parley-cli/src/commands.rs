use parley_core::ExportFormat;

/// Result of processing a slash command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Quit the application.
    Quit,
    /// Leave the current chat; the next message opens a new one.
    NewChat,
    /// List chats, newest first.
    ListChats,
    /// Open a chat by id.
    OpenChat(String),
    /// Rename the active chat.
    RenameChat(String),
    /// Delete a chat by id, or the active chat when empty.
    DeleteChat(Option<String>),
    /// Queue a file for the next message.
    Attach(String),
    /// Drop queued attachments.
    ClearAttachments,
    /// Ask again for the last user message.
    Regenerate,
    /// Export the active chat.
    Export(ExportFormat),
    /// Full-text message search.
    Search(String),
    /// List projects.
    ListProjects,
    /// Select a project by id, or clear the selection.
    SelectProject(Option<String>),
    /// Clear the current error notice.
    Dismiss,
    /// Reload chats and projects from storage.
    Reload,
    /// Show active chat, project and queued files.
    ShowStatus,
    /// Not a command - treat as regular input.
    NotACommand,
}

pub fn handle_command(input: &str) -> CommandResult {
    let parts: Vec<&str> = input.trim().splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/help" | "/h" => show_help(),
        "/exit" | "/quit" | "/q" => CommandResult::Quit,

        // Chat commands
        "/new" => CommandResult::NewChat,
        "/chats" | "/history" => CommandResult::ListChats,
        "/open" | "/load" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /open <chat-id>".into())
            } else {
                CommandResult::OpenChat(arg.to_string())
            }
        }
        "/rename" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /rename <title>".into())
            } else {
                CommandResult::RenameChat(arg.to_string())
            }
        }
        "/delete" => {
            if arg.is_empty() {
                CommandResult::DeleteChat(None)
            } else {
                CommandResult::DeleteChat(Some(arg.to_string()))
            }
        }
        "/regen" | "/regenerate" => CommandResult::Regenerate,
        "/export" => {
            let format = if arg.is_empty() { "markdown" } else { arg };
            match format.parse::<ExportFormat>() {
                Ok(format) => CommandResult::Export(format),
                Err(e) => CommandResult::Message(format!("{e}\nUsage: /export [markdown|json|text]")),
            }
        }
        "/search" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /search <text>".into())
            } else {
                CommandResult::Search(arg.to_string())
            }
        }

        // Attachments
        "/attach" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /attach <path>".into())
            } else {
                CommandResult::Attach(arg.to_string())
            }
        }
        "/detach" => CommandResult::ClearAttachments,

        // Projects
        "/projects" => CommandResult::ListProjects,
        "/project" => match arg {
            "" => CommandResult::Message("Usage: /project <project-id|none>".into()),
            "none" | "off" => CommandResult::SelectProject(None),
            id => CommandResult::SelectProject(Some(id.to_string())),
        },

        // Other
        "/dismiss" => CommandResult::Dismiss,
        "/reload" => CommandResult::Reload,
        "/status" => CommandResult::ShowStatus,
        "/version" => CommandResult::Message(format!("Parley v{}", env!("CARGO_PKG_VERSION"))),

        // Unknown command
        _ => {
            if cmd.starts_with('/') {
                CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands."))
            } else {
                CommandResult::NotACommand
            }
        }
    }
}

fn show_help() -> CommandResult {
    let help_text = "\
Parley commands

  CHATS
    /new                      Start a fresh chat
    /chats, /history          List chats
    /open <id>                Open a chat
    /rename <title>           Rename the active chat
    /delete [id]              Delete a chat (default: the active one)
    /regen                    Regenerate the last answer
    /export [format]          Export the active chat (markdown, json, text)
    /search <text>            Search all messages

  FILES & PROJECTS
    /attach <path>            Attach a file to the next message
    /detach                   Drop queued attachments
    /projects                 List projects
    /project <id|none>        Use a project's files as context

  OTHER
    /status                   Show active chat, project and attachments
    /dismiss                  Clear the current error
    /reload                   Reload chats and projects from disk
    /help, /h                 Show this help message
    /version                  Show version information
    /exit, /quit, /q          Quit";

    CommandResult::Message(help_text.into())
}
