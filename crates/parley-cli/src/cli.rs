use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_core::ExportFormat;

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Parley - chat with Claude from the terminal")]
#[command(version)]
pub struct Cli {
    /// Send a single message and exit
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Continue an existing chat instead of starting a new one
    #[arg(short, long)]
    pub chat: Option<String>,

    /// Attach a file to the message (repeatable)
    #[arg(short, long = "attach", value_name = "PATH")]
    pub attachments: Vec<PathBuf>,

    /// Send the files of this project as context
    #[arg(long)]
    pub project: Option<String>,

    /// Override the data directory from the config file
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List chats, newest first
    Chats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print every message of a chat
    Show { chat: String },
    /// Ask again for the last user message of a chat
    Regenerate {
        chat: String,
        /// Send the files of this project as context
        #[arg(long)]
        project: Option<String>,
    },
    /// Write a chat to a file
    Export {
        chat: String,
        /// markdown, json or text
        #[arg(short, long, default_value = "markdown", value_parser = parse_format)]
        format: ExportFormat,
        /// Output file or directory (default: current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete a chat and its messages
    Delete { chat: String },
    /// Search all messages
    Search { query: String },
    /// List projects and their files
    Projects,
    /// Manage a project
    #[command(subcommand)]
    Project(ProjectCommand),
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project
    Create {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Copy a file into a project
    AddFile { project: String, path: PathBuf },
    /// Remove a file from a project
    RemoveFile { project: String, file: String },
    /// Delete a project and its files
    Delete { project: String },
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse().map_err(|e: parley_core::ParleyError| e.to_string())
}
