// Library interface for parley-cli so integration tests can reach the
// command parser and the app without a terminal.

pub mod app;
pub mod cli;
pub mod commands;

pub use app::{App, Step};
pub use cli::{Cli, Command, ProjectCommand};
pub use commands::{handle_command, CommandResult};
