pub mod artifact;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod llm;
pub mod media;
pub mod model;
pub mod services;
pub mod store;

// Re-export key types
pub use artifact::Extracted;
pub use config::Settings;
pub use context::{AssemblyInput, RequestAssembler};
pub use error::{ErrorKind, ErrorNotice, ParleyError};
pub use llm::{
    ClaudeTransport, Completion, ContentBlock, GenerationParams, HistoryEntry, MessageContent,
    ModelProvider, Role, Turn, Usage,
};
pub use model::{
    Artifact, Attachment, Chat, ChatPatch, Message, OutgoingFile, Project, ProjectFile,
    ProjectFilePatch, ProjectPatch, SearchHit,
};
pub use services::{
    ExportFormat, ExportOptions, ExportOutcome, ExportService, FileExporter, FileService,
    JsonStore, LocalFileService, Persistence, UploadOutcome,
};
pub use store::{ChatState, ChatStore, Collaborators, ProjectState, ProjectStore};
