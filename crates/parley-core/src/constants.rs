/// Parley centralized constants.
/// Model ids, endpoints, limits and prompt templates live here.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    /// Model id sent with every completion request, whatever the settings say.
    pub const PINNED_MODEL: &str = "claude-3-5-sonnet-20241022";

    /// Model shown as selected in fresh settings.
    pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
}

// ─── API ──────────────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
    pub const MESSAGES_PATH: &str = "/v1/messages";
    pub const ANTHROPIC_VERSION: &str = "2023-06-01";
    pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

    /// Upper bound for one completion call.
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const MAX_TOKENS: u32 = 4096;
    pub const TEMPERATURE: f32 = 0.7;
    pub const TOP_P: f32 = 1.0;
    pub const CHAT_TITLE: &str = "New Chat";
    pub const TITLE_MAX_CHARS: usize = 80;
}

// ─── Media ────────────────────────────────────────────────────────────────────

pub mod media {
    pub const OCTET_STREAM: &str = "application/octet-stream";

    pub const EXTENSION_TYPES: &[(&str, &str)] = &[
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("svg", "image/svg+xml"),
        ("bmp", "image/bmp"),
        ("txt", "text/plain"),
        ("md", "text/markdown"),
        ("markdown", "text/markdown"),
        ("csv", "text/csv"),
        ("html", "text/html"),
        ("htm", "text/html"),
        ("css", "text/css"),
        ("xml", "application/xml"),
        ("json", "application/json"),
        ("yaml", "application/yaml"),
        ("yml", "application/yaml"),
        ("toml", "application/toml"),
        ("js", "text/javascript"),
        ("mjs", "text/javascript"),
        ("ts", "text/typescript"),
        ("tsx", "text/tsx"),
        ("jsx", "text/jsx"),
        ("py", "text/x-python"),
        ("rs", "text/x-rust"),
        ("go", "text/x-go"),
        ("java", "text/x-java"),
        ("c", "text/x-c"),
        ("h", "text/x-c"),
        ("cpp", "text/x-c++"),
        ("rb", "text/x-ruby"),
        ("sh", "application/x-sh"),
        ("sql", "application/sql"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
    ];
}

// ─── Prompt Assembly ──────────────────────────────────────────────────────────

pub mod prompt {
    /// Sent when the user supplied neither text nor attachments.
    pub const DEFAULT_GREETING: &str = "Hello";

    pub const PROJECT_FOOTER: &str = "=== End of project context ===";

    pub fn attachment_block(name: &str, content: &str) -> String {
        format!("--- Begin file: {name} ---\n{content}\n--- End file: {name} ---")
    }

    pub fn project_file_block(name: &str, content: &str) -> String {
        format!("--- Begin project file: {name} ---\n{content}\n--- End project file: {name} ---")
    }

    pub fn binary_placeholder(name: &str, media_type: &str, size: usize) -> String {
        format!("[Binary file: {name} ({media_type}, {size} bytes)]")
    }

    pub fn project_header(file_count: usize) -> String {
        let noun = if file_count == 1 { "file" } else { "files" };
        format!("=== Project context ({file_count} {noun}) ===")
    }

    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Parley, a helpful assistant. \
        Answer clearly and concisely.\n\
        \n\
        When you produce a self-contained document, a complete code file, or \
        markup the user may want to keep, wrap it in an artifact:\n\
        <artifact identifier=\"unique-id\" type=\"application/vnd.code\" title=\"Short title\" language=\"rust\">\n\
        ...content...\n\
        </artifact>\n\
        Use type \"text/markdown\" for documents and \"text/html\" for web pages. \
        Keep explanations outside the artifact.";
}
