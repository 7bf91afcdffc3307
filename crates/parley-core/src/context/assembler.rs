use base64::Engine;

use crate::constants::prompt;
use crate::llm::{ContentBlock, HistoryEntry, Turn};
use crate::media;
use crate::model::Attachment;

/// Everything that goes into one outgoing request.
#[derive(Debug, Clone, Default)]
pub struct AssemblyInput<'a> {
    pub text: &'a str,
    pub attachments: &'a [Attachment],
    pub project_files: &'a [Attachment],
    pub history: &'a [HistoryEntry],
}

/// Builds provider turns from user text, attachments, project context and history.
///
/// Attachment problems never fail assembly: unreadable files are skipped and
/// undecodable ones are described by a placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestAssembler;

#[derive(Clone, Copy)]
enum FileSection {
    Attachment,
    Project,
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self
    }

    pub async fn assemble(&self, input: AssemblyInput<'_>) -> Vec<Turn> {
        let mut blocks = Vec::new();

        for attachment in input.attachments {
            if let Some(block) = Self::file_block(attachment, FileSection::Attachment).await {
                blocks.push(block);
            }
        }

        if !input.project_files.is_empty() {
            blocks.push(ContentBlock::text(prompt::project_header(
                input.project_files.len(),
            )));
            for file in input.project_files {
                if let Some(block) = Self::file_block(file, FileSection::Project).await {
                    blocks.push(block);
                }
            }
            blocks.push(ContentBlock::text(prompt::PROJECT_FOOTER));
        }

        // Blank text is not sent as its own block (see "Empty text with
        // attachments" in DESIGN.md); the greeting covers a fully empty turn.
        if !input.text.trim().is_empty() {
            blocks.push(ContentBlock::text(input.text));
        } else if blocks.is_empty() {
            blocks.push(ContentBlock::text(prompt::DEFAULT_GREETING));
        }

        let mut turns = Self::history_turns(input.history);
        turns.push(Turn::user(blocks));

        tracing::debug!(turns = turns.len(), "assembled request");
        turns
    }

    /// Normalize history into turns, dropping entries without a role.
    pub fn history_turns(history: &[HistoryEntry]) -> Vec<Turn> {
        history
            .iter()
            .filter_map(|entry| {
                entry.role.map(|role| Turn {
                    role,
                    content: entry.content.clone().into_blocks(),
                })
            })
            .collect()
    }

    async fn file_block(file: &Attachment, section: FileSection) -> Option<ContentBlock> {
        let bytes = match tokio::fs::read(&file.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("skipping attachment {} ({}): {}", file.name, file.path, e);
                return None;
            }
        };

        let media_type = media::classify(Some(&file.mime_type), &file.name);

        if media::is_image(&media_type) {
            let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
            return Some(ContentBlock::base64_image(media_type, data));
        }

        let size = bytes.len();
        let text = match String::from_utf8(bytes) {
            Ok(content) => match section {
                FileSection::Attachment => prompt::attachment_block(&file.name, &content),
                FileSection::Project => prompt::project_file_block(&file.name, &content),
            },
            Err(_) => prompt::binary_placeholder(&file.name, &media_type, size),
        };
        Some(ContentBlock::text(text))
    }
}
