use crate::constants::defaults;
use crate::error::ParleyError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Source of an inline image block. Only base64 payloads are produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// Atomic unit of a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn base64_image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: media_type.into(),
                data: data.into(),
            },
        }
    }
}

/// One role-tagged message as sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }
}

/// Message content as found in history: a bare string or a block list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) => vec![ContentBlock::text(text)],
            Self::Blocks(blocks) => blocks,
        }
    }
}

/// A prior message fed back as history. Entries without a role are skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: Option<Role>,
    pub content: MessageContent,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: MessageContent::Text(content.into()),
        }
    }
}

impl From<&crate::model::Message> for HistoryEntry {
    fn from(message: &crate::model::Message) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
            top_p: defaults::TOP_P,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Normalized successful reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Concatenation of every text block of the reply.
    pub content: String,
    pub model_id: String,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// The model-provider boundary.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send one completion request. A single attempt, no retries.
    async fn send_completion(
        &self,
        turns: &[Turn],
        system_prompt: Option<&str>,
        params: &GenerationParams,
        credential: &str,
    ) -> Result<Completion, ParleyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_block_wire_shape() {
        let block = ContentBlock::base64_image("image/png", "AAAA");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "image",
                "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}
            })
        );

        let json = serde_json::to_value(ContentBlock::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "text": "hi"}));
    }

    #[test]
    fn test_history_content_accepts_both_forms() {
        let bare: HistoryEntry =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(bare.content.into_blocks(), vec![ContentBlock::text("hi")]);

        let blocks: HistoryEntry = serde_json::from_str(
            r#"{"role":"assistant","content":[{"type":"text","text":"yo"}]}"#,
        )
        .unwrap();
        assert_eq!(blocks.role, Some(Role::Assistant));
        assert_eq!(blocks.content.into_blocks(), vec![ContentBlock::text("yo")]);

        let roleless: HistoryEntry = serde_json::from_str(r#"{"content":"x"}"#).unwrap();
        assert!(roleless.role.is_none());
    }
}
