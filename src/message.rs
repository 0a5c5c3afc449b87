// src/message.rs
// Message and attachment types plus the formatter that turns a
// role/content/attachment history into the providers' wire shape.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// File reference produced by the upload subsystem. The formatter only
/// consumes the type, URL, and filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    pub file_url: String,
}

/// One stored conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Provider wire content: a bare string for plain text turns, a part list
/// once attachments are involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl WireContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireContent::Text(s) => Some(s),
            WireContent::Parts(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    pub filename: String,
    /// Data URI carrying the base64-encoded bytes
    pub file_data: String,
}

/// One message in the providers' chat-completions dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: WireContent,
}

/// Converts messages and attachments into provider wire content.
///
/// Attachment handling is per-part best-effort: a PDF that cannot be fetched
/// degrades to a placeholder text part instead of failing the message.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    http: reqwest::Client,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFormatter {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Format the current user turn.
    pub async fn format_turn(&self, text: &str, attachments: &[Attachment]) -> WireContent {
        let mut parts: Vec<ContentPart> = Vec::new();

        if !text.trim().is_empty() {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }

        for attachment in attachments {
            parts.push(self.attachment_part(attachment).await);
        }

        collapse(parts, text)
    }

    /// Format an already-persisted message. Assistant turns keep their plain
    /// content; models do not receive file context back.
    pub async fn format_history_message(&self, message: &ChatMessage) -> WireMessage {
        if message.role == "assistant" || message.attachments.is_empty() {
            return WireMessage {
                role: message.role.clone(),
                content: WireContent::Text(message.content.clone()),
            };
        }

        WireMessage {
            role: message.role.clone(),
            content: self
                .format_turn(&message.content, &message.attachments)
                .await,
        }
    }

    /// Format a whole history, oldest first.
    pub async fn format_history(&self, messages: &[ChatMessage]) -> Vec<WireMessage> {
        let mut formatted = Vec::with_capacity(messages.len());
        for message in messages {
            formatted.push(self.format_history_message(message).await);
        }
        formatted
    }

    async fn attachment_part(&self, attachment: &Attachment) -> ContentPart {
        if attachment.file_type.starts_with("image/") {
            return ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: attachment.file_url.clone(),
                },
            };
        }

        if attachment.file_type == "application/pdf" {
            match self.fetch_pdf_data_uri(attachment).await {
                Ok(file_data) => {
                    return ContentPart::File {
                        file: FileData {
                            filename: attachment.filename.clone(),
                            file_data,
                        },
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        filename = %attachment.filename,
                        error = %e,
                        "Failed to process PDF attachment, degrading to placeholder"
                    );
                    return ContentPart::Text {
                        text: format!(
                            "[PDF Document: {} - Unable to process file content]",
                            attachment.filename
                        ),
                    };
                }
            }
        }

        ContentPart::Text {
            text: format!("[File: {}]", attachment.filename),
        }
    }

    async fn fetch_pdf_data_uri(&self, attachment: &Attachment) -> anyhow::Result<String> {
        let response = self.http.get(&attachment.file_url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("fetch returned {}", response.status());
        }
        let bytes = response.bytes().await?;
        Ok(format!(
            "data:application/pdf;base64,{}",
            BASE64.encode(&bytes)
        ))
    }
}

/// Providers accept a bare string for a text-only turn; only hand them a
/// part list when there is more than one part or a non-text part.
fn collapse(parts: Vec<ContentPart>, fallback: &str) -> WireContent {
    let single_text = parts.len() == 1 && matches!(parts[0], ContentPart::Text { .. });

    if parts.len() > 1 || (parts.len() == 1 && !single_text) {
        return WireContent::Parts(parts);
    }

    match parts.into_iter().next() {
        Some(ContentPart::Text { text }) => WireContent::Text(text),
        _ => WireContent::Text(fallback.to_string()),
    }
}
