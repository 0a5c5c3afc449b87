// src/title.rs
// Conversation title synthesis. Asks a fast model for a short title and
// falls back to a local heuristic whenever that cannot work, so callers
// always get a usable string.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::message::{WireContent, WireMessage};
use crate::provider::CompletionRequest;
use crate::router::{CompletionRouter, Credential};

/// Fast, cheap model used for every title request.
pub const TITLE_MODEL: &str = "google/gemini-2.0-flash-lite-001";

const GREETING_PREFIXES: &str =
    r"(?i)^(hi|hello|hey|can you|could you|please|help me|i need|how do i|what is|explain)";

pub struct TitleSynthesizer {
    router: Arc<CompletionRouter>,
}

impl TitleSynthesizer {
    pub fn new(router: Arc<CompletionRouter>) -> Self {
        Self { router }
    }

    /// Produce a short title for a conversation's opening exchange.
    /// Never fails: any synthesis problem degrades to the heuristic.
    pub async fn summarize(
        &self,
        user_text: &str,
        assistant_text: &str,
        credential: Option<&Credential>,
    ) -> String {
        match self.synthesize(user_text, assistant_text, credential).await {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => fallback_title(user_text),
            Err(e) => {
                debug!("title synthesis failed, using fallback: {}", e);
                fallback_title(user_text)
            }
        }
    }

    async fn synthesize(
        &self,
        user_text: &str,
        assistant_text: &str,
        credential: Option<&Credential>,
    ) -> anyhow::Result<String> {
        let resolution = self.router.resolve(TITLE_MODEL, credential)?;
        let prompt = build_prompt(user_text, assistant_text);
        let request = CompletionRequest::new(
            resolution.provider_model,
            vec![WireMessage {
                role: "user".to_string(),
                content: WireContent::Text(prompt),
            }],
        );
        let raw = resolution.provider.create(request).await?;
        Ok(clean_title(&raw))
    }
}

fn build_prompt(user_text: &str, assistant_text: &str) -> String {
    let context = if assistant_text.is_empty() {
        format!("User: {user_text}")
    } else {
        let preview: String = assistant_text.chars().take(200).collect();
        format!("User: {user_text}\n\nAssistant: {preview}...")
    };

    format!(
        "Generate a very short, concise title (max 6 words) for this conversation. \
The title should capture the main topic or task. Do not use quotes or punctuation. Examples:\n\
- \"Python data analysis help\"\n\
- \"React component debugging\"\n\
- \"Travel planning for Japan\"\n\
- \"Math homework assistance\"\n\n\
Conversation:\n{context}\n\nTitle:"
    )
}

/// Strip one pair of surrounding quotes and cap at 60 characters.
fn clean_title(raw: &str) -> String {
    let unquoted = raw.strip_prefix(['"', '\'']).unwrap_or(raw);
    let unquoted = unquoted.strip_suffix(['"', '\'']).unwrap_or(unquoted);
    let capped: String = unquoted.chars().take(60).collect();
    capped.trim().to_string()
}

/// Deterministic local title: drop a leading greeting or request phrase,
/// keep the first six words, cap at 50 characters.
fn fallback_title(user_message: &str) -> String {
    let cleaned = Regex::new(GREETING_PREFIXES)
        .map(|re| re.replace(user_message, "").trim().to_string())
        .unwrap_or_else(|_| user_message.trim().to_string());

    let title = cleaned.split(' ').take(6).collect::<Vec<_>>().join(" ");

    if title.chars().count() > 3 {
        clip(&title, 50)
    } else {
        clip(user_message, 50)
    }
}

fn clip(s: &str, limit: usize) -> String {
    if s.chars().count() > limit {
        let head: String = s.chars().take(limit).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}
