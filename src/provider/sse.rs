//! SSE (Server-Sent Events) decoding for provider completion streams
//!
//! Both upstream providers speak the chat-completions dialect: `data: <json>`
//! lines carrying delta fragments, terminated by a `[DONE]` sentinel. The
//! decoder buffers partial chunks and hands back complete frames.

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Buffering decoder for `data:`-framed provider streams.
///
/// Network chunks rarely align with line boundaries; anything after the last
/// newline is carried into the next push. The buffer is bounded so a
/// malformed stream cannot grow it without limit.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    /// Hard cap on buffered bytes from a stream that never produces a newline
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Push a chunk of bytes and extract the complete frames it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            tracing::warn!(
                "SSE buffer exceeded {}KB limit, truncating",
                Self::MAX_BUFFER_SIZE / 1024
            );
            let keep_from = self.buffer.len() - (Self::MAX_BUFFER_SIZE / 2);
            self.buffer = self.buffer[keep_from..].to_string();
        }

        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer = self.buffer[pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }

            if let Some(data) = line.strip_prefix("data: ") {
                frames.push(SseFrame {
                    data: data.to_string(),
                });
            }
        }

        frames
    }

    /// Push a string directly (tests and pre-decoded content)
    pub fn push_str(&mut self, s: &str) -> Vec<SseFrame> {
        self.push(s.as_bytes())
    }
}

/// One complete `data:` line, prefix stripped.
#[derive(Debug, Clone)]
pub struct SseFrame {
    pub data: String,
}

impl SseFrame {
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    /// Parse the frame data as JSON, or None when the provider interleaves
    /// non-JSON noise (comments, keepalives) we simply skip.
    pub fn try_parse<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.data).ok()
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data)
            .map_err(|e| anyhow::anyhow!("SSE JSON parse error: {}. Data: {}", e, self.preview()))
    }

    /// First 200 chars, for log lines
    pub fn preview(&self) -> String {
        if self.data.len() > 200 {
            format!("{}...", &self.data[..200])
        } else {
            self.data.clone()
        }
    }
}
