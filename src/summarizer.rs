//! Consumer-file summarization through a generative-text endpoint.
//!
//! The client is an explicitly constructed service object: built once during
//! startup, then passed by reference through the reporting path. Summarization
//! failures degrade to bracketed sentinel strings — they never abort a run.

use crate::config::SummarizerConfig;
use crate::debug_log;
use anyhow::{bail, Result};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

pub const SUMMARY_EMPTY_FILE: &str = "[File is empty or contains only whitespace]";
pub const SUMMARY_BLOCKED: &str = "[Summary generation blocked or failed]";
pub const SUMMARY_ERROR: &str = "[Error during summarization]";
pub const SUMMARY_NONE: &str = "[No summary generated]";

pub struct Summarizer {
    agent: ureq::Agent,
    api_key: String,
    model: String,
    endpoint: String,
    max_code_chars: usize,
}

impl Summarizer {
    /// Build the client. The API key comes from the explicit argument or the
    /// `GOOGLE_API_KEY` environment variable; a missing key is a
    /// configuration error.
    pub fn new(api_key: Option<&str>, model: Option<&str>, cfg: &SummarizerConfig) -> Result<Self> {
        let api_key = match api_key {
            Some(k) if !k.trim().is_empty() => k.trim().to_string(),
            _ => match std::env::var("GOOGLE_API_KEY") {
                Ok(k) if !k.trim().is_empty() => k.trim().to_string(),
                _ => bail!(
                    "Google API key not found; set GOOGLE_API_KEY or pass --google-api-key"
                ),
            },
        };

        Ok(Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
            api_key,
            model: model.unwrap_or(&cfg.model).to_string(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            max_code_chars: cfg.max_code_chars,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Summarize one source file's content. Always returns a string: either a
    /// model-produced summary or one of the sentinel placeholders.
    pub fn summarize_source(&self, code: &str, display_path: &Path) -> String {
        if code.trim().is_empty() {
            eprintln!(
                "warning: skipping summarization for empty file: {}",
                display_path.display()
            );
            return SUMMARY_EMPTY_FILE.to_string();
        }

        let file_name = display_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| display_path.to_string_lossy().to_string());
        let prompt = format!(
            "Analyze the following C# code from the file '{file_name}':\n\n```csharp\n{}\n```\n\nProvide a concise summary (2-3 sentences) explaining the primary purpose of the code in this file. Focus on what the main classes/structs/interfaces/enums declared within this specific file do. Do not list methods or properties unless essential for the summary.",
            truncate_chars(code, self.max_code_chars)
        );

        debug_log!("requesting summary for {}", display_path.display());
        match self.request(&prompt) {
            Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Some(_)) => SUMMARY_NONE.to_string(),
            Ok(None) => {
                eprintln!(
                    "warning: summary response for {} was empty or blocked",
                    display_path.display()
                );
                SUMMARY_BLOCKED.to_string()
            }
            Err(e) => {
                eprintln!(
                    "warning: summarization request failed for {}: {e:#}",
                    display_path.display()
                );
                SUMMARY_ERROR.to_string()
            }
        }
    }

    /// POST one generateContent request. `Ok(None)` means the service answered
    /// but produced no usable candidate (e.g. a safety block).
    fn request(&self, prompt: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)?;
        let payload: serde_json::Value = response.into_json()?;

        let text = payload
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .map(|t| t.to_string());
        Ok(text)
    }
}

/// Cap `s` at `max_chars` bytes without splitting a UTF-8 character.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
