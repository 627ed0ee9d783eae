use anyhow::Result;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Error)]
#[error("completion API returned status {status}: {body}")]
pub struct ApiStatusError {
    pub status: u16,
    pub body: String,
}

pub trait LlmClient {
    fn complete(&self, prompt: &ChatPrompt, model: &str, params: &SamplingParams) -> Result<String>;
}

/// Removes one leading fence marker (with an optional language tag) and one
/// trailing closing marker. Unfenced text comes back unchanged.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return raw.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|line| is_fence_opener(line)) {
        lines.remove(0);
    }
    if lines.last().map(|line| line.trim()) == Some("```") {
        lines.pop();
    }
    lines.join("\n")
}

fn is_fence_opener(line: &str) -> bool {
    let tag = line.trim().trim_start_matches('`');
    tag.is_empty()
        || tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '#')
}
