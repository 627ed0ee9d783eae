use anyhow::{Result, anyhow};
use codetidy_llm::{ChatPrompt, LlmClient, SamplingParams, strip_code_fence};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Javascript,
    Java,
    C,
    Cpp,
}

pub const SELECTABLE_LANGUAGES: [Language; 5] = [
    Language::Python,
    Language::Javascript,
    Language::Java,
    Language::C,
    Language::Cpp,
];

impl Language {
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "py" | "python" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "javascript" => Some(Self::Javascript),
            "java" => Some(Self::Java),
            "c" => Some(Self::C),
            "cpp" | "c++" | "cc" | "cxx" => Some(Self::Cpp),
            _ => None,
        }
    }

    pub fn as_hint(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Javascript => "javascript",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "c++",
        }
    }

    /// Local interpreter used for test execution, where one exists.
    pub fn interpreter(&self) -> Option<&'static str> {
        match self {
            Self::Python => Some("python"),
            Self::Javascript => Some("node"),
            _ => None,
        }
    }

    pub fn source_file_name(&self) -> Option<&'static str> {
        match self {
            Self::Python => Some("main.py"),
            Self::Javascript => Some("main.js"),
            _ => None,
        }
    }

    pub fn test_file_name(&self) -> Option<&'static str> {
        match self {
            Self::Python => Some("test_main.py"),
            Self::Javascript => Some("test_main.js"),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_hint())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Silent,
    Minimal,
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    CodeOnly,
    TwoFieldJson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardizeRequest {
    pub language: Language,
    pub code: String,
    pub system_prompt: String,
    pub standards_doc: Option<String>,
    pub extra_instructions: Option<String>,
}

impl StandardizeRequest {
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(anyhow!("code must not be empty"));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(anyhow!("system prompt must not be empty"));
        }
        Ok(())
    }
}

pub fn build_standardize_prompt(req: &StandardizeRequest, format: ReplyFormat) -> ChatPrompt {
    let lang = req.language.as_hint();
    let mut user = String::new();

    if let Some(doc) = &req.standards_doc {
        user.push_str(&format!("### Coding standards:\n{doc}\n\n"));
    }
    if let Some(extra) = &req.extra_instructions {
        user.push_str(&format!("{extra}\n\n"));
    }
    user.push_str(&format!("### User code in {lang}:\n{}\n\n", req.code));

    match format {
        ReplyFormat::CodeOnly => user.push_str(&format!(
            "You will be provided with code in {lang} and optionally coding standards. \
Your task is to generate standardized code.\n\n\
Instructions:\n\
1. Return only {lang} code. No markdown, no extra text.\n\
2. If coding standards are provided, follow them strictly.\n\
3. Ensure the code can run without modification."
        )),
        ReplyFormat::TwoFieldJson => user.push_str(&format!(
            "You will be provided with code in {lang} and optionally coding standards. \
Your task is to generate standardized code and test cases for it.\n\n\
Instructions:\n\
1. Return a single JSON object with exactly two string fields: \
\"standardized_code\" and \"test_cases\". No markdown, no extra text.\n\
2. Both fields must contain only {lang} code.\n\
3. If coding standards are provided, follow them strictly.\n\
4. Ensure the code can run without modification."
        )),
    }

    ChatPrompt {
        system: req.system_prompt.clone(),
        user,
    }
}

pub fn build_test_prompt(
    language: Language,
    standardized_code: &str,
    system_prompt: &str,
) -> ChatPrompt {
    let lang = language.as_hint();
    let user = format!(
        "Generate test cases in {lang} to validate the functionality of the following code:\n\n\
{standardized_code}\n\n\
Return only {lang} code. No markdown, no extra text."
    );

    ChatPrompt {
        system: system_prompt.to_string(),
        user,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeAndTests {
    pub standardized_code: String,
    pub test_cases: String,
}

#[derive(Debug, Error)]
#[error("reply was not the expected two-field JSON payload")]
pub struct ReplyParseError {
    pub raw: String,
}

/// Strict parse of the structured reply. Non-conforming payloads are rejected,
/// never evaluated; the raw text rides along for display.
pub fn parse_structured_reply(raw: &str) -> Result<CodeAndTests, ReplyParseError> {
    let cleaned = strip_code_fence(raw);
    serde_json::from_str(cleaned.trim()).map_err(|_| ReplyParseError {
        raw: raw.to_string(),
    })
}

pub struct Standardizer<C: LlmClient> {
    pub client: C,
    pub model: String,
    pub params: SamplingParams,
    pub progress_mode: ProgressMode,
}

impl<C: LlmClient> Standardizer<C> {
    fn report(&self, stage: &str) {
        if !matches!(self.progress_mode, ProgressMode::Silent) {
            eprintln!("[codetidy] {stage} via model {}", self.model);
        }
    }

    pub fn standardize(&self, req: &StandardizeRequest) -> Result<String> {
        req.validate()?;
        self.report("standardizing code");
        let prompt = build_standardize_prompt(req, ReplyFormat::CodeOnly);
        let raw = self.client.complete(&prompt, &self.model, &self.params)?;
        if matches!(self.progress_mode, ProgressMode::Verbose) {
            eprintln!("[codetidy] received {} chars", raw.len());
        }
        Ok(strip_code_fence(&raw))
    }

    pub fn generate_tests(
        &self,
        language: Language,
        standardized_code: &str,
        system_prompt: &str,
    ) -> Result<String> {
        if standardized_code.trim().is_empty() {
            return Err(anyhow!("standardized code must not be empty"));
        }
        self.report("generating test cases");
        let prompt = build_test_prompt(language, standardized_code, system_prompt);
        let raw = self.client.complete(&prompt, &self.model, &self.params)?;
        Ok(strip_code_fence(&raw))
    }

    /// Single-call variant: one completion returns both the standardized code
    /// and the test cases as a two-field JSON object.
    pub fn standardize_with_tests(&self, req: &StandardizeRequest) -> Result<CodeAndTests> {
        req.validate()?;
        self.report("standardizing code and generating test cases");
        let prompt = build_standardize_prompt(req, ReplyFormat::TwoFieldJson);
        let params = SamplingParams {
            max_tokens: self.params.max_tokens.max(2048),
            ..self.params
        };
        let raw = self.client.complete(&prompt, &self.model, &params)?;
        Ok(parse_structured_reply(&raw)?)
    }
}
