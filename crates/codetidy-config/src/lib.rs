use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressSetting {
    Auto,
    Silent,
    Verbose,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub lang: Option<String>,
    pub timeout_secs: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub progress: Option<ProgressSetting>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub lang: Option<String>,
    pub timeout_secs: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub progress: Option<ProgressSetting>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub lang: Option<String>,
    pub timeout_secs: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub verbose: Option<bool>,
    pub no_progress: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunDefaults {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub lang: Option<String>,
    pub timeout_secs: u64,
    pub host: String,
    pub port: u16,
    pub progress: ProgressSetting,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 1024,
            lang: None,
            timeout_secs: 30,
            host: "127.0.0.1".to_string(),
            port: 8787,
            progress: ProgressSetting::Auto,
        }
    }
}

pub fn load_file_config(explicit_path: Option<&Path>, cwd: &Path) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = cwd.join("codetidy.json");
            if candidate.exists() {
                candidate
            } else {
                let home_candidate = dirs::home_dir().map(|home| home.join(".codetidy.json"));
                match home_candidate {
                    Some(p) if p.exists() => p,
                    _ => return Ok(None),
                }
            }
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self {
            model: env::var("CODETIDY_MODEL").ok(),
            base_url: env::var("GROQ_BASE_URL").ok(),
            api_key: env::var("GROQ_API_KEY").ok(),
            temperature: env::var("CODETIDY_TEMPERATURE")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            top_p: env::var("CODETIDY_TOP_P")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            max_tokens: env::var("CODETIDY_MAX_TOKENS")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            lang: env::var("CODETIDY_LANG").ok(),
            timeout_secs: env::var("CODETIDY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            host: env::var("CODETIDY_HOST").ok(),
            port: env::var("CODETIDY_PORT")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            progress: env::var("CODETIDY_PROGRESS")
                .ok()
                .and_then(|v| parse_progress(&v)),
        }
    }
}

pub fn resolve_run_defaults(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> RunDefaults {
    let base = RunDefaults::default();

    let model = cli
        .model
        .clone()
        .or_else(|| env_cfg.model.clone())
        .or_else(|| file_cfg.and_then(|c| c.model.clone()))
        .unwrap_or(base.model);

    let base_url = cli
        .base_url
        .clone()
        .or_else(|| env_cfg.base_url.clone())
        .or_else(|| file_cfg.and_then(|c| c.base_url.clone()))
        .unwrap_or(base.base_url);

    let api_key = env_cfg
        .api_key
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.api_key.clone()))
        .or(base.api_key);

    let temperature = env_cfg
        .temperature
        .or(file_cfg.and_then(|c| c.temperature))
        .unwrap_or(base.temperature);

    let top_p = env_cfg
        .top_p
        .or(file_cfg.and_then(|c| c.top_p))
        .unwrap_or(base.top_p);

    let max_tokens = cli
        .max_tokens
        .or(env_cfg.max_tokens)
        .or(file_cfg.and_then(|c| c.max_tokens))
        .unwrap_or(base.max_tokens);

    let lang = cli
        .lang
        .clone()
        .or_else(|| env_cfg.lang.clone())
        .or_else(|| file_cfg.and_then(|c| c.lang.clone()))
        .or(base.lang);

    let timeout_secs = cli
        .timeout_secs
        .or(env_cfg.timeout_secs)
        .or(file_cfg.and_then(|c| c.timeout_secs))
        .unwrap_or(base.timeout_secs);

    let host = cli
        .host
        .clone()
        .or_else(|| env_cfg.host.clone())
        .or_else(|| file_cfg.and_then(|c| c.host.clone()))
        .unwrap_or(base.host);

    let port = cli
        .port
        .or(env_cfg.port)
        .or(file_cfg.and_then(|c| c.port))
        .unwrap_or(base.port);

    let mut progress = env_cfg
        .progress
        .or(file_cfg.and_then(|c| c.progress))
        .unwrap_or(base.progress);

    if cli.verbose == Some(true) {
        progress = ProgressSetting::Verbose;
    }
    if cli.no_progress == Some(true) {
        progress = ProgressSetting::Silent;
    }

    RunDefaults {
        model,
        base_url,
        api_key,
        temperature,
        top_p,
        max_tokens,
        lang,
        timeout_secs,
        host,
        port,
        progress,
    }
}

fn parse_progress(input: &str) -> Option<ProgressSetting> {
    match input.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ProgressSetting::Auto),
        "silent" => Some(ProgressSetting::Silent),
        "verbose" => Some(ProgressSetting::Verbose),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CliOverrides, EnvConfig, FileConfig, ProgressSetting, load_file_config,
        resolve_run_defaults,
    };
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn valid_config_parses() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("codetidy.json");
        fs::write(&path, r#"{"model":"llama-x","max_tokens":2048}"#).expect("write should work");

        let parsed = load_file_config(None, dir.path())
            .expect("parse should work")
            .expect("file should exist");
        assert_eq!(parsed.model.as_deref(), Some("llama-x"));
        assert_eq!(parsed.max_tokens, Some(2048));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("codetidy.json");
        fs::write(&path, r#"{"unknown":1}"#).expect("write should work");

        let err = load_file_config(None, dir.path()).expect_err("parse should fail");
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn malformed_json_has_location() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("codetidy.json");
        fs::write(&path, "{\n  \"model\":\n").expect("write should work");

        let err = load_file_config(None, dir.path()).expect_err("parse should fail");
        assert!(
            format!("{err:#}").contains("line") || format!("{err:#}").contains("column"),
            "expected location details, got: {err}"
        );
    }

    #[test]
    fn precedence_cli_env_file_defaults() {
        let file = FileConfig {
            model: Some("from-file".to_string()),
            max_tokens: Some(512),
            progress: Some(ProgressSetting::Verbose),
            ..FileConfig::default()
        };

        let env_cfg = EnvConfig {
            model: Some("from-env".to_string()),
            timeout_secs: Some(10),
            ..EnvConfig::default()
        };

        let cli = CliOverrides {
            model: Some("from-cli".to_string()),
            no_progress: Some(true),
            ..CliOverrides::default()
        };

        let resolved = resolve_run_defaults(&cli, &env_cfg, Some(&file));
        assert_eq!(resolved.model, "from-cli");
        assert_eq!(resolved.max_tokens, 512);
        assert_eq!(resolved.timeout_secs, 10);
        assert_eq!(resolved.progress, ProgressSetting::Silent);
    }

    #[test]
    fn defaults_match_hosted_api_contract() {
        let resolved = resolve_run_defaults(
            &CliOverrides::default(),
            &EnvConfig::default(),
            None,
        );
        assert_eq!(resolved.temperature, 1.0);
        assert_eq!(resolved.top_p, 1.0);
        assert_eq!(resolved.max_tokens, 1024);
        assert!(resolved.base_url.contains("groq.com"));
    }
}
