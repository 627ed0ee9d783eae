mod forms;
mod pages;
mod session;
mod web;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use codetidy_config::{
    CliOverrides, EnvConfig, ProgressSetting, RunDefaults, load_file_config, resolve_run_defaults,
};
use codetidy_core::{Language, ProgressMode, StandardizeRequest, Standardizer};
use codetidy_llm::SamplingParams;
use codetidy_llm_groq::GroqClient;
use codetidy_runner::RunLimits;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional software engineer. \
You rewrite code to a consistent, idiomatic style without changing its behavior.";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LanguageArg {
    Python,
    Javascript,
    Java,
    C,
    Cpp,
}

impl LanguageArg {
    fn as_language(self) -> Language {
        match self {
            LanguageArg::Python => Language::Python,
            LanguageArg::Javascript => Language::Javascript,
            LanguageArg::Java => Language::Java,
            LanguageArg::C => Language::C,
            LanguageArg::Cpp => Language::Cpp,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "codetidy", version, about = "Code standardizer and test runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args)]
struct CommonArgs {
    #[arg(long)]
    lang: Option<LanguageArg>,
    /// Style-guide document read as raw UTF-8 text.
    #[arg(long)]
    standards: Option<PathBuf>,
    #[arg(long)]
    system_prompt: Option<String>,
    /// Extra free-text instruction appended to the prompt.
    #[arg(long)]
    instructions: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    no_progress: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Standardize a source file and print the rewritten code.
    Standardize {
        file: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Standardize a file, generate test cases for it, and run them.
    Test {
        file: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
        /// Exported names the generated JavaScript tests should import.
        #[arg(long = "entry")]
        entry_points: Vec<String>,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Serve the browser workflow form.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        no_progress: bool,
    },
}

fn resolve_defaults(overrides: CliOverrides, config_path: Option<&Path>) -> Result<RunDefaults> {
    let cwd = std::env::current_dir().context("failed getting current directory")?;
    let file_cfg = load_file_config(config_path, &cwd)?;
    let env_cfg = EnvConfig::from_current_env();
    Ok(resolve_run_defaults(&overrides, &env_cfg, file_cfg.as_ref()))
}

fn progress_mode(setting: ProgressSetting) -> ProgressMode {
    match setting {
        ProgressSetting::Auto => ProgressMode::Minimal,
        ProgressSetting::Silent => ProgressMode::Silent,
        ProgressSetting::Verbose => ProgressMode::Verbose,
    }
}

fn build_standardizer(defaults: &RunDefaults) -> Result<Standardizer<GroqClient>> {
    let api_key = defaults
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("GROQ_API_KEY is required for the Groq API"))?;

    Ok(Standardizer {
        client: GroqClient::new(defaults.base_url.clone(), api_key),
        model: defaults.model.clone(),
        params: SamplingParams {
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            max_tokens: defaults.max_tokens,
        },
        progress_mode: progress_mode(defaults.progress),
    })
}

fn resolve_language(
    arg: Option<LanguageArg>,
    configured: Option<&str>,
    file: &Path,
) -> Result<Language> {
    if let Some(arg) = arg {
        return Ok(arg.as_language());
    }
    if let Some(hint) = configured
        && let Some(language) = Language::from_hint(hint)
    {
        return Ok(language);
    }
    file.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_hint)
        .ok_or_else(|| {
            anyhow!(
                "could not determine the target language for {}; pass --lang",
                file.display()
            )
        })
}

fn read_standards_doc(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    String::from_utf8(bytes).map_err(|_| {
        anyhow!(
            "could not read {} as UTF-8 text; use a text-based format",
            path.display()
        )
    })
}

fn standardize_request(
    file: &Path,
    common: &CommonArgs,
    defaults: &RunDefaults,
) -> Result<StandardizeRequest> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("failed reading source file {}", file.display()))?;
    let language = resolve_language(common.lang, defaults.lang.as_deref(), file)?;
    let standards_doc = common
        .standards
        .as_deref()
        .map(read_standards_doc)
        .transpose()?;

    Ok(StandardizeRequest {
        language,
        code,
        system_prompt: common
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        standards_doc,
        extra_instructions: common.instructions.clone(),
    })
}

fn common_overrides(common: &CommonArgs) -> CliOverrides {
    CliOverrides {
        model: common.model.clone(),
        base_url: common.base_url.clone(),
        max_tokens: common.max_tokens,
        verbose: common.verbose.then_some(true),
        no_progress: common.no_progress.then_some(true),
        ..CliOverrides::default()
    }
}

fn standardize_command(file: PathBuf, common: CommonArgs) -> Result<()> {
    let defaults = resolve_defaults(common_overrides(&common), common.config.as_deref())?;
    let standardizer = build_standardizer(&defaults)?;
    let req = standardize_request(&file, &common, &defaults)?;

    let standardized = standardizer
        .standardize(&req)
        .with_context(|| format!("failed standardizing {}", file.display()))?;
    println!("{standardized}");
    Ok(())
}

fn test_command(
    file: PathBuf,
    common: CommonArgs,
    entry_points: Vec<String>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let overrides = CliOverrides {
        timeout_secs,
        ..common_overrides(&common)
    };
    let defaults = resolve_defaults(overrides, common.config.as_deref())?;
    let standardizer = build_standardizer(&defaults)?;
    let req = standardize_request(&file, &common, &defaults)?;

    let standardized = standardizer
        .standardize(&req)
        .with_context(|| format!("failed standardizing {}", file.display()))?;
    println!("=== standardized code ===\n{standardized}\n");

    let tests = standardizer.generate_tests(req.language, &standardized, &req.system_prompt)?;
    println!("=== test cases ===\n{tests}\n");

    let limits = RunLimits {
        timeout: Duration::from_secs(defaults.timeout_secs),
    };
    let report =
        codetidy_runner::run_tests(req.language, &standardized, &tests, &entry_points, &limits)?;
    println!("=== test execution report ===\n{report}");
    Ok(())
}

fn serve_command(
    host: Option<String>,
    port: Option<u16>,
    config: Option<PathBuf>,
    model: Option<String>,
    base_url: Option<String>,
    verbose: bool,
    no_progress: bool,
) -> Result<()> {
    let overrides = CliOverrides {
        model,
        base_url,
        host,
        port,
        verbose: verbose.then_some(true),
        no_progress: no_progress.then_some(true),
        ..CliOverrides::default()
    };
    let defaults = resolve_defaults(overrides, config.as_deref())?;
    let standardizer = build_standardizer(&defaults)?;
    let limits = RunLimits {
        timeout: Duration::from_secs(defaults.timeout_secs),
    };

    web::serve(&defaults.host, defaults.port, standardizer, limits)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Standardize { file, common } => standardize_command(file, common),
        Commands::Test {
            file,
            common,
            entry_points,
            timeout_secs,
        } => test_command(file, common, entry_points, timeout_secs),
        Commands::Serve {
            host,
            port,
            config,
            model,
            base_url,
            verbose,
            no_progress,
        } => serve_command(host, port, config, model, base_url, verbose, no_progress),
    }
}
