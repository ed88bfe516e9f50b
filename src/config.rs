//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.clarifier.toml` files.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".clarifier.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Which vendor API backs extraction and analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI-compatible chat completions API
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl ProviderKind {
    fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenAi => "https://api.openai.com",
        }
    }

    fn default_extraction_model(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "llama3.2-vision:latest",
            ProviderKind::OpenAi => "gpt-4o",
        }
    }

    fn default_analysis_model(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "llama3.1:latest",
            ProviderKind::OpenAi => "gpt-4o",
        }
    }
}

/// LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API flavor.
    #[serde(default)]
    pub kind: ProviderKind,

    /// API base URL. Defaults per provider kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key (OpenAI only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used to extract text from attachments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_model: Option<String>,

    /// Model used for the structured analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_model: Option<String>,

    /// Temperature for the analysis call. Kept low for schema-constrained output.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP client timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            api_key_env: default_api_key_env(),
            extraction_model: None,
            analysis_model: None,
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Effective base URL, without a trailing slash.
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.kind.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn extraction_model(&self) -> String {
        self.extraction_model
            .clone()
            .unwrap_or_else(|| self.kind.default_extraction_model().to_string())
    }

    pub fn analysis_model(&self) -> String {
        self.analysis_model
            .clone()
            .unwrap_or_else(|| self.kind.default_analysis_model().to_string())
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> u64 {
    300 // vision extraction of multi-page PDFs can be slow
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum accepted request body in bytes (base64 attachments included).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format of the terminal front-end.
    #[serde(default)]
    pub format: OutputFormat,

    /// How many critical risks to highlight.
    #[serde(default = "default_top_risks")]
    pub top_risks: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            top_risks: default_top_risks(),
        }
    }
}

fn default_top_risks() -> usize {
    crate::enrichment::TOP_CRITICAL_RISKS
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.clarifier.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(kind) = args.provider {
            self.provider.kind = kind;
        }
        if let Some(ref url) = args.provider_url {
            self.provider.base_url = Some(url.clone());
        }
        if let Some(ref model) = args.model {
            self.provider.analysis_model = Some(model.clone());
        }
        if let Some(ref model) = args.extraction_model {
            self.provider.extraction_model = Some(model.clone());
        }
        if let Some(temperature) = args.temperature {
            self.provider.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.provider.timeout_seconds = timeout;
        }

        match &args.command {
            crate::cli::Command::Serve(serve) => {
                if let Some(ref bind) = serve.bind {
                    self.server.bind = bind.clone();
                }
            }
            crate::cli::Command::Analyze(analyze) => {
                if let Some(format) = analyze.format {
                    self.report.format = format;
                }
            }
            crate::cli::Command::InitConfig => {}
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, ServeArgs};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.kind, ProviderKind::Ollama);
        assert_eq!(config.provider.base_url(), "http://localhost:11434");
        assert_eq!(config.provider.temperature, 0.2);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.report.top_risks, 3);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[provider]
kind = "openai"
base_url = "https://llm.internal.example/"
analysis_model = "gpt-4.1"
temperature = 0.1

[server]
bind = "0.0.0.0:8080"

[report]
format = "json"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.provider.base_url(), "https://llm.internal.example");
        assert_eq!(config.provider.analysis_model(), "gpt-4.1");
        assert_eq!(config.provider.extraction_model(), "gpt-4o");
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.server.max_body_bytes, 20 * 1024 * 1024);
        assert_eq!(config.report.format, OutputFormat::Json);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[provider]\ntimeout_seconds = 42\n",
        )
        .unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.provider.timeout_seconds, 42);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[provider\nkind = ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_merge_with_args_only_overrides_explicit_values() {
        let mut config = Config::default();
        config.provider.timeout_seconds = 99;

        let args = Args {
            command: crate::cli::Command::Serve(ServeArgs {
                bind: Some("0.0.0.0:9000".to_string()),
            }),
            config: None,
            verbose: false,
            quiet: false,
            provider: Some(ProviderKind::OpenAi),
            provider_url: None,
            model: Some("gpt-4o-mini".to_string()),
            extraction_model: None,
            temperature: None,
            timeout: None,
        };
        config.merge_with_args(&args);

        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.provider.analysis_model(), "gpt-4o-mini");
        assert_eq!(config.provider.timeout_seconds, 99);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[provider]"));
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[report]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.server.bind, "127.0.0.1:3000");
    }
}
