//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::ProviderKind;
use crate::extraction::{is_supported_attachment, mime_from_path};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Clarifier - find what a feature description leaves unsaid
///
/// Analyzes a feature description (typed, or extracted from an image or
/// document) for implicit assumptions, system risks and predicted UX
/// problems before design starts.
///
/// Examples:
///   clarifier analyze --title Login --text "Users can reset their password via email."
///   clarifier analyze --file wireframe.png --interactive
///   clarifier analyze --text-file brief.md --notes "Links expire after 1h" --format json
///   clarifier serve --bind 0.0.0.0:3000
///   clarifier init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .clarifier.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Provider backing extraction and analysis (ollama, openai)
    #[arg(long, value_name = "KIND", env = "CLARIFIER_PROVIDER", global = true)]
    pub provider: Option<ProviderKind>,

    /// Provider API base URL
    #[arg(long, value_name = "URL", env = "CLARIFIER_PROVIDER_URL", global = true)]
    pub provider_url: Option<String>,

    /// Model used for analysis
    #[arg(short, long, env = "CLARIFIER_MODEL", global = true)]
    pub model: Option<String>,

    /// Model used for text extraction (must read images)
    #[arg(long, value_name = "MODEL", global = true)]
    pub extraction_model: Option<String>,

    /// Temperature for analysis responses (0.0 - 1.0)
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP API (POST /api/extract, POST /api/analyze)
    Serve(ServeArgs),

    /// Analyze one feature description from the terminal
    Analyze(AnalyzeArgs),

    /// Generate a default .clarifier.toml configuration file
    InitConfig,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to listen on, e.g. 127.0.0.1:3000
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Feature title
    #[arg(long)]
    pub title: Option<String>,

    /// Product context (audience, platform, constraints)
    #[arg(long)]
    pub context: Option<String>,

    /// Feature description
    #[arg(long, conflicts_with = "text_file")]
    pub text: Option<String>,

    /// Read the feature description from a file
    #[arg(long, value_name = "FILE")]
    pub text_file: Option<PathBuf>,

    /// Attach an image, PDF, text or Word document
    ///
    /// Text is extracted from it first and merged with the description.
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Clarification notes for one refinement pass after the first result
    #[arg(long)]
    pub notes: Option<String>,

    /// Prompt for clarification notes and offer retries on errors
    #[arg(short, long)]
    pub interactive: bool,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate provider URL format
        if let Some(ref url) = self.provider_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Provider URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Validate temperature range
        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match &self.command {
            Command::Analyze(analyze) => analyze.validate(),
            Command::Serve(_) | Command::InitConfig => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

impl AnalyzeArgs {
    /// Validate the analyze inputs: something to analyze, readable files,
    /// and a supported attachment type.
    pub fn validate(&self) -> Result<(), String> {
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && self.text_file.is_none() && self.file.is_none() {
            return Err(
                "Please provide a feature description (--text, --text-file) or attach a file (--file)"
                    .to_string(),
            );
        }

        if let Some(ref path) = self.text_file {
            if !path.is_file() {
                return Err(format!("Text file does not exist: {}", path.display()));
            }
        }

        if let Some(ref path) = self.file {
            if !path.is_file() {
                return Err(format!("Attachment does not exist: {}", path.display()));
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mime = mime_from_path(path).unwrap_or_default();
            if !is_supported_attachment(&name, mime) {
                return Err(format!(
                    "Unsupported attachment type: {} (use an image, PDF, .txt or .docx file)",
                    path.display()
                ));
            }
        }

        if let Some(ref notes) = self.notes {
            if notes.trim().is_empty() {
                return Err("Clarification notes must not be blank".to_string());
            }
        }

        Ok(())
    }
}
