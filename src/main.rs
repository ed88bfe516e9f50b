//! Clarifier - LLM-powered feature clarity analyzer
//!
//! Reads a feature description (typed, or extracted from an attached image
//! or document), asks a model for a structured clarity analysis and
//! presents assumptions, risks and predicted UX problems before design
//! starts. Runs as a terminal tool or as a small HTTP API.
//!
//! Exit codes:
//!   0 - Success (analysis presented, or server stopped cleanly)
//!   1 - Runtime error (configuration, provider setup, I/O, etc.)
//!   2 - The session ended with a failed extraction or analysis

mod analysis;
mod cli;
mod config;
mod enrichment;
mod extraction;
mod llm;
mod models;
mod report;
mod schema;
mod server;
mod session;

use analysis::AnalysisGateway;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{AnalyzeArgs, Args, Command, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use extraction::{is_supported_attachment, mime_from_path, ExtractionGateway};
use indicatif::{ProgressBar, ProgressStyle};
use models::{FeatureRequest, FileRef};
use report::{ClarityReport, ReportMetadata};
use session::{OrchestrationController, Phase};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Clarifier v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let outcome = match load_config(&args) {
        Ok(config) => run(args, config).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Clarifier failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .clarifier.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to choose a provider, models, server address and report format.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        // An explicit path must load
        info!("Loading config from: {}", config_path.display());
        Config::load(config_path)?
    } else {
        match Config::load_default() {
            Ok(Some(config)) => {
                info!("Loaded default config from {}", CONFIG_FILE_NAME);
                config
            }
            Ok(None) => {
                debug!("No config file found, using defaults");
                Config::default()
            }
            Err(e) => {
                warn!("Failed to load config: {:#}", e);
                Config::default()
            }
        }
    };

    config.merge_with_args(args);
    Ok(config)
}

async fn run(args: Args, config: Config) -> Result<i32> {
    let providers =
        llm::create_providers(&config.provider).context("Failed to set up the provider")?;
    let extraction = ExtractionGateway::new(providers.extraction);
    let analysis = AnalysisGateway::new(providers.analysis, config.provider.temperature);

    match args.command {
        Command::Serve(_) => {
            println!("🌐 Starting Clarifier API");
            println!("   Provider: {}", config.provider.kind);
            println!("   Analysis model: {}", config.provider.analysis_model());
            println!("   Extraction model: {}", config.provider.extraction_model());

            let state = Arc::new(server::AppState {
                extraction,
                analysis,
            });
            server::serve(state, &config.server.bind, config.server.max_body_bytes).await?;
            Ok(0)
        }
        Command::Analyze(ref analyze) => {
            let controller = OrchestrationController::new(extraction, analysis);
            run_analysis(controller, analyze, &config, args.quiet).await
        }
        Command::InitConfig => Ok(0),
    }
}

/// Build the feature request from the analyze arguments.
fn build_request(analyze: &AnalyzeArgs) -> Result<FeatureRequest> {
    let feature_text = match (&analyze.text, &analyze.text_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => String::new(),
    };

    let attached_file = match analyze.file {
        Some(ref path) => Some(read_attachment(path)?),
        None => None,
    };

    Ok(FeatureRequest {
        title: analyze.title.clone(),
        context: analyze.context.clone(),
        feature_text,
        attached_file,
    })
}

fn read_attachment(path: &Path) -> Result<FileRef> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = mime_from_path(path)
        .with_context(|| format!("Unsupported attachment type: {}", path.display()))?
        .to_string();

    info!("Attaching {} ({}, {} bytes)", name, mime_type, bytes.len());
    Ok(FileRef {
        name,
        mime_type,
        bytes,
    })
}

/// Shows a spinner while an external call is in flight.
#[derive(Clone, Default)]
struct PhaseProgress {
    bar: Arc<Mutex<Option<ProgressBar>>>,
    hidden: bool,
}

impl PhaseProgress {
    fn new(hidden: bool) -> Self {
        Self {
            hidden,
            ..Self::default()
        }
    }

    fn update(&self, phase: Phase) {
        if self.hidden {
            return;
        }
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };

        let message = match phase {
            Phase::Extracting => "Extracting text from the attachment...",
            Phase::Analyzing => "Analyzing feature clarity...",
            _ => {
                if let Some(bar) = slot.take() {
                    bar.finish_and_clear();
                }
                return;
            }
        };

        let bar = slot.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        bar.set_message(message);
    }
}

/// Drive one terminal session. Returns the exit code (0 or 2).
async fn run_analysis(
    controller: OrchestrationController,
    analyze: &AnalyzeArgs,
    config: &Config,
    quiet: bool,
) -> Result<i32> {
    let start_time = Instant::now();
    let progress = PhaseProgress::new(quiet);
    let listener = progress.clone();
    let mut controller = controller.with_phase_listener(move |phase| listener.update(phase));

    let request = build_request(analyze)?;
    let mut source_file = request.attached_file.as_ref().map(|f| f.name.clone());
    let feature_title = request
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| analysis::prompt::UNTITLED_FEATURE.to_string());

    println!("🔬 Analyzing \"{}\"", feature_title);
    println!(
        "   Provider: {} ({})",
        config.provider.kind,
        config.provider.analysis_model()
    );

    controller.run(request).await?;

    let mut refinements = 0;
    let mut pending_notes = analyze.notes.clone();

    loop {
        match controller.phase() {
            Phase::Presenting => {
                if let Some(notes) = pending_notes.take() {
                    println!("\n🔁 Refining with clarification notes...");
                    controller.refine(&notes).await?;
                    refinements += 1;
                    continue;
                }
                if !analyze.interactive {
                    break;
                }

                let report = build_report(
                    &controller,
                    config,
                    &feature_title,
                    source_file.as_deref(),
                    refinements,
                    start_time,
                )?;
                println!("\n{}", render(&report, config.report.format)?);

                let notes = prompt_line("\n📝 Clarification notes (leave empty to finish): ")?;
                if notes.trim().is_empty() {
                    break;
                }
                pending_notes = Some(notes);
            }
            Phase::Errored => {
                let Some(error) = controller.last_error().cloned() else {
                    break;
                };
                eprintln!("\n{}", report::generate_error_report(&error));
                if !analyze.interactive {
                    return Ok(2);
                }

                if error.is_extraction_origin() {
                    let choice =
                        prompt_line("[r]etry, paste [t]ext, try another [f]ile, or [q]uit? ")?;
                    let recovery = match choice.trim().to_lowercase().as_str() {
                        "r" | "retry" => Recovery::Retry,
                        "t" | "text" => Recovery::PasteText(prompt_line("Feature description: ")?),
                        "f" | "file" => {
                            let path = prompt_line("Path to file: ")?;
                            Recovery::AnotherFile(PathBuf::from(path.trim()))
                        }
                        _ => Recovery::Quit,
                    };
                    if !recover_from_extraction(&mut controller, recovery, &mut source_file)
                        .await?
                    {
                        return Ok(2);
                    }
                } else {
                    let choice = prompt_line("[r]etry or [q]uit? ")?;
                    if !matches!(choice.trim().to_lowercase().as_str(), "r" | "retry") {
                        return Ok(2);
                    }
                    controller.retry().await?;
                }
            }
            Phase::Idle | Phase::Extracting | Phase::Analyzing => break,
        }
    }

    if controller.phase() != Phase::Presenting {
        return Ok(2);
    }

    let report = build_report(
        &controller,
        config,
        &feature_title,
        source_file.as_deref(),
        refinements,
        start_time,
    )?;
    let output = render(&report, config.report.format)?;

    match analyze.output {
        Some(ref path) => {
            report::write_report(&output, path)?;
            println!("\n✅ Analysis complete! Report saved to: {}", path.display());
        }
        None if analyze.interactive => {
            println!("\n✅ Analysis complete.");
        }
        None => println!("\n{}", output),
    }

    let enrichment = &report.enrichment;
    println!("\n📊 Clarity Summary:");
    println!(
        "   Ambiguity score: {}/100 | Rework probability: {}%",
        enrichment.ambiguity_score, enrichment.rework_probability
    );
    println!(
        "   Items: {} ({} high severity)",
        enrichment.total_items, enrichment.high_count
    );
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

    Ok(0)
}

fn build_report(
    controller: &OrchestrationController,
    config: &Config,
    feature_title: &str,
    source_file: Option<&str>,
    refinements: usize,
    start_time: Instant,
) -> Result<ClarityReport> {
    let result = controller
        .result()
        .cloned()
        .context("No analysis result to report")?;
    let enrichment = controller
        .enrichment(config.report.top_risks)
        .context("No analysis result to report")?;

    Ok(ClarityReport {
        metadata: ReportMetadata {
            feature_title: feature_title.to_string(),
            analysis_date: Utc::now(),
            provider: config.provider.kind.to_string(),
            model_used: config.provider.analysis_model(),
            source_file: source_file.map(str::to_string),
            refinements,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        result,
        enrichment,
    })
}

fn render(report: &ClarityReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => report::generate_json_report(report),
        OutputFormat::Markdown => Ok(report::generate_markdown_report(report)),
    }
}

/// Answer to a failed extraction in the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Recovery {
    Retry,
    PasteText(String),
    AnotherFile(PathBuf),
    Quit,
}

/// Apply a recovery choice after an extraction error.
///
/// Returns `false` when the session should end. An unusable file leaves
/// the session in `Errored` so the menu is offered again.
async fn recover_from_extraction(
    controller: &mut OrchestrationController,
    recovery: Recovery,
    source_file: &mut Option<String>,
) -> Result<bool> {
    let attachment = match recovery {
        Recovery::Quit => return Ok(false),
        Recovery::Retry => {
            controller.retry().await?;
            return Ok(true);
        }
        Recovery::PasteText(text) => {
            controller.discard_attachment()?;
            let mut request = controller.state().request.clone().unwrap_or_default();
            if !text.trim().is_empty() {
                request.feature_text = text;
            }
            *source_file = None;
            return match controller.run(request).await {
                Ok(_) => Ok(true),
                Err(e) => {
                    eprintln!("{}", e);
                    Ok(false)
                }
            };
        }
        Recovery::AnotherFile(path) => path,
    };

    let name = attachment
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = mime_from_path(&attachment).unwrap_or_default();
    if !attachment.is_file() || !is_supported_attachment(&name, mime) {
        eprintln!(
            "Cannot use {} (use an existing image, PDF, .txt or .docx file)",
            attachment.display()
        );
        return Ok(true);
    }
    let file = match read_attachment(&attachment) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{:#}", e);
            return Ok(true);
        }
    };

    controller.discard_attachment()?;
    let mut request = controller.state().request.clone().unwrap_or_default();
    request.attached_file = Some(file);
    *source_file = Some(name);
    controller.run(request).await?;
    Ok(true)
}

fn prompt_line(question: &str) -> Result<String> {
    print!("{}", question);
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
