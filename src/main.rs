// specforge - requirements refinement from the command line
// Main entry point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use specforge::budget::{estimate_tokens, TokenBudgetManager};
use specforge::config::{apply_model_override, load_config, load_config_from, Config};
use specforge::context::{collect_project_notes, ContextRelevanceBuilder, LocalWorkspace};
use specforge::logging::{init_tracing, TranscriptLogger};
use specforge::model::{ModelChannel, ReplayModel};
use specforge::protocol::{AwaitReason, Persona, Phase};
use specforge::refinement::{EventReceiver, RefinementSession, SessionEvent};

#[derive(Parser)]
#[command(name = "specforge", version)]
#[command(about = "Turn feature requests into implementation-ready requirements", long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model id used to size the token budget
    #[arg(long, global = true)]
    model: Option<String>,

    /// Config file instead of ~/.specforge/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble and print the workspace context for a request
    Context {
        request: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Token budget; defaults to the analyst allocation
        #[arg(long)]
        budget: Option<usize>,
    },
    /// Show stage allocations for a model, optionally sizing a file
    Budget {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Run a refinement session against recorded model responses
    Refine {
        request: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// JSON array of recorded responses
        #[arg(long)]
        replay: PathBuf,
        /// Append session events to this JSONL file
        #[arg(long)]
        transcript: Option<PathBuf>,
        /// Write the approved document here
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let config = apply_model_override(config, cli.model);

    match cli.command {
        Commands::Context { request, root, budget } => run_context(&config, &request, &root, budget).await,
        Commands::Budget { file } => run_budget(&config, file.as_deref()).await,
        Commands::Refine {
            request,
            root,
            replay,
            transcript,
            output,
        } => run_refine(&config, &request, &root, &replay, transcript, output).await,
    }
}

fn context_builder(config: &Config, root: &Path) -> Result<ContextRelevanceBuilder> {
    if !root.is_dir() {
        bail!("Workspace root {} is not a directory", root.display());
    }
    let workspace = Arc::new(LocalWorkspace::new(root));
    Ok(ContextRelevanceBuilder::new(
        root,
        workspace.clone(),
        workspace,
        config.context.clone(),
    ))
}

async fn run_context(config: &Config, request: &str, root: &Path, budget: Option<usize>) -> Result<()> {
    let builder = context_builder(config, root)?;
    let budget = budget.unwrap_or_else(|| {
        TokenBudgetManager::for_model(&config.model, config).available_tokens(Persona::Analyst)
    });

    let context = builder
        .build_context(request, budget)
        .await
        .context("Failed to build workspace context")?;

    println!("{} {:?}", "Strategy:".bold(), context.strategy);
    println!("{} {}", "Keywords:".bold(), context.keywords.join(", "));
    println!(
        "{} {} full, {} skeleton, ~{} / {} tokens",
        "Files:".bold(),
        context.full_content_files,
        context.skeleton_files,
        context.estimated_tokens,
        budget
    );
    for file in &context.files {
        println!(
            "  {} {} {}",
            format!("{:>4}", file.score).cyan(),
            file.relative_path,
            format!("({} matches)", file.match_count).dark_grey()
        );
    }
    println!("{}", "─".repeat(60).dark_grey());
    println!("{}", context.content);
    Ok(())
}

async fn run_budget(config: &Config, file: Option<&Path>) -> Result<()> {
    let manager = TokenBudgetManager::for_model(&config.model, config);
    let state = manager.state();

    println!("{} {}", "Model:".bold(), config.model);
    println!("{} {} tokens", "Limit:".bold(), state.max_tokens);
    println!("{} {} tokens", "Usable:".bold(), manager.remaining_tokens());
    for stage in [Persona::Analyst, Persona::Critic, Persona::Refiner] {
        println!(
            "  {:<8} {:>6} tokens {}",
            stage.as_str(),
            manager.available_tokens(stage),
            format!("({:.0}%)", manager.stage_ratio(stage) * 100.0).dark_grey()
        );
    }

    if let Some(path) = file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let tokens = estimate_tokens(&text);
        println!("{} {} ~{} tokens", "File:".bold(), path.display(), tokens);
        for stage in [Persona::Analyst, Persona::Critic, Persona::Refiner] {
            let allocation = manager.available_tokens(stage);
            if tokens <= allocation {
                println!("  {:<8} {}", stage.as_str(), "fits".green());
            } else {
                let truncated = manager.truncate_context(&text, allocation);
                println!(
                    "  {:<8} {} to ~{} tokens",
                    stage.as_str(),
                    "truncated".yellow(),
                    truncated.truncated_tokens
                );
            }
        }
    }
    Ok(())
}

async fn run_refine(
    config: &Config,
    request: &str,
    root: &Path,
    replay: &Path,
    transcript: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let builder = Arc::new(context_builder(config, root)?);
    let model: Arc<dyn ModelChannel> = Arc::new(ReplayModel::load(config.model.clone(), replay).await?);
    let (mut session, mut events) = RefinementSession::new(request, model, builder, config);
    let mut transcript = match transcript {
        Some(path) => Some(TranscriptLogger::new(path, session.state().id.clone())?),
        None => None,
    };

    let notes = collect_project_notes(root).unwrap_or_default();
    let started = session.start(&notes).await;
    drain_events(&mut events, transcript.as_mut())?;
    started?;

    let mut rl = DefaultEditor::new()?;
    loop {
        let prompt = match session.phase() {
            Phase::AwaitingUser(AwaitReason::Clarification) => "answer (or 'refine', 'cancel')> ",
            Phase::AwaitingUser(AwaitReason::Approval) => "'approve', 'cancel', or feedback> ",
            phase if phase.is_terminal() => break,
            phase => bail!("Session stopped unexpectedly in {phase}"),
        };

        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                session.cancel()?;
                drain_events(&mut events, transcript.as_mut())?;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let result = match input {
            "cancel" => session.cancel(),
            "approve" => session.approve(),
            "refine" => session.trigger_refine().await,
            answer => session.handle_user_response(answer).await,
        };
        drain_events(&mut events, transcript.as_mut())?;

        match result {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                println!("{} {} (nothing was recorded, try again)", "⚠".yellow().bold(), e)
            }
            Err(e) => println!("{} {}", "⚠".yellow().bold(), e),
        }
    }

    if session.phase() == Phase::Approved {
        if let (Some(path), Some(artifact)) = (output, session.artifact()) {
            tokio::fs::write(&path, &artifact.raw_markdown)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Wrote {}", "✓".green().bold(), path.display());
        }
    }
    if let Some(logger) = transcript.as_mut() {
        logger.flush()?;
    }
    Ok(())
}

fn drain_events(events: &mut EventReceiver, mut transcript: Option<&mut TranscriptLogger>) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        if let Some(logger) = transcript.as_deref_mut() {
            logger.record(&event)?;
        }
        render_event(&event);
    }
    Ok(())
}

fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChange { from, to } => {
            println!("{}", format!("· {from} → {to}").dark_grey());
        }
        SessionEvent::Questions(questions) => {
            println!("\n{} {}", "▸".cyan().bold(), "Questions".bold());
            for (idx, q) in questions.iter().enumerate() {
                println!("  {}. {}", idx + 1, q.question);
                if let Some(options) = &q.options {
                    println!("     {}", options.join(" · ").cyan());
                }
            }
            println!();
        }
        SessionEvent::DraftReady(draft) => {
            println!("{} Draft ready (~{} tokens)", "✓".green(), estimate_tokens(draft));
        }
        SessionEvent::CritiqueReady(critique) => {
            let score = format!("{}/100", critique.confidence_score);
            let score = if critique.passed_validation { score.green() } else { score.red() };
            println!("{} Review confidence {}", "ℹ".yellow(), score);
            for issue in &critique.issues {
                println!(
                    "  [{}] {} {}",
                    issue.severity.as_str(),
                    issue.issue_type.as_str().yellow(),
                    issue.description
                );
            }
        }
        SessionEvent::ArtifactReady(artifact) => {
            println!("\n{} {}", "✓".green().bold(), artifact.title.clone().bold());
            println!("{}", "─".repeat(60).dark_grey());
            println!("{}", artifact.raw_markdown);
            println!("{}", "─".repeat(60).dark_grey());
        }
        SessionEvent::Progress(message) => println!("{}", message.clone().dark_grey()),
        SessionEvent::Error(message) => println!("{} {}", "⚠".red().bold(), message),
    }
}
