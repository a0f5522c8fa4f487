//! TaskBreak - goal classification and task breakdown
//!
//! CLI entry point for running the breakdown pipeline by hand.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use taskbreak::cli::{Cli, Command, OutputFormat};
use taskbreak::config::Config;
use taskbreak::domain::{TaskGraph, TaskSet};
use taskbreak::extract::{extract_task_stubs, parse_consolidation};
use taskbreak::hooks::{AgentMessage, RecallConfig, TaskBreakdownPlugin, UserMessage, WorkingMemory};
use taskbreak::llm::{self, LlmClient, create_client};
use taskbreak::prompts::PromptLoader;
use taskbreak::sink::HttpItemSink;
use taskbreak::{BreakdownRun, ClassificationLabel, Classifier, LlmClassifier, Orchestrator, learning_labels};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = taskbreak::cli::get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "TaskBreak loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Chat { text } => cmd_chat(&config, &text).await,
        Command::Classify { text } => cmd_classify(&config, &text).await,
        Command::Breakdown { goal, format } => cmd_breakdown(&config, &goal, format).await,
        Command::Extract {
            file,
            consolidated,
            format,
        } => cmd_extract(file.as_deref(), consolidated, format),
        Command::Prompts => cmd_prompts(&config),
    }
}

fn prompt_loader(config: &Config) -> Arc<PromptLoader> {
    Arc::new(PromptLoader::new(config.prompts.dir.as_deref()))
}

/// Validated config plus a live client
fn connect(config: &Config) -> Result<Arc<dyn LlmClient>> {
    debug!("connect: called");
    config.validate()?;
    Ok(create_client(&config.llm)?)
}

/// Run one turn through every hook, using the model as the host's generator
async fn cmd_chat(config: &Config, text: &str) -> Result<()> {
    debug!(%text, "cmd_chat: called");
    let llm = connect(config)?;
    let orchestrator = Orchestrator::with_llm_classifier(llm.clone(), prompt_loader(config), config.breakdown.clone());
    let mut plugin = TaskBreakdownPlugin::new(Arc::new(orchestrator));
    if let Some(sink) = HttpItemSink::from_config(&config.sink)? {
        println!("{} mirroring tasks to {}", "sink".dimmed(), sink.url());
        plugin = plugin.with_sink(Arc::new(sink));
    }

    let recall = plugin.before_recall(RecallConfig::default());
    println!("{} k = {}", "recall".dimmed(), recall.k);

    let mut memory = WorkingMemory::default();
    let message = plugin.before_read(UserMessage::new(text), &mut memory).await;
    if memory.hacked {
        println!("{} {}", "rewritten".dimmed(), message.text);
    } else {
        println!("{} message passed through", "read".dimmed());
    }

    let draft = llm::ask(llm.as_ref(), "", &message.text, config.llm.max_tokens)
        .await
        .context("Host generation failed")?;
    let outcome = plugin.process_reply(AgentMessage::new(draft)).await;

    match &outcome.graph {
        Some(graph) => print_graph(graph),
        None => println!("{}", outcome.message.text),
    }

    if let Some(publish) = outcome.publish {
        let published = publish.await.context("Sink publish task failed")?;
        println!("{} published {} items", "sink".dimmed(), published);
    }
    Ok(())
}

async fn cmd_classify(config: &Config, text: &str) -> Result<()> {
    debug!(%text, "cmd_classify: called");
    let llm = connect(config)?;
    let classifier = LlmClassifier::new(llm, prompt_loader(config), config.breakdown.classifier_max_tokens);
    let label = classifier.classify(text, &learning_labels()).await?;

    match ClassificationLabel::from_label(&label) {
        Some(ClassificationLabel::Learning) => println!("{}", label.green().bold()),
        _ => println!("{}", label.yellow().bold()),
    }
    Ok(())
}

async fn cmd_breakdown(config: &Config, goal: &str, format: OutputFormat) -> Result<()> {
    debug!(%goal, ?format, "cmd_breakdown: called");
    let llm = connect(config)?;
    let orchestrator = Orchestrator::with_llm_classifier(llm, prompt_loader(config), config.breakdown.clone());

    let mut run = BreakdownRun::new();
    let result = orchestrator.breakdown(&mut run, goal).await;
    let states: Vec<String> = run.history().iter().map(ToString::to_string).collect();
    eprintln!("{} {}", "states".dimmed(), states.join(" -> "));

    let graph = result?;
    match format {
        OutputFormat::Text => print_graph(&graph),
        OutputFormat::Json => println!("{}", graph.to_pretty_json()?),
    }
    Ok(())
}

fn cmd_extract(file: Option<&Path>, consolidated: bool, format: OutputFormat) -> Result<()> {
    debug!(?file, consolidated, ?format, "cmd_extract: called");
    let input = read_input(file)?;

    if consolidated {
        let graph = parse_consolidation(&input)?;
        match format {
            OutputFormat::Text => print_graph(&graph),
            OutputFormat::Json => println!("{}", graph.to_pretty_json()?),
        }
        return Ok(());
    }

    let stubs = extract_task_stubs(&input);
    match format {
        OutputFormat::Text => print_stubs(&stubs),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stubs.names())?),
    }
    Ok(())
}

fn cmd_prompts(config: &Config) -> Result<()> {
    debug!("cmd_prompts: called");
    let loader = prompt_loader(config);
    println!("{}", "Prompt templates:".bright_cyan());
    for (name, source) in loader.list() {
        println!("  {:14} {}", name.yellow(), source);
    }
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn print_stubs(stubs: &TaskSet) {
    if stubs.is_empty() {
        println!("{}", "No valid task stubs".dimmed());
        return;
    }
    for task in stubs {
        println!("  {:14} {}", task.task_id.yellow(), task.name);
    }
}

fn print_graph(graph: &TaskGraph) {
    println!("{}", "Tasks:".bright_cyan().bold());
    for task in &graph.tasks {
        let hours = task
            .estimation
            .map(|h| format!("{}h", h))
            .unwrap_or_else(|| "?".to_string());
        println!("  {:>3}. {} {}", task.id, task.name_of_the_task.bold(), format!("({})", hours).dimmed());
        if !task.description.is_empty() {
            println!("       {}", task.description);
        }
        if !task.dependencies.is_empty() {
            let deps: Vec<String> = task.dependencies.iter().map(u64::to_string).collect();
            println!("       {} {}", "after".dimmed(), deps.join(", "));
        }
    }
    println!("{} {}h", "Total:".bright_cyan(), graph.total_hours());
}
