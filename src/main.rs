//! war-room: earnings-call question and response prep from the command line
//!
//! Usage:
//!   war-room questions --count 5
//!   war-room respond --id q2
//!   war-room respond --question "Why did NRR decline?"
//!   war-room prepare --json
//!   war-room dashboard

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use earnings_war_room::clients::{AnthropicClient, TextGenerator};
use earnings_war_room::config::{Config, DEFAULT_LOG_FILTER, RuntimeConfig};
use earnings_war_room::ingest::TabularIngestor;
use earnings_war_room::reference::{
    self, DataSources, PerformanceSnapshot, competitive_context,
};
use earnings_war_room::schemas::{Question, QuestionBatch, ResponseDraft};
use earnings_war_room::{Generated, SessionController};

#[derive(Parser)]
#[command(name = "war-room")]
#[command(about = "Anticipate analyst questions and draft executive responses", long_about = None)]
struct Cli {
    /// Surface model and extraction failures instead of substituting sample content
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BatchArgs {
    /// Number of questions to generate
    #[arg(long)]
    count: Option<usize>,
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a batch of anticipated analyst questions
    Questions(BatchArgs),
    /// Draft an executive response to one question
    Respond {
        /// Id of a question from a freshly generated batch
        #[arg(long, conflicts_with = "question", required_unless_present = "question")]
        id: Option<String>,
        /// Free-text question to answer directly
        #[arg(long)]
        question: Option<String>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Generate questions, then a response for every question
    Prepare(BatchArgs),
    /// Print the performance snapshot and competitive context from the reference data
    Dashboard,
}

#[derive(Serialize)]
struct PrepEntry {
    question_id: String,
    response: Generated<ResponseDraft>,
}

#[derive(Serialize)]
struct PrepPack {
    questions: Generated<QuestionBatch>,
    responses: Vec<PrepEntry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Config loading logs, so the filter comes from the environment alone
    let runtime = RuntimeConfig::load_from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&runtime.log_level)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    if cli.strict {
        config.generation.fallback_on_error = false;
    }

    match cli.command {
        Commands::Questions(args) => questions(&config, args).await,
        Commands::Respond {
            id,
            question,
            batch,
        } => respond(&config, id, question, batch).await,
        Commands::Prepare(args) => prepare(&config, args).await,
        Commands::Dashboard => dashboard(&config).await,
    }
}

async fn build_session(config: &Config) -> Result<SessionController> {
    if config.runtime.api_key.is_none() {
        warn!("ANTHROPIC_API_KEY not set; model calls will fail");
    }
    let client = AnthropicClient::new(&config.model, config.runtime.api_key.clone())?;
    let generator: Arc<dyn TextGenerator> = Arc::new(client);
    let session = SessionController::from_config(generator, config);

    // Reference data only feeds the prompt when context is enabled; a failed load is not fatal here
    if config.generation.include_reference_context {
        let sources = DataSources::discover(&config.data);
        if let Err(e) = session
            .load_reference_data(&sources, ingestor(config))
            .await
        {
            warn!("Continuing without reference context: {}", e);
        }
    }
    Ok(session)
}

fn ingestor(config: &Config) -> TabularIngestor {
    TabularIngestor::new(config.data.delimiter as u8)
}

async fn questions(config: &Config, args: BatchArgs) -> Result<()> {
    let session = build_session(config).await?;
    let count = args
        .count
        .unwrap_or(config.generation.default_question_count);
    let batch = session.generate_questions(count).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        print_batch(&batch);
    }
    Ok(())
}

async fn respond(
    config: &Config,
    id: Option<String>,
    text: Option<String>,
    args: BatchArgs,
) -> Result<()> {
    let session = build_session(config).await?;
    let question = match (id, text) {
        (Some(id), _) => {
            let count = args
                .count
                .unwrap_or(config.generation.default_question_count);
            let batch = session.generate_questions(count).await?;
            let found = batch.artifact.iter().find(|q| q.id == id).cloned();
            match found {
                Some(q) => q,
                None => {
                    let ids: Vec<&str> = batch.artifact.iter().map(|q| q.id.as_str()).collect();
                    anyhow::bail!("No question with id '{}' in batch ({})", id, ids.join(", "));
                }
            }
        }
        (None, Some(text)) => Question::ad_hoc(text),
        (None, None) => anyhow::bail!("Either --id or --question is required"),
    };

    let draft = session.generate_response(question.clone()).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&draft)?);
    } else {
        print_question(&question);
        println!();
        print_draft(&draft);
    }
    Ok(())
}

async fn prepare(config: &Config, args: BatchArgs) -> Result<()> {
    let session = build_session(config).await?;
    let count = args
        .count
        .unwrap_or(config.generation.default_question_count);
    let batch = session.generate_questions(count).await?;

    let mut responses = Vec::with_capacity(batch.artifact.len());
    for question in &batch.artifact {
        let response = session.generate_response(question.clone()).await?;
        responses.push(PrepEntry {
            question_id: question.id.clone(),
            response,
        });
    }
    info!("Prepared {} responses", responses.len());

    if args.json {
        let pack = PrepPack {
            questions: batch,
            responses,
        };
        println!("{}", serde_json::to_string_pretty(&pack)?);
        return Ok(());
    }

    if batch.was_fallback {
        println!("[fallback] sample questions shown\n");
    }
    for (question, entry) in batch.artifact.iter().zip(&responses) {
        print_question(question);
        println!();
        print_draft(&entry.response);
        println!("\n{}\n", "=".repeat(72));
    }
    Ok(())
}

async fn dashboard(config: &Config) -> Result<()> {
    let sources = DataSources::discover(&config.data);
    for (name, location) in sources.iter() {
        info!("{}: {}", name, location);
    }
    let fetch_timeout = Duration::from_millis(config.data.fetch_timeout_ms);
    let bundle = reference::load_with_timeout(&sources, ingestor(config), fetch_timeout)
        .await
        .context("Failed to load reference data")?;

    println!("Reference data (loaded {})", bundle.loaded_at().format("%Y-%m-%d %H:%M:%S UTC"));
    for (name, rows) in bundle.table_sizes() {
        println!("  {:<16} {} rows", name, rows);
    }
    println!();
    match PerformanceSnapshot::from_bundle(&bundle) {
        Some(snapshot) => println!("{}", snapshot.render()),
        None => println!("Performance snapshot unavailable (need two quarters of metrics)"),
    }
    println!();
    println!(
        "{}",
        competitive_context(&bundle, config.generation.context_rows)
    );
    Ok(())
}

fn print_batch(batch: &Generated<QuestionBatch>) {
    if batch.was_fallback {
        println!("[fallback] sample questions shown\n");
    }
    for question in &batch.artifact {
        print_question(question);
        println!();
    }
}

fn print_question(q: &Question) {
    println!("[{}] {} | {}", q.id, q.category.label(), q.difficulty.label());
    println!("Q: {}", q.question);
    if !q.context.is_empty() {
        println!("   Why it matters: {}", q.context);
    }
    if !q.data_points.is_empty() {
        println!("   Data: {}", q.data_points.join("; "));
    }
}

fn print_draft(draft: &Generated<ResponseDraft>) {
    let d = &draft.artifact;
    if draft.was_fallback {
        println!("[fallback] sample response shown");
    }
    println!("Risk level: {}", d.risk_level.label());
    println!("Talking points:");
    for point in &d.talking_points {
        println!("  - {}", point);
    }
    if !d.key_metrics.is_empty() {
        println!("Key metrics:");
        for metric in &d.key_metrics {
            println!("  - {}", metric);
        }
    }
    println!("\n{}", d.response_text);
    if !d.follow_up_concerns.is_empty() {
        println!("\nLikely follow-ups:");
        for concern in &d.follow_up_concerns {
            println!("  - {}", concern);
        }
    }
}
