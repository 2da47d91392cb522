mod chart;
mod metrics;
mod pipeline;
mod stages;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::future::BoxFuture;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drishti_agent::{IntakeGate, IntakeStatus};
use drishti_core::config::AppConfig;
use drishti_core::error::{DrishtiError, Result as DrishtiResult};
use drishti_core::traits::ReplySource;
use drishti_llm::{ChatClient, ChatMessage};

#[derive(Parser)]
#[command(
    name = "drishti",
    version,
    about = "Graph-driven, skeptical Vedic chart analysis"
)]
struct Cli {
    /// Path to the case folder (e.g. subjects/ananya/input/0001)
    #[arg(long)]
    case: PathBuf,

    /// User question forwarded through intake to the analysis stages
    #[arg(short, long)]
    question: String,

    /// Path to config file
    #[arg(short, long, default_value = "drishti.toml")]
    config: PathBuf,

    /// Override the end-user report path
    #[arg(long)]
    user_output: Option<PathBuf>,

    /// Override the detailed report path
    #[arg(long)]
    detailed_output: Option<PathBuf>,

    /// Session ID (taken from the case context if not provided)
    #[arg(short, long)]
    session: Option<String>,

    /// Keep asking for detail until intake approves the question
    #[arg(long)]
    interactive: bool,
}

/// Console prompt that keeps asking until it gets a non-empty line. EOF and
/// interrupts count as "ask again" — the pipeline cannot continue without an
/// answer.
async fn prompt_line(prompt: String) -> DrishtiResult<String> {
    loop {
        let text = prompt.clone();
        let reply = tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(text)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .map_err(|e| DrishtiError::Config(format!("console prompt task failed: {}", e)))?;
        match reply {
            Ok(line) if !line.trim().is_empty() => return Ok(line.trim().to_string()),
            Ok(_) => println!("\nA reply is needed to continue."),
            Err(e) => {
                warn!(error = %e, "console input unavailable, asking again");
                println!("\nManual input is required to continue. Please answer the question above.");
            }
        }
    }
}

struct ConsoleReplySource;

impl ReplySource for ConsoleReplySource {
    fn reply(&self, question: &str) -> BoxFuture<'_, DrishtiResult<String>> {
        let prompt = format!("\nDeep-dive follow-up -> {}\nYour reply", question);
        Box::pin(prompt_line(prompt))
    }
}

/// Short greetings and small-talk skip the agent pipeline entirely.
fn is_greeting(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return true;
    }
    const GREETINGS: &[&str] = &[
        "hi", "hello", "hey", "yo", "hola", "namaste", "whatsup", "what's up", "sup",
    ];
    if GREETINGS.contains(&t.as_str()) {
        return true;
    }
    // Stretched variants like "hiii" or "heyyy!".
    let stripped = t.trim_end_matches(['!', '.', ' ']);
    for stem in ["hello", "hey", "hi"] {
        let last = stem.chars().next_back().unwrap_or_default();
        if stripped.starts_with(stem) && stripped[stem.len()..].chars().all(|c| c == last) {
            return true;
        }
    }
    // Very short small-talk without intent.
    t.split_whitespace().count() <= 3 && ["hi", "hello", "hey"].iter().any(|g| t.contains(g))
}

async fn concierge_follow_up(client: &ChatClient, text: &str) -> DrishtiResult<String> {
    let messages = [
        ChatMessage::system(stages::CONCIERGE_PROMPT),
        ChatMessage::user(text),
    ];
    Ok(client.complete(&messages).await?.text)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("drishti=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)?;
    let client = Arc::new(ChatClient::new(config.model.clone()));

    let bundle = pipeline::load_case(&cli.case, cli.session.as_deref())?;
    info!(
        subject = %bundle.subject_id,
        session = %bundle.session_id,
        case = %bundle.origin,
        "case loaded"
    );

    let review_context = stages::format_review_context(&bundle.meta);
    let gate = IntakeGate::new(stages::intake_reviewer(&client));

    let question = if cli.interactive {
        let mut current = cli.question.clone();
        loop {
            if is_greeting(&current) {
                let reply = concierge_follow_up(&client, &current).await?;
                println!("\n{}", reply.trim());
                current = prompt_line(
                    "\nPlease share your specific question (area + intent + timeframe)".to_string(),
                )
                .await?;
                continue;
            }
            let review = gate.review(&current, &review_context).await?;
            info!(directive = %review.decision.raw, "intake decision");
            match review.decision.status {
                IntakeStatus::FollowUp => {
                    println!("\n{}", review.decision.message);
                    current = prompt_line("\nPlease add the missing detail".to_string()).await?;
                }
                IntakeStatus::Proceed => break review.decision.message,
            }
        }
    } else {
        if is_greeting(&cli.question) {
            let reply = concierge_follow_up(&client, &cli.question).await?;
            println!("\n{}", reply.trim());
            println!(
                "\nReply with your specific question (area + intent + timeframe) to start deep analysis."
            );
            return Ok(());
        }
        let review = gate.review(&cli.question, &review_context).await?;
        info!(directive = %review.decision.raw, "intake decision");
        match review.decision.status {
            IntakeStatus::FollowUp => {
                println!("\n{}", review.decision.message);
                println!("\nPlease resend your question with the requested details.");
                return Ok(());
            }
            IntakeStatus::Proceed => review.decision.message,
        }
    };

    let user_output = cli
        .user_output
        .unwrap_or_else(|| config.reports.user_output.clone());
    let detailed_output = cli
        .detailed_output
        .unwrap_or_else(|| config.reports.detailed_output.clone());

    let outcome = pipeline::run_case(
        &config,
        &client,
        &bundle,
        &question,
        &ConsoleReplySource,
        &user_output,
        &detailed_output,
    )
    .await?;

    println!("\n=== Final Forecast ===\n");
    println!("{}", outcome.final_summary.trim());
    println!("\nUser report: {}", outcome.user_output.display());
    println!("Detailed report: {}", outcome.detailed_output.display());
    println!(
        "Token usage -> prompt: {}, completion: {}, total: {}",
        outcome.total_usage.prompt,
        outcome.total_usage.completion,
        outcome.total_usage.total()
    );
    println!("\nPer-stage summary:");
    for row in &outcome.stages {
        match &row.error {
            Some(error) => println!("  {:<14} FAILED: {}", row.name, error),
            None => println!(
                "  {:<14} tokens={:<8} duration={:.2}s",
                row.name,
                row.usage.total(),
                row.elapsed_ms as f64 / 1000.0
            ),
        }
    }
    println!(
        "  {:<14} tokens={:<8} duration={:.2}s",
        "master_writer",
        outcome.writer_usage.total(),
        outcome.writer_elapsed_ms as f64 / 1000.0
    );

    Ok(())
}
