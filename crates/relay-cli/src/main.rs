mod config;
mod logging;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use relay_core::budget::{Cl100kTokenCounter, MemoizedTokenCounter, ModelLimitsRegistry};
use relay_core::{
    ConversationWindow, ConversationWindower, InMemoryCache, Message, SharedCache, WindowConfig,
    WindowRequest,
};
use relay_llm::{
    create_backend, generate_title, CompletionDriver, CompletionRequest, ProgressSink,
    ProviderBackend, StagedResources,
};
use relay_metrics::{
    evaluate, BillingContext, CostEstimator, LogBillingSink, QuotaCounters, QuotaLedger,
    QuotaStatus, QuotaStores, UsageOwner, UsageRecorder,
};
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Windowed, retrying completions against Gemini and Vertex AI")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    /// Model override
    #[arg(long, short)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which part of a conversation fits the model's context window
    Window {
        /// JSON file holding an array of messages
        file: PathBuf,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        max_context: Option<u32>,
        #[arg(long)]
        max_response: Option<u32>,
        /// Print the assembled prompt
        #[arg(long)]
        show_prompt: bool,
    },
    /// Send a message and stream the reply
    Chat {
        message: String,
        /// Earlier conversation as a JSON array of messages
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        system: Option<String>,
        /// Also generate a conversation title
        #[arg(long)]
        title: bool,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Check request and token counts against the configured quota limits
    Quota {
        #[arg(long, default_value_t = 0)]
        requests: u64,
        #[arg(long, default_value_t = 0)]
        tokens: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let mut config = CliConfig::load()?;
    if let Some(model) = cli.model {
        config.provider.model = Some(model);
    }

    if cli.debug {
        eprintln!("{}", "[DEBUG] Debug mode enabled".dimmed());
        eprintln!(
            "{}",
            format!(
                "[DEBUG] Backend: {}",
                if config.provider.is_cloud() { "Vertex AI" } else { "Gemini API" }
            )
            .dimmed()
        );
    }

    match cli.command {
        Commands::Window {
            file,
            system,
            max_context,
            max_response,
            show_prompt,
        } => {
            let messages = read_messages(&file)?;
            let window_config = resolve_window(&config, max_context, max_response).await;
            let window = build_window(&messages, &window_config, system, &CancellationToken::new()).await?;
            print_window(&window, messages.len(), show_prompt);
            Ok(())
        }
        Commands::Chat {
            message,
            history,
            system,
            title,
            user,
            conversation,
        } => {
            let owner = UsageOwner {
                user,
                conversation_id: conversation,
            };
            run_chat(&config, message, history, system, title, owner).await
        }
        Commands::Quota { requests, tokens } => {
            let status = evaluate(
                &QuotaCounters {
                    requests_per_minute: requests,
                    tokens_per_minute: tokens,
                    ..QuotaCounters::default()
                },
                &config.relay.quota,
            );
            print_quota(&status);
            Ok(())
        }
    }
}

fn read_messages(path: &Path) -> anyhow::Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let messages = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    Ok(messages)
}

/// Flags win, then an explicit `window` section, then the model's known limits.
async fn resolve_window(config: &CliConfig, max_context: Option<u32>, max_response: Option<u32>) -> WindowConfig {
    let mut window = if config.relay.window != WindowConfig::default() {
        config.relay.window.clone()
    } else {
        let mut registry = ModelLimitsRegistry::new();
        if let Err(e) = registry.load_user_config().await {
            log::warn!("[Window] Failed to load model limits: {}", e);
        }
        let model = config.provider.model.as_deref().unwrap_or("default");
        registry.get_or_default(model).window_config()
    };

    if let Some(max_context) = max_context {
        window.max_context_tokens = max_context;
    }
    if let Some(max_response) = max_response {
        window.max_response_tokens = max_response;
    }
    window
}

async fn build_window(
    messages: &[Message],
    window_config: &WindowConfig,
    system: Option<String>,
    cancel: &CancellationToken,
) -> anyhow::Result<ConversationWindow> {
    let windower = ConversationWindower::new(Arc::new(MemoizedTokenCounter::new(Cl100kTokenCounter::new())));
    let mut request = WindowRequest::from_config(window_config);
    if let Some(system) = system {
        request = request.with_system_message(system);
    }
    let window = windower.build_window(messages, &request, cancel).await?;
    Ok(window)
}

fn print_window(window: &ConversationWindow, total: usize, show_prompt: bool) {
    println!(
        "{}",
        format!(
            "Kept {} of {} messages ({} dropped)",
            window.context.len(),
            total,
            window.dropped_count
        )
        .cyan()
    );
    println!("Prompt tokens:   {}", window.prompt_tokens);
    println!("Response tokens: {}", window.reserved_response_tokens);
    if show_prompt {
        println!("{}", "─".repeat(40).dimmed());
        println!("{}", window.prompt);
    }
}

fn print_quota(status: &QuotaStatus) {
    for (name, gauge) in [("RPM", &status.rpm), ("TPM", &status.tpm)] {
        let line = format!(
            "{}: {}/{} ({:.1}%)",
            name, gauge.current, gauge.limit, gauge.percentage
        );
        if gauge.approaching {
            println!("{}", line.yellow());
        } else {
            println!("{}", line.green());
        }
    }
    for warning in &status.warnings {
        println!("{}", format!("⚠️  {}", warning).yellow());
    }
}

/// Prints streamed text straight to stdout.
struct TerminalSink;

#[async_trait]
impl ProgressSink for TerminalSink {
    async fn on_progress(&self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    async fn on_retry(&self, attempt: u32) {
        println!();
        println!("{}", format!("↻ retrying (attempt {})", attempt + 1).yellow());
    }
}

async fn run_chat(
    config: &CliConfig,
    message: String,
    history: Option<PathBuf>,
    system: Option<String>,
    with_title: bool,
    owner: UsageOwner,
) -> anyhow::Result<()> {
    let cache: SharedCache = Arc::new(InMemoryCache::new());
    let backend: Arc<dyn ProviderBackend> = create_backend(&config.provider, Some(cache))?;

    let mut messages = match history {
        Some(path) => read_messages(&path)?,
        None => Vec::new(),
    };
    messages.push(Message::user(message.clone()));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let window_config = resolve_window(config, None, None).await;
    let window = build_window(&messages, &window_config, system.clone(), &cancel).await?;
    if window.is_truncated() {
        log::info!("[Chat] {} older messages left out of the context", window.dropped_count);
    }

    let request = CompletionRequest::from_window(&window, system);
    let driver = CompletionDriver::new(backend.clone(), config.relay.retry.clone(), config.relay.stream.clone());

    let completion = match driver
        .get_completion(&request, &TerminalSink, &cancel, StagedResources::none())
        .await
    {
        Ok(completion) => completion,
        Err(e) => {
            println!();
            eprintln!("{}", e.to_user_message().red());
            anyhow::bail!("completion failed");
        }
    };
    println!();

    let ledger = Arc::new(QuotaLedger::new(QuotaStores::in_memory()));
    let recorder = UsageRecorder::new(Arc::new(LogBillingSink)).with_ledger(ledger.clone());

    if let Some(usage) = completion.usage {
        recorder
            .record(BillingContext::Message, &owner, backend.provider(), backend.model(), usage)
            .await;

        let estimate = CostEstimator::new().estimate(
            backend.model(),
            usage.input_tokens,
            usage.output_tokens,
            backend.provider(),
        );
        println!(
            "{}",
            format!(
                "{} prompt + {} completion tokens, ~${:.6} {}",
                estimate.prompt_tokens, estimate.completion_tokens, estimate.total_cost, estimate.currency
            )
            .dimmed()
        );
    }

    if with_title {
        let timeout = Duration::from_millis(config.relay.stream.title_timeout_ms);
        let title = generate_title(backend.as_ref(), &message, &completion.text, timeout).await;
        if let Some(usage) = title.usage {
            recorder
                .record(BillingContext::Title, &owner, backend.provider(), backend.model(), usage)
                .await;
        }
        println!("{}", format!("Title: {}", title.title).green());
    }

    if let relay_llm::Provider::Cloud { project_id, .. } = backend.provider() {
        let status = ledger
            .check_threshold(project_id, backend.model(), &config.relay.quota)
            .await;
        for warning in &status.warnings {
            eprintln!("{}", format!("⚠️  {}", warning).yellow());
        }
    }

    Ok(())
}
