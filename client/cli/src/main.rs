//! Docchat CLI - Terminal Front-End for the Document Chat Service
//!
//! A thin surface over `docchat-core`: it renders streamed answers and pull
//! progress to the terminal and maps Ctrl-C onto the core's cancellation.
//!
//! # Usage
//!
//! ```bash
//! # Ask a question about the default project
//! docchat-cli chat --chat-id c1 "What does chapter 2 conclude?"
//!
//! # Pull a model; Ctrl-C cancels and asks the backend to clean up
//! docchat-cli pull phi3.5:mini
//!
//! # Follow status, memory and chat-list refreshes
//! docchat-cli watch
//!
//! # Verbose logging
//! RUST_LOG=debug docchat-cli status
//! ```

use std::io::{Stdout, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docchat_core::{
    default_config_path, load_config_from_path, CancelOutcome, CleanupStatus, ConfigOverrides,
    DocChatClient, PullProgress, Refresh, SessionObserver, SessionOutcome, TerminalEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Docchat CLI - chat with your documents from the terminal
#[derive(Parser, Debug)]
#[command(name = "docchat-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "DOCCHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and environment)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "DOCCHAT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the answer
    Chat {
        /// Chat to send into
        #[arg(long)]
        chat_id: String,

        /// Project whose documents answer the question
        #[arg(short = 'p', long)]
        project: Option<String>,

        /// Ask the backend for retrieval debug info
        #[arg(long)]
        debug: bool,

        /// The question
        query: String,
    },
    /// Pull a model, showing progress
    Pull {
        /// Model name, e.g. `llama3.2`
        model: String,
    },
    /// Show backend status
    Status,
    /// Show backend memory usage
    Memory,
    /// List chats of a project
    Chats {
        /// Project to list (defaults to the configured one)
        #[arg(short = 'p', long)]
        project: Option<String>,
    },
    /// List local and pullable models
    Models,
    /// Print background refreshes until Ctrl-C
    Watch,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("docchat_cli={level},docchat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Renders session callbacks: answer text and progress to `out`, notes to stderr
struct TerminalObserver<W: Write = Stdout> {
    out: W,
    printed: usize,
    last_percent: Option<u64>,
}

impl TerminalObserver {
    fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalObserver<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            last_percent: None,
        }
    }

    fn emit(&mut self, text: &str) {
        // Terminal gone; nothing sensible to do
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn end_line(&mut self) {
        if self.printed > 0 || self.last_percent.is_some() {
            self.emit("\n");
        }
        self.printed = 0;
        self.last_percent = None;
    }
}

impl<W: Write + Send> SessionObserver for TerminalObserver<W> {
    fn on_thinking(&mut self, text: &str) {
        eprintln!("[thinking] {text}");
    }

    fn on_response_start(&mut self, model: Option<&str>, debug_info: Option<&serde_json::Value>) {
        if let Some(model) = model {
            eprintln!("[{model}]");
        }
        if let Some(info) = debug_info {
            eprintln!("[debug] {info}");
        }
        self.printed = 0;
    }

    fn on_content(&mut self, delta: &str, accumulated: &str) {
        self.emit(delta);
        self.printed = accumulated.len();
    }

    fn on_progress(&mut self, progress: &PullProgress) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = progress.percent.floor() as u64;
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        let line = format!(
            "\r{:>3}% {} / {} {}",
            percent, progress.downloaded, progress.total, progress.status
        );
        self.emit(&line);
    }

    fn on_terminal(&mut self, event: &TerminalEvent) {
        self.end_line();
        if let TerminalEvent::Completed(status) = event {
            info!(status = %status, "Pull completed");
        }
    }

    fn on_error(&mut self, message: &str, _partial: Option<&str>) {
        self.end_line();
        eprintln!("Error: {message}");
    }

    fn on_cancelled(&mut self) {
        self.end_line();
        eprintln!("Cancelled");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_chat(client: &DocChatClient, chat_id: &str, query: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut observer = TerminalObserver::stdout();
    let result = client.send_chat(chat_id, query, cancel, &mut observer).await;
    interrupt.abort();

    let delivery = result?;
    info!(path = ?delivery.path, "Chat delivered");
    Ok(())
}

async fn run_pull(client: &DocChatClient, model: &str) -> Result<()> {
    let canceller = {
        let client = client.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                client.cancel_download().await
            } else {
                CancelOutcome::NoActiveDownload
            }
        })
    };

    let mut observer = TerminalObserver::stdout();
    let outcome = client.pull_model(model, &mut observer).await;

    if !matches!(outcome, Ok(SessionOutcome::Cancelled)) {
        canceller.abort();
        outcome?;
        return Ok(());
    }

    match canceller.await.context("cancel task failed")? {
        CancelOutcome::Cancelled { model_name, cleanup } => match cleanup {
            CleanupStatus::Acknowledged => eprintln!("Download of {model_name} cancelled"),
            CleanupStatus::Failed(reason) => {
                eprintln!("Download of {model_name} cancelled; cleanup failed: {reason}");
            }
            CleanupStatus::TimedOut => {
                eprintln!("Download of {model_name} cancelled; backend did not confirm cleanup");
            }
        },
        other => warn!(outcome = ?other, "Pull stopped without a cancel request"),
    }
    Ok(())
}

async fn run_watch(client: &DocChatClient) -> Result<()> {
    let shutdown = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handles: Vec<_> = client
        .pollers(&tx)
        .iter()
        .map(|poller| poller.spawn(shutdown.clone()))
        .collect();
    drop(tx);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = rx.recv() => match update {
                Some(Refresh::Status(status)) => print_json(&status)?,
                Some(Refresh::Memory(memory)) => print_json(&memory)?,
                Some(Refresh::Chats(chats)) => print_json(&chats)?,
                None => break,
            },
        }
    }

    shutdown.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Poller task failed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = args.base_url.clone() {
        overrides = overrides.with_base_url(url);
    }
    if let Command::Chat { project, debug, .. } = &args.command {
        if let Some(project) = project.clone() {
            overrides = overrides.with_project(project);
        }
        if *debug {
            overrides = overrides.with_debug(true);
        }
    }
    overrides.apply(&mut config);
    info!(source = %config.source(), base_url = %config.server.base_url, "Configuration loaded");

    let chats_project = config.chat.project.clone();
    let client = DocChatClient::new(config).context("Failed to create client")?;

    match args.command {
        Command::Chat { chat_id, query, .. } => run_chat(&client, &chat_id, &query).await?,
        Command::Pull { model } => run_pull(&client, &model).await?,
        Command::Status => print_json(&client.fetch_status().await?)?,
        Command::Memory => print_json(&client.fetch_memory().await?)?,
        Command::Chats { project } => {
            let project = project.unwrap_or(chats_project);
            print_json(&client.list_chats(&project).await?)?;
        }
        Command::Models => print_json(&client.list_models().await?)?,
        Command::Watch => run_watch(&client).await?,
    }

    Ok(())
}
