use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use slack_reader_client::{SlackApi, SlackClient};
use slack_reader_config::AppConfig;
use slack_reader_conversations::{
    ConversationRepository, LimitSpec, RepoConfig, SlackConversationRepository,
};
use slack_reader_output::{format_markdown, print_error, print_json, UserDirectory};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

#[derive(Debug, Parser)]
#[command(
    name = "slack-reader",
    about = "Read-only Slack CLI for messages, threads, and channel lists"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Slack team domain (e.g. "myteam" for myteam.slack.com).
    #[arg(long, global = true, value_name = "NAME")]
    workspace: Option<String>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    Auth(AuthArgs),
    Channel(ChannelArgs),
    Message(MessageArgs),
}

#[derive(Debug, Args)]
struct AuthArgs {
    #[command(subcommand)]
    command: AuthCommand,
}

#[derive(Debug, Subcommand)]
enum AuthCommand {
    /// Show current authentication info (auth.test).
    Whoami,
}

#[derive(Debug, Args)]
struct ChannelArgs {
    #[command(subcommand)]
    command: ChannelCommand,
}

#[derive(Debug, Subcommand)]
enum ChannelCommand {
    List(ChannelListArgs),
}

#[derive(Debug, Args)]
struct ChannelListArgs {
    #[arg(long, value_name = "USER", conflicts_with = "all")]
    user: Option<String>,
    #[arg(long)]
    all: bool,
    #[arg(long)]
    limit: Option<i64>,
    #[arg(long)]
    cursor: Option<String>,
}

#[derive(Debug, Args)]
struct MessageArgs {
    #[command(subcommand)]
    command: MessageCommand,
}

#[derive(Debug, Subcommand)]
enum MessageCommand {
    Get(MessageGetArgs),
    List(MessageListArgs),
}

#[derive(Debug, Args)]
struct MessageGetArgs {
    channel: String,
    #[arg(long)]
    ts: String,
}

#[derive(Debug, Args)]
struct MessageListArgs {
    channel: String,
    /// Thread root timestamp; without it the channel history is listed.
    #[arg(long)]
    ts: Option<String>,
    /// Maximum number of messages (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    limit: i64,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_cfg(cli: &Cli) -> Result<AppConfig> {
    let config_path = slack_reader_config::resolve_config_path(cli.config.clone());
    let mut cfg = slack_reader_config::load_config_or_default(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    if let Some(workspace) = cli.workspace.as_deref().map(str::trim) {
        if !workspace.is_empty() {
            cfg.slack.workspace = workspace.to_string();
        }
    }
    debug!(path = %config_path.display(), workspace = %cfg.slack.workspace, "config loaded");
    Ok(cfg)
}

fn repo_config(cfg: &AppConfig) -> RepoConfig {
    RepoConfig {
        page_size_ceiling: cfg.fetch.page_size_ceiling,
        list_default_limit: cfg.fetch.list_default_limit,
        list_max_limit: cfg.fetch.list_max_limit,
    }
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = load_cfg(&cli)?;
    let api: Arc<dyn SlackApi> = Arc::new(SlackClient::new(&cfg.slack)?);

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());
    let repo = SlackConversationRepository::new(api.clone(), repo_config(&cfg))
        .with_cancellation(cancel);

    match cli.command {
        CliCommand::Auth(AuthArgs {
            command: AuthCommand::Whoami,
        }) => {
            let identity = repo.auth_test().await?;
            print_json(&identity)
        }
        CliCommand::Channel(ChannelArgs {
            command: ChannelCommand::List(args),
        }) => {
            let limit = args.limit.unwrap_or(0);
            let cursor = args.cursor.as_deref();
            let listing = if args.all {
                repo.list_all_conversations(limit, cursor).await?
            } else if let Some(user) = args.user.as_deref() {
                let user_id = repo.resolve_user(user).await?;
                repo.list_user_conversations(Some(&user_id), limit, cursor)
                    .await?
            } else {
                repo.list_user_conversations(None, limit, cursor).await?
            };
            print_json(&listing)
        }
        CliCommand::Message(MessageArgs {
            command: MessageCommand::Get(args),
        }) => {
            if args.ts.trim().is_empty() {
                bail!("--ts is required");
            }
            let channel_id = repo.resolve_channel(&args.channel).await?;
            let result = repo.message(&channel_id, &args.ts).await?;
            print_json(&result)
        }
        CliCommand::Message(MessageArgs {
            command: MessageCommand::List(args),
        }) => {
            let channel_id = repo.resolve_channel(&args.channel).await?;
            let limit = LimitSpec::from_requested(args.limit);
            let messages = match args.ts.as_deref().filter(|ts| !ts.trim().is_empty()) {
                Some(ts) => repo.thread(&channel_id, ts, limit).await?,
                None => repo.channel_history(&channel_id, limit).await?,
            };

            match args.format {
                OutputFormat::Json => print_json(&json!({ "messages": messages })),
                OutputFormat::Markdown => {
                    let users = UserDirectory::new(api);
                    print!("{}", format_markdown(&messages, &users).await?);
                    Ok(())
                }
            }
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&err);
            ExitCode::from(1)
        }
    }
}
