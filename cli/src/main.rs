use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use plantops_core::{
    CONFIG_FILE_NAME, HttpRemote, OptimisticCollection, RemoteCollection, SyncConfig, SyncContext,
    default_config_json, init_logging,
};
use serde_json::json;

type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Parser)]
#[command(name = "plantops")]
#[command(about = "Plant-ops sync client: notifications, shift chat and data collections")]
struct Cli {
    /// Data directory (config, chat cache and log live here)
    #[arg(long, default_value = ".plantops")]
    data_dir: PathBuf,

    /// Base URL of the data service; overrides the config file
    #[arg(long, env = "PLANTOPS_REMOTE")]
    remote: Option<String>,

    /// Caller identity sent with every request; overrides the config file
    #[arg(long, env = "PLANTOPS_ACTOR")]
    actor: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a default config file if none exists
    Init,

    /// Fetch and print notifications
    Notifications,

    /// Mark every unread notification read on the server
    MarkAllRead,

    /// Fetch and print the chat history (merged with unsent local messages)
    ChatHistory,

    /// Send a chat message
    ChatSend {
        #[arg(long)]
        text: String,
    },

    /// List a collection's records
    List {
        /// Collection name, e.g. `assets`
        collection: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("create data dir {}", cli.data_dir.display()))?;
    let data_dir = cli
        .data_dir
        .to_str()
        .ok_or_else(|| anyhow!("data dir is not valid UTF-8"))?
        .to_string();
    init_logging(Some(&data_dir));

    match &cli.cmd {
        Command::Init => cmd_init(&cli),
        Command::Notifications => {
            let (mut ctx, remote) = open(&cli, &data_dir)?;
            cmd_notifications(&mut ctx, remote.as_ref()).await
        }
        Command::MarkAllRead => {
            let (mut ctx, remote) = open(&cli, &data_dir)?;
            cmd_mark_all_read(&mut ctx, remote.as_ref()).await
        }
        Command::ChatHistory => {
            let (mut ctx, remote) = open(&cli, &data_dir)?;
            cmd_chat_history(&mut ctx, remote.as_ref()).await
        }
        Command::ChatSend { text } => {
            let (mut ctx, remote) = open(&cli, &data_dir)?;
            cmd_chat_send(&mut ctx, remote.as_ref(), text).await
        }
        Command::List { collection } => {
            let (_ctx, remote) = open(&cli, &data_dir)?;
            cmd_list(remote.as_ref(), collection).await
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn open(cli: &Cli, data_dir: &str) -> anyhow::Result<(SyncContext, Option<HttpRemote>)> {
    // One-shot process: nobody consumes store updates.
    let (tx, _rx) = flume::unbounded();
    let ctx = SyncContext::open(data_dir, tx);
    let remote = build_remote(cli, ctx.config())?;
    Ok((ctx, remote))
}

fn build_remote(cli: &Cli, config: &SyncConfig) -> anyhow::Result<Option<HttpRemote>> {
    let mut config = config.clone();
    if let Some(url) = &cli.remote {
        config.remote_base_url = Some(url.clone());
    }
    if let Some(actor) = &cli.actor {
        config.actor_id = Some(actor.clone());
    }
    HttpRemote::from_config(&config).context("build http client")
}

fn require(remote: Option<&HttpRemote>) -> anyhow::Result<&HttpRemote> {
    remote.ok_or_else(|| anyhow!("no remote configured; pass --remote or set remote_base_url"))
}

fn print(v: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(v).context("encode json")?);
    Ok(())
}

fn print_notifications(ctx: &SyncContext) -> anyhow::Result<()> {
    print(&json!({
        "unread_count": ctx.notifications().unread_count(),
        "notifications": ctx.notifications().notifications(),
    }))
}

fn print_chat(ctx: &SyncContext) -> anyhow::Result<()> {
    print(&json!({
        "last_fetched_at": ctx.chat().last_fetched_at(),
        "pending": ctx.chat().pending_count(),
        "messages": ctx.chat().messages(),
    }))
}

fn last_error(ctx: &SyncContext) -> anyhow::Error {
    anyhow!(
        ctx.state()
            .last_error
            .unwrap_or_else(|| plantops_core::FALLBACK_ERROR.to_string())
    )
}

// ── Commands ────────────────────────────────────────────────────────────────

fn cmd_init(cli: &Cli) -> anyhow::Result<()> {
    let path = cli.data_dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return print(&json!({ "config": path, "created": false }));
    }
    std::fs::write(&path, default_config_json())
        .with_context(|| format!("write {}", path.display()))?;
    print(&json!({ "config": path, "created": true }))
}

async fn cmd_notifications(
    ctx: &mut SyncContext,
    remote: Option<&HttpRemote>,
) -> anyhow::Result<()> {
    if !ctx.refresh_notifications(require(remote)?).await {
        return Err(last_error(ctx));
    }
    print_notifications(ctx)
}

async fn cmd_mark_all_read(
    ctx: &mut SyncContext,
    remote: Option<&HttpRemote>,
) -> anyhow::Result<()> {
    let remote = require(remote)?;
    if !ctx.refresh_notifications(remote).await {
        return Err(last_error(ctx));
    }
    if !ctx.mark_all_notifications_read_via(remote).await {
        return Err(last_error(ctx));
    }
    print_notifications(ctx)
}

async fn cmd_chat_history(
    ctx: &mut SyncContext,
    remote: Option<&HttpRemote>,
) -> anyhow::Result<()> {
    match remote {
        Some(remote) => {
            if !ctx.refresh_chat(remote).await {
                tracing::warn!("chat refresh failed; showing cached history");
            }
        }
        None => tracing::info!("no remote configured; showing cached history"),
    }
    print_chat(ctx)
}

async fn cmd_chat_send(
    ctx: &mut SyncContext,
    remote: Option<&HttpRemote>,
    text: &str,
) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        return Err(anyhow!("message text is empty"));
    }
    if !ctx.send_chat_via(require(remote)?, text).await {
        return Err(last_error(ctx));
    }
    print_chat(ctx)
}

async fn cmd_list(remote: Option<&HttpRemote>, collection: &str) -> anyhow::Result<()> {
    let service = RemoteCollection::new(require(remote)?.clone(), collection);
    let records = OptimisticCollection::<Record>::new();
    if !records.refresh(&service).await {
        return Err(anyhow!(
            records
                .error()
                .unwrap_or_else(|| plantops_core::FALLBACK_ERROR.to_string())
        ));
    }
    let entities: Vec<_> = records.items().into_iter().map(|t| t.entity).collect();
    print(&json!({ "collection": service.name(), "items": entities }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_args_and_subcommand() {
        let cli = Cli::try_parse_from([
            "plantops",
            "--data-dir",
            "/tmp/ops",
            "--remote",
            "http://ops.local/api",
            "chat-send",
            "--text",
            "pump 3 tripped",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/ops"));
        assert_eq!(cli.remote.as_deref(), Some("http://ops.local/api"));
        assert!(matches!(cli.cmd, Command::ChatSend { ref text } if text == "pump 3 tripped"));
    }

    #[test]
    fn remote_flag_overrides_config() {
        let cli = Cli::try_parse_from([
            "plantops", "--remote", "http://a/", "--actor", "op-1", "list", "assets",
        ])
        .unwrap();
        let remote = build_remote(&cli, &SyncConfig::default()).unwrap().unwrap();
        assert_eq!(remote.base_url(), "http://a");
        assert_eq!(remote.actor_id(), Some("op-1"));

        let bare = Cli::try_parse_from(["plantops", "init"]).unwrap();
        assert!(build_remote(&bare, &SyncConfig::default()).unwrap().is_none());
    }
}
