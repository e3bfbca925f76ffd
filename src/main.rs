use anyhow::Context as _;
use clap::{Parser, Subcommand};
use courier_core::{
    config::{self, redact, Config, LoggingConfig},
    update::Update,
};
use courier_poller::{HandlerRegistry, HandlerResult, InstanceGuard, LockStatus, Poller};
use courier_telegram::TelegramClient;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Telegram bot long-poller with concurrent update dispatch"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Bot token, overriding `telegram.bot_token`.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the echo bot until Ctrl-C.
    Start {
        /// Process updates queued before startup instead of skipping them.
        #[arg(long)]
        keep_old_updates: bool,
    },
    /// Show the effective configuration and whether a poller holds the lock.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load(&cli.config)?;
    if let Some(token) = cli.token.filter(|t| !t.is_empty()) {
        cfg.telegram.bot_token = token;
    }

    match cli.command {
        Commands::Start { keep_old_updates } => {
            let _log_guard = init_logging(&cfg.logging)?;
            if !Path::new(&cli.config).exists() {
                info!("config file {} not found, using defaults", cli.config);
            }
            start(cfg, !keep_old_updates).await
        }
        Commands::Status => {
            status(&cli.config, &cfg);
            Ok(())
        }
    }
}

/// Stderr layer plus an optional non-blocking file layer. The returned
/// guard flushes the file writer when dropped.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("invalid log level '{}'", logging.level))?;

    let console = logging
        .console
        .then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

    let (file, guard) = match &logging.file {
        Some(path) => {
            let path = config::shellexpand(path);
            let path = Path::new(&path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let name = path
                .file_name()
                .with_context(|| format!("log file path has no file name: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}

async fn start(cfg: Config, discard_old_updates: bool) -> anyhow::Result<()> {
    if cfg.telegram.bot_token.is_empty() {
        anyhow::bail!(
            "bot_token is empty. Set it in config.toml, pass --token or set TELEGRAM_BOT_TOKEN."
        );
    }

    let client = TelegramClient::new(&cfg.telegram)?;
    let me = client
        .get_me()
        .await
        .context("getMe failed; check the bot token")?;
    info!(
        "courier starting as {} (id {}, token {})",
        me.display_name(),
        me.id,
        redact(&cfg.telegram.bot_token)
    );

    let poller = Poller::new(
        Arc::new(client.clone()),
        cfg.poller.clone(),
        echo_handlers(client),
    );

    let stop = poller.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                stop.stop();
            }
            Err(e) => warn!("cannot listen for Ctrl-C: {e}"),
        }
    });

    poller
        .start(discard_old_updates && cfg.poller.discard_old_updates)
        .await?;

    let pending = poller.in_flight();
    if pending > 0 {
        info!("waiting for {pending} handler task(s) to finish");
    }
    poller.wait_idle().await;
    Ok(())
}

/// Reply to every text message with `Echo: <text>` and trace every update.
fn echo_handlers(client: TelegramClient) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers
        .on_message(move |update: Arc<Update>| echo(client.clone(), update))
        .on_update(|update: Arc<Update>| async move {
            debug!("update {} ({})", update.update_id, update.kind());
            Ok(())
        });
    handlers
}

async fn echo(client: TelegramClient, update: Arc<Update>) -> HandlerResult {
    let (Some(chat_id), Some(text)) = (update.chat_id(), update.text()) else {
        return Ok(());
    };
    client
        .call(
            "sendMessage",
            json!({ "chat_id": chat_id, "text": format!("Echo: {text}") }),
        )
        .await
        .with_context(|| format!("echo to chat {chat_id} failed"))?;
    Ok(())
}

fn status(config_path: &str, cfg: &Config) {
    println!("Courier status\n");
    println!("Config: {config_path}");
    println!();

    let tg = &cfg.telegram;
    println!("  telegram:");
    println!("    bot_token: {}", redact(&tg.bot_token));
    println!("    api_url: {}", tg.api_url);
    println!("    request_timeout: {}s", tg.request_timeout_secs);
    println!("    connect_timeout: {}s", tg.connect_timeout_secs);

    let p = &cfg.poller;
    println!("  poller:");
    println!("    poll_timeout: {}s", p.poll_timeout_secs);
    println!(
        "    backoff: {}s..{}s",
        p.backoff_base_secs, p.max_backoff_secs
    );
    println!(
        "    max_concurrency: {}",
        p.max_concurrency
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!("    discard_old_updates: {}", p.discard_old_updates);
    println!("    lock_path: {}", p.lock_path);

    let log = &cfg.logging;
    println!("  logging:");
    println!("    level: {}", log.level);
    println!("    file: {}", log.file.as_deref().unwrap_or("<none>"));
    println!("    console: {}", log.console);
    println!();

    let instance = lock_state(&config::shellexpand(&p.lock_path));
    println!("  instance: {instance}");
}

/// Inspect the lock without taking it, so the pid in the file is left alone.
fn lock_state(lock_path: &str) -> String {
    match InstanceGuard::probe(lock_path) {
        Ok(LockStatus::Free) => "not running".to_string(),
        Ok(LockStatus::Held { pid: Some(pid) }) => format!("running (pid {pid})"),
        Ok(LockStatus::Held { pid: None }) => "running".to_string(),
        Err(e) => format!("unknown ({e})"),
    }
}
