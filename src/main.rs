use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use ssx_bot::application::messaging::{ignore_bots, RateLimiter};
use ssx_bot::infrastructure::adapters::{ConsoleConnector, TelegramConnector};
use ssx_bot::infrastructure::config::Config;
use ssx_bot::{command_fn, Bot, BotError, Bundle, Command, CommandKind, CommandOutput, Outcome};

#[derive(Parser)]
#[command(name = "ssx-bot")]
#[command(about = "A chat bot command dispatcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config, enables Telegram)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            run_bot(cli.config, cli.token);
        }
        Commands::Version => {
            println!("ssx-bot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

fn run_bot(config_path: String, token_override: Option<String>) {
    // Load config
    let mut config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        })
    } else {
        Config::load_env()
    };

    if let Some(token) = token_override {
        config.bot.token = Some(token);
        if let Some(ref mut tg) = config.adapters.telegram {
            tg.enabled = true;
        }
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(start(config)) {
        tracing::error!("Bot failed: {}", e);
        std::process::exit(1);
    }
}

async fn start(config: Config) -> Result<(), BotError> {
    let mut bot = if config.telegram_enabled() {
        let poll_timeout = config.adapters.telegram.as_ref().map_or(30, |t| t.poll_timeout);
        Bot::from_config(&TelegramConnector::new(poll_timeout), config).await?
    } else {
        // Console lines are authored by the owner so owner-only commands work locally
        let owner = config.bot.owner.clone();
        Bot::from_config(&ConsoleConnector::new(owner), config).await?
    };

    tracing::info!("Starting ssx-bot, audit logs in {}", bot.log_path().display());

    bot.add_cancelation(ignore_bots());
    bot.add_cancelation(RateLimiter::new(20, 60).into_cancelation());

    register_ping_command(&mut bot);
    register_help_command(&mut bot);
    register_stop_command(&mut bot);
    register_thanks_inline(&mut bot);
    register_stats_custom(&mut bot);

    bot.run().await
}

/// Replies with a fixed text in the originating channel
struct ReplyCommand {
    operation: &'static str,
    text: &'static str,
}

#[async_trait]
impl Command for ReplyCommand {
    async fn run(&self, bundle: &Bundle<'_>, _args: &[String]) -> CommandOutput {
        match bundle.reply(self.text).await {
            Ok(_) => CommandOutput::success(),
            Err(e) => CommandOutput::failed(self.operation, e),
        }
    }
}

fn register_ping_command(bot: &mut Bot) {
    bot.add_command("!ping", ReplyCommand {
        operation: "reply to ping",
        text: "pong",
    });
}

fn register_thanks_inline(bot: &mut Bot) {
    bot.add_inline("thanks", ReplyCommand {
        operation: "acknowledge thanks",
        text: "you're welcome",
    });
}

struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    async fn run(&self, bundle: &Bundle<'_>, _args: &[String]) -> CommandOutput {
        let registry = bundle.bot().registry();
        let mut help = "Commands:\n".to_string();
        for name in registry.names(CommandKind::Prefix) {
            help.push_str(&format!("  {}\n", name));
        }
        help.push_str("Keywords:\n");
        for name in registry.names(CommandKind::Inline) {
            help.push_str(&format!("  {}\n", name));
        }

        match bundle.reply(&help).await {
            Ok(_) => CommandOutput::success(),
            Err(e) => CommandOutput::failed("send help", e),
        }
    }
}

fn register_help_command(bot: &mut Bot) {
    bot.add_command("!help", HelpCommand);
}

fn register_stop_command(bot: &mut Bot) {
    bot.add_command("!stop", command_fn(|bundle, _args| {
        if bundle.author_is_owner() {
            CommandOutput::exit()
        } else {
            bundle.log().log("stop refused: author is not the owner");
            CommandOutput::warning()
        }
    }));
}

fn register_stats_custom(bot: &mut Bot) {
    let seen = AtomicU64::new(0);
    bot.add_custom("stats", command_fn(move |bundle, args| {
        let count = seen.fetch_add(1, Ordering::Relaxed) + 1;
        bundle.log().log(&format!("stats: event #{} with {} tokens", count, args.len()));
        CommandOutput::new(Outcome::Success)
    }));
}

fn init_config() {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => tracing::error!("Failed to render default config: {}", e),
    }
}
