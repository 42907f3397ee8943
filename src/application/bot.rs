//! Bot lifecycle - construction, registration, run/stop

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Local;
use rand::RngCore;
use tokio::sync::watch;

use crate::application::errors::BotError;
use crate::application::messaging::{tokenize, AuditLog, Bundle, Cancelation, Dispatch, Dispatcher};
use crate::domain::entities::{Command, CommandKind, CommandRegistry, Message};
use crate::domain::traits::{AuditLogFactory, Connector, EventHandler, Gateway};
use crate::infrastructure::audit::FileAuditLogFactory;
use crate::infrastructure::config::Config;

/// Overwrite a sensitive buffer with random bytes
pub fn scrub(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
}

/// Shared liveness flag.
///
/// Cleared by a command returning `Exit`; the run loop waits on it alongside
/// the external shutdown signal.
#[derive(Clone)]
pub struct Liveness {
    tx: Arc<watch::Sender<bool>>,
}

impl Liveness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_alive(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn revive(&self) {
        self.tx.send_replace(true);
    }

    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    /// Resolves once the flag is cleared
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only ends once the flag is false
        let _ = rx.wait_for(|alive| !*alive).await;
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected chat bot: identity, command registry and liveness.
pub struct Bot {
    id: String,
    owner: String,
    log_path: PathBuf,
    session: Arc<dyn Gateway>,
    registry: CommandRegistry,
    cancelations: Vec<Cancelation>,
    liveness: Liveness,
    audit: Arc<dyn AuditLogFactory>,
}

impl Bot {
    /// Establish a session bound to `credential` and resolve the bot's own identity.
    ///
    /// The credential and the authorization derived from it are overwritten
    /// with random bytes right after the connect attempt.
    pub async fn new(
        connector: &dyn Connector,
        credential: &mut [u8],
        owner: impl Into<String>,
        log_path: impl Into<PathBuf>,
    ) -> Result<Self, BotError> {
        let session = connect_scrubbed(connector, credential).await?;
        let me = session.current_user().await?;
        let log_path = log_path.into();

        tracing::info!("Bot created as {} ({})", me, me.id);
        Ok(Self {
            id: me.id,
            owner: owner.into(),
            audit: Arc::new(FileAuditLogFactory::new(log_path.clone())),
            log_path,
            session,
            registry: CommandRegistry::new(),
            cancelations: Vec::new(),
            liveness: Liveness::new(),
        })
    }

    /// Construct from a parsed config; the token is scrubbed from the owned config copy
    pub async fn from_config(connector: &dyn Connector, config: Config) -> Result<Self, BotError> {
        config.validate()?;
        let Config { bot, .. } = config;
        let mut credential = bot.token.unwrap_or_default().into_bytes();
        let result = Self::new(connector, &mut credential, bot.owner, bot.log_path).await;
        scrub(&mut credential);
        result
    }

    /// Replace the per-event audit sink factory
    pub fn with_audit_log_factory(mut self, factory: Arc<dyn AuditLogFactory>) -> Self {
        self.audit = factory;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn session(&self) -> &Arc<dyn Gateway> {
        &self.session
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Prefix command: runs when the first token equals `name`
    pub fn add_command(&mut self, name: impl Into<String>, command: impl Command + 'static) {
        self.register(CommandKind::Prefix, name.into(), Arc::new(command));
    }

    /// Inline command: runs for the leftmost token equal to `token`
    pub fn add_inline(&mut self, token: impl Into<String>, command: impl Command + 'static) {
        self.register(CommandKind::Inline, token.into(), Arc::new(command));
    }

    /// Custom command: runs on every event that is not cancelled
    pub fn add_custom(&mut self, name: impl Into<String>, command: impl Command + 'static) {
        self.register(CommandKind::Custom, name.into(), Arc::new(command));
    }

    pub fn add_cancelation<F>(&mut self, cancel: F)
    where
        F: Fn(&Bundle<'_>) -> bool + Send + Sync + 'static,
    {
        self.cancelations.push(Box::new(cancel));
    }

    fn register(&mut self, kind: CommandKind, name: String, command: Arc<dyn Command>) {
        if self.registry.register(kind, name.clone(), command) {
            tracing::warn!("Replaced existing {} command {}", kind.as_str(), name);
        } else {
            tracing::debug!("Registered {} command {}", kind.as_str(), name);
        }
    }

    /// DM the owner
    pub async fn notify_owner(&self, text: &str) -> Result<String, BotError> {
        let channel = self.session.create_direct_channel(&self.owner).await?;
        self.session.send_message(&channel, text).await
    }

    /// Dispatch one inbound message arriving on `session`
    pub async fn handle_message(&self, session: Arc<dyn Gateway>, message: Message) -> Dispatch {
        if message.author.id == self.id {
            return Dispatch::Ignored;
        }

        let event_id = format!("{} {}", Local::now().format("%Y-%m-%dT%H-%M-%S"), message.id);
        let args = tokenize(&message.content);
        tracing::debug!("[START] message ID {} {:?}", event_id, args);

        let log = match self.audit.create(&event_id) {
            Ok(sink) => AuditLog::new(event_id.clone(), sink),
            Err(e) => {
                tracing::error!("Failed to open audit log for {}: {}", event_id, e);
                AuditLog::detached(event_id.clone())
            }
        };

        let bundle = Bundle::new(self, session, message, log);
        let dispatch = Dispatcher::new(&self.registry, &self.cancelations)
            .dispatch(bundle, &args)
            .await;

        if dispatch != Dispatch::Cancelled {
            tracing::debug!("[FINISH] message ID {}", event_id);
        }
        dispatch
    }

    /// Run until SIGINT/SIGTERM or until a command returns `Exit`
    pub async fn run(self) -> Result<(), BotError> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves or until a command returns `Exit`.
    ///
    /// Opens the session, announces the start to the owner, waits, then
    /// announces the stop and closes the session.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), BotError>
    where
        F: Future<Output = ()>,
    {
        let bot = Arc::new(self);
        bot.session.set_event_handler(Arc::new(BotHandler {
            bot: Arc::downgrade(&bot),
        }));

        tracing::info!("Running bot...");
        // Alive before the first event can arrive, so an early Exit sticks
        bot.liveness.revive();
        if let Err(e) = bot.session.open().await {
            bot.liveness.clear();
            return Err(e);
        }

        if let Err(e) = bot.notify_owner("Bot started").await {
            bot.liveness.clear();
            if let Err(close_err) = bot.session.close().await {
                tracing::warn!("Failed to close session: {}", close_err);
            }
            return Err(e);
        }
        tracing::info!("Bot is now running. Press CTRL-C to exit.");

        tokio::select! {
            _ = shutdown => tracing::info!("Shutdown signal received"),
            _ = bot.liveness.stopped() => tracing::info!("Exit requested by a command"),
        }
        bot.liveness.clear();

        tracing::info!("Shutting down bot...");
        if let Err(e) = bot.notify_owner("Bot stopped").await {
            tracing::warn!("Failed to send stop notice: {}", e);
        }
        bot.session.close().await
    }
}

/// Copy the credential into a `Bot <token>` authorization, scrub the credential,
/// connect, then scrub the authorization
async fn connect_scrubbed(
    connector: &dyn Connector,
    credential: &mut [u8],
) -> Result<Arc<dyn Gateway>, BotError> {
    let mut authorization = b"Bot ".to_vec();
    authorization.extend_from_slice(credential);
    scrub(credential);

    let result = match std::str::from_utf8(&authorization) {
        Ok(auth) => connector.connect(auth).await,
        Err(_) => Err(BotError::Auth("credential is not valid UTF-8".to_string())),
    };
    scrub(&mut authorization);
    result
}

/// Gateway-facing handler; one task per inbound event
struct BotHandler {
    bot: Weak<Bot>,
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn on_message(&self, session: Arc<dyn Gateway>, message: Message) {
        let Some(bot) = self.bot.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            bot.handle_message(session, message).await;
        });
    }
}

/// Waits for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                wait_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_ctrl_c().await;
}

async fn wait_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
