//! Dispatch pipeline and lifecycle tests
//! Run with: cargo test --test dispatch_test

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;

use ssx_bot::infrastructure::adapters::{MemoryConnector, MemoryGateway};
use ssx_bot::infrastructure::audit::MemoryAuditLogFactory;
use ssx_bot::infrastructure::config::Config;
use ssx_bot::application::errors::AuditError;
use ssx_bot::application::services::Status;
use ssx_bot::domain::traits::{AuditLogFactory, AuditSink};
use ssx_bot::{command_fn, Bot, BotError, Bundle, Command, CommandKind, CommandOutput, Dispatch, Message, Outcome, User};

const BOT_ID: &str = "bot-1";
const OWNER: &str = "owner-1";
const CHANNEL: &str = "chan-1";
const AUTHOR: &str = "user-7";

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

async fn setup() -> (Bot, Arc<MemoryGateway>, MemoryAuditLogFactory) {
    ensure_init();
    let gateway = MemoryGateway::new(User::new(BOT_ID).as_bot());
    let connector = MemoryConnector::new(gateway.clone());
    let audit = MemoryAuditLogFactory::new();
    let mut token = b"secret".to_vec();
    let bot = Bot::new(&connector, &mut token, OWNER, "unused-logs")
        .await
        .expect("bot should connect")
        .with_audit_log_factory(Arc::new(audit.clone()));
    (bot, gateway, audit)
}

fn message(text: &str) -> Message {
    Message::new(CHANNEL, User::new(AUTHOR), text)
}

type Calls = Arc<Mutex<Vec<(usize, Vec<String>)>>>;

/// Records the matched index and line, then returns `outcome`
fn recorder(calls: &Calls, outcome: Outcome) -> impl Command {
    let calls = Arc::clone(calls);
    command_fn(move |bundle, args| {
        calls.lock().unwrap().push((bundle.cmd_index(), args.to_vec()));
        CommandOutput::new(outcome)
    })
}

fn line(s: &str) -> Vec<String> {
    s.split_whitespace().map(String::from).collect()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn test_prefix_success_logs_start_and_finish() {
    let (mut bot, gateway, audit) = setup().await;
    let calls = Calls::default();
    bot.add_command("!ping", recorder(&calls, Outcome::Success));

    let dispatch = bot.handle_message(gateway.clone(), message("!ping")).await;

    assert_eq!(dispatch.reports().len(), 1);
    assert_eq!(dispatch.reports()[0].kind, CommandKind::Prefix);
    assert_eq!(dispatch.reports()[0].status, Status::Success);
    assert_eq!(calls.lock().unwrap().clone(), vec![(0, line("!ping"))]);
    assert_eq!(
        audit.lines(),
        vec![
            "START cmd:!ping args []".to_string(),
            "FINISH cmd:!ping line:[!ping] result:SUCCESS".to_string(),
        ]
    );
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_prefix_gets_full_line_and_requires_exact_match() {
    let (mut bot, gateway, _audit) = setup().await;
    let calls = Calls::default();
    bot.add_command("!roll", recorder(&calls, Outcome::Success));

    bot.handle_message(gateway.clone(), message("  !roll   2  d6 ")).await;
    bot.handle_message(gateway.clone(), message("!ROLL 2 d6")).await;
    bot.handle_message(gateway.clone(), message("please !roll")).await;

    assert_eq!(calls.lock().unwrap().clone(), vec![(0, line("!roll 2 d6"))]);
}

#[tokio::test]
async fn test_error_is_escalated_to_owner_and_channel() {
    let (mut bot, gateway, audit) = setup().await;
    bot.add_command("!broken", command_fn(|_, _| CommandOutput::failed("load quotes", "database is down")));

    let dispatch = bot.handle_message(gateway.clone(), message("!broken")).await;

    assert_eq!(dispatch.reports()[0].status, Status::Error);
    let owner_dm = gateway.sent_to(&MemoryGateway::direct_channel_id(OWNER));
    assert_eq!(owner_dm.len(), 1);
    assert!(owner_dm[0].contains("load quotes"));
    assert!(owner_dm[0].contains("database is down"));
    assert_eq!(
        gateway.sent_to(CHANNEL),
        vec![format!("<@{}> that didn't go as planned", AUTHOR)]
    );
    assert!(audit.lines().contains(&"FINISH cmd:!broken line:[!broken] result:ERROR".to_string()));
}

#[tokio::test]
async fn test_outcomes_without_error_send_nothing() {
    let (mut bot, gateway, audit) = setup().await;
    bot.add_command("!warn", command_fn(|_, _| CommandOutput::warning()));
    bot.add_command("!fatal", command_fn(|_, _| CommandOutput::fatal()));

    let warn = bot.handle_message(gateway.clone(), message("!warn")).await;
    let fatal = bot.handle_message(gateway.clone(), message("!fatal")).await;

    assert_eq!(warn.reports()[0].status, Status::Warning);
    assert_eq!(fatal.reports()[0].status, Status::Fatal);
    assert!(gateway.sent().is_empty());
    assert!(audit.lines().iter().any(|l| l.ends_with("result:FATAL")));
}

#[tokio::test]
async fn test_escalation_failure_does_not_stop_dispatch() {
    let (mut bot, gateway, audit) = setup().await;
    let calls = Calls::default();
    bot.add_custom("scan", command_fn(|_, _| CommandOutput::failed("scan", "boom")));
    bot.add_command("!ping", recorder(&calls, Outcome::Success));
    gateway.fail_sends(true);

    let dispatch = bot.handle_message(gateway.clone(), message("!ping")).await;

    let statuses: Vec<_> = dispatch.reports().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![Status::Error, Status::Success]);
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(audit.lines().iter().any(|l| l.starts_with("ESCALATE")));
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_first_inline_by_leftmost_token() {
    let (mut bot, gateway, _audit) = setup().await;
    let a_calls = Calls::default();
    let b_calls = Calls::default();
    bot.add_inline("a", recorder(&a_calls, Outcome::Success));
    bot.add_inline("b", recorder(&b_calls, Outcome::Success));

    let dispatch = bot.handle_message(gateway.clone(), message("x b a b")).await;

    assert_eq!(dispatch.reports().len(), 1);
    assert_eq!(dispatch.reports()[0].label, "b");
    assert_eq!(b_calls.lock().unwrap().clone(), vec![(1, line("x b a b"))]);
    assert!(a_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_inline_match_runs_nothing() {
    let (mut bot, gateway, audit) = setup().await;
    let calls = Calls::default();
    bot.add_inline("thanks", recorder(&calls, Outcome::Success));

    let dispatch = bot.handle_message(gateway.clone(), message("hello there")).await;

    assert_eq!(dispatch, Dispatch::Completed(Vec::new()));
    assert!(calls.lock().unwrap().is_empty());
    assert!(audit.lines().is_empty());
}

#[tokio::test]
async fn test_customs_run_on_every_event_in_order() {
    let (mut bot, gateway, audit) = setup().await;
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["stats", "moderation"] {
        let order = Arc::clone(&order);
        bot.add_custom(name, command_fn(move |_, args| {
            order.lock().unwrap().push((name, args.to_vec()));
            CommandOutput::success()
        }));
    }

    let first = bot.handle_message(gateway.clone(), message("just chatting")).await;
    bot.handle_message(gateway.clone(), message("!unknown")).await;

    assert_eq!(first.reports().len(), 2);
    assert_eq!(
        order.lock().unwrap().clone(),
        vec![
            ("stats", line("just chatting")),
            ("moderation", line("just chatting")),
            ("stats", line("!unknown")),
            ("moderation", line("!unknown")),
        ]
    );
    assert!(audit.lines().contains(&"START custom cmd:stats args [just chatting]".to_string()));
    assert!(audit.lines().contains(&"FINISH cmd:moderation line:[!unknown] result:SUCCESS".to_string()));
}

#[tokio::test]
async fn test_all_passes_fire_for_one_event() {
    let (mut bot, gateway, _audit) = setup().await;
    let custom = Calls::default();
    let inline = Calls::default();
    let prefix = Calls::default();
    bot.add_custom("watch", recorder(&custom, Outcome::Success));
    bot.add_inline("!hug", recorder(&inline, Outcome::Success));
    bot.add_command("!hug", recorder(&prefix, Outcome::Success));

    let dispatch = bot.handle_message(gateway.clone(), message("!hug everyone")).await;

    let kinds: Vec<_> = dispatch.reports().iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![CommandKind::Custom, CommandKind::Inline, CommandKind::Prefix]);
    assert_eq!(inline.lock().unwrap()[0].0, 0);
    assert_eq!(prefix.lock().unwrap().len(), 1);
    assert_eq!(custom.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelation_short_circuits() {
    let (mut bot, gateway, audit) = setup().await;
    let calls = Calls::default();
    let later_checked = Arc::new(AtomicBool::new(false));
    bot.add_custom("stats", recorder(&calls, Outcome::Success));
    bot.add_command("!ping", recorder(&calls, Outcome::Success));
    bot.add_cancelation(|bundle| bundle.message().content.contains("spam"));
    let flag = Arc::clone(&later_checked);
    bot.add_cancelation(move |_| {
        flag.store(true, Ordering::SeqCst);
        false
    });

    let dispatch = bot.handle_message(gateway.clone(), message("!ping spam")).await;

    assert_eq!(dispatch, Dispatch::Cancelled);
    assert!(calls.lock().unwrap().is_empty());
    assert!(!later_checked.load(Ordering::SeqCst));
    assert!(!audit.lines().iter().any(|l| l.starts_with("FINISH")));
    assert!(gateway.sent().is_empty());

    // Not cancelled: both predicates are consulted
    bot.handle_message(gateway.clone(), message("!ping")).await;
    assert!(later_checked.load(Ordering::SeqCst));
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_self_authored_events_are_ignored() {
    let (mut bot, gateway, audit) = setup().await;
    let calls = Calls::default();
    bot.add_custom("stats", recorder(&calls, Outcome::Success));

    let own = Message::new(CHANNEL, User::new(BOT_ID), "!ping");
    let dispatch = bot.handle_message(gateway.clone(), own).await;

    assert_eq!(dispatch, Dispatch::Ignored);
    assert!(calls.lock().unwrap().is_empty());
    assert!(audit.events().is_empty());
}

#[tokio::test]
async fn test_empty_line_has_no_command() {
    let (mut bot, gateway, audit) = setup().await;
    let calls = Calls::default();
    bot.add_custom("stats", recorder(&calls, Outcome::Success));

    let dispatch = bot.handle_message(gateway.clone(), message("  \t ")).await;

    assert_eq!(dispatch, Dispatch::Empty);
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(audit.lines(), vec!["START no cmd available".to_string()]);
}

#[tokio::test]
async fn test_each_event_gets_its_own_audit_log() {
    let (mut bot, gateway, audit) = setup().await;
    bot.add_command("!ping", command_fn(|_, _| CommandOutput::success()));

    bot.handle_message(gateway.clone(), message("!ping").with_id("m-1")).await;
    bot.handle_message(gateway.clone(), message("!ping").with_id("m-2")).await;

    let events = audit.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].ends_with(" m-1"));
    assert!(events[1].ends_with(" m-2"));
    for event in &events {
        let lines = audit.entries().into_iter().filter(|e| &e.event_id == event).count();
        assert_eq!(lines, 2);
    }
}

#[tokio::test]
async fn test_file_audit_log_under_log_path() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let gateway = MemoryGateway::new(User::new(BOT_ID));
    let connector = MemoryConnector::new(gateway.clone());
    let mut token = b"secret".to_vec();
    let mut bot = Bot::new(&connector, &mut token, OWNER, dir.path()).await.unwrap();
    bot.add_command("!ping", command_fn(|_, _| CommandOutput::success()));

    bot.handle_message(gateway.clone(), message("!ping").with_id("4242")).await;

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with(" 4242.log"), "unexpected file name {}", name);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert!(content.contains("START cmd:!ping args []"));
    assert!(content.contains("result:SUCCESS"));
}

#[tokio::test]
async fn test_credential_is_scrubbed() {
    ensure_init();
    let gateway = MemoryGateway::new(User::new(BOT_ID));
    let connector = MemoryConnector::new(gateway.clone()).accepting("Bot secret-token");
    let mut token = b"secret-token".to_vec();

    let bot = Bot::new(&connector, &mut token, OWNER, "logs").await.unwrap();

    assert_eq!(bot.id(), BOT_ID);
    assert_eq!(bot.owner(), OWNER);
    assert_ne!(token, b"secret-token".to_vec());
}

#[tokio::test]
async fn test_rejected_credential_fails_construction() {
    ensure_init();
    let gateway = MemoryGateway::new(User::new(BOT_ID));
    let connector = MemoryConnector::new(gateway.clone()).accepting("Bot right");
    let mut token = b"wrong".to_vec();

    let result = Bot::new(&connector, &mut token, OWNER, "logs").await;

    assert!(matches!(result, Err(BotError::Auth(_))));
    assert_ne!(token, b"wrong".to_vec());
}

#[tokio::test]
async fn test_from_config() {
    ensure_init();
    let gateway = MemoryGateway::new(User::new(BOT_ID));
    let connector = MemoryConnector::new(gateway.clone()).accepting("Bot abc");
    let config = Config::from_yaml("bot:\n  token: abc\n  owner: boss\n  log-path: logs\n").unwrap();

    let bot = Bot::from_config(&connector, config).await.unwrap();

    assert_eq!(bot.owner(), "boss");
    assert_eq!(bot.log_path(), std::path::Path::new("logs"));
}

/// Audit factory that can never open a sink
struct BrokenAudit;

impl AuditLogFactory for BrokenAudit {
    fn create(&self, _event_id: &str) -> Result<Box<dyn AuditSink>, AuditError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only log dir").into())
    }
}

#[tokio::test]
async fn test_dispatch_continues_without_audit_sink() {
    let (bot, gateway, _audit) = setup().await;
    let mut bot = bot.with_audit_log_factory(Arc::new(BrokenAudit));
    let calls = Calls::default();
    bot.add_command("!ping", recorder(&calls, Outcome::Success));

    let dispatch = bot.handle_message(gateway.clone(), message("!ping now")).await;

    assert_eq!(calls.lock().unwrap().clone(), vec![(0, line("!ping now"))]);
    assert_eq!(dispatch.reports().len(), 1);
    assert_eq!(dispatch.reports()[0].status, Status::Success);
}

#[tokio::test]
async fn test_run_fails_when_start_notice_cannot_be_sent() {
    let (bot, gateway, _audit) = setup().await;
    let liveness = bot.liveness().clone();
    gateway.fail_sends(true);

    let result = tokio::time::timeout(Duration::from_secs(5), bot.run_until(std::future::pending()))
        .await
        .expect("run should return");

    assert!(result.is_err());
    assert!(gateway.was_closed());
    assert!(!gateway.is_open());
    assert!(!liveness.is_alive());
}

#[tokio::test]
async fn test_run_stops_on_exit_outcome() {
    let (mut bot, gateway, audit) = setup().await;
    bot.add_command("!noop", command_fn(|_, _| CommandOutput::success()));
    bot.add_command("!stop", command_fn(|_, _| CommandOutput::exit()));
    let liveness = bot.liveness().clone();
    assert!(!liveness.is_alive());

    let owner_dm = MemoryGateway::direct_channel_id(OWNER);
    let run = tokio::spawn(bot.run_until(std::future::pending()));

    wait_until(|| gateway.sent_to(&owner_dm).contains(&"Bot started".to_string())).await;
    assert!(gateway.is_open());
    assert!(liveness.is_alive());

    assert!(gateway.deliver(message("!noop")).await);
    wait_until(|| audit.lines().iter().any(|l| l.starts_with("FINISH cmd:!noop"))).await;
    assert!(liveness.is_alive());

    assert!(gateway.deliver(message("!stop")).await);
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should unblock")
        .expect("run task panicked");

    assert!(result.is_ok());
    assert!(!liveness.is_alive());
    assert!(audit.lines().contains(&"FINISH cmd:!stop line:[!stop] result:EXIT".to_string()));
    assert_eq!(gateway.sent_to(&owner_dm), vec!["Bot started", "Bot stopped"]);
    assert!(gateway.was_closed());
}

#[tokio::test]
async fn test_run_stops_on_external_shutdown() {
    let (bot, gateway, _audit) = setup().await;
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(bot.run_until(async move {
        let _ = rx.await;
    }));

    wait_until(|| gateway.is_open()).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(gateway.was_closed());
    assert_eq!(
        gateway.sent_to(&MemoryGateway::direct_channel_id(OWNER)),
        vec!["Bot started", "Bot stopped"]
    );
}

/// Waits until released by another event
struct Gate {
    release: Arc<tokio::sync::Notify>,
    passed: Arc<AtomicUsize>,
}

#[async_trait]
impl Command for Gate {
    async fn run(&self, _bundle: &Bundle<'_>, _args: &[String]) -> CommandOutput {
        self.release.notified().await;
        self.passed.fetch_add(1, Ordering::SeqCst);
        CommandOutput::success()
    }
}

#[tokio::test]
async fn test_events_dispatch_concurrently() {
    let (mut bot, gateway, _audit) = setup().await;
    let release = Arc::new(tokio::sync::Notify::new());
    let passed = Arc::new(AtomicUsize::new(0));
    bot.add_command("!wait", Gate {
        release: Arc::clone(&release),
        passed: Arc::clone(&passed),
    });
    let opener = Arc::clone(&release);
    bot.add_command("!go", command_fn(move |_, _| {
        opener.notify_one();
        CommandOutput::success()
    }));
    bot.add_command("!stop", command_fn(|_, _| CommandOutput::exit()));

    let run = tokio::spawn(bot.run_until(std::future::pending()));
    wait_until(|| gateway.is_open()).await;

    // The first event blocks until the second one runs
    gateway.deliver(message("!wait")).await;
    gateway.deliver(message("!go")).await;
    wait_until(|| passed.load(Ordering::SeqCst) == 1).await;

    gateway.deliver(message("!stop")).await;
    tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
}
