//! Pipeline integration tests
//! Run with: cargo test --test pipeline_test

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use guildbot::application::errors::{BoxError, StorageError, ValidationError};
use guildbot::application::messaging::{DispatchOutcome, Rejection};
use guildbot::application::services::enablement_service::SETTINGS_ENTITY;
use guildbot::application::services::{BotRuntime, DisabledReason};
use guildbot::domain::entities::{
    Actor, ArgSpec, Command, CommandScope, ConfigAction, FlagSpec, InboundMessage, PluginDefinition,
};
use guildbot::domain::traits::StorageBackend;
use guildbot::infrastructure::adapters::MemoryGateway;
use guildbot::infrastructure::config::Config;
use guildbot::infrastructure::storage::MemoryBackend;
use guildbot::plugins;

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

const GUILD: &str = "g1";
const CHANNEL: &str = "general";
const OPS: &str = "ops";

/// Memory backend that counts calls and can be switched offline
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    offline: AtomicBool,
    gets: AtomicUsize,
    closes: AtomicUsize,
}

impl FlakyBackend {
    fn check(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("backend offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, t: &str, id: &str, k: &str) -> Result<Option<Value>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(t, id, k).await
    }

    async fn set(&self, t: &str, id: &str, k: &str, value: Value) -> Result<Value, StorageError> {
        self.check()?;
        self.inner.set(t, id, k, value).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    runtime: BotRuntime,
    gateway: Arc<MemoryGateway>,
    backend: Arc<FlakyBackend>,
    bans: Arc<AtomicUsize>,
    slow_started: Arc<Notify>,
    slow_finished: Arc<AtomicUsize>,
}

fn moderation(bans: Arc<AtomicUsize>, slow_started: Arc<Notify>, slow_finished: Arc<AtomicUsize>) -> PluginDefinition {
    PluginDefinition::new("moderation")
        .with_command(
            Command::new("ban")
                .with_level("moderator")
                .with_arg(ArgSpec::required("user"))
                .with_arg(ArgSpec::required("reason").greedy())
                .with_handler(move |ctx| {
                    let bans = bans.clone();
                    async move {
                        bans.fetch_add(1, Ordering::SeqCst);
                        Ok(Some(format!(
                            "banned {}: {}",
                            ctx.arg("user").unwrap_or_default(),
                            ctx.arg("reason").unwrap_or_default()
                        )))
                    }
                }),
        )
        .with_command(
            Command::new("boom")
                .with_scope(CommandScope::Any)
                .with_handler(|_ctx| async { Err(BoxError::from("kaboom: secret detail")) }),
        )
        .with_command(Command::new("crash").with_handler(|_ctx| async {
            if true {
                panic!("handler panicked");
            }
            Ok::<_, BoxError>(None)
        }))
        .with_command(
            Command::new("audit")
                .with_level("auditor")
                .with_handler(|_ctx| async { Ok(Some("audited".to_string())) }),
        )
        .with_config_action(
            ConfigAction::new("limit", |ctx| async move {
                let n = ctx.arg("n").unwrap_or_default();
                let forced = if ctx.switch("force") { " (forced)" } else { "" };
                Ok(Some(format!("limit {}{}", n, forced)))
            })
            .with_arg(ArgSpec::required("n"))
            .with_flag(FlagSpec::switch("force").with_short('f')),
        )
        .with_command(Command::new("slow").with_handler(move |_ctx| {
            let started = slow_started.clone();
            let finished = slow_finished.clone();
            async move {
                started.notify_one();
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(Some("slow done".to_string()))
            }
        }))
}

async fn harness() -> Harness {
    ensure_init();

    let mut config = Config::default();
    config.bot.owner_id = "owner".to_string();
    config.bot.operator_channel = Some(OPS.to_string());

    let gateway = Arc::new(MemoryGateway::new().with_tenant(GUILD, Some("guild-owner")));
    let bans = Arc::new(AtomicUsize::new(0));
    let slow_started = Arc::new(Notify::new());
    let slow_finished = Arc::new(AtomicUsize::new(0));

    let mut definitions = plugins::builtin(&config.bot.prefix);
    definitions.push(moderation(bans.clone(), slow_started.clone(), slow_finished.clone()));

    let backend = Arc::new(FlakyBackend::default());
    let runtime = BotRuntime::start_with(&config, gateway.clone(), backend.clone(), definitions)
        .await
        .unwrap();

    Harness {
        runtime,
        gateway,
        backend,
        bans,
        slow_started,
        slow_finished,
    }
}

fn say(actor: &str, text: &str) -> InboundMessage {
    InboundMessage::in_tenant(text, Actor::new(actor), GUILD, CHANNEL)
}

impl Harness {
    async fn send(&self, actor: &str, text: &str) -> DispatchOutcome {
        self.runtime.dispatch(say(actor, text)).await
    }

    fn last_reply(&self) -> String {
        self.gateway.sent_to(CHANNEL).last().cloned().unwrap_or_default()
    }

    /// Take the backend offline and drop everything the cache remembers
    fn storage_down(&self) {
        self.backend.offline.store(true, Ordering::SeqCst);
        self.runtime.services().store.clear();
    }
}

#[tokio::test]
async fn test_ping_replies() {
    let h = harness().await;
    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Completed);
    assert_eq!(h.gateway.sent_to(CHANNEL), vec!["Pong!".to_string()]);
}

#[tokio::test]
async fn test_plain_text_and_unknown_commands_are_ignored() {
    let h = harness().await;
    assert_eq!(h.send("bob", "hello there").await, DispatchOutcome::Ignored);
    assert_eq!(h.send("bob", "!nosuchcommand").await, DispatchOutcome::Ignored);
    assert!(h.gateway.sent().is_empty());
}

#[tokio::test]
async fn test_lookup_ignores_case() {
    let h = harness().await;
    assert_eq!(h.send("bob", "!PiNg").await, DispatchOutcome::Completed);
    assert_eq!(h.send("bob", "!SAY hi").await, DispatchOutcome::Completed);
    assert_eq!(h.last_reply(), "hi");
}

#[tokio::test]
async fn test_permission_denied_never_runs_body() {
    let h = harness().await;

    let outcome = h.send("bob", "!ban user123 spamming").await;

    assert_eq!(outcome, DispatchOutcome::Rejected(Rejection::PermissionDenied));
    assert_eq!(h.bans.load(Ordering::SeqCst), 0);
    assert_eq!(h.last_reply(), "You can't use that command here.");
}

#[tokio::test]
async fn test_granted_level_runs_with_greedy_reason() {
    let h = harness().await;

    assert_eq!(h.send("owner", "!grant moderator bob").await, DispatchOutcome::Completed);
    assert_eq!(h.last_reply(), "Granted `moderator` to user bob.");

    let outcome = h.send("bob", "!ban user123 spamming and also trolling").await;
    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(h.last_reply(), "banned user123: spamming and also trolling");
    assert_eq!(h.bans.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_role_grant_admits_role_holders() {
    let h = harness().await;
    h.send("owner", "!grant moderator mods --role").await;

    let carol = Actor::new("carol").with_roles(["mods"]);
    let outcome = h
        .runtime
        .dispatch(InboundMessage::in_tenant("!ban u1 flood", carol, GUILD, CHANNEL))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);

    h.send("owner", "!revoke moderator mods -r").await;
    assert_eq!(h.last_reply(), "Revoked `moderator` from role mods.");
}

#[tokio::test]
async fn test_guild_owner_bypasses_levels() {
    let h = harness().await;
    assert_eq!(h.send("guild-owner", "!ban u1 flood").await, DispatchOutcome::Completed);
    assert_eq!(h.bans.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_regrant_conflicts_and_keeps_one_entry() {
    let h = harness().await;

    h.send("owner", "!grant moderator bob").await;
    h.send("owner", "!grant moderator bob").await;

    assert_eq!(h.last_reply(), "`user bob` already holds level `moderator`");
    let membership = h
        .runtime
        .services()
        .permissions
        .get_permissions_data(GUILD, "moderator")
        .await
        .unwrap();
    assert_eq!(membership.users.len(), 1);
}

#[tokio::test]
async fn test_unknown_level_gets_hint() {
    let h = harness().await;
    h.send("owner", "!grant janitor bob").await;
    assert!(h.last_reply().starts_with("No level named `janitor`."));
}

#[tokio::test]
async fn test_command_error_is_reported_once_and_pipeline_continues() {
    let h = harness().await;

    let DispatchOutcome::Failed { incident } = h.send("bob", "!boom").await else {
        panic!("expected a failure");
    };

    let reports = h.gateway.sent_to(OPS);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains(&incident));
    assert!(reports[0].contains("kaboom: secret detail"));
    assert!(reports[0].contains("Actor: bob (bob)"));
    assert!(reports[0].contains("Message: !boom"));

    let replies = h.gateway.sent_to(CHANNEL);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains(&incident));
    assert!(!replies[0].contains("kaboom"));

    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Completed);
    assert_eq!(h.last_reply(), "Pong!");
}

#[tokio::test]
async fn test_panic_is_contained() {
    let h = harness().await;

    assert!(matches!(h.send("bob", "!crash").await, DispatchOutcome::Failed { .. }));
    assert_eq!(h.gateway.sent_to(OPS).len(), 1);
    assert!(h.gateway.sent_to(OPS)[0].contains("handler panicked"));

    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Completed);
}

#[tokio::test]
async fn test_disabled_plugin_blocks_its_commands() {
    let h = harness().await;

    h.send("owner", "!disable utility").await;
    assert_eq!(h.last_reply(), "Plugin `utility` disabled.");

    assert_eq!(
        h.send("bob", "!ping").await,
        DispatchOutcome::Rejected(Rejection::Disabled(DisabledReason::PluginDisabled("utility".into())))
    );

    h.send("owner", "!enable utility").await;
    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Completed);
}

#[tokio::test]
async fn test_core_cannot_be_disabled() {
    let h = harness().await;

    h.send("owner", "!disable core").await;
    assert_eq!(h.last_reply(), "`core` cannot be disabled");
    assert_eq!(h.send("bob", "!help").await, DispatchOutcome::Completed);
}

#[tokio::test]
async fn test_command_toggle() {
    let h = harness().await;

    h.send("owner", "!disable echo").await;
    assert_eq!(
        h.send("bob", "!echo hi").await,
        DispatchOutcome::Rejected(Rejection::Disabled(DisabledReason::CommandDisabled))
    );

    h.send("owner", "!disable echo").await;
    assert_eq!(h.last_reply(), "`echo` is already disabled");
}

#[tokio::test]
async fn test_prefix_config_action() {
    let h = harness().await;

    h.send("owner", "!config core prefix ?").await;
    assert_eq!(h.last_reply(), "Prefix set to `?`.");

    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Ignored);
    assert_eq!(h.send("bob", "?ping").await, DispatchOutcome::Completed);
}

#[tokio::test]
async fn test_config_is_admin_gated() {
    let h = harness().await;
    assert_eq!(
        h.send("bob", "!config core prefix ?").await,
        DispatchOutcome::Rejected(Rejection::PermissionDenied)
    );

    h.send("owner", "!grant admin bob").await;
    h.send("bob", "!config core prefix ?").await;
    assert_eq!(h.last_reply(), "Prefix set to `?`.");
}

#[tokio::test]
async fn test_config_unknown_action() {
    let h = harness().await;
    h.send("owner", "!config core colour red").await;
    assert_eq!(h.last_reply(), "`core` has no config action `colour`. Available: prefix");
}

#[tokio::test]
async fn test_config_action_flags_reach_the_action() {
    let h = harness().await;

    assert_eq!(
        h.send("owner", "!config moderation limit 5 --force").await,
        DispatchOutcome::Completed
    );
    assert_eq!(h.last_reply(), "limit 5 (forced)");

    h.send("owner", "!config moderation limit -f 7").await;
    assert_eq!(h.last_reply(), "limit 7 (forced)");

    h.send("owner", "!config moderation limit 3").await;
    assert_eq!(h.last_reply(), "limit 3");

    h.send("owner", "!config moderation limit 3 --bogus").await;
    assert_eq!(
        h.last_reply(),
        "Unknown flag `--bogus`\nUsage: !config moderation limit <n> [--force|-f]"
    );

    h.send("owner", "!config moderation limit --help").await;
    assert_eq!(h.last_reply(), "Usage: !config moderation limit <n> [--force|-f]");

    assert_eq!(h.send("owner", "!config --help").await, DispatchOutcome::Help);
}

#[tokio::test]
async fn test_config_inputs_starting_with_a_dash() {
    let h = harness().await;

    h.send("owner", "!config core prefix -b").await;
    assert_eq!(h.last_reply(), "Unknown flag `-b`\nUsage: !config core prefix <prefix>");

    h.send("owner", "!config core prefix -- -b").await;
    assert_eq!(h.last_reply(), "Prefix set to `-b`.");
    assert_eq!(h.send("bob", "-bping").await, DispatchOutcome::Completed);

    h.send("owner", "-bconfig core prefix \"-!\"").await;
    assert_eq!(h.last_reply(), "Prefix set to `-!`.");
}

#[tokio::test]
async fn test_validation_failure_shows_usage() {
    let h = harness().await;

    let outcome = h.send("bob", "!echo").await;

    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(Rejection::Invalid(ValidationError::MissingArgument("text".into())))
    );
    assert!(h.last_reply().contains("Usage: !echo <text...>"));
}

#[tokio::test]
async fn test_help_flag_short_circuits() {
    let h = harness().await;

    assert_eq!(h.send("owner", "!ban u1 --help").await, DispatchOutcome::Help);
    assert!(h.last_reply().starts_with("Usage: !ban <user> <reason...>"));
    assert_eq!(h.bans.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_echo_flags() {
    let h = harness().await;
    h.send("bob", "!echo -u --repeat 2 hi there").await;
    assert_eq!(h.last_reply(), "HI THERE\nHI THERE");

    h.send("bob", "!echo 'keep  spacing' --repeat=x").await;
    assert!(h.last_reply().starts_with("Flag `--repeat` expects an integer, got `x`"));
}

#[tokio::test]
async fn test_scope_mismatch() {
    let h = harness().await;
    let dm = InboundMessage::direct("!plugins", Actor::new("bob"), "dm-bob");

    assert_eq!(h.runtime.dispatch(dm).await, DispatchOutcome::Rejected(Rejection::WrongScope));
    assert_eq!(h.gateway.sent_to("dm-bob"), vec!["`plugins` can't be used here.".to_string()]);
}

#[tokio::test]
async fn test_defaults_seeded_on_connect() {
    let h = harness().await;
    let services = h.runtime.services();

    assert_eq!(
        services.store.get(SETTINGS_ENTITY, GUILD, "prefix").await.unwrap(),
        Some(json!("!"))
    );
    assert_eq!(services.enablement.bootstrap_defaults(GUILD).await.unwrap(), 0);
}

#[tokio::test]
async fn test_new_tenant_bootstrapped_on_first_command() {
    let h = harness().await;
    let outcome = h
        .runtime
        .dispatch(InboundMessage::in_tenant("!ping", Actor::new("bob"), "g2", CHANNEL))
        .await;

    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(
        h.runtime.services().store.get(SETTINGS_ENTITY, "g2", "prefix").await.unwrap(),
        Some(json!("!"))
    );
}

#[tokio::test]
async fn test_storage_outage_reports_and_apologises() {
    let h = harness().await;
    h.storage_down();

    let DispatchOutcome::Failed { incident } = h.send("bob", "!ping").await else {
        panic!("expected a failure");
    };

    let reports = h.gateway.sent_to(OPS);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("(storage error)"));
    assert!(reports[0].contains("backend offline"));

    let replies = h.gateway.sent_to(CHANNEL);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with("I can't reach my storage"));
    assert!(replies[0].contains(&incident));

    h.backend.offline.store(false, Ordering::SeqCst);
    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Completed);
    assert_eq!(h.last_reply(), "Pong!");
}

#[tokio::test]
async fn test_prefix_falls_back_to_default_when_storage_is_down() {
    let h = harness().await;
    h.send("owner", "!config core prefix ?").await;
    h.storage_down();

    assert_eq!(h.send("bob", "?ping").await, DispatchOutcome::Ignored);
    assert!(matches!(h.send("bob", "!ping").await, DispatchOutcome::Failed { .. }));
}

#[tokio::test]
async fn test_undeclared_level_is_reported_to_operator() {
    let h = harness().await;

    let DispatchOutcome::Failed { incident } = h.send("bob", "!audit").await else {
        panic!("expected a failure");
    };

    let reports = h.gateway.sent_to(OPS);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("(configuration error)"));
    assert!(reports[0].contains("requires undeclared level `auditor`"));
    assert!(h.last_reply().starts_with("Sorry, something went wrong"));
    assert!(h.last_reply().contains(&incident));
    assert!(!h.gateway.sent_to(CHANNEL).contains(&"audited".to_string()));
}

#[tokio::test]
async fn test_repeat_commands_are_served_from_cache() {
    let h = harness().await;

    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Completed);
    let gets = h.backend.gets.load(Ordering::SeqCst);

    assert_eq!(h.send("bob", "!ping").await, DispatchOutcome::Completed);
    assert_eq!(h.backend.gets.load(Ordering::SeqCst), gets);
}

#[tokio::test]
async fn test_shutdown_is_owner_only() {
    let h = harness().await;

    assert_eq!(
        h.send("guild-owner", "!shutdown").await,
        DispatchOutcome::Rejected(Rejection::PermissionDenied)
    );
    assert!(!h.runtime.shutdown_token().is_cancelled());

    assert_eq!(h.send("owner", "!shutdown").await, DispatchOutcome::Completed);
    assert!(h.runtime.shutdown_token().is_cancelled());
    assert_eq!(h.send("owner", "!ping").await, DispatchOutcome::Ignored);
}

#[tokio::test]
async fn test_run_waits_for_in_flight_before_disconnect() {
    let h = harness().await;
    let runtime = Arc::new(h.runtime);
    let (tx, rx) = mpsc::channel(8);

    let loop_runtime = runtime.clone();
    let handle = tokio::spawn(async move { loop_runtime.run(rx).await });

    tx.send(say("bob", "!slow")).await.unwrap();
    h.slow_started.notified().await;
    runtime.shutdown_token().cancel();

    handle.await.unwrap().unwrap();

    assert_eq!(h.slow_finished.load(Ordering::SeqCst), 1);
    assert_eq!(h.gateway.sent_to(CHANNEL), vec!["slow done".to_string()]);
    assert!(!h.gateway.is_connected());
}

#[tokio::test]
async fn test_shutdown_during_run_tears_down_once() {
    let h = harness().await;
    let runtime = Arc::new(h.runtime);
    let (tx, rx) = mpsc::channel(8);

    let loop_runtime = runtime.clone();
    let handle = tokio::spawn(async move { loop_runtime.run(rx).await });

    tx.send(say("bob", "!slow")).await.unwrap();
    h.slow_started.notified().await;
    runtime.shutdown().await.unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(h.slow_finished.load(Ordering::SeqCst), 1);
    assert_eq!(h.gateway.disconnect_count(), 1);
    assert_eq!(h.backend.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_ends_when_inbound_closes() {
    let h = harness().await;
    let (tx, rx) = mpsc::channel(8);

    tx.send(say("bob", "!ping")).await.unwrap();
    drop(tx);
    h.runtime.run(rx).await.unwrap();

    assert_eq!(h.gateway.sent_to(CHANNEL), vec!["Pong!".to_string()]);
    assert!(!h.gateway.is_connected());
}
