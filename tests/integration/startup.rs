//! Loading configuration files and starting the daemon
//!
//! Scenarios:
//! - A config file on disk resolves and starts with the built-in executors
//! - Startup refuses kinds without executors and notifiers without transports
//! - Jabber notifiers only connect when something is delivered
//! - A failing command check reaches a command notifier end to end

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tempfile::NamedTempFile;
use vigil::Daemon;
use vigil::config::{self, CheckKind};
use vigil::error::{ConfigError, StartupError};
use vigil::probes::{ProbeExecutors, ProbeKind};

use crate::helpers::*;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_config_file() {
    let file = write_config(
        r#"
        [global]
        workers = 4
        fail_schedule = ["30s", "2m"]

        [[check.web]]
        id = "homepage"
        url = "https://example.com"
        repeat = "30s"
        look_for = "Welcome"
        notify_fail = ["ops"]

        [[check.port]]
        id = "db"
        host = "db.local"
        port = 5432

        [[notify.cmd]]
        id = "ops"
        command = "logger"

        [[notify.webhook]]
        id = "chat"
        url = "https://chat.example.com/hook"
        slow_schedule = ["10m"]
        "#,
    );

    let config = config::load(file.path()).unwrap();

    assert_eq!(config.global.workers, 4);
    assert_eq!(config.checks.len(), 2);

    let homepage = &config.checks[0];
    assert_eq!(homepage.repeat, Duration::from_secs(30));
    assert_eq!(homepage.look_for.as_deref(), Some("Welcome"));
    assert_eq!(homepage.notify_fail, vec!["ops".to_string()]);
    assert_eq!(homepage.notify_slow, vec!["ops".to_string(), "chat".to_string()]);

    assert_matches!(&config.checks[1].kind, CheckKind::Port(port) if port.port == 5432);

    let chat = config.notifiers.iter().find(|n| n.id == "chat").unwrap();
    assert_eq!(chat.fail_schedule, vec![Duration::from_secs(30), Duration::from_secs(120)]);
    assert_eq!(chat.slow_schedule, vec![Duration::from_secs(600)]);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = config::load(dir.path().join("missing.toml"));
    assert_matches!(result, Err(ConfigError::Io(_)));
}

#[test]
fn test_unknown_check_kind_is_rejected() {
    let file = write_config(
        r#"
        [global]
        workers = 1

        [[check.smtp]]
        id = "mx"
        "#,
    );

    assert_matches!(config::load(file.path()), Err(ConfigError::Parse(_)));
}

#[tokio::test]
async fn test_start_without_executor_for_kind() {
    let config = config(1, vec![cmd_check("disk", Duration::from_secs(60))], vec![]);
    let executors = ProbeExecutors::new().register(ProbeKind::Web, ScriptedExecutor::new());
    let (notifiers, _receiver) = collecting(&[]);

    let result = Daemon::start(&config, executors, notifiers);
    assert_matches!(
        result.err(),
        Some(StartupError::NoExecutor { check, kind: ProbeKind::Cmd }) if check == "disk"
    );
}

#[tokio::test]
async fn test_start_without_notifier_transport() {
    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(60), 1, &["ops", "pager"])],
        vec![notifier("ops", &[60], &[0]), notifier("pager", &[60], &[0])],
    );
    let executor: Arc<ScriptedExecutor> = ScriptedExecutor::new();
    let (notifiers, _receiver) = collecting(&["ops"]);

    let result = Daemon::start(&config, executors(executor), notifiers);
    assert_matches!(
        result.err(),
        Some(StartupError::MissingTransport { check, notifier }) if check == "api" && notifier == "pager"
    );
}

#[tokio::test]
async fn test_jabber_notifier_starts_without_connecting() {
    let file = write_config(
        r#"
        [global]
        workers = 1

        [[check.cmd]]
        id = "disk"
        command = "true"

        [[notify.jabber]]
        id = "im"
        server = "xmpp.example.com"
        port = 5222
        user = "robot@example.com"
        to = ["ops@example.com"]
        "#,
    );

    let config = config::load(file.path()).unwrap();
    let daemon = Daemon::start_default(&config).unwrap();
    daemon.shutdown().await;
}

#[tokio::test]
async fn test_invalid_jabber_recipient_fails_startup() {
    let file = write_config(
        r#"
        [global]
        workers = 1

        [[check.cmd]]
        id = "disk"
        command = "true"

        [[notify.jabber]]
        id = "im"
        server = "xmpp.example.com"
        port = 5222
        user = "robot@example.com"
        to = ["ops@"]
        "#,
    );

    let config = config::load(file.path()).unwrap();
    let result = Daemon::start_default(&config);
    assert_matches!(
        result.err(),
        Some(StartupError::NotifierSetup { id, .. }) if id == "im"
    );
}

#[tokio::test]
async fn test_failing_command_reaches_command_notifier() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("alerts.log");

    let file = write_config(&format!(
        r#"
        [global]
        workers = 1

        [[check.cmd]]
        id = "broken"
        command = "exit 3"
        repeat = "1s"

        [[notify.cmd]]
        id = "log"
        command = "printf '%s|%s\n' \"$VIGIL_KIND\" \"$VIGIL_SUBJECT\" >> {}"
        "#,
        output.display()
    ));

    let config = config::load(file.path()).unwrap();
    let daemon = Daemon::start_default(&config).unwrap();

    let mut contents = String::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        contents = std::fs::read_to_string(&output).unwrap_or_default();
        if !contents.is_empty() {
            break;
        }
    }

    daemon.shutdown().await;

    assert_eq!(contents.lines().next(), Some("fail|exit 3 problem"));
}
