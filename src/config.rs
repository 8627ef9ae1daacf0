//! Configuration file handling
//!
//! The file is TOML. It is read into the raw [`Config`] structs, validated, and then
//! resolved into immutable [`CheckDefinition`]s and [`NotifierDefinition`]s with every
//! default filled in, every duration parsed and every `${VAR}` expanded. Nothing
//! downstream ever sees an optional field.
//!
//! ```toml
//! [global]
//! workers = 4
//!
//! [[check.web]]
//! id = "homepage"
//! url = "https://example.com"
//! allowed_fails = 2
//! notify_fail = ["ops"]
//!
//! [[notify.cmd]]
//! id = "ops"
//! command = "logger -t vigil '{subject}'"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{trace, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::probes::ProbeKind;
use crate::util::{expand_env, parse_duration};

const DEFAULT_LOG_LEVEL: &str = "warn";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_REPEAT: Duration = Duration::from_secs(60);
const DEFAULT_EXPECTED_CODE: u16 = 200;
const DEFAULT_ALLOWED_FAILS: u32 = 1;

const WEB_EXPECTED_TIME_MS: u64 = 1000;
const WEB_ALLOWED_SLOWS: u32 = 2;
const PING_EXPECTED_TIME_MS: u64 = 150;
const PING_ALLOWED_SLOWS: u32 = 3;
const PORT_EXPECTED_TIME_MS: u64 = 150;
const PORT_ALLOWED_SLOWS: u32 = 3;
const CMD_EXPECTED_TIME_MS: u64 = 5000;
const CMD_ALLOWED_SLOWS: u32 = 2;

const DEFAULT_FAIL_SCHEDULE: [&str; 3] = ["1m", "5m", "10m"];
const DEFAULT_SLOW_SCHEDULE: [&str; 2] = ["5m", "0"];

const FAIL_SUBJECT: &str = "{check}{params} problem";
const SLOW_SUBJECT: &str = "{check}{params} slow";
const FAIL_OK_SUBJECT: &str = "{check}{params} ok";
const SLOW_OK_SUBJECT: &str = "{check}{params} ok";
const FAIL_TEXT: &str =
    "FAILURE:\n{check}{params}\nTime: {timestamp}\n\nResponse code: {response_code}\nError: {error}\n";
const SLOW_TEXT: &str = "SLOW RESPONSE:\n{check}{params}\nTime: {timestamp}\n\nResponse/Expected time: {response_time}/{expected_time}\n";
const FAIL_OK_TEXT: &str =
    "RECOVERED:\n{check}{params}\nTime: {timestamp}\n\nResponse code: {response_code}\n";
const SLOW_OK_TEXT: &str = "RECOVERED:\n{check}{params}\nTime: {timestamp}\n\nResponse/Expected time: {response_time}/{expected_time}\n";

// ============================================================================
// Raw configuration (as written in the file)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub check: CheckSections,

    #[serde(default)]
    pub notify: NotifySections,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Concurrency ceiling per check kind
    #[serde(default)]
    pub workers: usize,

    pub log_level: Option<String>,

    pub http_timeout: Option<String>,
    pub ping_timeout: Option<String>,
    pub port_timeout: Option<String>,

    /// Fallback schedules for notifiers that don't define their own
    pub fail_schedule: Option<Vec<String>>,
    pub slow_schedule: Option<Vec<String>>,

    /// Fallback message templates
    #[serde(default)]
    pub templates: TemplateConfig,
}

/// One table per check kind. Unknown kinds are rejected while parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckSections {
    #[serde(default)]
    pub web: Vec<WebCheckConfig>,
    #[serde(default)]
    pub ping: Vec<PingCheckConfig>,
    #[serde(default)]
    pub port: Vec<PortCheckConfig>,
    #[serde(default)]
    pub cmd: Vec<CmdCheckConfig>,
}

/// Fields shared by every check kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonCheckConfig {
    #[serde(default)]
    pub id: String,

    /// Interval between two probes
    pub repeat: Option<String>,

    pub expected_code: Option<u16>,

    /// Maximum latency in milliseconds before a round counts as slow
    pub expected_time: Option<u64>,

    pub allowed_fails: Option<u32>,
    pub allowed_slows: Option<u32>,

    /// Substring the response body has to contain
    pub look_for: Option<String>,

    /// Notifiers for failures (defaults to all notifiers)
    pub notify_fail: Option<Vec<String>>,

    /// Notifiers for slowness (defaults to all notifiers)
    pub notify_slow: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebCheckConfig {
    #[serde(flatten)]
    pub common: CommonCheckConfig,

    #[serde(default)]
    pub url: String,

    pub method: Option<HttpMethod>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body, either JSON or url encoded `a=b&c=d`
    pub params: Option<String>,

    /// Maximum number of redirects to follow
    pub redirects: Option<usize>,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingCheckConfig {
    #[serde(flatten)]
    pub common: CommonCheckConfig,

    #[serde(default)]
    pub host: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortCheckConfig {
    #[serde(flatten)]
    pub common: CommonCheckConfig,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CmdCheckConfig {
    #[serde(flatten)]
    pub common: CommonCheckConfig,

    #[serde(default)]
    pub command: String,

    pub params: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// One table per notifier kind. Unknown kinds are rejected while parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifySections {
    #[serde(default)]
    pub mail: Vec<MailNotifierConfig>,
    #[serde(default)]
    pub jabber: Vec<JabberNotifierConfig>,
    #[serde(default)]
    pub cmd: Vec<CmdNotifierConfig>,
    #[serde(default)]
    pub webhook: Vec<WebhookNotifierConfig>,
}

/// Fields shared by every notifier kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonNotifierConfig {
    #[serde(default)]
    pub id: String,

    pub fail_schedule: Option<Vec<String>>,
    pub slow_schedule: Option<Vec<String>>,

    /// Don't deliver recovery messages
    #[serde(default)]
    pub no_recovery: bool,

    #[serde(default)]
    pub templates: TemplateConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateConfig {
    pub fail_subject: Option<String>,
    pub fail_text: Option<String>,
    pub slow_subject: Option<String>,
    pub slow_text: Option<String>,
    pub fail_ok_subject: Option<String>,
    pub fail_ok_text: Option<String>,
    pub slow_ok_subject: Option<String>,
    pub slow_ok_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailNotifierConfig {
    #[serde(flatten)]
    pub common: CommonNotifierConfig,

    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub ignore_cert: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JabberNotifierConfig {
    #[serde(flatten)]
    pub common: CommonNotifierConfig,

    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    pub pass: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub ignore_cert: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CmdNotifierConfig {
    #[serde(flatten)]
    pub common: CommonNotifierConfig,

    /// Command line run through `sh -c`, may contain `{subject}` and `{text}`
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookNotifierConfig {
    #[serde(flatten)]
    pub common: CommonNotifierConfig,

    #[serde(default)]
    pub url: String,
}

// ============================================================================
// Resolved configuration (what the daemon runs on)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub global: ResolvedGlobal,
    pub checks: Vec<CheckDefinition>,
    pub notifiers: Vec<NotifierDefinition>,
}

#[derive(Debug, Clone)]
pub struct ResolvedGlobal {
    pub workers: usize,
    pub log_level: String,
    pub http_timeout: Duration,
    pub ping_timeout: Duration,
    pub port_timeout: Duration,
}

impl Default for ResolvedGlobal {
    fn default() -> Self {
        Self {
            workers: 1,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            port_timeout: DEFAULT_PORT_TIMEOUT,
        }
    }
}

/// A fully resolved, immutable check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckDefinition {
    pub id: String,
    pub kind: CheckKind,
    pub repeat: Duration,
    pub expected_code: u16,
    pub expected_time: Duration,
    pub allowed_fails: u32,
    pub allowed_slows: u32,
    pub look_for: Option<String>,
    pub notify_fail: Vec<String>,
    pub notify_slow: Vec<String>,
}

impl CheckDefinition {
    /// Create a definition with the defaults of its kind
    pub fn new(id: impl Into<String>, kind: CheckKind) -> Self {
        let (expected_time, allowed_slows) = kind.probe_kind().default_slowness();
        Self {
            id: id.into(),
            kind,
            repeat: DEFAULT_REPEAT,
            expected_code: DEFAULT_EXPECTED_CODE,
            expected_time,
            allowed_fails: DEFAULT_ALLOWED_FAILS,
            allowed_slows,
            look_for: None,
            notify_fail: vec![],
            notify_slow: vec![],
        }
    }
}

/// What a check probes, one variant per check kind
#[derive(Debug, Clone, PartialEq)]
pub enum CheckKind {
    Web(WebTarget),
    Ping(PingTarget),
    Port(PortTarget),
    Cmd(CmdTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebTarget {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub params: Option<String>,
    pub redirects: usize,
    pub insecure: bool,
}

impl WebTarget {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: vec![],
            params: None,
            redirects: 10,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingTarget {
    pub host: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortTarget {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmdTarget {
    pub command: String,
    pub params: Option<String>,
}

impl CheckKind {
    pub fn probe_kind(&self) -> ProbeKind {
        match self {
            CheckKind::Web(_) => ProbeKind::Web,
            CheckKind::Ping(_) => ProbeKind::Ping,
            CheckKind::Port(_) => ProbeKind::Port,
            CheckKind::Cmd(_) => ProbeKind::Cmd,
        }
    }

    /// The probed target as shown in messages
    pub fn target(&self) -> String {
        match self {
            CheckKind::Web(web) => web.url.clone(),
            CheckKind::Ping(ping) => ping.host.clone(),
            CheckKind::Port(port) => format!("{}:{}", port.host, port.port),
            CheckKind::Cmd(cmd) => cmd.command.clone(),
        }
    }

    pub fn params(&self) -> Option<&str> {
        match self {
            CheckKind::Web(web) => web.params.as_deref(),
            CheckKind::Cmd(cmd) => cmd.params.as_deref(),
            CheckKind::Ping(_) | CheckKind::Port(_) => None,
        }
    }
}

impl ProbeKind {
    /// Expected latency and allowed slow rounds when the config doesn't say
    fn default_slowness(&self) -> (Duration, u32) {
        match self {
            ProbeKind::Web => (Duration::from_millis(WEB_EXPECTED_TIME_MS), WEB_ALLOWED_SLOWS),
            ProbeKind::Ping => (Duration::from_millis(PING_EXPECTED_TIME_MS), PING_ALLOWED_SLOWS),
            ProbeKind::Port => (Duration::from_millis(PORT_EXPECTED_TIME_MS), PORT_ALLOWED_SLOWS),
            ProbeKind::Cmd => (Duration::from_millis(CMD_EXPECTED_TIME_MS), CMD_ALLOWED_SLOWS),
        }
    }
}

/// A fully resolved notifier
#[derive(Debug, Clone, PartialEq)]
pub struct NotifierDefinition {
    pub id: String,
    pub kind: NotifierKind,
    pub fail_schedule: Vec<Duration>,
    pub slow_schedule: Vec<Duration>,
    pub no_recovery: bool,
    pub templates: MessageTemplates,
}

impl NotifierDefinition {
    /// Create a notifier with the default schedules and templates
    pub fn new(id: impl Into<String>, kind: NotifierKind) -> Self {
        Self {
            id: id.into(),
            kind,
            fail_schedule: default_schedule(&DEFAULT_FAIL_SCHEDULE),
            slow_schedule: default_schedule(&DEFAULT_SLOW_SCHEDULE),
            no_recovery: false,
            templates: MessageTemplates::default(),
        }
    }
}

fn default_schedule(entries: &[&str]) -> Vec<Duration> {
    entries.iter().filter_map(|entry| parse_duration(entry)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifierKind {
    Mail(MailTarget),
    Jabber(JabberTarget),
    Cmd(CmdNotifierTarget),
    Webhook(WebhookTarget),
}

impl NotifierKind {
    pub fn name(&self) -> &'static str {
        match self {
            NotifierKind::Mail(_) => "mail",
            NotifierKind::Jabber(_) => "jabber",
            NotifierKind::Cmd(_) => "cmd",
            NotifierKind::Webhook(_) => "webhook",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailTarget {
    pub server: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub ignore_cert: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JabberTarget {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub pass: Option<String>,
    pub to: Vec<String>,
    pub ignore_cert: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmdNotifierTarget {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookTarget {
    pub url: String,
}

/// Subject and text templates, one pair per notification kind
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplates {
    pub fail_subject: String,
    pub fail_text: String,
    pub slow_subject: String,
    pub slow_text: String,
    pub fail_ok_subject: String,
    pub fail_ok_text: String,
    pub slow_ok_subject: String,
    pub slow_ok_text: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            fail_subject: FAIL_SUBJECT.to_string(),
            fail_text: FAIL_TEXT.to_string(),
            slow_subject: SLOW_SUBJECT.to_string(),
            slow_text: SLOW_TEXT.to_string(),
            fail_ok_subject: FAIL_OK_SUBJECT.to_string(),
            fail_ok_text: FAIL_OK_TEXT.to_string(),
            slow_ok_subject: SLOW_OK_SUBJECT.to_string(),
            slow_ok_text: SLOW_OK_TEXT.to_string(),
        }
    }
}

impl MessageTemplates {
    /// Notifier value, then global value, then built-in default
    fn resolve(own: &TemplateConfig, global: &TemplateConfig) -> Self {
        let pick = |own: &Option<String>, global: &Option<String>, default: &str| {
            own.clone()
                .or_else(|| global.clone())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            fail_subject: pick(&own.fail_subject, &global.fail_subject, FAIL_SUBJECT),
            fail_text: pick(&own.fail_text, &global.fail_text, FAIL_TEXT),
            slow_subject: pick(&own.slow_subject, &global.slow_subject, SLOW_SUBJECT),
            slow_text: pick(&own.slow_text, &global.slow_text, SLOW_TEXT),
            fail_ok_subject: pick(&own.fail_ok_subject, &global.fail_ok_subject, FAIL_OK_SUBJECT),
            fail_ok_text: pick(&own.fail_ok_text, &global.fail_ok_text, FAIL_OK_TEXT),
            slow_ok_subject: pick(&own.slow_ok_subject, &global.slow_ok_subject, SLOW_OK_SUBJECT),
            slow_ok_text: pick(&own.slow_ok_text, &global.slow_ok_text, SLOW_OK_TEXT),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Read, validate and resolve a configuration file
pub fn load(path: impl AsRef<Path>) -> ConfigResult<ResolvedConfig> {
    let config = read_config_file(path)?;
    config.validate()?;
    config.resolve()
}

pub fn read_config_file(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    Config::from_toml(&content)
}

impl Config {
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str::<Config>(content)
            .map_err(ConfigError::from)
            .inspect(|config| trace!("loaded config: {config:?}"))
    }

    fn check_count(&self) -> usize {
        self.check.web.len() + self.check.ping.len() + self.check.port.len() + self.check.cmd.len()
    }

    /// Ids of every defined notifier, in file order
    pub fn notifier_ids(&self) -> Vec<String> {
        let notify = &self.notify;
        notify
            .mail
            .iter()
            .map(|n| &n.common)
            .chain(notify.jabber.iter().map(|n| &n.common))
            .chain(notify.cmd.iter().map(|n| &n.common))
            .chain(notify.webhook.iter().map(|n| &n.common))
            .map(|common| common.id.clone())
            .collect()
    }

    /// Check that every mandatory field is present and every reference resolves
    pub fn validate(&self) -> ConfigResult<()> {
        if self.global.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.check_count() == 0 {
            return Err(ConfigError::NoChecks);
        }

        self.validate_notifiers()?;
        self.validate_checks()
    }

    fn validate_checks(&self) -> ConfigResult<()> {
        let notifiers: HashSet<String> = self.notifier_ids().into_iter().collect();
        let mut seen = HashSet::new();

        let mut validate_common = |section: &'static str, index: usize, common: &CommonCheckConfig| {
            if common.id.is_empty() {
                return Err(ConfigError::MissingId {
                    section,
                    index: index + 1,
                });
            }
            if !seen.insert(common.id.clone()) {
                return Err(ConfigError::DuplicateId {
                    section: "check",
                    id: common.id.clone(),
                });
            }

            let referenced = common.notify_fail.iter().chain(common.notify_slow.iter()).flatten();
            for notifier in referenced {
                if !notifiers.contains(notifier) {
                    return Err(ConfigError::UnknownNotifier {
                        check: common.id.clone(),
                        notifier: notifier.clone(),
                    });
                }
            }
            Ok(())
        };

        for (index, check) in self.check.web.iter().enumerate() {
            validate_common("check.web", index, &check.common)?;
            require("check.web", &check.common.id, "url", &check.url)?;
        }
        for (index, check) in self.check.ping.iter().enumerate() {
            validate_common("check.ping", index, &check.common)?;
            require("check.ping", &check.common.id, "host", &check.host)?;
        }
        for (index, check) in self.check.port.iter().enumerate() {
            validate_common("check.port", index, &check.common)?;
            require("check.port", &check.common.id, "host", &check.host)?;
            if check.port == 0 {
                return Err(missing("check.port", &check.common.id, "port"));
            }
        }
        for (index, check) in self.check.cmd.iter().enumerate() {
            validate_common("check.cmd", index, &check.common)?;
            require("check.cmd", &check.common.id, "command", &check.command)?;
        }

        Ok(())
    }

    fn validate_notifiers(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        let mut validate_common = |section: &'static str, index: usize, common: &CommonNotifierConfig| {
            if common.id.is_empty() {
                return Err(ConfigError::MissingId {
                    section,
                    index: index + 1,
                });
            }
            if !seen.insert(common.id.clone()) {
                return Err(ConfigError::DuplicateId {
                    section: "notify",
                    id: common.id.clone(),
                });
            }
            Ok(())
        };

        for (index, mail) in self.notify.mail.iter().enumerate() {
            let id = &mail.common.id;
            validate_common("notify.mail", index, &mail.common)?;
            require("notify.mail", id, "server", &mail.server)?;
            if mail.port == 0 {
                return Err(missing("notify.mail", id, "port"));
            }
            if mail.from.is_none() && mail.user.is_none() {
                return Err(missing("notify.mail", id, "from"));
            }
            if mail.to.is_empty() {
                return Err(missing("notify.mail", id, "to"));
            }
        }
        for (index, jabber) in self.notify.jabber.iter().enumerate() {
            let id = &jabber.common.id;
            validate_common("notify.jabber", index, &jabber.common)?;
            require("notify.jabber", id, "server", &jabber.server)?;
            if jabber.port == 0 {
                return Err(missing("notify.jabber", id, "port"));
            }
            require("notify.jabber", id, "user", &jabber.user)?;
            if jabber.to.is_empty() {
                return Err(missing("notify.jabber", id, "to"));
            }
        }
        for (index, cmd) in self.notify.cmd.iter().enumerate() {
            validate_common("notify.cmd", index, &cmd.common)?;
            require("notify.cmd", &cmd.common.id, "command", &cmd.command)?;
        }
        for (index, webhook) in self.notify.webhook.iter().enumerate() {
            validate_common("notify.webhook", index, &webhook.common)?;
            require("notify.webhook", &webhook.common.id, "url", &webhook.url)?;
        }

        Ok(())
    }

    /// Fill in defaults, expand environment variables and parse durations
    pub fn resolve(self) -> ConfigResult<ResolvedConfig> {
        let all_notifiers = self.notifier_ids();
        let global = &self.global;

        let resolved_global = ResolvedGlobal {
            workers: global.workers,
            log_level: global
                .log_level
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            http_timeout: duration_or("global", "http_timeout", &global.http_timeout, DEFAULT_HTTP_TIMEOUT)?,
            ping_timeout: duration_or("global", "ping_timeout", &global.ping_timeout, DEFAULT_PING_TIMEOUT)?,
            port_timeout: duration_or("global", "port_timeout", &global.port_timeout, DEFAULT_PORT_TIMEOUT)?,
        };

        let mut checks = Vec::with_capacity(self.check_count());

        for web in &self.check.web {
            let id = &web.common.id;
            let kind = CheckKind::Web(WebTarget {
                url: expand_env(&web.url, id, "url"),
                method: web.method.unwrap_or_default(),
                headers: web
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), expand_env(value, id, "headers")))
                    .collect(),
                params: web.params.as_deref().map(|params| expand_env(params, id, "params")),
                redirects: web.redirects.unwrap_or(10),
                insecure: web.insecure,
            });
            checks.push(resolve_check(&web.common, kind, &all_notifiers)?);
        }
        for ping in &self.check.ping {
            let kind = CheckKind::Ping(PingTarget {
                host: ping.host.clone(),
            });
            checks.push(resolve_check(&ping.common, kind, &all_notifiers)?);
        }
        for port in &self.check.port {
            let kind = CheckKind::Port(PortTarget {
                host: port.host.clone(),
                port: port.port,
            });
            checks.push(resolve_check(&port.common, kind, &all_notifiers)?);
        }
        for cmd in &self.check.cmd {
            let id = &cmd.common.id;
            let kind = CheckKind::Cmd(CmdTarget {
                command: expand_env(&cmd.command, id, "command"),
                params: cmd.params.as_deref().map(|params| expand_env(params, id, "params")),
            });
            checks.push(resolve_check(&cmd.common, kind, &all_notifiers)?);
        }

        let mut notifiers = Vec::with_capacity(all_notifiers.len());

        for mail in &self.notify.mail {
            let id = &mail.common.id;
            let user = mail.user.as_deref().map(|user| expand_env(user, id, "user"));
            let kind = NotifierKind::Mail(MailTarget {
                server: expand_env(&mail.server, id, "server"),
                port: mail.port,
                from: mail.from.clone().or_else(|| user.clone()).unwrap_or_default(),
                user,
                pass: mail.pass.as_deref().map(|pass| expand_env(pass, id, "pass")),
                to: mail.to.clone(),
                ignore_cert: mail.ignore_cert,
            });
            notifiers.push(resolve_notifier(&mail.common, kind, global)?);
        }
        for jabber in &self.notify.jabber {
            let id = &jabber.common.id;
            let kind = NotifierKind::Jabber(JabberTarget {
                server: expand_env(&jabber.server, id, "server"),
                port: jabber.port,
                user: expand_env(&jabber.user, id, "user"),
                pass: jabber.pass.as_deref().map(|pass| expand_env(pass, id, "pass")),
                to: jabber.to.clone(),
                ignore_cert: jabber.ignore_cert,
            });
            notifiers.push(resolve_notifier(&jabber.common, kind, global)?);
        }
        for cmd in &self.notify.cmd {
            let kind = NotifierKind::Cmd(CmdNotifierTarget {
                command: expand_env(&cmd.command, &cmd.common.id, "command"),
            });
            notifiers.push(resolve_notifier(&cmd.common, kind, global)?);
        }
        for webhook in &self.notify.webhook {
            let kind = NotifierKind::Webhook(WebhookTarget {
                url: expand_env(&webhook.url, &webhook.common.id, "url"),
            });
            notifiers.push(resolve_notifier(&webhook.common, kind, global)?);
        }

        Ok(ResolvedConfig {
            global: resolved_global,
            checks,
            notifiers,
        })
    }
}

fn resolve_check(
    common: &CommonCheckConfig,
    kind: CheckKind,
    all_notifiers: &[String],
) -> ConfigResult<CheckDefinition> {
    let mut definition = CheckDefinition::new(common.id.clone(), kind);

    if let Some(repeat) = &common.repeat {
        definition.repeat = parse(&common.id, "repeat", repeat)?;
    }
    if let Some(code) = common.expected_code {
        definition.expected_code = code;
    }
    if let Some(millis) = common.expected_time {
        definition.expected_time = Duration::from_millis(millis);
    }
    if let Some(fails) = common.allowed_fails {
        definition.allowed_fails = at_least_one(&common.id, "allowed_fails", fails);
    }
    if let Some(slows) = common.allowed_slows {
        definition.allowed_slows = at_least_one(&common.id, "allowed_slows", slows);
    }

    definition.look_for = common.look_for.clone().filter(|look_for| !look_for.is_empty());
    definition.notify_fail = common
        .notify_fail
        .clone()
        .unwrap_or_else(|| all_notifiers.to_vec());
    definition.notify_slow = common
        .notify_slow
        .clone()
        .unwrap_or_else(|| all_notifiers.to_vec());

    Ok(definition)
}

fn resolve_notifier(
    common: &CommonNotifierConfig,
    kind: NotifierKind,
    global: &GlobalConfig,
) -> ConfigResult<NotifierDefinition> {
    let schedule = |own: &Option<Vec<String>>,
                    global: &Option<Vec<String>>,
                    default: &[&str],
                    field: &'static str|
     -> ConfigResult<Vec<Duration>> {
        let entries: Vec<String> = own
            .clone()
            .filter(|entries| !entries.is_empty())
            .or_else(|| global.clone().filter(|entries| !entries.is_empty()))
            .unwrap_or_else(|| default.iter().map(|entry| entry.to_string()).collect());

        entries
            .iter()
            .map(|entry| parse(&common.id, field, entry))
            .collect()
    };

    Ok(NotifierDefinition {
        id: common.id.clone(),
        kind,
        fail_schedule: schedule(
            &common.fail_schedule,
            &global.fail_schedule,
            &DEFAULT_FAIL_SCHEDULE,
            "fail_schedule",
        )?,
        slow_schedule: schedule(
            &common.slow_schedule,
            &global.slow_schedule,
            &DEFAULT_SLOW_SCHEDULE,
            "slow_schedule",
        )?,
        no_recovery: common.no_recovery,
        templates: MessageTemplates::resolve(&common.templates, &global.templates),
    })
}

/// A threshold of zero could never be crossed by the exact-equality rule
fn at_least_one(id: &str, field: &str, value: u32) -> u32 {
    if value == 0 {
        warn!(check_id = id, field, "threshold of 0 is not supported, using 1");
        1
    } else {
        value
    }
}

fn parse(owner: &str, field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        owner: owner.to_string(),
        field,
        value: value.to_string(),
    })
}

fn duration_or(
    owner: &str,
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> ConfigResult<Duration> {
    value
        .as_deref()
        .map(|value| parse(owner, field, value))
        .unwrap_or(Ok(default))
}

fn require(section: &'static str, id: &str, field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        Err(missing(section, id, field))
    } else {
        Ok(())
    }
}

fn missing(section: &'static str, id: &str, field: &'static str) -> ConfigError {
    ConfigError::MissingField {
        section,
        id: id.to_string(),
        field,
    }
}
