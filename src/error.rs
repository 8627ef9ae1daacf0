//! Error types for configuration loading and daemon startup
//!
//! Both kinds are fatal: they are raised before any check runs. Everything that
//! can go wrong at runtime (probe failures, delivery failures) is handled locally
//! and never surfaces through these types.

use std::fmt;

use crate::probes::ProbeKind;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating the configuration file
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    Io(std::io::Error),

    /// The file is not valid TOML or contains unknown sections/keys
    Parse(String),

    /// `[global] workers` is missing or zero
    NoWorkers,

    /// No check is defined at all
    NoChecks,

    /// A check or notifier is missing its id
    MissingId { section: &'static str, index: usize },

    /// Two checks or two notifiers share an id
    DuplicateId { section: &'static str, id: String },

    /// A mandatory field is empty
    MissingField {
        section: &'static str,
        id: String,
        field: &'static str,
    },

    /// A check references a notifier that is not defined
    UnknownNotifier { check: String, notifier: String },

    /// A duration string could not be parsed
    InvalidDuration {
        owner: String,
        field: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "failed to read config file: {}", err),
            ConfigError::Parse(msg) => write!(f, "invalid config file: {}", msg),
            ConfigError::NoWorkers => {
                write!(f, "[global] workers must be defined and greater than 0")
            }
            ConfigError::NoChecks => write!(f, "no checks defined"),
            ConfigError::MissingId { section, index } => {
                write!(f, "empty 'id' in {}. {} entry", index, section)
            }
            ConfigError::DuplicateId { section, id } => {
                write!(f, "duplicate id {:?} in {}", id, section)
            }
            ConfigError::MissingField { section, id, field } => {
                write!(f, "empty '{}' for {:?} ({}), this field is mandatory", field, id, section)
            }
            ConfigError::UnknownNotifier { check, notifier } => {
                write!(f, "check {:?} references undefined notifier {:?}", check, notifier)
            }
            ConfigError::InvalidDuration {
                owner,
                field,
                value,
            } => write!(f, "invalid duration {:?} in '{}' of {:?}", value, field, owner),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Errors that stop the daemon from starting
#[derive(Debug)]
pub enum StartupError {
    /// A check of this kind is configured but no executor is registered for it
    NoExecutor { check: String, kind: ProbeKind },

    /// The transport for a notifier is not available in this build
    UnsupportedNotifier { id: String, kind: &'static str },

    /// A notifier transport could not be constructed
    NotifierSetup { id: String, reason: String },

    /// A check references a notifier for which no transport was registered
    MissingTransport { check: String, notifier: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::NoExecutor { check, kind } => {
                write!(f, "no probe executor registered for kind '{}' (check {:?})", kind, check)
            }
            StartupError::UnsupportedNotifier { id, kind } => {
                write!(f, "notifier {:?}: '{}' transport is not available in this build", id, kind)
            }
            StartupError::NotifierSetup { id, reason } => {
                write!(f, "failed to set up notifier {:?}: {}", id, reason)
            }
            StartupError::MissingTransport { check, notifier } => {
                write!(f, "check {:?} uses notifier {:?} which has no transport", check, notifier)
            }
        }
    }
}

impl std::error::Error for StartupError {}
