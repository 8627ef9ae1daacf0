use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use tracing::warn;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Parse a duration like `500ms`, `30s`, `5m`, `1h` or a bare number of seconds.
///
/// `"0"` is a valid zero duration (used as schedule terminator).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Replace every `${VAR}` with the value of the environment variable `VAR`.
///
/// Unset variables are left untouched so the operator can spot them in the output.
pub fn expand_env(input: &str, owner: &str, field: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                warn!(owner, field, var = &caps[1], "environment variable not set");
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Whole milliseconds, saturating at `u64::MAX`
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Format a duration the way it is written in the config file.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        "0".to_string()
    } else if millis % 3_600_000 == 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}
