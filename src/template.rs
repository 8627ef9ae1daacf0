//! `{tag}` templates for notification subjects and texts

use std::sync::LazyLock;

use chrono::Local;
use regex::{Captures, Regex};

use crate::actors::messages::CheckSnapshot;
use crate::config::CheckKind;
use crate::util::format_duration;

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid template tag regex"));

const TIMESTAMP_FORMAT: &str = "%-d.%-m.%Y %H:%M:%S";

/// Replace every known `{tag}` with a value from the snapshot
///
/// Unknown tags are kept verbatim.
pub fn render(template: &str, snapshot: &CheckSnapshot) -> String {
    TAG.replace_all(template, |caps: &Captures| {
        tag_value(&caps[1], snapshot).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// Substitute arbitrary `{name}` placeholders, leaving everything else alone
pub fn render_with(template: &str, values: &[(&str, &str)]) -> String {
    TAG.replace_all(template, |caps: &Captures| {
        values
            .iter()
            .find(|(name, _)| *name == &caps[1])
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

fn tag_value(tag: &str, snapshot: &CheckSnapshot) -> Option<String> {
    let check = &snapshot.definition;
    let result = &snapshot.result;
    let state = &snapshot.state;

    let value = match tag {
        "check_id" => check.id.clone(),
        "kind" => check.kind.probe_kind().to_string(),
        "check" => check.kind.target(),
        "params" => space_if_value(check.kind.params().unwrap_or_default()),
        "method" => match &check.kind {
            CheckKind::Web(web) => space_if_value(web.method.as_str()),
            _ => String::new(),
        },
        "headers" => match &check.kind {
            CheckKind::Web(web) => {
                let headers: Vec<String> =
                    web.headers.iter().map(|(name, value)| format!("{name}: {value}")).collect();
                space_if_value(&headers.join(", "))
            }
            _ => String::new(),
        },
        "look_for" => space_if_value(check.look_for.as_deref().unwrap_or_default()),
        "repeat" => format_duration(check.repeat),
        "response" => result.body.clone(),
        "response_code" => result.status_code.to_string(),
        "response_time" => result.elapsed.as_millis().to_string(),
        "expected_code" => check.expected_code.to_string(),
        "expected_time" => check.expected_time.as_millis().to_string(),
        "allowed_fails" => check.allowed_fails.to_string(),
        "allowed_slows" => check.allowed_slows.to_string(),
        "fails" => state.fail_streak.to_string(),
        "slows" => state.slow_streak.to_string(),
        "notify_fail" => check.notify_fail.join(", "),
        "notify_slow" => check.notify_slow.join(", "),
        "error" => state.reason.clone().unwrap_or_default(),
        "timestamp" => state
            .last_transition
            .unwrap_or(state.checked_at)
            .with_timezone(&Local)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        _ => return None,
    };

    Some(value)
}

/// Optional values are prefixed with a space so `{check}{params}` reads naturally
fn space_if_value(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!(" {value}")
    }
}
