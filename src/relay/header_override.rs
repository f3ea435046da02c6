//! Conditional header overrides
//!
//! A channel may rewrite outbound headers in one of two forms:
//!
//! - simple: `{"User-Agent": "my-agent", "Authorization": "Bearer {api_key}"}`
//! - operations: `{"operations": [{"header": "...", "value": "...",
//!   "conditions": [{"header": "...", "mode": "contains", "value": "...",
//!   "invert": false}], "logic": "OR"}]}`
//!
//! The operations form is parsed fail-closed: if any operation is
//! malformed, nothing is applied. Simple mode rejects non-string values
//! with an error.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::http::HeaderMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::{header_value, RelayInfo};
use crate::error::{RelayError, RelayResult};

/// Key that switches the configuration into operations mode
pub const OPERATIONS_KEY: &str = "operations";

/// Placeholder replaced with the channel API key
pub const API_KEY_PLACEHOLDER: &str = "{api_key}";

/// Final header values to set on the outbound request
pub type HeaderOverrides = HashMap<String, String>;

/// How a condition compares the inbound header with its expected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    Full,
    Prefix,
    Suffix,
    #[default]
    Contains,
}

impl MatchMode {
    /// Case-insensitive parse of `full`, `prefix`, `suffix`, `contains`
    pub fn parse(mode: &str) -> Option<Self> {
        match mode.to_ascii_lowercase().as_str() {
            "full" => Some(MatchMode::Full),
            "prefix" => Some(MatchMode::Prefix),
            "suffix" => Some(MatchMode::Suffix),
            "contains" => Some(MatchMode::Contains),
            _ => None,
        }
    }

    fn matches(self, actual: &str, expected: &str) -> bool {
        match self {
            MatchMode::Full => actual == expected,
            MatchMode::Prefix => actual.starts_with(expected),
            MatchMode::Suffix => actual.ends_with(expected),
            MatchMode::Contains => actual.contains(expected),
        }
    }
}

/// How the conditions of one operation combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    And,
    #[default]
    Or,
}

impl Logic {
    /// Case-insensitive parse of `AND` / `OR`
    pub fn parse(logic: &str) -> Option<Self> {
        if logic.eq_ignore_ascii_case("and") {
            Some(Logic::And)
        } else if logic.eq_ignore_ascii_case("or") {
            Some(Logic::Or)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// Predicate over one inbound header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCondition {
    pub header: String,
    pub mode: MatchMode,
    pub value: String,
    pub invert: bool,
}

/// Set `header` to `value` when the conditions hold
///
/// An empty condition list always applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOperation {
    pub header: String,
    pub value: String,
    pub conditions: Vec<HeaderCondition>,
    pub logic: Logic,
}

/// Parse the operations form of a channel override
///
/// Returns `None` when `operations` is absent, is neither an array nor a
/// JSON string holding an array, contains any malformed operation, or
/// yields no operations at all.
pub fn try_parse(raw: &Map<String, Value>) -> Option<Vec<HeaderOperation>> {
    let entries = normalize_operations(raw.get(OPERATIONS_KEY)?)?;

    let mut operations = Vec::with_capacity(entries.len());
    for entry in entries.iter() {
        // Non-object entries carry no operation and are ignored.
        let Some(fields) = entry.as_object() else {
            continue;
        };
        operations.push(parse_operation(fields)?);
    }

    (!operations.is_empty()).then_some(operations)
}

fn normalize_operations(value: &Value) -> Option<Cow<'_, [Value]>> {
    match value {
        Value::Array(items) => Some(Cow::Borrowed(items.as_slice())),
        Value::String(encoded) => serde_json::from_str::<Vec<Value>>(encoded)
            .ok()
            .map(Cow::Owned),
        _ => None,
    }
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn parse_operation(fields: &Map<String, Value>) -> Option<HeaderOperation> {
    let header = non_empty_str(fields, "header")?;
    let value = non_empty_str(fields, "value")?;

    let logic = match fields.get("logic") {
        None => Logic::Or,
        Some(Value::String(logic)) => Logic::parse(logic)?,
        Some(_) => return None,
    };

    let conditions = match fields.get("conditions") {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            if items.is_empty() {
                return None;
            }
            let conditions: Vec<_> = items.iter().filter_map(parse_condition).collect();
            if conditions.is_empty() {
                return None;
            }
            conditions
        }
        Some(_) => return None,
    };

    Some(HeaderOperation {
        header: header.to_string(),
        value: value.to_string(),
        conditions,
        logic,
    })
}

/// `None` means the condition is skipped, not that parsing failed
fn parse_condition(entry: &Value) -> Option<HeaderCondition> {
    let fields = entry.as_object()?;
    let header = non_empty_str(fields, "header")?;

    let mode = match fields.get("mode") {
        None => MatchMode::Contains,
        Some(Value::String(mode)) if mode.is_empty() => MatchMode::Contains,
        Some(Value::String(mode)) => MatchMode::parse(mode)?,
        Some(_) => return None,
    };

    let value = non_empty_str(fields, "value")?;

    let invert = match fields.get("invert") {
        None => false,
        Some(Value::Bool(invert)) => *invert,
        Some(_) => return None,
    };

    Some(HeaderCondition {
        header: header.to_string(),
        mode,
        value: value.to_string(),
        invert,
    })
}

/// Evaluate one condition against the inbound headers
pub fn check_single_condition(inbound: &HeaderMap, condition: &HeaderCondition) -> bool {
    let actual = header_value(inbound, &condition.header);
    condition.mode.matches(actual, &condition.value) != condition.invert
}

/// Combine conditions with `logic`; an empty list is always true
pub fn check_conditions(inbound: &HeaderMap, conditions: &[HeaderCondition], logic: Logic) -> bool {
    if conditions.is_empty() {
        return true;
    }
    match logic {
        Logic::And => conditions.iter().all(|c| check_single_condition(inbound, c)),
        Logic::Or => conditions.iter().any(|c| check_single_condition(inbound, c)),
    }
}

/// Substitute `{api_key}`; without channel metadata the input is returned as is
pub fn replace_variables(template: &str, info: Option<&RelayInfo>) -> String {
    let Some(meta) = info.and_then(|info| info.channel_meta.as_ref()) else {
        return template.to_string();
    };
    if template.contains(API_KEY_PLACEHOLDER) {
        template.replace(API_KEY_PLACEHOLDER, &meta.api_key)
    } else {
        template.to_string()
    }
}

/// Compute override values for parsed operations
///
/// Conditions always read the inbound request, never earlier overrides.
/// When an operation does not apply, a non-empty inbound value for its
/// header is passed through so the HTTP client cannot substitute its own
/// default (a `User-Agent`, typically).
pub fn evaluate(
    inbound: &HeaderMap,
    operations: &[HeaderOperation],
    info: Option<&RelayInfo>,
) -> HeaderOverrides {
    let mut result = HeaderOverrides::with_capacity(operations.len());

    for operation in operations {
        if !check_conditions(inbound, &operation.conditions, operation.logic) {
            let original = header_value(inbound, &operation.header);
            if !original.is_empty() {
                result.insert(operation.header.clone(), original.to_string());
            }
            continue;
        }

        result.insert(
            operation.header.clone(),
            replace_variables(&operation.value, info),
        );
    }

    result
}

/// Resolve the channel override configuration for one request
///
/// A malformed operations block is logged and yields no overrides. A
/// non-string value in simple mode is a configuration error.
pub fn resolve(inbound: &HeaderMap, info: Option<&RelayInfo>) -> RelayResult<HeaderOverrides> {
    let Some(info) = info else {
        return Ok(HeaderOverrides::new());
    };
    let raw = &info.headers_override;

    if raw.contains_key(OPERATIONS_KEY) {
        return match try_parse(raw) {
            Some(operations) => {
                debug!(
                    channel_id = info.channel_id(),
                    operations = operations.len(),
                    "Applying conditional header overrides"
                );
                Ok(evaluate(inbound, &operations, Some(info)))
            }
            None => {
                warn!(
                    channel_id = info.channel_id(),
                    "header override operations parse failed, falling back to no override"
                );
                Ok(HeaderOverrides::new())
            }
        };
    }

    let mut result = HeaderOverrides::with_capacity(raw.len());
    for (name, value) in raw {
        let Value::String(template) = value else {
            return Err(RelayError::HeaderOverrideInvalid(format!(
                "value for header {name} is not a string"
            )));
        };
        result.insert(name.clone(), replace_variables(template, Some(info)));
    }
    Ok(result)
}
