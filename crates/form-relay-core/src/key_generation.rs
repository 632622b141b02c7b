//! # Unique Key Generation
//!
//! Derives the unique record key stored alongside every created custom
//! object. The strategy is chosen per configuration:
//!
//! | Strategy     | Output                                                   |
//! |--------------|----------------------------------------------------------|
//! | `uuid`       | random identifier (`standard`, `short` or `numeric`)     |
//! | `sequential` | `{prefix}-{n}` with `n` from a per-configuration counter |
//! | `date`       | formatted current time, optionally in a target zone      |
//! | `composite`  | template filled from submitted fields                    |
//! | anything else| `key_{epoch_ms}`                                         |
//!
//! Only `date` and `composite` are reproducible for a fixed clock; the other
//! strategies draw from the injected [`Entropy`] or [`SequenceSource`].

use crate::sources::{Clock, Entropy, InMemorySequence, SequenceSource, SystemClock, ThreadEntropy};
use crate::FormData;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const DEFAULT_SEQUENCE_PREFIX: &str = "ITEM";
const DEFAULT_SEQUENCE_PADDING: u64 = 3;
const MAX_SEQUENCE_PADDING: u64 = 20;
const DEFAULT_COMPOSITE_PATTERN: &str = "{lastName}-{firstName}-{year}";
const UNKNOWN_PLACEHOLDER: &str = "UNKNOWN";

/// Key strategy selected by a configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KeyType {
    #[default]
    Uuid,
    Sequential,
    Date,
    Composite,
    /// Unknown strategy name, kept verbatim; generates the fallback key
    Unrecognized(String),
}

impl KeyType {
    /// Parse a strategy name; never fails
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "uuid" => Self::Uuid,
            "sequential" => Self::Sequential,
            "date" => Self::Date,
            "composite" => Self::Composite,
            _ => Self::Unrecognized(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Uuid => "uuid",
            Self::Sequential => "sequential",
            Self::Date => "date",
            Self::Composite => "composite",
            Self::Unrecognized(name) => name,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for KeyType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<KeyType> for String {
    fn from(value: KeyType) -> Self {
        value.as_str().to_string()
    }
}

/// Strategy options bag
///
/// Recognized keys depend on the strategy; anything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyConfig(serde_json::Map<String, Value>);

impl KeyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First non-blank string stored under any of `names`
    pub fn string(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.0.get(*name))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    /// First non-negative integer stored under any of `names`
    ///
    /// Numeric strings are accepted.
    pub fn unsigned(&self, names: &[&str]) -> Option<u64> {
        names
            .iter()
            .filter_map(|name| self.0.get(*name))
            .find_map(|value| match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
    }
}

/// Layouts accepted by the `date` strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateLayout {
    Compact,
    Dashed,
    DateOnly,
    Short,
}

impl DateLayout {
    fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("YYYYMMDD-HHMMSS") => Self::Compact,
            Some("YYYY-MM-DD-HH-MM-SS") => Self::Dashed,
            Some("YYYYMMDD") => Self::DateOnly,
            Some("YYMMDD-HHMM") => Self::Short,
            Some(other) => {
                debug!(format = %other, "Unknown date key format; using YYYYMMDD-HHMMSS");
                Self::Compact
            }
        }
    }

    fn strftime(&self) -> &'static str {
        match self {
            Self::Compact => "%Y%m%d-%H%M%S",
            Self::Dashed => "%Y-%m-%d-%H-%M-%S",
            Self::DateOnly => "%Y%m%d",
            Self::Short => "%y%m%d-%H%M",
        }
    }
}

/// Unique key generator with injected time, randomness and sequences
#[derive(Clone)]
pub struct KeyGenerator {
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
    sequence: Arc<dyn SequenceSource>,
}

impl KeyGenerator {
    pub fn new(
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn Entropy>,
        sequence: Arc<dyn SequenceSource>,
    ) -> Self {
        Self {
            clock,
            entropy,
            sequence,
        }
    }

    /// Wall clock, thread RNG and process-local sequences
    pub fn system() -> Self {
        Self::new(
            Arc::new(SystemClock),
            Arc::new(ThreadEntropy),
            Arc::new(InMemorySequence::new()),
        )
    }

    /// Clock shared with the field mapper so key and metadata agree
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Generate a key
    ///
    /// `scope` names the counter used by the `sequential` strategy; the
    /// dispatcher passes the configuration key. Never fails: unknown
    /// strategies and malformed options fall back to documented defaults.
    pub fn generate(
        &self,
        scope: &str,
        form_data: &FormData,
        key_type: &KeyType,
        key_config: &KeyConfig,
    ) -> String {
        match key_type {
            KeyType::Uuid => self.uuid_key(key_config),
            KeyType::Sequential => self.sequential_key(scope, key_config),
            KeyType::Date => self.date_key(key_config),
            KeyType::Composite => self.composite_key(form_data, key_config),
            KeyType::Unrecognized(name) => {
                debug!(key_type = %name, "Unrecognized key type; using time-based fallback");
                format!("key_{}", self.clock.now().timestamp_millis())
            }
        }
    }

    fn uuid_key(&self, key_config: &KeyConfig) -> String {
        match key_config.string(&["format"]) {
            Some("short") => {
                // 36^6 fits comfortably in u64
                let span = 36u64.pow(6);
                format!(
                    "{}{}",
                    to_base36(self.entropy.below(span), 6),
                    to_base36(self.entropy.below(span), 6)
                )
            }
            Some("numeric") => format!(
                "{}{}",
                self.clock.now().timestamp_millis(),
                self.entropy.below(1000)
            ),
            _ => {
                let mut bytes = [0u8; 16];
                self.entropy.fill_bytes(&mut bytes);
                uuid::Builder::from_random_bytes(bytes)
                    .into_uuid()
                    .hyphenated()
                    .to_string()
            }
        }
    }

    fn sequential_key(&self, scope: &str, key_config: &KeyConfig) -> String {
        let prefix = key_config
            .string(&["prefix"])
            .unwrap_or(DEFAULT_SEQUENCE_PREFIX);
        let padding = key_config
            .unsigned(&["padding"])
            .unwrap_or(DEFAULT_SEQUENCE_PADDING)
            .min(MAX_SEQUENCE_PADDING) as usize;
        let start_at = key_config.unsigned(&["startAt", "start_at"]).unwrap_or(1);

        let number = self.sequence.next_value(scope, start_at);
        format!("{}-{:0>width$}", prefix, number, width = padding)
    }

    fn date_key(&self, key_config: &KeyConfig) -> String {
        let layout = DateLayout::parse(key_config.string(&["format"]));
        let local = localize(self.clock.now(), key_config.string(&["timezone", "timeZone"]));
        local.format(layout.strftime()).to_string()
    }

    fn composite_key(&self, form_data: &FormData, key_config: &KeyConfig) -> String {
        let pattern = key_config
            .string(&["pattern"])
            .unwrap_or(DEFAULT_COMPOSITE_PATTERN);
        let year = self.clock.now().year();

        let filled = placeholder_regex().replace_all(pattern, |caps: &Captures| {
            let name = caps[1].trim();
            if name == "year" {
                year.to_string()
            } else {
                resolve_field(form_data, name).unwrap_or_else(|| UNKNOWN_PLACEHOLDER.to_string())
            }
        });

        match key_config.string(&["case"]) {
            None => filled.to_uppercase(),
            Some(case) if case.eq_ignore_ascii_case("uppercase") => filled.to_uppercase(),
            Some(case) if case.eq_ignore_ascii_case("lowercase") => filled.to_lowercase(),
            Some(_) => filled.into_owned(),
        }
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator").finish_non_exhaustive()
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"))
}

/// Convert to wall time in `timezone`; unknown zones fall back to UTC
fn localize(now: DateTime<Utc>, timezone: Option<&str>) -> NaiveDateTime {
    match timezone {
        None => now.naive_utc(),
        Some(zone) if zone.eq_ignore_ascii_case("utc") => now.naive_utc(),
        Some(zone) => match zone.parse::<Tz>() {
            Ok(tz) => now.with_timezone(&tz).naive_local(),
            Err(_) => {
                warn!(timezone = %zone, "Unknown time zone for date key; using UTC");
                now.naive_utc()
            }
        },
    }
}

/// Field names that stand in for each other in templates
fn alias_of(name: &str) -> Option<&'static str> {
    match name {
        "firstName" => Some("first_name"),
        "first_name" => Some("firstName"),
        "lastName" => Some("last_name"),
        "last_name" => Some("lastName"),
        _ => None,
    }
}

fn resolve_field(form_data: &FormData, name: &str) -> Option<String> {
    render_scalar(form_data.get(name))
        .or_else(|| alias_of(name).and_then(|alias| render_scalar(form_data.get(alias))))
}

/// Text of a scalar value; absent, null, blank and non-scalar values are `None`
fn render_scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn to_base36(mut value: u64, width: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut out = Vec::with_capacity(width);
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    while out.len() < width {
        out.push(b'0');
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
#[path = "key_generation_tests.rs"]
mod tests;
