//! Configuration types for favwatch
//!
//! Raw agent options arrive as strings (the way a settings form stores them).
//! [`AgentOptions::validate`] turns them into a typed [`AgentConfig`] once,
//! before any poll runs; the engine never looks at the raw strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw agent options, as entered by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOptions {
    /// Screen name whose favorites list is followed
    #[serde(default)]
    pub username: String,

    /// Number of latest favorites fetched per poll (page size)
    #[serde(default)]
    pub number: String,

    /// Number of tweet ids remembered between polls
    #[serde(default)]
    pub history: String,

    /// Longest expected gap between events, used only for liveness reporting
    #[serde(default)]
    pub expected_update_period_in_days: String,

    /// Earliest tweet creation time to emit (free text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_at: Option<String>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            username: "tectonic".to_string(),
            number: "10".to_string(),
            history: "100".to_string(),
            expected_update_period_in_days: "2".to_string(),
            starting_at: None,
        }
    }
}

impl AgentOptions {
    /// Validate the options and build the typed configuration
    ///
    /// Every offending field is reported, not just the first one.
    ///
    /// # Parameters
    ///
    /// - `created_at`: When the agent was created; the cutoff fallback when
    ///   `starting_at` is blank
    pub fn validate(
        &self,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<AgentConfig, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let username = self.username.trim();
        if username.is_empty() {
            errors.push("username", "username is required");
        }

        let page_size = positive_integer(&mut errors, "number", &self.number);
        let history_size = positive_integer(&mut errors, "history", &self.history);
        let expected_update_period = update_period(&mut errors, &self.expected_update_period_in_days);

        let starting_at = match self.starting_at.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    errors.push("starting_at", format!("Error parsing starting_at: '{}'", raw));
                }
                parsed
            }
            _ => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        // All three are Some when no error was recorded
        match (page_size, history_size, expected_update_period) {
            (Some(page_size), Some(history_size), Some(expected_update_period)) => Ok(AgentConfig {
                username: username.to_string(),
                page_size,
                history_size,
                expected_update_period,
                starting_at,
                created_at,
            }),
            _ => Err(errors),
        }
    }
}

fn positive_integer(errors: &mut ValidationErrors, field: &'static str, raw: &str) -> Option<usize> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.push(field, format!("{} is required", field));
        return None;
    }
    match raw.parse::<usize>() {
        Ok(0) => {
            errors.push(field, format!("{} must be greater than 0", field));
            None
        }
        Ok(n) => Some(n),
        Err(_) => {
            errors.push(field, format!("{} must be a positive integer, got '{}'", field, raw));
            None
        }
    }
}

fn update_period(errors: &mut ValidationErrors, raw: &str) -> Option<TimeDelta> {
    const FIELD: &str = "expected_update_period_in_days";

    let raw = raw.trim();
    if raw.is_empty() {
        errors.push(FIELD, format!("{} is required", FIELD));
        return None;
    }
    let days = match raw.parse::<f64>() {
        Ok(days) if days.is_finite() && days > 0.0 => days,
        _ => {
            errors.push(FIELD, format!("{} must be a positive number, got '{}'", FIELD, raw));
            return None;
        }
    };
    let period = TimeDelta::try_seconds((days * 86_400.0).round() as i64);
    if period.is_none() {
        errors.push(FIELD, format!("{} is too large: {}", FIELD, raw));
    }
    period
}

/// Validated, immutable per-run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Screen name whose favorites are polled
    pub username: String,
    /// Items requested per fetch
    pub page_size: usize,
    /// Capacity of the seen buffer
    pub history_size: usize,
    /// Consumed only by external liveness checks
    pub expected_update_period: TimeDelta,
    /// Explicit cutoff
    pub starting_at: Option<DateTime<Utc>>,
    /// Agent creation time, the second link of the cutoff fallback chain
    pub created_at: Option<DateTime<Utc>>,
}

impl AgentConfig {
    /// Create a configuration directly, bypassing string validation
    ///
    /// Callers are responsible for passing positive sizes.
    pub fn new(username: impl Into<String>, page_size: usize, history_size: usize) -> Self {
        Self {
            username: username.into(),
            page_size,
            history_size,
            expected_update_period: TimeDelta::days(2),
            starting_at: None,
            created_at: None,
        }
    }

    /// Set the explicit cutoff
    pub fn with_starting_at(mut self, starting_at: DateTime<Utc>) -> Self {
        self.starting_at = Some(starting_at);
        self
    }

    /// Set the agent creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set the expected update period
    pub fn with_expected_update_period(mut self, period: TimeDelta) -> Self {
        self.expected_update_period = period;
        self
    }

    /// Resolve the effective cutoff timestamp
    ///
    /// Explicit `starting_at`, else creation time, else `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.starting_at.or(self.created_at).unwrap_or(now)
    }
}

/// Formats carrying their own UTC offset
const OFFSET_FORMATS: &[&str] = &[
    "%a %b %d %H:%M:%S %z %Y", // Twitter: Mon Jun 02 00:38:12 +0000 2014
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M %z",
    "%Y-%m-%dT%H:%M:%S%z",
];

/// Formats without an offset, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%a %b %d %H:%M:%S %Y",
];

/// Date-only formats, interpreted as midnight UTC
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];

/// Tolerantly parse a user-supplied timestamp
///
/// Returns `None` when no known format matches; callers decide whether that
/// is a validation failure.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(input, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// One rejected option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Option key
    pub field: &'static str,
    /// Human-readable reason
    pub message: String,
}

/// All validation failures for one set of options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Whether no field was rejected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The rejected fields, in option order
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether the given field was rejected
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Feed source configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedSourceConfig {
    /// Twitter API v1.1 favorites list
    Twitter {
        /// App or user bearer token
        bearer_token: String,
        /// Override for the API base URL (proxies, test servers)
        #[serde(default)]
        api_base: Option<String>,
    },

    /// Custom feed source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl FeedSourceConfig {
    /// Validate the feed source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FeedSourceConfig::Twitter { bearer_token, api_base } => {
                if bearer_token.is_empty() {
                    return Err(crate::Error::config("Twitter bearer token cannot be empty"));
                }
                if let Some(base) = api_base
                    && !base.starts_with("https://")
                    && !base.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "Twitter API base must be an HTTP(S) URL, got: {}",
                        base
                    )));
                }
                Ok(())
            }
            FeedSourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom feed source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom feed source config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the feed source type name
    pub fn type_name(&self) -> &str {
        match self {
            FeedSourceConfig::Twitter { .. } => "twitter",
            FeedSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

// The bearer token never appears in logs
impl fmt::Debug for FeedSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSourceConfig::Twitter { api_base, .. } => f
                .debug_struct("Twitter")
                .field("bearer_token", &"<REDACTED>")
                .field("api_base", api_base)
                .finish(),
            FeedSourceConfig::Custom { factory, config } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", config)
                .finish(),
        }
    }
}

/// Seen store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeenStoreConfig {
    /// File-based store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SeenStoreConfig {
    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            SeenStoreConfig::File { .. } => "file",
            SeenStoreConfig::Memory => "memory",
            SeenStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_default_options_validate() {
        let config = AgentOptions::default().validate(None).unwrap();
        assert_eq!(config.username, "tectonic");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.history_size, 100);
        assert_eq!(config.expected_update_period, TimeDelta::days(2));
        assert_eq!(config.starting_at, None);
    }

    #[test]
    fn test_every_missing_field_is_reported() {
        let options = AgentOptions {
            username: "  ".to_string(),
            number: String::new(),
            history: String::new(),
            expected_update_period_in_days: String::new(),
            starting_at: None,
        };

        let errors = options.validate(None).unwrap_err();
        assert_eq!(errors.errors().len(), 4);
        for field in ["username", "number", "history", "expected_update_period_in_days"] {
            assert!(errors.has_field(field), "missing error for {}", field);
        }
        assert!(errors.to_string().contains("username is required"));
    }

    #[test]
    fn test_non_positive_numbers_rejected() {
        let options = AgentOptions {
            number: "0".to_string(),
            history: "ten".to_string(),
            expected_update_period_in_days: "-1".to_string(),
            ..AgentOptions::default()
        };

        let errors = options.validate(None).unwrap_err();
        assert!(errors.has_field("number"));
        assert!(errors.has_field("history"));
        assert!(errors.has_field("expected_update_period_in_days"));
        assert!(!errors.has_field("username"));
    }

    #[test]
    fn test_unparseable_starting_at_is_a_validation_error() {
        let options = AgentOptions {
            starting_at: Some("next tuesday-ish".to_string()),
            ..AgentOptions::default()
        };

        let errors = options.validate(None).unwrap_err();
        assert_eq!(errors.errors().len(), 1);
        assert!(errors.has_field("starting_at"));
    }

    #[test]
    fn test_blank_starting_at_is_unset() {
        let options = AgentOptions {
            starting_at: Some("   ".to_string()),
            ..AgentOptions::default()
        };
        assert_eq!(options.validate(None).unwrap().starting_at, None);
    }

    #[test]
    fn test_fractional_update_period() {
        let options = AgentOptions {
            expected_update_period_in_days: "0.5".to_string(),
            ..AgentOptions::default()
        };
        let config = options.validate(None).unwrap();
        assert_eq!(config.expected_update_period, TimeDelta::hours(12));
    }

    #[test]
    fn test_cutoff_fallback_chain() {
        let now = utc("2024-05-01T12:00:00Z");
        let created = utc("2024-01-01T00:00:00Z");
        let explicit = utc("2023-06-02T00:38:12Z");

        let config = AgentConfig::new("user", 10, 100);
        assert_eq!(config.cutoff(now), now);

        let config = config.with_created_at(created);
        assert_eq!(config.cutoff(now), created);

        let config = config.with_starting_at(explicit);
        assert_eq!(config.cutoff(now), explicit);
    }

    #[test]
    fn test_parse_twitter_format() {
        let parsed = parse_timestamp("Mon Jun 02 00:38:12 +0000 2014").unwrap();
        assert_eq!(parsed, utc("2014-06-02T00:38:12Z"));
    }

    #[test]
    fn test_parse_offsets_normalize_to_utc() {
        let parsed = parse_timestamp("2014-06-02 02:38:12 +0200").unwrap();
        assert_eq!(parsed, utc("2014-06-02T00:38:12Z"));

        let parsed = parse_timestamp("2014-06-02T02:38:12+02:00").unwrap();
        assert_eq!(parsed, utc("2014-06-02T00:38:12Z"));
    }

    #[test]
    fn test_parse_naive_and_date_only_are_utc() {
        assert_eq!(
            parse_timestamp("2014-06-02 00:38:12").unwrap(),
            utc("2014-06-02T00:38:12Z")
        );
        assert_eq!(parse_timestamp("2014-06-02").unwrap(), utc("2014-06-02T00:00:00Z"));
        assert_eq!(parse_timestamp(" 2014/06/02 ").unwrap(), utc("2014-06-02T00:00:00Z"));

        let spelled = parse_timestamp("June 2, 2014").unwrap();
        assert_eq!((spelled.year(), spelled.month(), spelled.day()), (2014, 6, 2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2014-13-45"), None);
    }

    #[test]
    fn test_options_deserialize_with_missing_keys() {
        let options: AgentOptions =
            serde_json::from_str(r#"{"username": "tectonic", "number": "5"}"#).unwrap();
        assert_eq!(options.history, "");
        assert_eq!(options.starting_at, None);
        assert!(options.validate(None).unwrap_err().has_field("history"));
    }

    #[test]
    fn test_feed_source_config_redacts_token() {
        let config = FeedSourceConfig::Twitter {
            bearer_token: "AAAAsecret".to_string(),
            api_base: None,
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("AAAAsecret"));
        assert!(debug.contains("<REDACTED>"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_source_config_validation() {
        let empty = FeedSourceConfig::Twitter {
            bearer_token: String::new(),
            api_base: None,
        };
        assert!(empty.validate().is_err());

        let bad_base = FeedSourceConfig::Twitter {
            bearer_token: "token".to_string(),
            api_base: Some("ftp://example.com".to_string()),
        };
        assert!(bad_base.validate().is_err());
    }
}
