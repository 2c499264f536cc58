//! Data models for the admin dashboard.
//!
//! Records arrive from the document store as loosely typed JSON. The
//! deserializers in this module coerce them exactly once: missing numbers
//! become 0, missing strings become empty, missing lists become empty and
//! timestamps accept every shape the store emits. Code past this boundary
//! can rely on well-typed fields.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity level of an issue.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    /// Cosmetic problems, nothing blocks users
    #[default]
    Low,
    /// Degraded behaviour with a workaround
    Medium,
    /// Broken feature without a workaround
    High,
    /// Data loss, crashes on launch, security problems
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Stored form, as written to the issues collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Workflow status of an issue.
///
/// Issues start `Open`. The admin moves them to `InProgress`, then `Fixed`,
/// then `Closed`; an open issue may also be closed directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Fixed,
    Closed,
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueStatus::Open => write!(f, "open"),
            IssueStatus::InProgress => write!(f, "in progress"),
            IssueStatus::Fixed => write!(f, "fixed"),
            IssueStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "open" => Ok(IssueStatus::Open),
            "in_progress" => Ok(IssueStatus::InProgress),
            "fixed" => Ok(IssueStatus::Fixed),
            "closed" => Ok(IssueStatus::Closed),
            other => Err(format!("unknown issue status '{}'", other)),
        }
    }
}

impl TryFrom<String> for IssueStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl IssueStatus {
    /// Stored form, as written to the issues collection.
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Fixed => "fixed",
            IssueStatus::Closed => "closed",
        }
    }

    /// Whether the workflow allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: IssueStatus) -> bool {
        matches!(
            (self, next),
            (IssueStatus::Open, IssueStatus::InProgress)
                | (IssueStatus::Open, IssueStatus::Closed)
                | (IssueStatus::InProgress, IssueStatus::Fixed)
                | (IssueStatus::Fixed, IssueStatus::Closed)
        )
    }

    /// Fixed and closed issues no longer need attention.
    pub fn is_resolved(self) -> bool {
        matches!(self, IssueStatus::Fixed | IssueStatus::Closed)
    }
}

/// Rejected status change.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot move issue from {from} to {to}")]
pub struct TransitionError {
    pub from: IssueStatus,
    pub to: IssueStatus,
}

/// A registered account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Document id, equal to the auth uid.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Display name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub fullname: String,
    /// Unique handle, shown as `@username`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    /// Reputation score ("stack score").
    #[serde(default, deserialize_with = "lenient_i64")]
    pub stack_score: i64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_admin: bool,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_image_url: Option<String>,
}

/// A bundle of photos uploaded together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Owning user id. Not checked against the users collection.
    #[serde(default, deserialize_with = "lenient_string")]
    pub owner_uid: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub caption: Option<String>,
    /// May disagree with `image_urls.len()`; both are kept as stored.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub image_count: u64,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub image_urls: Vec<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_private: bool,
    /// Creation time.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    /// When the upload finished and notifications went out.
    #[serde(
        default,
        alias = "uploadCompleted",
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload_completed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub shared_with: Vec<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub notification_sent: bool,
}

impl Stack {
    /// Caption for display, falling back to `untitled` when empty.
    pub fn display_caption<'a>(&'a self, untitled: &'a str) -> &'a str {
        match self.caption.as_deref() {
            Some(caption) if !caption.trim().is_empty() => caption,
            _ => untitled,
        }
    }

    pub fn visibility_label(&self) -> &'static str {
        if self.is_private {
            "Private"
        } else {
            "Public"
        }
    }
}

/// An application issue tracked by the admins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    /// App version the issue was seen in, e.g. `1.0.0`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub status: IssueStatus,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Creates a freshly reported issue in the `Open` state.
    ///
    /// The id stays empty until the store assigns one.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            description: description.into(),
            version: version.into(),
            severity,
            status: IssueStatus::Open,
            created_at: Some(now),
            updated_at: None,
        }
    }

    /// Applies a status change, stamping `updated_at`.
    pub fn transition(&mut self, next: IssueStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.updated_at = Some(now);
        Ok(())
    }
}

/// Parse any timestamp shape the document store produces.
///
/// Accepts `{seconds, nanoseconds}` (also the `_seconds` export form),
/// RFC 3339 strings and epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(value_as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(value_as_i64)
                .unwrap_or(0);
            let nanos = u32::try_from(nanos).ok()?;
            Utc.timestamp_opt(seconds, nanos).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

/// Missing or null maps to the default; unknown names are rejected.
fn lenient_enum<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + TryFrom<String, Error = String>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => T::try_from(raw).map_err(serde::de::Error::custom),
        None => Ok(T::default()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_i64).unwrap_or(0))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(value_as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(matches!(value, Some(Value::Bool(true))))
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_emoji() {
        assert_eq!(Severity::Critical.emoji(), "🔴");
        assert_eq!(Severity::High.emoji(), "🟠");
        assert_eq!(Severity::Medium.emoji(), "🟡");
        assert_eq!(Severity::Low.emoji(), "🟢");
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert_eq!(" critical ".parse::<Severity>(), Ok(Severity::Critical));
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_status_transitions() {
        use IssueStatus::*;

        assert!(Open.can_transition_to(InProgress));
        assert!(Open.can_transition_to(Closed));
        assert!(InProgress.can_transition_to(Fixed));
        assert!(Fixed.can_transition_to(Closed));

        assert!(!Open.can_transition_to(Fixed));
        assert!(!Closed.can_transition_to(Open));
        assert!(!InProgress.can_transition_to(Open));
        assert!(!Open.can_transition_to(Open));
    }

    #[test]
    fn test_issue_transition_stamps_update() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let mut issue = Issue::new("Crash", "On upload", "1.0.0", Severity::High, created);

        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.id.is_empty());
        assert_eq!(issue.created_at, Some(created));
        issue.transition(IssueStatus::InProgress, later).unwrap();
        assert_eq!(issue.status, IssueStatus::InProgress);
        assert_eq!(issue.updated_at, Some(later));

        let err = issue.transition(IssueStatus::Closed, later).unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: IssueStatus::InProgress,
                to: IssueStatus::Closed
            }
        );
        assert_eq!(issue.status, IssueStatus::InProgress);
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let secs = expected.timestamp();

        assert_eq!(
            parse_timestamp(&json!({"seconds": secs, "nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!({"_seconds": secs, "_nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-01-15T12:00:00Z")),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!(secs * 1000)), Some(expected));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn test_stack_lenient_fields() {
        let stack: Stack = serde_json::from_value(json!({
            "id": "s1",
            "ownerUid": "u1",
            "imageCount": null,
            "imageUrls": ["a.jpg", 3, "b.jpg"],
            "isPrivate": true,
            "timestamp": {"seconds": 1_700_000_000, "nanoseconds": 0}
        }))
        .unwrap();

        assert_eq!(stack.image_count, 0);
        assert_eq!(stack.image_urls, vec!["a.jpg", "b.jpg"]);
        assert!(stack.is_private);
        assert!(stack.caption.is_none());
        assert!(stack.shared_with.is_empty());
        assert!(!stack.notification_sent);
        assert!(stack.timestamp.is_some());
        assert_eq!(stack.display_caption("Untitled Stack"), "Untitled Stack");
    }

    #[test]
    fn test_user_field_names() {
        let user: User = serde_json::from_value(json!({
            "id": "u1",
            "fullname": "Ada Lovelace",
            "username": "ada",
            "email": "ada@example.com",
            "stackScore": "42",
            "isAdmin": true
        }))
        .unwrap();

        assert_eq!(user.fullname, "Ada Lovelace");
        assert_eq!(user.stack_score, 42);
        assert!(user.is_admin);
        assert!(user.profile_image_url.is_none());
    }

    #[test]
    fn test_issue_defaults_and_rejection() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "i1",
            "title": "Login loop",
            "version": "1.2.0",
            "severity": "Critical",
            "status": "in_progress"
        }))
        .unwrap();
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.status, IssueStatus::InProgress);
        assert!(issue.created_at.is_none());

        let defaulted: Issue = serde_json::from_value(json!({"id": "i2"})).unwrap();
        assert_eq!(defaulted.severity, Severity::Low);
        assert_eq!(defaulted.status, IssueStatus::Open);

        let bad = serde_json::from_value::<Issue>(json!({"id": "i3", "severity": "urgent"}));
        assert!(bad.is_err());
        let bad = serde_json::from_value::<Issue>(json!({"id": "i4", "status": "reopened"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_issue_null_severity_and_status_default() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "i1",
            "title": "Blank fields",
            "severity": null,
            "status": null
        }))
        .unwrap();

        assert_eq!(issue.severity, Severity::Low);
        assert_eq!(issue.status, IssueStatus::Open);
    }

    #[test]
    fn test_stack_upload_completed_field() {
        let stack: Stack = serde_json::from_value(json!({
            "id": "s1",
            "notificationSent": true,
            "uploadCompleted": {"seconds": 1_700_000_000, "nanoseconds": 0}
        }))
        .unwrap();

        assert_eq!(
            stack.upload_completed_at,
            Utc.timestamp_opt(1_700_000_000, 0).single()
        );
        assert!(stack.notification_sent);
    }

    #[test]
    fn test_stored_names() {
        assert_eq!(Severity::Critical.as_str(), "critical");
        assert_eq!(IssueStatus::InProgress.as_str(), "in_progress");
        assert_eq!("in progress".parse::<IssueStatus>(), Ok(IssueStatus::InProgress));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&IssueStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(IssueStatus::InProgress.to_string(), "in progress");
    }
}
