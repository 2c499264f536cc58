//! Filtering and statistics over fetched records.
//!
//! Every function here is pure: it reads already-materialized records,
//! never mutates them, keeps no state between calls and takes "now" as an
//! argument. Callers re-run them whenever an input or a filter changes.

use crate::models::{Issue, Severity, Stack, User};
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Extracts one searchable text field from a record.
///
/// `None` is searched as an empty string.
pub type FieldSelector<T> = fn(&T) -> Option<&str>;

/// Fields matched by the users table search box.
pub const USER_SEARCH_FIELDS: &[FieldSelector<User>] = &[user_fullname, user_email, user_username];

/// Fields matched by the stacks table search box.
pub const STACK_SEARCH_FIELDS: &[FieldSelector<Stack>] = &[stack_caption];

/// Fields matched by the issues list search box.
pub const ISSUE_SEARCH_FIELDS: &[FieldSelector<Issue>] = &[issue_title, issue_description];

fn user_fullname(user: &User) -> Option<&str> {
    Some(&user.fullname)
}

fn user_email(user: &User) -> Option<&str> {
    Some(&user.email)
}

fn user_username(user: &User) -> Option<&str> {
    Some(&user.username)
}

fn stack_caption(stack: &Stack) -> Option<&str> {
    stack.caption.as_deref()
}

fn issue_title(issue: &Issue) -> Option<&str> {
    Some(&issue.title)
}

fn issue_description(issue: &Issue) -> Option<&str> {
    Some(&issue.description)
}

/// Stack visibility filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    #[value(name = "public")]
    #[serde(rename = "public")]
    PublicOnly,
    #[value(name = "private")]
    #[serde(rename = "private")]
    PrivateOnly,
}

impl Visibility {
    fn admits(self, stack: &Stack) -> bool {
        match self {
            Visibility::All => true,
            Visibility::PublicOnly => !stack.is_private,
            Visibility::PrivateOnly => stack.is_private,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::All => write!(f, "all"),
            Visibility::PublicOnly => write!(f, "public"),
            Visibility::PrivateOnly => write!(f, "private"),
        }
    }
}

/// Records carrying a creation time.
pub trait Timestamped {
    fn created_at(&self) -> Option<DateTime<Utc>>;
}

impl Timestamped for Stack {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

impl Timestamped for Issue {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// A dashboard statistic kept at one decimal place.
///
/// Displays as `3.0`, `1.5`, `0.0`; serializes as a plain number.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Average(f64);

impl Average {
    pub const ZERO: Average = Average(0.0);

    fn rounded(value: f64) -> Self {
        if value.is_finite() {
            Average((value * 10.0).round() / 10.0)
        } else {
            Average::ZERO
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

impl Serialize for Average {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

/// Keep records where any selected field contains `term`, ignoring case.
///
/// An empty term keeps everything. Relative order is preserved.
pub fn filter_by_search<'a, T, I>(records: I, term: &str, fields: &[FieldSelector<T>]) -> Vec<&'a T>
where
    T: 'a,
    I: IntoIterator<Item = &'a T>,
{
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return records.into_iter().collect();
    }

    records
        .into_iter()
        .filter(|record| {
            fields.iter().any(|field| {
                field(record)
                    .unwrap_or("")
                    .to_lowercase()
                    .contains(&needle)
            })
        })
        .collect()
}

/// Keep stacks admitted by the visibility mode.
pub fn filter_by_category<'a, I>(stacks: I, visibility: Visibility) -> Vec<&'a Stack>
where
    I: IntoIterator<Item = &'a Stack>,
{
    stacks
        .into_iter()
        .filter(|stack| visibility.admits(stack))
        .collect()
}

/// Keep issues matching both the version and the severity, when given.
pub fn filter_issues<'a, I>(
    issues: I,
    version: Option<&str>,
    severity: Option<Severity>,
) -> Vec<&'a Issue>
where
    I: IntoIterator<Item = &'a Issue>,
{
    issues
        .into_iter()
        .filter(|issue| version.map_or(true, |v| issue.version == v))
        .filter(|issue| severity.map_or(true, |s| issue.severity == s))
        .collect()
}

/// Average number of records created per week, up to `now`.
///
/// The window starts at the earliest creation time. A record without a
/// creation time counts as created at `now`, so it can never widen the
/// window. Elapsed weeks are rounded up with a floor of one week, which
/// also covers timestamps later than `now`.
pub fn average_entities_per_week<T: Timestamped>(records: &[T], now: DateTime<Utc>) -> Average {
    if records.is_empty() {
        return Average::ZERO;
    }

    let earliest = records
        .iter()
        .map(|r| r.created_at().unwrap_or(now))
        .min()
        .unwrap_or(now);

    let elapsed_ms = (now - earliest).num_milliseconds() as f64;
    let week_ms = Duration::weeks(1).num_milliseconds() as f64;
    let weeks = (elapsed_ms / week_ms).ceil().max(1.0);

    Average::rounded(records.len() as f64 / weeks)
}

/// Mean of a numeric field across records; missing values count as 0.
pub fn average_numeric_field_per_entity<T, F>(records: &[T], field: F) -> Average
where
    F: Fn(&T) -> Option<f64>,
{
    if records.is_empty() {
        return Average::ZERO;
    }

    let total: f64 = records.iter().map(|r| field(r).unwrap_or(0.0)).sum();
    Average::rounded(total / records.len() as f64)
}

/// Number of records matching `predicate`.
pub fn count_where<T, P>(records: &[T], predicate: P) -> usize
where
    P: Fn(&T) -> bool,
{
    records.iter().filter(|r| predicate(r)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn user(fullname: &str, email: &str) -> User {
        User {
            id: fullname.to_lowercase(),
            fullname: fullname.to_string(),
            username: fullname.to_lowercase().replace(' ', "_"),
            email: email.to_string(),
            ..Default::default()
        }
    }

    fn stack(id: &str, caption: Option<&str>, is_private: bool) -> Stack {
        Stack {
            id: id.to_string(),
            owner_uid: "u1".to_string(),
            caption: caption.map(String::from),
            is_private,
            ..Default::default()
        }
    }

    fn issue(id: &str, version: &str, severity: Severity) -> Issue {
        Issue {
            id: id.to_string(),
            title: format!("Issue {}", id),
            version: version.to_string(),
            severity,
            ..Default::default()
        }
    }

    fn stack_ids(stacks: &[&Stack]) -> Vec<String> {
        stacks.iter().map(|s| s.id.clone()).collect()
    }

    fn issue_ids(issues: &[&Issue]) -> Vec<String> {
        issues.iter().map(|i| i.id.clone()).collect()
    }

    #[test]
    fn test_search_matches_any_field_ignoring_case() {
        let users = vec![
            user("Ada Lovelace", "a@x.com"),
            user("Bob", "ada@y.com"),
            user("Carol", "carol@z.com"),
        ];

        let found = filter_by_search(&users, "ADA", USER_SEARCH_FIELDS);

        let names: Vec<&str> = found.iter().map(|u| u.fullname.as_str()).collect();
        assert_eq!(names, vec!["Ada Lovelace", "Bob"]);
    }

    #[test]
    fn test_search_empty_term_keeps_everything_in_order() {
        let stacks = vec![
            stack("s1", Some("Beach"), false),
            stack("s2", None, true),
            stack("s3", Some("Hike"), false),
        ];

        let found = filter_by_search(&stacks, "", STACK_SEARCH_FIELDS);

        assert_eq!(stack_ids(&found), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_search_missing_field_never_matches_nonempty_term() {
        let stacks = vec![stack("s1", None, false), stack("s2", Some("Beach day"), false)];

        let found = filter_by_search(&stacks, "day", STACK_SEARCH_FIELDS);

        assert_eq!(stack_ids(&found), vec!["s2"]);
    }

    #[test]
    fn test_filters_are_idempotent() {
        let stacks = vec![
            stack("s1", Some("Beach"), false),
            stack("s2", Some("beach party"), true),
            stack("s3", Some("Hike"), true),
        ];

        let first = filter_by_category(
            filter_by_search(&stacks, "beach", STACK_SEARCH_FIELDS),
            Visibility::PrivateOnly,
        );
        let second = filter_by_category(
            filter_by_search(&stacks, "beach", STACK_SEARCH_FIELDS),
            Visibility::PrivateOnly,
        );

        assert_eq!(first, second);
        assert_eq!(stack_ids(&first), vec!["s2"]);

        let again = filter_by_category(first.clone(), Visibility::PrivateOnly);
        assert_eq!(again, first);
    }

    #[test]
    fn test_visibility_partitions_stacks() {
        let stacks = vec![
            stack("s1", None, false),
            stack("s2", None, true),
            stack("s3", None, false),
            stack("s4", None, true),
        ];

        let all = filter_by_category(&stacks, Visibility::All);
        let public = filter_by_category(&stacks, Visibility::PublicOnly);
        let private = filter_by_category(&stacks, Visibility::PrivateOnly);

        assert!(public.iter().all(|p| !private.iter().any(|q| q.id == p.id)));
        assert_eq!(public.len() + private.len(), all.len());
        assert_eq!(stack_ids(&public), vec!["s1", "s3"]);
        assert_eq!(stack_ids(&private), vec!["s2", "s4"]);
    }

    #[test]
    fn test_issue_filters_are_anded() {
        let issues = vec![
            issue("i1", "1.0", Severity::Low),
            issue("i2", "1.0", Severity::High),
            issue("i3", "2.0", Severity::High),
        ];

        let both = filter_issues(&issues, Some("1.0"), Some(Severity::High));
        assert_eq!(issue_ids(&both), vec!["i2"]);

        let by_version = filter_issues(&issues, Some("1.0"), None);
        assert_eq!(issue_ids(&by_version), vec!["i1", "i2"]);

        let unfiltered = filter_issues(&issues, None, None);
        assert_eq!(unfiltered.len(), 3);
    }

    #[test]
    fn test_empty_inputs_are_neutral() {
        let stacks: Vec<Stack> = Vec::new();

        assert_eq!(average_entities_per_week(&stacks, now()), Average::ZERO);
        assert_eq!(
            average_numeric_field_per_entity(&stacks, |s| Some(s.image_count as f64)),
            Average::ZERO
        );
        assert_eq!(count_where(&stacks, |s| s.is_private), 0);
        assert_eq!(Average::ZERO.to_string(), "0.0");
    }

    #[test]
    fn test_week_rate_floors_to_one_week() {
        let stacks: Vec<Stack> = (0..3)
            .map(|h| Stack {
                timestamp: Some(now() - Duration::hours(h)),
                ..Default::default()
            })
            .collect();

        let rate = average_entities_per_week(&stacks, now());
        assert_eq!(rate.to_string(), "3.0");
    }

    #[test]
    fn test_week_rate_rounds_weeks_up() {
        // Earliest is 2 weeks and 1 day old: 3 weeks.
        let stacks = vec![
            Stack {
                timestamp: Some(now() - Duration::days(15)),
                ..Default::default()
            },
            Stack {
                timestamp: Some(now() - Duration::days(2)),
                ..Default::default()
            },
        ];

        let rate = average_entities_per_week(&stacks, now());
        assert_eq!(rate.to_string(), "0.7");
    }

    #[test]
    fn test_week_rate_missing_timestamp_counts_as_now() {
        let stacks = vec![
            Stack {
                timestamp: Some(now() - Duration::days(14)),
                ..Default::default()
            },
            Stack::default(),
        ];

        let rate = average_entities_per_week(&stacks, now());
        assert_eq!(rate.to_string(), "1.0");

        let undated = vec![Stack::default(), Stack::default()];
        assert_eq!(average_entities_per_week(&undated, now()).to_string(), "2.0");
    }

    #[test]
    fn test_week_rate_future_timestamps_use_floor() {
        let stacks = vec![Stack {
            timestamp: Some(now() + Duration::days(30)),
            ..Default::default()
        }];

        assert_eq!(average_entities_per_week(&stacks, now()).to_string(), "1.0");
    }

    #[test]
    fn test_average_rounds_to_one_decimal() {
        let counts = |values: &[u64]| -> Vec<Stack> {
            values
                .iter()
                .map(|&n| Stack {
                    image_count: n,
                    ..Default::default()
                })
                .collect()
        };

        let images = |s: &Stack| Some(s.image_count as f64);

        assert_eq!(
            average_numeric_field_per_entity(&counts(&[2, 3, 4]), images).to_string(),
            "3.0"
        );
        assert_eq!(
            average_numeric_field_per_entity(&counts(&[1, 2]), images).to_string(),
            "1.5"
        );
        assert_eq!(
            average_numeric_field_per_entity(&counts(&[1, 1, 2]), images).to_string(),
            "1.3"
        );
    }

    #[test]
    fn test_average_missing_values_count_as_zero() {
        let stacks = vec![
            Stack {
                shared_with: vec!["a".into(), "b".into()],
                ..Default::default()
            },
            Stack::default(),
        ];

        let shared = average_numeric_field_per_entity(&stacks, |s| {
            (!s.shared_with.is_empty()).then(|| s.shared_with.len() as f64)
        });
        assert_eq!(shared.value(), 1.0);
    }

    #[test]
    fn test_count_where() {
        let users = vec![
            User {
                is_admin: true,
                ..Default::default()
            },
            User::default(),
            User {
                is_admin: true,
                ..Default::default()
            },
        ];

        assert_eq!(count_where(&users, |u| u.is_admin), 2);
    }

    #[test]
    fn test_average_serializes_as_number() {
        let json = serde_json::to_string(&Average::rounded(1.25)).unwrap();
        assert_eq!(json, "1.3");
    }
}
