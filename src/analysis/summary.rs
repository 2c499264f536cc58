//! Dashboard summaries built on top of the aggregator.

use super::aggregator::{
    average_entities_per_week, average_numeric_field_per_entity, count_where, Average,
};
use crate::models::{Issue, IssueStatus, Severity, Stack, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Stat cards of the admin panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminOverview {
    pub total_users: usize,
    pub admin_users: usize,
    pub total_stacks: usize,
    pub private_stacks: usize,
    pub public_stacks: usize,
    pub avg_stacks_per_week: Average,
    pub avg_images_per_stack: Average,
    pub avg_shared_per_stack: Average,
}

impl AdminOverview {
    /// Computes the overview from full collections.
    pub fn compute(users: &[User], stacks: &[Stack], now: DateTime<Utc>) -> Self {
        let private_stacks = count_where(stacks, |s| s.is_private);

        Self {
            total_users: users.len(),
            admin_users: count_where(users, |u| u.is_admin),
            total_stacks: stacks.len(),
            private_stacks,
            public_stacks: stacks.len() - private_stacks,
            avg_stacks_per_week: average_entities_per_week(stacks, now),
            avg_images_per_stack: average_numeric_field_per_entity(stacks, |s| {
                Some(s.image_count as f64)
            }),
            avg_shared_per_stack: average_numeric_field_per_entity(stacks, |s| {
                Some(s.shared_with.len() as f64)
            }),
        }
    }
}

/// Stat cards of a single user's dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserOverview {
    pub total_stacks: usize,
    pub total_images: u64,
    pub private_stacks: usize,
    pub public_stacks: usize,
    /// Stacks whose share notification went out.
    pub notified_stacks: usize,
}

impl UserOverview {
    /// Computes the overview from the stacks one user owns.
    pub fn compute(stacks: &[Stack]) -> Self {
        let private_stacks = count_where(stacks, |s| s.is_private);

        Self {
            total_stacks: stacks.len(),
            total_images: stacks.iter().map(|s| s.image_count).sum(),
            private_stacks,
            public_stacks: stacks.len() - private_stacks,
            notified_stacks: count_where(stacks, |s| s.notification_sent),
        }
    }
}

/// Issue counts by severity and status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub open: usize,
    pub in_progress: usize,
    pub fixed: usize,
    pub closed: usize,
}

impl IssueSummary {
    /// Creates a summary from a list of issues.
    pub fn from_issues<'a, I>(issues: I) -> Self
    where
        I: IntoIterator<Item = &'a Issue>,
    {
        let mut summary = Self::default();

        for issue in issues {
            summary.total += 1;

            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }

            match issue.status {
                IssueStatus::Open => summary.open += 1,
                IssueStatus::InProgress => summary.in_progress += 1,
                IssueStatus::Fixed => summary.fixed += 1,
                IssueStatus::Closed => summary.closed += 1,
            }
        }

        summary
    }

    /// Issues still waiting on a fix.
    pub fn unresolved(&self) -> usize {
        self.open + self.in_progress
    }
}

/// Unresolved issues at or above `level`.
pub fn unresolved_at_or_above(issues: &[Issue], level: Severity) -> usize {
    count_where(issues, |i| !i.status.is_resolved() && i.severity >= level)
}

/// Count stacks per owner id.
pub fn stacks_per_owner(stacks: &[Stack]) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for stack in stacks {
        *counts.entry(stack.owner_uid.as_str()).or_default() += 1;
    }

    counts
}

/// Look up the owner of a stack.
pub fn find_owner<'a>(users: &'a [User], owner_uid: &str) -> Option<&'a User> {
    users.iter().find(|u| u.id == owner_uid)
}

/// Distinct issue versions, sorted.
pub fn unique_versions(issues: &[Issue]) -> Vec<String> {
    issues
        .iter()
        .map(|i| i.version.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Newest issues first; issues without a creation time go last.
pub fn sort_issues_newest_first(issues: &mut [&Issue]) {
    issues.sort_by(|a, b| match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// First word of a display name, used in the dashboard greeting.
pub fn first_name(fullname: &str) -> &str {
    fullname.split_whitespace().next().unwrap_or("")
}
