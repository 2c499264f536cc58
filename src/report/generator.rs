//! Markdown and JSON report generation.
//!
//! Renders a computed dashboard view as tables. Filtering has already
//! happened; this module only formats and truncates rows for display.

use super::timefmt::{format_date, format_time_ago};
use crate::analysis::{first_name, AdminOverview, IssueSummary, UserOverview, Visibility};
use crate::config::ReportConfig;
use crate::dashboard::{StackRow, UserRow, View, ViewData, ViewFilters};
use crate::models::{Issue, Severity, Stack, User};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata about the report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub view: View,
    /// Where the records were read from.
    pub source: String,
    /// The instant every relative time is measured against.
    pub generated_at: DateTime<Utc>,
    pub filters: ViewFilters,
    pub tool_version: String,
}

/// A rendered dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub data: ViewData,
}

/// Display settings for Markdown output.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub max_rows: usize,
    pub date_format: String,
    pub datetime_format: String,
    pub untitled_caption: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::from_config(&ReportConfig::default(), 50)
    }
}

impl ReportOptions {
    pub fn from_config(config: &ReportConfig, max_rows: usize) -> Self {
        Self {
            max_rows,
            date_format: config.date_format.clone(),
            datetime_format: config.datetime_format.clone(),
            untitled_caption: config.untitled_caption.clone(),
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportOptions) -> String {
    let mut output = String::new();
    let now = report.metadata.generated_at;

    output.push_str("# Stackd Admin Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));

    match &report.data {
        ViewData::Overview { overview, issues } => {
            output.push_str(&generate_overview_section(overview));
            output.push_str(&generate_issue_summary_section(issues));
        }
        ViewData::Users { total, rows } => {
            output.push_str(&generate_users_section(rows, *total, options));
        }
        ViewData::Stacks { total, rows } => {
            output.push_str("## Stacks\n\n");
            output.push_str(&generate_stacks_table(rows, *total, options, now));
        }
        ViewData::Issues {
            total,
            summary,
            versions,
            rows,
        } => {
            output.push_str(&generate_issue_summary_section(summary));
            output.push_str(&generate_issues_section(rows, *total, versions, options));
        }
        ViewData::User {
            profile,
            overview,
            total,
            rows,
        } => {
            output.push_str(&generate_user_dashboard_section(profile, overview));
            output.push_str("## Stacks\n\n");
            output.push_str(&generate_stacks_table(rows, *total, options, now));
        }
    }

    output.push_str(&generate_footer(&report.metadata.tool_version));
    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();
    let filters = &metadata.filters;

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **View:** {}\n", metadata.view));
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if !filters.search.is_empty() {
        section.push_str(&format!("- **Search:** `{}`\n", filters.search));
    }
    if filters.visibility != Visibility::All {
        section.push_str(&format!("- **Visibility:** {}\n", filters.visibility));
    }
    if let Some(ref version) = filters.version {
        section.push_str(&format!("- **Version:** {}\n", version));
    }
    if let Some(severity) = filters.severity {
        section.push_str(&format!("- **Severity:** {}\n", severity));
    }

    section.push('\n');
    section
}

/// Generate the admin stat cards.
fn generate_overview_section(overview: &AdminOverview) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str("| Total Users | Admins | Total Stacks | Private Stacks | Public Stacks |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n\n",
        overview.total_users,
        overview.admin_users,
        overview.total_stacks,
        overview.private_stacks,
        overview.public_stacks
    ));

    section.push_str("| Avg Stacks/Week | Avg Images/Stack | Avg Shared/Stack |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} |\n\n",
        overview.avg_stacks_per_week, overview.avg_images_per_stack, overview.avg_shared_per_stack
    ));

    section
}

/// Generate the issue severity and status breakdown.
fn generate_issue_summary_section(summary: &IssueSummary) -> String {
    let mut section = String::new();

    section.push_str("## Issue Summary\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.high, summary.medium, summary.low, summary.total
    ));

    section.push_str("| Open | In Progress | Fixed | Closed | **Unresolved** |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.open,
        summary.in_progress,
        summary.fixed,
        summary.closed,
        summary.unresolved()
    ));

    section
}

/// Generate the users table.
fn generate_users_section(rows: &[UserRow], total: usize, options: &ReportOptions) -> String {
    let mut section = String::new();

    section.push_str("## Users\n\n");
    section.push_str(&showing_line(rows.len(), total, "users", options.max_rows));

    if rows.is_empty() {
        section.push_str("No users match the current filters.\n\n");
        return section;
    }

    section.push_str("| User | Handle | Email | Score | Stacks | Admin |\n");
    section.push_str("|:---|:---|:---|:---:|:---:|:---:|\n");

    for row in rows.iter().take(options.max_rows) {
        let user = &row.user;
        section.push_str(&format!(
            "| {} | @{} | {} | {} | {} | {} |\n",
            cell(&user.fullname),
            cell(&user.username),
            cell(&user.email),
            user.stack_score,
            row.stack_count,
            if user.is_admin { "yes" } else { "" }
        ));
    }
    section.push('\n');

    section
}

/// Generate a stacks table.
fn generate_stacks_table(
    rows: &[StackRow],
    total: usize,
    options: &ReportOptions,
    now: DateTime<Utc>,
) -> String {
    let mut section = String::new();

    section.push_str(&showing_line(rows.len(), total, "stacks", options.max_rows));

    if rows.is_empty() {
        section.push_str("No stacks match the current filters.\n\n");
        return section;
    }

    section.push_str("| Stack | Owner | Created | Images | Shared | Status | Notifications |\n");
    section.push_str("|:---|:---|:---|:---:|:---:|:---:|:---|\n");

    for row in rows.iter().take(options.max_rows) {
        let stack = &row.stack;
        section.push_str(&format!(
            "| {} `{}` | {} | {} ({}) | {} | {} | {} | {} |\n",
            cell(stack.display_caption(&options.untitled_caption)),
            cell(&stack.id),
            cell(row.owner_name.as_deref().unwrap_or("Unknown")),
            format_time_ago(stack.timestamp, now),
            format_date(stack.timestamp, &options.date_format),
            stack.image_count,
            stack.shared_with.len(),
            stack.visibility_label(),
            notification_cell(stack, now)
        ));
    }
    section.push('\n');

    section
}

/// Generate the issue list.
fn generate_issues_section(
    rows: &[Issue],
    total: usize,
    versions: &[String],
    options: &ReportOptions,
) -> String {
    let mut section = String::new();

    section.push_str("## Issues\n\n");
    if !versions.is_empty() {
        section.push_str(&format!("*Known versions: {}*\n\n", versions.join(", ")));
    }
    section.push_str(&showing_line(rows.len(), total, "issues", options.max_rows));

    if rows.is_empty() {
        section.push_str("No issues match the current filters.\n\n");
        return section;
    }

    section.push_str("| Severity | Title | Version | Status | Created |\n");
    section.push_str("|:---|:---|:---:|:---:|:---|\n");

    for issue in rows.iter().take(options.max_rows) {
        section.push_str(&format!(
            "| {} {} | {} | {} | {} | {} |\n",
            issue.severity.emoji(),
            issue.severity,
            cell(&issue.title),
            cell(&issue.version),
            issue.status,
            format_date(issue.created_at, &options.datetime_format)
        ));
    }
    section.push('\n');

    section
}

/// Generate a user's own dashboard cards.
fn generate_user_dashboard_section(profile: &User, overview: &UserOverview) -> String {
    let mut section = String::new();

    let name = first_name(&profile.fullname);
    if name.is_empty() {
        section.push_str("## Welcome\n\n");
    } else {
        section.push_str(&format!("## Welcome, {}\n\n", cell(name)));
    }

    section.push_str("| Total Stacks | Total Images | Private Stacks | Public Stacks | Notified |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n\n",
        overview.total_stacks,
        overview.total_images,
        overview.private_stacks,
        overview.public_stacks,
        overview.notified_stacks
    ));

    section
}

/// "Sent <time ago>" for stacks whose notifications went out.
fn notification_cell(stack: &Stack, now: DateTime<Utc>) -> String {
    if stack.notification_sent {
        format!("Sent {}", format_time_ago(stack.upload_completed_at, now))
    } else {
        String::new()
    }
}

fn showing_line(matching: usize, total: usize, noun: &str, max_rows: usize) -> String {
    if matching > max_rows {
        format!(
            "*Showing {} of {} {} (first {} listed)*\n\n",
            matching, total, noun, max_rows
        )
    } else {
        format!("*Showing {} of {} {}*\n\n", matching, total, noun)
    }
}

/// Make text safe for a Markdown table cell.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Generate the report footer.
fn generate_footer(version: &str) -> String {
    format!("---\n\n*Report generated by stackd v{}*\n", version)
}
