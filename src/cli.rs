//! Command-line flags.
//!
//! Source selection, view filters and output settings. Flags that are
//! `Option`s fall back to `.stackd.toml` and then to built-in defaults.

use crate::analysis::Visibility;
use crate::dashboard::{View, ViewFilters};
use crate::models::{IssueStatus, Severity};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Stackd - admin dashboards for the Stackd photo app
///
/// Read users, stacks and issues from a Firestore project or a local
/// snapshot, filter them like the admin panel does, and print the stat
/// cards and tables as Markdown or JSON.
///
/// Examples:
///   stackd --data ./export
///   stackd --data ./export --view stacks --search beach --visibility private
///   stackd --project stackd-app --api-key KEY --view issues --severity high
///   stackd --data ./export --view user --uid u123 --format json
///   stackd --data ./export --create-issue "Upload stalls" --app-version 1.4.2 --severity high
///   stackd --data ./export --set-status i42 --status fixed
///   stackd --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Snapshot directory exported from the document store
    ///
    /// Holds users.json, stacks.json, issues.json or one directory per
    /// collection with a JSON file per document.
    #[arg(short, long, value_name = "DIR", env = "STACKD_DATA", conflicts_with = "project")]
    pub data: Option<PathBuf>,

    /// Firestore project id to read from
    #[arg(short, long, value_name = "ID", env = "STACKD_PROJECT")]
    pub project: Option<String>,

    /// Firestore web API key
    #[arg(long, value_name = "KEY", env = "STACKD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Dashboard view to render
    #[arg(long, default_value = "overview", value_name = "VIEW")]
    pub view: View,

    /// User id for the user view
    #[arg(long, value_name = "UID")]
    pub uid: Option<String>,

    /// Case-insensitive search term
    ///
    /// Users match on name, email or username; stacks on caption;
    /// issues on title or description.
    #[arg(short, long, default_value = "", value_name = "TERM")]
    pub search: String,

    /// Stack visibility filter
    #[arg(long, default_value = "all", value_name = "VISIBILITY")]
    pub visibility: Visibility,

    /// Only issues reported against this app version
    ///
    /// With --create-issue, the version the new issue is reported against.
    #[arg(long, value_name = "VERSION")]
    pub app_version: Option<String>,

    /// Only issues of this severity
    ///
    /// With --create-issue, the new issue's severity (default: low).
    #[arg(long, value_name = "LEVEL")]
    pub severity: Option<Severity>,

    /// Report a new issue with this title instead of rendering a view
    #[arg(long, value_name = "TITLE", conflicts_with = "set_status")]
    pub create_issue: Option<String>,

    /// Description for --create-issue
    #[arg(long, value_name = "TEXT", requires = "create_issue")]
    pub description: Option<String>,

    /// Change the status of the issue with this id instead of rendering a view
    #[arg(long, value_name = "ID", requires = "status")]
    pub set_status: Option<String>,

    /// New status for --set-status (open, in_progress, fixed, closed)
    #[arg(long, value_name = "STATUS", requires = "set_status")]
    pub status: Option<IssueStatus>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Reference instant for weekly rates and relative dates (RFC 3339)
    ///
    /// Defaults to the current time. Pin it for reproducible reports.
    #[arg(long, value_name = "TIME")]
    pub now: Option<String>,

    /// Maximum table rows to print
    #[arg(long, value_name = "COUNT")]
    pub max_rows: Option<usize>,

    /// Request timeout in seconds for Firestore calls
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Fail if unresolved issues at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<Severity>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .stackd.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Generate a default .stackd.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    ///
    /// A data source may also come from the config file, so its absence is
    /// checked in `main` once the config is merged.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.data.is_some() && self.project.is_some() {
            return Err("Use either --data or --project, not both".to_string());
        }

        if self.create_issue.is_some() && self.set_status.is_some() {
            return Err("Use either --create-issue or --set-status, not both".to_string());
        }

        if let Some(ref title) = self.create_issue {
            if title.trim().is_empty() {
                return Err("--create-issue needs a non-empty title".to_string());
            }
            if self.app_version.as_deref().map_or(true, |v| v.trim().is_empty()) {
                return Err("--create-issue requires --app-version".to_string());
            }
        }

        if let Some(ref id) = self.set_status {
            if id.trim().is_empty() {
                return Err("--set-status needs an issue id".to_string());
            }
            if self.status.is_none() {
                return Err("--set-status requires --status".to_string());
            }
        }

        if self.action().is_none() && self.view == View::User && self.uid.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err("--view user requires --uid".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.max_rows == Some(0) {
            return Err("Max rows must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        self.reference_time()?;

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// The `--now` instant, or the current time.
    pub fn reference_time(&self) -> Result<DateTime<Utc>, String> {
        match self.now.as_deref() {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| format!("Invalid --now value '{}': {}", raw, e)),
            None => Ok(Utc::now()),
        }
    }

    /// The write action requested instead of a view, if any.
    pub fn action(&self) -> Option<Action> {
        if let Some(ref title) = self.create_issue {
            return Some(Action::CreateIssue {
                title: title.trim().to_string(),
                description: self.description.as_deref().unwrap_or("").trim().to_string(),
                version: self.app_version.as_deref().unwrap_or("").trim().to_string(),
                severity: self.severity.unwrap_or_default(),
            });
        }

        match (self.set_status.as_ref(), self.status) {
            (Some(id), Some(status)) => Some(Action::SetStatus {
                id: id.trim().to_string(),
                status,
            }),
            _ => None,
        }
    }

    /// Filter values for the selected view.
    pub fn filters(&self) -> ViewFilters {
        ViewFilters {
            search: self.search.trim().to_string(),
            visibility: self.visibility,
            version: self
                .app_version
                .as_ref()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            severity: self.severity,
        }
    }
}

/// A change to the issues collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateIssue {
        title: String,
        description: String,
        version: String,
        severity: Severity,
    },
    SetStatus {
        id: String,
        status: IssueStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_args() -> Args {
        Args {
            data: Some(PathBuf::from("./export")),
            project: None,
            api_key: None,
            view: View::Overview,
            uid: None,
            search: String::new(),
            visibility: Visibility::All,
            app_version: None,
            severity: None,
            create_issue: None,
            description: None,
            set_status: None,
            status: None,
            format: OutputFormat::Markdown,
            output: None,
            now: None,
            max_rows: None,
            timeout: None,
            fail_on: None,
            config: None,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "stackd",
            "--data",
            "./export",
            "--view",
            "stacks",
            "--visibility",
            "private",
            "--severity",
            "high",
        ])
        .unwrap();

        assert_eq!(args.view, View::Stacks);
        assert_eq!(args.visibility, Visibility::PrivateOnly);
        assert_eq!(args.severity, Some(Severity::High));
        assert_eq!(args.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_validation_ok() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_both_sources() {
        let mut args = make_args();
        args.project = Some("stackd-app".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_user_view_needs_uid() {
        let mut args = make_args();
        args.view = View::User;
        assert!(args.validate().is_err());

        args.uid = Some("u1".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        let mut args = make_args();
        args.max_rows = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.project = Some("p".to_string());
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_reference_time() {
        let mut args = make_args();
        args.now = Some("2024-06-01T12:00:00Z".to_string());
        assert_eq!(
            args.reference_time().unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        );

        args.now = Some("yesterday".to_string());
        assert!(args.reference_time().is_err());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_filters() {
        let mut args = make_args();
        args.search = "  Beach ".to_string();
        args.app_version = Some(" ".to_string());
        args.severity = Some(Severity::Critical);

        let filters = args.filters();
        assert_eq!(filters.search, "Beach");
        assert_eq!(filters.version, None);
        assert_eq!(filters.severity, Some(Severity::Critical));
    }

    #[test]
    fn test_parse_set_status() {
        let args = Args::try_parse_from([
            "stackd", "--data", "./export", "--set-status", "i42", "--status", "in progress",
        ])
        .unwrap();

        assert!(args.validate().is_ok());
        assert_eq!(
            args.action(),
            Some(Action::SetStatus {
                id: "i42".to_string(),
                status: IssueStatus::InProgress,
            })
        );

        let missing = Args::try_parse_from(["stackd", "--set-status", "i42"]);
        assert!(missing.is_err());
    }

    #[test]
    fn test_create_issue_action() {
        let mut args = make_args();
        args.create_issue = Some(" Upload stalls ".to_string());
        assert!(args.validate().is_err());

        args.app_version = Some("1.4.2".to_string());
        args.description = Some("Stuck at 99%".to_string());
        assert!(args.validate().is_ok());
        assert_eq!(
            args.action(),
            Some(Action::CreateIssue {
                title: "Upload stalls".to_string(),
                description: "Stuck at 99%".to_string(),
                version: "1.4.2".to_string(),
                severity: Severity::Low,
            })
        );

        args.create_issue = Some("  ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_actions_conflict() {
        let mut args = make_args();
        args.create_issue = Some("Crash".to_string());
        args.app_version = Some("1.0.0".to_string());
        args.set_status = Some("i1".to_string());
        args.status = Some(IssueStatus::Closed);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_action_skips_user_view_check() {
        let mut args = make_args();
        args.view = View::User;
        args.set_status = Some("i1".to_string());
        args.status = Some(IssueStatus::Closed);
        assert!(args.validate().is_ok());
        assert!(make_args().action().is_none());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
