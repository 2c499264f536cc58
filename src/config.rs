//! `.stackd.toml` handling.
//!
//! Persistent settings for the data source and report layout. Command-line
//! flags are merged on top before anything is fetched.

use crate::report::timefmt::is_valid_format;
use crate::store::FirestoreConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".stackd.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where records are read from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report file path; stdout when unset.
    #[serde(default)]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Maximum table rows in Markdown reports.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            verbose: false,
            max_rows: default_max_rows(),
        }
    }
}

fn default_max_rows() -> usize {
    50
}

/// Data source settings. Exactly one of `snapshot_dir` and `project_id`
/// must end up set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Local snapshot directory.
    #[serde(default)]
    pub snapshot_dir: Option<String>,

    /// Firestore project id.
    #[serde(default)]
    pub project_id: Option<String>,

    /// Firestore database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Firestore REST root. Point it at the emulator for local runs.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Web API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Firebase ID token for rules that require a signed-in admin.
    #[serde(default)]
    pub id_token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Documents per list page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            project_id: None,
            database: default_database(),
            endpoint: default_endpoint(),
            api_key: None,
            id_token: None,
            timeout_seconds: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_endpoint() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    300
}

/// The data source a merged config points at.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Snapshot(PathBuf),
    Firestore(FirestoreConfig),
}

impl SourceConfig {
    /// Resolve the configured source.
    pub fn kind(&self) -> Result<SourceKind> {
        let snapshot = self.snapshot_dir.as_deref().filter(|s| !s.trim().is_empty());
        let project = self.project_id.as_deref().filter(|s| !s.trim().is_empty());

        match (snapshot, project) {
            (Some(_), Some(_)) => {
                bail!("Both a snapshot directory and a Firestore project are configured")
            }
            (Some(dir), None) => Ok(SourceKind::Snapshot(PathBuf::from(dir))),
            (None, Some(project)) => Ok(SourceKind::Firestore(FirestoreConfig {
                endpoint: self.endpoint.clone(),
                project_id: project.to_string(),
                database: self.database.clone(),
                api_key: self.api_key.clone(),
                id_token: self.id_token.clone(),
                timeout_seconds: self.timeout_seconds,
                page_size: self.page_size,
            })),
            (None, None) => bail!(
                "No data source: pass --data DIR or --project ID, or set one in {}",
                CONFIG_FILE
            ),
        }
    }
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// chrono format for dates in stack tables.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// chrono format for date-times in issue tables.
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,

    /// Caption shown for stacks without one.
    #[serde(default = "default_untitled_caption")]
    pub untitled_caption: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            datetime_format: default_datetime_format(),
            untitled_caption: default_untitled_caption(),
        }
    }
}

impl ReportConfig {
    /// Reject date formats chrono cannot render.
    pub fn validate(&self) -> Result<()> {
        for (key, format) in [
            ("date_format", &self.date_format),
            ("datetime_format", &self.datetime_format),
        ] {
            if !is_valid_format(format) {
                bail!("Invalid [report] {} '{}'", key, format);
            }
        }
        Ok(())
    }
}

fn default_date_format() -> String {
    "%b %-d, %Y".to_string()
}

fn default_datetime_format() -> String {
    "%b %-d, %Y %H:%M".to_string()
}

fn default_untitled_caption() -> String {
    "Untitled Stack".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .report
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // A source given on the command line replaces the configured one
        if let Some(ref data) = args.data {
            self.source.snapshot_dir = Some(data.display().to_string());
            self.source.project_id = None;
        }
        if let Some(ref project) = args.project {
            self.source.project_id = Some(project.clone());
            self.source.snapshot_dir = None;
        }
        if let Some(ref key) = args.api_key {
            self.source.api_key = Some(key.clone());
        }
        if let Some(timeout) = args.timeout {
            self.source.timeout_seconds = timeout;
        }

        if let Some(max_rows) = args.max_rows {
            self.general.max_rows = max_rows;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
