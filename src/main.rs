//! Stackd - admin dashboards for the Stackd photo app
//!
//! A CLI tool that reads users, stacks and issues from Firestore or a
//! local snapshot and renders the admin panel's stat cards and tables.
//! It can also report new issues and move issues through their lifecycle.
//!
//! Exit codes:
//!   0 - Success (no issues above threshold, or no --fail-on set)
//!   1 - Runtime error (bad source, network failure, config, etc.)
//!   2 - Unresolved issues found at or above the --fail-on threshold

mod analysis;
mod cli;
mod config;
mod dashboard;
mod models;
mod report;
mod store;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use cli::{Action, Args, OutputFormat};
use config::{Config, SourceKind, CONFIG_FILE};
use dashboard::{View, ViewData};
use models::Issue;
use report::{Report, ReportMetadata, ReportOptions};
use std::path::Path;
use store::{DataSource, FirestoreSource, SnapshotSource, Store};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, &config);

    info!("Stackd v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Dashboard failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            eprintln!("   Check the data source settings and try again.");
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .stackd.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Set snapshot_dir or project_id under [source] to pick a data source.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Fetch, aggregate and render one view. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let now = args.reference_time().map_err(|e| anyhow!(e))?;
    let filters = args.filters();

    let store = Store::new(open_source(&config)?);
    info!("Reading from {}", store.describe());

    if let Some(action) = args.action() {
        return handle_action(&store, action, now).await;
    }

    let data = dashboard::load(&store, args.view, args.uid.as_deref(), !args.quiet).await?;
    let view_data = dashboard::build(args.view, &data, &filters, now)?;

    let report = Report {
        metadata: ReportMetadata {
            view: args.view,
            source: store.describe(),
            generated_at: now,
            filters,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        },
        data: view_data,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => {
            let options = ReportOptions::from_config(&config.report, config.general.max_rows);
            report::generate_markdown_report(&report, &options)
        }
    };

    match config.general.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path))?;
            if !args.quiet {
                eprintln!("✅ Report saved to: {}", path);
            }
        }
        None => print!("{}", output),
    }

    // Check --fail-on threshold
    if let Some(level) = args.fail_on {
        let failing = match report.data {
            ViewData::Issues { ref rows, .. } => analysis::unresolved_at_or_above(rows, level),
            _ => {
                let issues = if args.view == View::Overview {
                    data.issues
                } else {
                    store.fetch_all_issues().await?
                };
                let version = report.metadata.filters.version.as_deref();
                let matching: Vec<_> = analysis::filter_issues(&issues, version, None)
                    .into_iter()
                    .cloned()
                    .collect();
                analysis::unresolved_at_or_above(&matching, level)
            }
        };

        if failing > 0 {
            eprintln!(
                "\n⛔ {} unresolved issue(s) at or above {} severity. Failing (exit code 2).",
                failing, level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Apply a write to the issues collection. Returns exit code 0.
async fn handle_action(store: &Store, action: Action, now: DateTime<Utc>) -> Result<i32> {
    match action {
        Action::CreateIssue {
            title,
            description,
            version,
            severity,
        } => {
            let draft = Issue::new(title, description, version, severity, now);
            let issue = store
                .create_issue(&draft)
                .await
                .context("Failed to create issue")?;
            println!("✅ Created issue {} ({} severity)", issue.id, issue.severity);
        }
        Action::SetStatus { id, status } => {
            let issue = store
                .update_issue_status(&id, status, now)
                .await
                .with_context(|| format!("Failed to update issue {}", id))?;
            println!("✅ Issue {} is now {}", id, issue.status);
        }
    }

    Ok(0)
}

/// Open the configured data source.
fn open_source(config: &Config) -> Result<DataSource> {
    let source = match config.source.kind()? {
        SourceKind::Snapshot(dir) => {
            info!("Using snapshot directory: {}", dir.display());
            DataSource::Snapshot(SnapshotSource::open(dir)?)
        }
        SourceKind::Firestore(firestore) => {
            if firestore.api_key.is_none() && firestore.id_token.is_none() {
                warn!("No API key or ID token set; requests rely on open security rules");
            }
            DataSource::Firestore(FirestoreSource::new(firestore)?)
        }
    };

    Ok(source)
}

/// Load configuration from file or use defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    let mut config = if let Some(ref config_path) = args.config {
        Config::load(config_path)?
    } else {
        // Try default location
        match Config::load_default() {
            Ok(Some(config)) => config,
            Ok(None) => Config::default(),
            Err(e) => {
                eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE, e);
                Config::default()
            }
        }
    };

    config.merge_with_args(args);
    Ok(config)
}
