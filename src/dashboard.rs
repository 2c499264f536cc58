//! Dashboard views.
//!
//! Loads what a view needs from the store, then runs the aggregator with
//! the view's filters. Filter values are plain parameters owned by the
//! caller; nothing here is remembered between runs.

use crate::analysis::{
    filter_by_category, filter_by_search, filter_issues, find_owner, sort_issues_newest_first,
    stacks_per_owner, unique_versions, AdminOverview, IssueSummary, UserOverview, Visibility,
    ISSUE_SEARCH_FIELDS, STACK_SEARCH_FIELDS, USER_SEARCH_FIELDS,
};
use crate::models::{Issue, Severity, Stack, User};
use crate::store::Store;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Which dashboard to render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Admin stat cards plus issue counts
    #[default]
    Overview,
    /// Admin users table
    Users,
    /// Admin stacks table
    Stacks,
    /// Issue tracker list
    Issues,
    /// One user's own dashboard
    User,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Overview => write!(f, "overview"),
            View::Users => write!(f, "users"),
            View::Stacks => write!(f, "stacks"),
            View::Issues => write!(f, "issues"),
            View::User => write!(f, "user"),
        }
    }
}

/// Current values of the search box and filter drop-downs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewFilters {
    pub search: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Records fetched for one run.
#[derive(Debug, Clone, Default)]
pub struct Collections {
    pub users: Vec<User>,
    pub stacks: Vec<Stack>,
    pub issues: Vec<Issue>,
}

/// A user row with its stack count.
#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    #[serde(flatten)]
    pub user: User,
    pub stack_count: usize,
}

/// A stack row with its owner's display name.
#[derive(Debug, Clone, Serialize)]
pub struct StackRow {
    #[serde(flatten)]
    pub stack: Stack,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
}

/// The computed content of a view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum ViewData {
    Overview {
        overview: AdminOverview,
        issues: IssueSummary,
    },
    Users {
        total: usize,
        rows: Vec<UserRow>,
    },
    Stacks {
        total: usize,
        rows: Vec<StackRow>,
    },
    Issues {
        total: usize,
        summary: IssueSummary,
        versions: Vec<String>,
        rows: Vec<Issue>,
    },
    User {
        profile: User,
        overview: UserOverview,
        total: usize,
        rows: Vec<StackRow>,
    },
}

/// Fetch the collections a view needs, concurrently.
pub async fn load(
    store: &Store,
    view: View,
    uid: Option<&str>,
    show_progress: bool,
) -> Result<Collections> {
    let spinner = show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Fetching {} data from {}", view, store.describe()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = fetch(store, view, uid).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let collections = result?;
    info!(
        "Loaded {} users, {} stacks, {} issues",
        collections.users.len(),
        collections.stacks.len(),
        collections.issues.len()
    );
    Ok(collections)
}

async fn fetch(store: &Store, view: View, uid: Option<&str>) -> Result<Collections> {
    let collections = match view {
        View::Overview => {
            let (users, stacks, issues) = futures::try_join!(
                store.fetch_all_users(),
                store.fetch_all_stacks(),
                store.fetch_all_issues()
            )?;
            Collections {
                users,
                stacks,
                issues,
            }
        }
        View::Users | View::Stacks => {
            let (users, stacks) =
                futures::try_join!(store.fetch_all_users(), store.fetch_all_stacks())?;
            Collections {
                users,
                stacks,
                issues: Vec::new(),
            }
        }
        View::Issues => Collections {
            issues: store.fetch_all_issues().await?,
            ..Default::default()
        },
        View::User => {
            let uid = uid.ok_or_else(|| anyhow!("--uid is required for the user view"))?;
            let (profile, stacks) =
                futures::try_join!(store.fetch_user(uid), store.fetch_users_stacks(uid))?;
            let profile = profile.ok_or_else(|| anyhow!("User not found: {}", uid))?;
            Collections {
                users: vec![profile],
                stacks,
                issues: Vec::new(),
            }
        }
    };

    Ok(collections)
}

/// Run the aggregator for a view.
pub fn build(
    view: View,
    data: &Collections,
    filters: &ViewFilters,
    now: DateTime<Utc>,
) -> Result<ViewData> {
    debug!("Building {} view with filters {:?}", view, filters);

    let view_data = match view {
        View::Overview => ViewData::Overview {
            overview: AdminOverview::compute(&data.users, &data.stacks, now),
            issues: IssueSummary::from_issues(&data.issues),
        },
        View::Users => {
            let counts = stacks_per_owner(&data.stacks);
            let rows = filter_by_search(&data.users, &filters.search, USER_SEARCH_FIELDS)
                .into_iter()
                .map(|user| UserRow {
                    stack_count: counts.get(user.id.as_str()).copied().unwrap_or(0),
                    user: user.clone(),
                })
                .collect();

            ViewData::Users {
                total: data.users.len(),
                rows,
            }
        }
        View::Stacks => ViewData::Stacks {
            total: data.stacks.len(),
            rows: stack_rows(&data.stacks, &data.users, filters),
        },
        View::Issues => {
            let searched = filter_by_search(&data.issues, &filters.search, ISSUE_SEARCH_FIELDS);
            let mut matching =
                filter_issues(searched, filters.version.as_deref(), filters.severity);
            sort_issues_newest_first(&mut matching);

            ViewData::Issues {
                total: data.issues.len(),
                summary: IssueSummary::from_issues(matching.iter().copied()),
                versions: unique_versions(&data.issues),
                rows: matching.into_iter().cloned().collect(),
            }
        }
        View::User => {
            let profile = data
                .users
                .first()
                .cloned()
                .ok_or_else(|| anyhow!("No profile loaded for the user view"))?;

            ViewData::User {
                overview: UserOverview::compute(&data.stacks),
                total: data.stacks.len(),
                rows: stack_rows(&data.stacks, &data.users, filters),
                profile,
            }
        }
    };

    Ok(view_data)
}

/// Stacks matching the search AND the visibility filter.
fn stack_rows(stacks: &[Stack], users: &[User], filters: &ViewFilters) -> Vec<StackRow> {
    let searched = filter_by_search(stacks, &filters.search, STACK_SEARCH_FIELDS);

    filter_by_category(searched, filters.visibility)
        .into_iter()
        .map(|stack| StackRow {
            owner_name: find_owner(users, &stack.owner_uid).map(|u| u.fullname.clone()),
            stack: stack.clone(),
        })
        .collect()
}
