//! Data access for the users, stacks and issues collections.
//!
//! Two sources are supported: a local snapshot directory exported from the
//! document store, and the Firestore REST API. Both hand back plain JSON
//! documents, which are coerced into typed records here and nowhere else.
//!
//! Issues are also written here: new reports and status changes.

pub mod firestore;
pub mod snapshot;

pub use firestore::{FirestoreConfig, FirestoreSource};
pub use snapshot::SnapshotSource;

use crate::models::{Issue, IssueStatus, Stack, TransitionError, User};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const USERS: &str = "users";
pub const STACKS: &str = "stacks";
pub const ISSUES: &str = "issues";

/// Errors raised while fetching documents.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to walk snapshot directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("Firestore returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid data source: {0}")]
    InvalidSource(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("no document {id} in {collection}")]
    NotFound { collection: String, id: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A field value written to a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Time(DateTime<Utc>),
}

impl FieldValue {
    /// Plain JSON form, as stored in snapshots.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text.clone()),
            FieldValue::Time(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

fn fields_to_json(fields: &[(&str, FieldValue)]) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_json()))
        .collect()
}

/// Where documents come from.
#[derive(Debug, Clone)]
pub enum DataSource {
    Snapshot(SnapshotSource),
    Firestore(FirestoreSource),
}

impl DataSource {
    /// Human-readable description for logs and report metadata.
    pub fn describe(&self) -> String {
        match self {
            DataSource::Snapshot(s) => format!("snapshot {}", s.root().display()),
            DataSource::Firestore(f) => format!("firestore project {}", f.project_id()),
        }
    }

    /// Every document in a collection. A missing collection is empty.
    pub async fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        match self {
            DataSource::Snapshot(s) => {
                let source = s.clone();
                let name = collection.to_string();
                tokio::task::spawn_blocking(move || source.load_collection(&name)).await?
            }
            DataSource::Firestore(f) => f.list_documents(collection).await,
        }
    }

    /// A single document by id.
    pub async fn fetch_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, StoreError> {
        match self {
            DataSource::Snapshot(_) => {
                let docs = self.fetch_collection(collection).await?;
                Ok(docs.into_iter().find(|doc| doc["id"] == id))
            }
            DataSource::Firestore(f) => f.get_document(collection, id).await,
        }
    }

    /// Documents whose `field` equals the string `value`.
    pub async fn fetch_where_equal(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        match self {
            DataSource::Snapshot(_) => {
                let docs = self.fetch_collection(collection).await?;
                Ok(docs.into_iter().filter(|doc| doc[field] == value).collect())
            }
            DataSource::Firestore(f) => f.run_equal_query(collection, field, value).await,
        }
    }

    /// Create a document and return its new id.
    pub async fn insert_document(
        &self,
        collection: &str,
        fields: &[(&str, FieldValue)],
    ) -> Result<String, StoreError> {
        match self {
            DataSource::Snapshot(s) => {
                let source = s.clone();
                let name = collection.to_string();
                let body = fields_to_json(fields);
                tokio::task::spawn_blocking(move || source.insert_document(&name, body)).await?
            }
            DataSource::Firestore(f) => f.create_document(collection, fields).await,
        }
    }

    /// Overwrite the given fields of an existing document.
    pub async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: &[(&str, FieldValue)],
    ) -> Result<(), StoreError> {
        match self {
            DataSource::Snapshot(s) => {
                let source = s.clone();
                let name = collection.to_string();
                let id = id.to_string();
                let body = fields_to_json(fields);
                tokio::task::spawn_blocking(move || source.update_document(&name, &id, body))
                    .await?
            }
            DataSource::Firestore(f) => f.patch_document(collection, id, fields).await,
        }
    }
}

/// Typed access to the three collections.
#[derive(Debug, Clone)]
pub struct Store {
    source: DataSource,
}

impl Store {
    pub fn new(source: DataSource) -> Self {
        Self { source }
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    pub async fn fetch_all_users(&self) -> Result<Vec<User>, StoreError> {
        let docs = self.source.fetch_collection(USERS).await?;
        Ok(decode_records(docs, USERS))
    }

    pub async fn fetch_all_stacks(&self) -> Result<Vec<Stack>, StoreError> {
        let docs = self.source.fetch_collection(STACKS).await?;
        Ok(decode_records(docs, STACKS))
    }

    pub async fn fetch_all_issues(&self) -> Result<Vec<Issue>, StoreError> {
        let docs = self.source.fetch_collection(ISSUES).await?;
        Ok(decode_records(docs, ISSUES))
    }

    /// The profile of one user, if it exists.
    pub async fn fetch_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        let doc = self.source.fetch_document(USERS, uid).await?;
        Ok(doc.and_then(|d| decode_records(vec![d], USERS).pop()))
    }

    /// Stacks owned by one user.
    pub async fn fetch_users_stacks(&self, uid: &str) -> Result<Vec<Stack>, StoreError> {
        let docs = self.source.fetch_where_equal(STACKS, "ownerUid", uid).await?;
        Ok(decode_records(docs, STACKS))
    }

    /// Save a newly reported issue and return it with its assigned id.
    pub async fn create_issue(&self, issue: &Issue) -> Result<Issue, StoreError> {
        let mut fields = vec![
            ("title", FieldValue::Text(issue.title.clone())),
            ("description", FieldValue::Text(issue.description.clone())),
            ("version", FieldValue::Text(issue.version.clone())),
            ("severity", FieldValue::Text(issue.severity.as_str().to_string())),
            ("status", FieldValue::Text(issue.status.as_str().to_string())),
        ];
        if let Some(created_at) = issue.created_at {
            fields.push(("createdAt", FieldValue::Time(created_at)));
        }

        let id = self.source.insert_document(ISSUES, &fields).await?;
        info!("Created issue {}", id);

        Ok(Issue {
            id,
            ..issue.clone()
        })
    }

    /// Move an issue to `next`, enforcing the status lifecycle.
    pub async fn update_issue_status(
        &self,
        id: &str,
        next: IssueStatus,
        now: DateTime<Utc>,
    ) -> Result<Issue, StoreError> {
        let not_found = || StoreError::NotFound {
            collection: ISSUES.to_string(),
            id: id.to_string(),
        };

        let doc = self.source.fetch_document(ISSUES, id).await?.ok_or_else(not_found)?;
        let mut issue: Issue = decode_records(vec![doc], ISSUES)
            .pop()
            .ok_or_else(|| StoreError::InvalidSource(format!("issue {} cannot be decoded", id)))?;

        issue.transition(next, now)?;

        let fields = [
            ("status", FieldValue::Text(next.as_str().to_string())),
            ("updatedAt", FieldValue::Time(now)),
        ];
        self.source.update_document(ISSUES, id, &fields).await?;
        info!("Issue {} moved to {}", id, next);

        Ok(issue)
    }
}

/// Coerce raw documents into records, skipping the ones that don't fit.
pub fn decode_records<T: DeserializeOwned>(docs: Vec<Value>, collection: &str) -> Vec<T> {
    let total = docs.len();
    let records: Vec<T> = docs
        .into_iter()
        .filter_map(|doc| {
            let id = doc["id"].as_str().unwrap_or("<no id>").to_string();
            match serde_json::from_value(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping {} document {}: {}", collection, id, e);
                    None
                }
            }
        })
        .collect();

    debug!("Decoded {}/{} {} documents", records.len(), total, collection);
    records
}

/// Attach the document id to a document body unless it already has one.
pub(crate) fn with_id(mut doc: Value, id: &str) -> Value {
    if let Value::Object(ref mut map) = doc {
        map.entry("id")
            .or_insert_with(|| Value::String(id.to_string()));
    }
    doc
}
