//! Local snapshot of the document store.
//!
//! A snapshot directory holds, per collection, either `<collection>.json`
//! (an array of documents, or an object keyed by document id) or a
//! `<collection>/` directory with one `<id>.json` file per document. Both
//! forms may coexist; their documents are concatenated.
//!
//! New documents are written as `<collection>/<id>.json`. Updates are
//! applied in place, in whichever file holds the document.

use super::{with_id, StoreError};
use chrono::Utc;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Snapshot directory reader.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    root: PathBuf,
}

impl SnapshotSource {
    /// Open a snapshot directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();

        if !root.is_dir() {
            return Err(StoreError::InvalidSource(format!(
                "snapshot directory not found: {}",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every document of a collection.
    pub fn load_collection(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        check_name(collection)?;

        let file = self.root.join(format!("{}.json", collection));
        let dir = self.root.join(collection);
        let mut docs = Vec::new();

        if file.is_file() {
            docs.extend(read_collection_file(&file)?);
        }
        if dir.is_dir() {
            docs.extend(read_collection_dir(&dir)?);
        }

        if docs.is_empty() {
            debug!("Collection {} is empty or missing in {}", collection, self.root.display());
        } else {
            debug!("Loaded {} {} documents from snapshot", docs.len(), collection);
        }

        Ok(docs)
    }
}

impl SnapshotSource {
    /// Store a new document and return its generated id.
    pub fn insert_document(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, StoreError> {
        check_name(collection)?;

        let dir = self.root.join(collection);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let existing = self.load_collection(collection)?;
        let base = format!("{:x}", Utc::now().timestamp_micros());
        let mut id = base.clone();
        let mut suffix = 1;
        while dir.join(format!("{}.json", id)).exists()
            || existing.iter().any(|doc| doc["id"] == id.as_str())
        {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        write_json(&dir.join(format!("{}.json", id)), &Value::Object(fields))?;
        debug!("Inserted {}/{} into snapshot", collection, id);
        Ok(id)
    }

    /// Merge `fields` into an existing document.
    pub fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        check_name(collection)?;
        check_name(id)?;

        let doc_path = self.root.join(collection).join(format!("{}.json", id));
        if doc_path.is_file() {
            let mut doc = read_json(&doc_path)?;
            merge_fields(&mut doc, fields);
            return write_json(&doc_path, &doc);
        }

        let file = self.root.join(format!("{}.json", collection));
        if file.is_file() {
            let mut content = read_json(&file)?;
            let target = match content {
                Value::Array(ref mut items) => items.iter_mut().find(|doc| doc["id"] == id),
                Value::Object(ref mut map) => map.get_mut(id),
                _ => None,
            };
            if let Some(doc) = target {
                merge_fields(doc, fields);
                return write_json(&file, &content);
            }
        }

        Err(StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }
}

fn check_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(StoreError::InvalidSource(format!("invalid name: {}", name)));
    }
    Ok(())
}

fn merge_fields(doc: &mut Value, fields: Map<String, Value>) {
    if let Value::Object(map) = doc {
        map.extend(fields);
    }
}

fn write_json(path: &Path, value: &Value) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        origin: path.display().to_string(),
        source,
    })?;

    fs::write(path, content).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json(path: &Path) -> Result<Value, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        origin: path.display().to_string(),
        source,
    })
}

fn read_collection_file(path: &Path) -> Result<Vec<Value>, StoreError> {
    match read_json(path)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter(|item| {
                let is_doc = item.is_object();
                if !is_doc {
                    warn!("Ignoring non-object entry in {}", path.display());
                }
                is_doc
            })
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(_, doc)| doc.is_object())
            .map(|(id, doc)| with_id(doc, &id))
            .collect()),
        _ => Err(StoreError::InvalidSource(format!(
            "{} must contain an array or an object of documents",
            path.display()
        ))),
    }
}

fn read_collection_dir(dir: &Path) -> Result<Vec<Value>, StoreError> {
    let mut docs = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();

        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let doc = read_json(path)?;
        if doc.is_object() {
            docs.push(with_id(doc, id));
        } else {
            warn!("Ignoring non-object document {}", path.display());
        }
    }

    Ok(docs)
}
