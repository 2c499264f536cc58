//! Firestore REST client.
//!
//! Reads cover what the dashboards need: list a collection, get one
//! document, and an equality query. Typed Firestore values are flattened
//! to plain JSON so that record coercion works the same as for snapshots.
//! Writes create a document or patch named fields of an existing one.

use super::{with_id, FieldValue, StoreError};
use chrono::SecondsFormat;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the Firestore REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    /// API root, e.g. `https://firestore.googleapis.com/v1` or an emulator.
    pub endpoint: String,
    pub project_id: String,
    pub database: String,
    pub api_key: Option<String>,
    /// Firebase ID token sent as a bearer token when set.
    pub id_token: Option<String>,
    pub timeout_seconds: u64,
    pub page_size: usize,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://firestore.googleapis.com/v1".to_string(),
            project_id: String::new(),
            database: "(default)".to_string(),
            api_key: None,
            id_token: None,
            timeout_seconds: 30,
            page_size: 300,
        }
    }
}

/// A Firestore document as returned by the REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    document: Option<Document>,
}

/// Firestore client.
#[derive(Debug, Clone)]
pub struct FirestoreSource {
    config: FirestoreConfig,
    http_client: reqwest::Client,
}

impl FirestoreSource {
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        if config.project_id.trim().is_empty() {
            return Err(StoreError::InvalidSource(
                "Firestore project id is empty".to_string(),
            ));
        }

        info!(
            "Using Firestore project {} (database {})",
            config.project_id, config.database
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project_id,
            self.config.database
        )
    }

    /// Every document in a collection, following pagination.
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let url = format!("{}/{}", self.documents_url(), collection);
        let page_size = self.config.page_size.to_string();
        let mut docs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("pageSize", page_size.as_str())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = self.send(request).await?;
            let page: ListDocumentsResponse = response.json().await?;
            debug!("Fetched {} {} documents", page.documents.len(), collection);

            docs.extend(page.documents.into_iter().map(decode_document));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(docs)
    }

    /// A single document, or `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let url = format!("{}/{}/{}", self.documents_url(), collection, id);

        match self.send(self.http_client.get(&url)).await {
            Ok(response) => {
                let document: Document = response.json().await?;
                Ok(Some(decode_document(document)))
            }
            Err(StoreError::Status { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Documents whose `field` equals `value`.
    pub async fn run_equal_query(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let url = format!("{}:runQuery", self.documents_url());
        let body = equal_query(collection, field, value);

        let response = self.send(self.http_client.post(&url).json(&body)).await?;
        let results: Vec<RunQueryResponse> = response.json().await?;

        Ok(results
            .into_iter()
            .filter_map(|r| r.document)
            .map(decode_document)
            .collect())
    }

    /// Create a document with a generated id and return that id.
    pub async fn create_document(
        &self,
        collection: &str,
        fields: &[(&str, FieldValue)],
    ) -> Result<String, StoreError> {
        let url = format!("{}/{}", self.documents_url(), collection);
        let body = document_body(fields);

        let response = self.send(self.http_client.post(&url).json(&body)).await?;
        let document: Document = response.json().await?;
        let id = document_id(&document.name);
        debug!("Created {}/{}", collection, id);

        Ok(id)
    }

    /// Overwrite the given fields of an existing document.
    pub async fn patch_document(
        &self,
        collection: &str,
        id: &str,
        fields: &[(&str, FieldValue)],
    ) -> Result<(), StoreError> {
        let url = format!("{}/{}/{}", self.documents_url(), collection, id);
        let mut query: Vec<(&str, &str)> = fields
            .iter()
            .map(|(name, _)| ("updateMask.fieldPaths", *name))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let request = self
            .http_client
            .patch(&url)
            .query(&query)
            .json(&document_body(fields));

        match self.send(request).await {
            Ok(_) => {
                debug!("Patched {}/{}", collection, id);
                Ok(())
            }
            Err(StoreError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn send(&self, mut request: RequestBuilder) -> Result<Response, StoreError> {
        if let Some(ref key) = self.config.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        if let Some(ref token) = self.config.id_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.config.timeout_seconds)
            } else {
                StoreError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        Ok(response)
    }
}

/// Structured query body for `field == value`.
fn equal_query(collection: &str, field: &str, value: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": { "stringValue": value }
                }
            }
        }
    })
}

/// Request body carrying typed fields.
fn document_body(fields: &[(&str, FieldValue)]) -> Value {
    let fields: Map<String, Value> = fields
        .iter()
        .map(|(name, value)| (name.to_string(), encode_value(value)))
        .collect();
    json!({ "fields": fields })
}

fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => json!({ "stringValue": text }),
        FieldValue::Time(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Millis, true) })
        }
    }
}

fn document_id(name: &str) -> String {
    name.rsplit('/').next().unwrap_or("").to_string()
}

/// Flatten a document into a plain JSON object with an `id`.
fn decode_document(document: Document) -> Value {
    let id = document_id(&document.name);
    let fields: Map<String, Value> = document
        .fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect();

    with_id(Value::Object(fields), &id)
}

/// Convert one typed Firestore value to plain JSON.
///
/// Timestamps stay RFC 3339 strings; integers (sent as strings) become
/// numbers. Unknown shapes become `null`.
fn decode_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = map.iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or(false)),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map(Value::from)
            .unwrap_or(Value::Null),
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "arrayValue" => Value::Array(
            inner["values"]
                .as_array()
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner["fields"]
                .as_object()
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), decode_value(v)))
                        .collect()
                })
                .unwrap_or_default(),
        ),
        "geoPointValue" => inner.clone(),
        _ => Value::Null,
    }
}
