//! Datum intake and enrichment.
//!
//! Turns an upstream record into a [`WriteRequest`]: resolves where the
//! document goes from its metadata (falling back to configuration), folds
//! the metadata into the body, and serializes the body to canonical JSON.

use chrono::{DateTime, Utc};
use doc_store::WriteRequest;
use serde_json::{Map, Value};

use crate::config::WriterConfig;

/// Key under which a datum's metadata is merged into its document.
pub const METADATA_KEY: &str = "_metadata";

const INDEX_KEY: &str = "index";
const TYPE_KEY: &str = "type";
const ID_KEY: &str = "id";
const PARENT_KEY: &str = "parent";
const ROUTING_KEY: &str = "routing";
const ADDITIONAL_PROPERTIES_KEY: &str = "additionalProperties";

/// Document payload of a datum.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// An already-parsed JSON value.
    Json(Value),
    /// Raw JSON text, parsed during enrichment.
    Text(String),
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Document {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One input record: a payload plus the metadata describing where it goes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datum {
    pub document: Option<Document>,
    pub metadata: Map<String, Value>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Datum {
    pub fn new(document: impl Into<Document>) -> Self {
        Self {
            document: Some(document.into()),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Why a datum was dropped during enrichment.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("datum has no document")]
    MissingDocument,

    #[error("document is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("document is not a JSON object, cannot attach metadata")]
    NotAnObject,

    #[error("failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Builds write requests from datums according to the writer configuration.
#[derive(Debug, Clone)]
pub struct Enricher {
    index: String,
    doc_type: String,
    exclude_fields: Vec<String>,
    hoist_additional_properties: bool,
}

impl Enricher {
    pub fn new(config: &WriterConfig) -> Self {
        Self {
            index: config.index.clone(),
            doc_type: config.doc_type.clone(),
            exclude_fields: config.exclude_fields.clone(),
            hoist_additional_properties: config.hoist_additional_properties,
        }
    }

    /// Resolve, enrich and serialize a datum.
    pub fn enrich(&self, datum: Datum) -> Result<WriteRequest, EnrichError> {
        let Datum {
            document,
            metadata,
            timestamp,
        } = datum;

        let mut body = match document {
            None | Some(Document::Json(Value::Null)) => return Err(EnrichError::MissingDocument),
            Some(Document::Json(value)) => value,
            Some(Document::Text(text)) => {
                serde_json::from_str(&text).map_err(EnrichError::InvalidJson)?
            }
        };
        if body.is_null() {
            return Err(EnrichError::MissingDocument);
        }

        if self.hoist_additional_properties {
            hoist_additional_properties(&mut body);
        }

        if let Some(object) = body.as_object_mut() {
            for field in &self.exclude_fields {
                object.remove(field);
            }
        }

        let collection = metadata_string(&metadata, INDEX_KEY).unwrap_or_else(|| self.index.clone());
        let doc_type = metadata_string(&metadata, TYPE_KEY).unwrap_or_else(|| self.doc_type.clone());
        let id = metadata_string(&metadata, ID_KEY);
        let parent = metadata_string(&metadata, PARENT_KEY);
        let routing = metadata_string(&metadata, ROUTING_KEY);

        if !metadata.is_empty() {
            body.as_object_mut()
                .ok_or(EnrichError::NotAnObject)?
                .insert(METADATA_KEY.to_string(), Value::Object(metadata));
        }

        let payload = serde_json::to_vec(&body).map_err(EnrichError::Serialize)?;

        Ok(
            WriteRequest::new(collection, doc_type, timestamp.unwrap_or_else(Utc::now), payload)
                .with_id(id)
                .with_parent(parent)
                .with_routing(routing),
        )
    }
}

/// Read a metadata entry as a string. Scalars other than strings are
/// rendered as JSON text; nulls, arrays and objects are ignored.
fn metadata_string(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        value @ (Value::Number(_) | Value::Bool(_)) => Some(value.to_string()),
        _ => None,
    }
}

/// Merge `additionalProperties` objects into the object that holds them.
///
/// Some producers nest unknown fields under `additionalProperties` instead
/// of at the top level. Nested
/// `additionalProperties` are merged first, and merged keys overwrite
/// existing ones.
pub fn hoist_additional_properties(value: &mut Value) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    let Some(mut extra) = object.remove(ADDITIONAL_PROPERTIES_KEY) else {
        return;
    };

    hoist_additional_properties(&mut extra);
    match extra {
        Value::Object(fields) => object.extend(fields),
        other => {
            object.insert(ADDITIONAL_PROPERTIES_KEY.to_string(), other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn enricher() -> Enricher {
        Enricher::new(&WriterConfig {
            index: "default_index".to_string(),
            doc_type: "default_type".to_string(),
            ..Default::default()
        })
    }

    fn body(request: &WriteRequest) -> Value {
        request.payload_json().unwrap()
    }

    #[test]
    fn test_defaults_apply_without_metadata() {
        let request = enricher().enrich(Datum::new(json!({"text": "hi"}))).unwrap();

        assert_eq!(request.collection(), "default_index");
        assert_eq!(request.doc_type(), "default_type");
        assert_eq!(request.id(), None);
        assert_eq!(body(&request), json!({"text": "hi"}));
    }

    #[test]
    fn test_metadata_overrides_and_is_merged() {
        let datum = Datum::new(json!({"text": "hi"}))
            .with_metadata("index", "tweets")
            .with_metadata("type", "tweet")
            .with_metadata("id", 42)
            .with_metadata("parent", "p1")
            .with_metadata("routing", "r1");

        let request = enricher().enrich(datum).unwrap();

        assert_eq!(request.collection(), "tweets");
        assert_eq!(request.doc_type(), "tweet");
        assert_eq!(request.id(), Some("42"));
        assert_eq!(request.parent(), Some("p1"));
        assert_eq!(request.routing(), Some("r1"));
        assert_eq!(body(&request)["_metadata"]["index"], "tweets");
        assert_eq!(body(&request)["text"], "hi");
    }

    #[test]
    fn test_payload_len_is_serialized_length() {
        let request = enricher().enrich(Datum::new(json!({"a": 1}))).unwrap();
        assert_eq!(request.payload(), br#"{"a":1}"#);
        assert_eq!(request.payload_len(), 7);
    }

    #[test]
    fn test_text_documents_are_parsed() {
        let request = enricher()
            .enrich(Datum::new(r#"{"from":"text"}"#).with_metadata("id", "x"))
            .unwrap();
        assert_eq!(body(&request)["from"], "text");
        assert_eq!(body(&request)["_metadata"]["id"], "x");
    }

    #[test]
    fn test_missing_and_null_documents_are_rejected() {
        assert!(matches!(
            enricher().enrich(Datum::default()),
            Err(EnrichError::MissingDocument)
        ));
        assert!(matches!(
            enricher().enrich(Datum::new(Value::Null)),
            Err(EnrichError::MissingDocument)
        ));
        assert!(matches!(
            enricher().enrich(Datum::new("null")),
            Err(EnrichError::MissingDocument)
        ));
    }

    #[test]
    fn test_invalid_text_is_rejected() {
        assert!(matches!(
            enricher().enrich(Datum::new("{broken")),
            Err(EnrichError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_metadata_on_non_object_is_rejected() {
        let datum = Datum::new(json!([1, 2, 3])).with_metadata("id", "x");
        assert!(matches!(
            enricher().enrich(datum),
            Err(EnrichError::NotAnObject)
        ));

        // Without metadata there is nothing to attach.
        assert!(enricher().enrich(Datum::new(json!([1, 2, 3]))).is_ok());
    }

    #[test]
    fn test_timestamp_is_kept() {
        let ts = Utc.with_ymd_and_hms(2013, 10, 20, 12, 0, 0).unwrap();
        let request = enricher()
            .enrich(Datum::new(json!({})).with_timestamp(ts))
            .unwrap();
        assert_eq!(request.timestamp(), ts);
    }

    #[test]
    fn test_non_string_metadata_values() {
        let datum = Datum::new(json!({}))
            .with_metadata("index", Value::Null)
            .with_metadata("id", true)
            .with_metadata("routing", json!({"nested": 1}));
        let request = enricher().enrich(datum).unwrap();

        assert_eq!(request.collection(), "default_index");
        assert_eq!(request.id(), Some("true"));
        assert_eq!(request.routing(), None);
    }

    #[test]
    fn test_exclude_fields() {
        let enricher = Enricher::new(&WriterConfig {
            exclude_fields: vec!["password".to_string()],
            ..Default::default()
        });
        let request = enricher
            .enrich(Datum::new(json!({"user": "u", "password": "p"})))
            .unwrap();
        assert_eq!(body(&request), json!({"user": "u"}));
    }

    #[test]
    fn test_hoist_additional_properties() {
        let mut value = json!({
            "id": 1,
            "additionalProperties": {
                "lang": "en",
                "additionalProperties": {"geo": "nz"}
            }
        });
        hoist_additional_properties(&mut value);
        assert_eq!(value, json!({"id": 1, "lang": "en", "geo": "nz"}));
    }

    #[test]
    fn test_hoist_keeps_non_object_additional_properties() {
        let mut value = json!({"additionalProperties": 5});
        hoist_additional_properties(&mut value);
        assert_eq!(value, json!({"additionalProperties": 5}));
    }

    #[test]
    fn test_enricher_hoists_when_configured() {
        let enricher = Enricher::new(&WriterConfig {
            hoist_additional_properties: true,
            ..Default::default()
        });
        let request = enricher
            .enrich(Datum::new(json!({"additionalProperties": {"x": 1}})))
            .unwrap();
        assert_eq!(body(&request), json!({"x": 1}));
    }
}
