//! Types exchanged with a [`crate::DocumentStore`].

use chrono::{DateTime, Utc};

/// A single index operation bound for a collection.
///
/// Built once at intake and never mutated afterwards; all fields are read
/// through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    collection: String,
    doc_type: String,
    id: Option<String>,
    parent: Option<String>,
    routing: Option<String>,
    timestamp: DateTime<Utc>,
    payload: Vec<u8>,
}

impl WriteRequest {
    /// Create a request with no id, parent or routing key.
    pub fn new(
        collection: impl Into<String>,
        doc_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_type: doc_type.into(),
            id: None,
            parent: None,
            routing: None,
            timestamp,
            payload: payload.into(),
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_routing(mut self, routing: Option<String>) -> Self {
        self.routing = routing;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn routing(&self) -> Option<&str> {
        self.routing.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialized document body (canonical JSON text).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the payload in bytes, the unit batch byte limits are counted in.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Parse the payload back into a JSON value.
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

/// Per-item result reported by a bulk submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Ok,
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Acknowledgment of a collection creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateAck {
    /// The collection was created by this call.
    Created,
    /// Somebody else created it between the exists check and this call.
    AlreadyExists,
    /// The store answered but refused to acknowledge the creation.
    NotAcknowledged,
}

impl CreateAck {
    /// Whether the collection can be written to after this acknowledgment.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Created | Self::AlreadyExists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_len_matches_bytes() {
        let req = WriteRequest::new("tweets", "activity", Utc::now(), r#"{"a":1}"#);
        assert_eq!(req.payload_len(), 7);
        assert_eq!(req.payload(), br#"{"a":1}"#);
    }

    #[test]
    fn test_builder_sets_optional_fields() {
        let req = WriteRequest::new("tweets", "activity", Utc::now(), "{}")
            .with_id(Some("42".to_string()))
            .with_parent(Some("7".to_string()))
            .with_routing(None);

        assert_eq!(req.id(), Some("42"));
        assert_eq!(req.parent(), Some("7"));
        assert_eq!(req.routing(), None);
        assert_eq!(req.collection(), "tweets");
        assert_eq!(req.doc_type(), "activity");
    }

    #[test]
    fn test_payload_json() {
        let req = WriteRequest::new("t", "d", Utc::now(), r#"{"name":"x"}"#);
        let value = req.payload_json().unwrap();
        assert_eq!(value["name"], "x");
    }

    #[test]
    fn test_outcome_and_ack_helpers() {
        assert!(ItemOutcome::Ok.is_ok());
        assert!(!ItemOutcome::failed("mapping conflict").is_ok());
        assert!(CreateAck::Created.is_usable());
        assert!(CreateAck::AlreadyExists.is_usable());
        assert!(!CreateAck::NotAcknowledged.is_usable());
    }
}
