//! Implementation of DocumentStore for SurrealDB.

use std::fmt::Write as _;

use anyhow::{bail, Result};
use doc_store::{CreateAck, DocumentStore, ItemOutcome, WriteRequest};
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;

/// Wrapper around `Surreal<Any>` that implements `DocumentStore`.
///
/// SurrealDB makes writes visible immediately, so the refresh knobs are
/// accepted and logged without touching the server.
pub struct SurrealStore {
    client: Surreal<Any>,
}

impl SurrealStore {
    pub fn new(client: Surreal<Any>) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Surreal<Any> {
        &self.client
    }

    /// Number of records currently stored in a table.
    pub async fn count_records(&self, table: &str) -> Result<usize> {
        let mut response = self
            .client
            .query("SELECT count() FROM type::table($tb) GROUP ALL")
            .bind(("tb", table.to_string()))
            .await?;
        let count: Option<i64> = response.take((0, "count"))?;
        Ok(count.unwrap_or(0) as usize)
    }
}

/// Table names end up inside a `DEFINE TABLE` statement, which cannot take
/// parameters.
fn check_table_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("'{name}' is not a valid SurrealDB table name");
    }
    Ok(())
}

/// Parse a request payload into the object bound as record content.
///
/// An `id` field in the body would clash with the record id chosen by the
/// request, so it is dropped when the request carries one.
fn record_content(request: &WriteRequest) -> Result<Value, String> {
    let mut value = request
        .payload_json()
        .map_err(|e| format!("payload is not valid JSON: {e}"))?;
    match value.as_object_mut() {
        Some(object) => {
            if request.id().is_some() {
                object.remove("id");
            }
        }
        None => return Err("payload is not a JSON object".to_string()),
    }
    Ok(value)
}

#[async_trait::async_trait]
impl DocumentStore for SurrealStore {
    async fn exists(&self, collection: &str) -> Result<bool> {
        let mut response = self.client.query("INFO FOR DB;").await?;
        let info: Option<Value> = response.take(0)?;

        Ok(info
            .as_ref()
            .and_then(|info| info.get("tables"))
            .and_then(Value::as_object)
            .is_some_and(|tables| tables.contains_key(collection)))
    }

    async fn create(&self, collection: &str) -> Result<CreateAck> {
        check_table_name(collection)?;
        let response = self
            .client
            .query(format!("DEFINE TABLE {collection} SCHEMALESS;"))
            .await?;

        match response.check() {
            Ok(_) => {
                tracing::info!("Table created: {collection}");
                Ok(CreateAck::Created)
            }
            Err(e) if e.to_string().contains("already exists") => {
                tracing::debug!("Table {collection} was created concurrently");
                Ok(CreateAck::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn bulk_submit(&self, requests: &[WriteRequest]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = vec![ItemOutcome::Ok; requests.len()];
        let mut sql = String::new();
        // statement index -> request index
        let mut statements = Vec::with_capacity(requests.len());
        let mut bindings = Vec::with_capacity(requests.len() * 3);

        for (i, request) in requests.iter().enumerate() {
            let content = match record_content(request) {
                Ok(content) => content,
                Err(reason) => {
                    outcomes[i] = ItemOutcome::Failed { reason };
                    continue;
                }
            };

            bindings.push((format!("tb{i}"), Value::from(request.collection())));
            bindings.push((format!("c{i}"), content));
            match request.id() {
                Some(id) => {
                    bindings.push((format!("id{i}"), Value::from(id)));
                    let _ = writeln!(sql, "UPSERT type::thing($tb{i}, $id{i}) CONTENT $c{i};");
                }
                None => {
                    let _ = writeln!(sql, "CREATE type::table($tb{i}) CONTENT $c{i};");
                }
            }
            statements.push(i);
        }

        if statements.is_empty() {
            return Ok(outcomes);
        }

        tracing::trace!("Submitting {} statements to SurrealDB", statements.len());

        let mut query = self.client.query(sql);
        for binding in bindings {
            query = query.bind(binding);
        }
        let mut response = query.await?;

        for (statement, error) in response.take_errors() {
            if let Some(&i) = statements.get(statement) {
                tracing::debug!(
                    "Write to {} (id {:?}) failed: {}",
                    requests[i].collection(),
                    requests[i].id(),
                    error
                );
                outcomes[i] = ItemOutcome::failed(error.to_string());
            }
        }

        Ok(outcomes)
    }

    async fn update_setting(&self, collection: &str, key: &str, value: &str) -> Result<()> {
        tracing::debug!(
            "SurrealDB has no per-table {key}; ignoring {key}={value} for {collection}"
        );
        Ok(())
    }

    async fn refresh(&self, collection: &str) -> Result<()> {
        tracing::debug!("SurrealDB writes are immediately visible; nothing to refresh for {collection}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_check_table_name() {
        assert!(check_table_name("tweets").is_ok());
        assert!(check_table_name("user_posts2").is_ok());
        assert!(check_table_name("").is_err());
        assert!(check_table_name("a; REMOVE TABLE b").is_err());
        assert!(check_table_name("dash-name").is_err());
    }

    #[test]
    fn test_record_content_strips_id_when_request_has_one() {
        let request = WriteRequest::new("t", "doc", Utc::now(), r#"{"id":"x","name":"n"}"#)
            .with_id(Some("x".to_string()));
        let content = record_content(&request).unwrap();
        assert!(content.get("id").is_none());
        assert_eq!(content["name"], "n");
    }

    #[test]
    fn test_record_content_keeps_id_without_request_id() {
        let request = WriteRequest::new("t", "doc", Utc::now(), r#"{"id":"x"}"#);
        let content = record_content(&request).unwrap();
        assert_eq!(content["id"], "x");
    }

    #[test]
    fn test_record_content_rejects_non_objects() {
        let array = WriteRequest::new("t", "doc", Utc::now(), "[1,2]");
        assert!(record_content(&array).is_err());
        let garbage = WriteRequest::new("t", "doc", Utc::now(), "{not json");
        assert!(record_content(&garbage).is_err());
    }
}
