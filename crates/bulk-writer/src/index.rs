//! Collection lifecycle.
//!
//! The registry remembers which collections have been verified or created.
//! Each collection gets its own once-cell, so the first writer to see a name
//! performs the exists/create round trip while any concurrent writer for the
//! same name waits on that cell instead of issuing its own. Writers that
//! should share "create exactly once" semantics share one registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use doc_store::{CreateAck, DocumentStore};
use tokio::sync::OnceCell;

use crate::error::WriterError;

#[derive(Debug, Default)]
pub struct IndexRegistry {
    cells: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, collection: &str) -> Arc<OnceCell<()>> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(collection.to_string()).or_default())
    }

    /// Whether the collection has already been verified.
    pub fn contains(&self, collection: &str) -> bool {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .is_some_and(|cell| cell.initialized())
    }

    /// Verified collection names, sorted.
    pub fn collections(&self) -> Vec<String> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = cells
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Make sure `collection` exists in `store`, creating it if needed.
    ///
    /// Only the first successful call per collection talks to the store. A
    /// failed attempt is not remembered, so a later call tries again.
    pub async fn ensure_index<S>(&self, store: &S, collection: &str) -> Result<(), WriterError>
    where
        S: DocumentStore + ?Sized,
    {
        let cell = self.cell(collection);
        if cell.initialized() {
            return Ok(());
        }

        cell.get_or_try_init(|| create_if_missing(store, collection))
            .await
            .map(|_| ())
            .map_err(|source| {
                tracing::error!(
                    "Collection {collection} did not exist and could not be created: {source:#}"
                );
                WriterError::IndexCreation {
                    collection: collection.to_string(),
                    source,
                }
            })
    }
}

async fn create_if_missing<S>(store: &S, collection: &str) -> anyhow::Result<()>
where
    S: DocumentStore + ?Sized,
{
    if store.exists(collection).await? {
        tracing::debug!("Collection {collection} already exists");
        return Ok(());
    }

    match store.create(collection).await? {
        CreateAck::Created => {
            tracing::info!("Collection created: {collection}");
            Ok(())
        }
        CreateAck::AlreadyExists => {
            tracing::debug!("Collection {collection} was created concurrently");
            Ok(())
        }
        CreateAck::NotAcknowledged => Err(anyhow!(
            "store did not acknowledge creation of collection {collection}"
        )),
    }
}
