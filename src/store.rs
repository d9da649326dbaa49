//! Target cluster document store
//!
//! [`ClusterStore`] is the substrate the reconciliation algorithm queries
//! against: find all, find by identifier, insert one. The store enforces
//! identifier uniqueness and rejects a second insert with the same identifier;
//! that rejection surfaces as [`Error::DuplicateId`] and drives the collision
//! branch of the reconciler.
//!
//! [`MongoClusterStore`] is the real store. [`MemoryClusterStore`] backs the
//! reconciler's tests and the `--dry-run` mode, where reconciliation runs
//! against an in-memory copy of the live snapshot and writes nothing.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::debug;

use crate::model::ClusterDocument;
use crate::{Error, Result, CLUSTER_COLLECTION, CLUSTER_DATABASE, REQUEST_TIMEOUT_SECS};

/// Read/insert surface of the target cluster collection
///
/// An explicit dependency of the reconciler rather than an ambient handle, so
/// the algorithm can run against an in-memory store with no real database.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// All cluster documents currently in the store
    async fn list_all(&self) -> Result<Vec<ClusterDocument>>;

    /// Cluster document with the given identifier, if any
    async fn find_by_id(&self, cluster_id: &str) -> Result<Option<ClusterDocument>>;

    /// Insert one document; [`Error::DuplicateId`] when the identifier exists
    async fn insert(&self, doc: &ClusterDocument) -> Result<()>;
}

/// Cluster store backed by the MongoDB cluster collection
pub struct MongoClusterStore {
    collection: Collection<ClusterDocument>,
}

impl MongoClusterStore {
    /// Connect to the document store
    pub async fn connect(uri: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.connect_timeout = Some(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        options.server_selection_timeout = Some(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        let client = Client::with_options(options)?;
        let collection = client
            .database(CLUSTER_DATABASE)
            .collection::<ClusterDocument>(CLUSTER_COLLECTION);
        Ok(Self { collection })
    }

    /// Ensure the unique index on the cluster identifier exists
    ///
    /// The platform's own deployment creates this index; creating it here too
    /// means a fresh target store still rejects duplicate identifiers.
    pub async fn ensure_unique_index(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "clusterID": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await?;
        debug!("unique clusterID index ensured");
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for MongoClusterStore {
    async fn list_all(&self) -> Result<Vec<ClusterDocument>> {
        let cursor = self.collection.find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_id(&self, cluster_id: &str) -> Result<Option<ClusterDocument>> {
        Ok(self
            .collection
            .find_one(doc! { "clusterID": cluster_id })
            .await?)
    }

    async fn insert(&self, doc: &ClusterDocument) -> Result<()> {
        match self.collection.insert_one(doc).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(Error::DuplicateId(doc.cluster_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// True when the driver error is the unique-index rejection (E11000)
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

/// In-memory cluster store with the same uniqueness behavior as the real one
#[derive(Default)]
pub struct MemoryClusterStore {
    docs: Mutex<Vec<ClusterDocument>>,
}

impl MemoryClusterStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with existing documents (a live snapshot in dry-run)
    pub fn seeded(docs: Vec<ClusterDocument>) -> Self {
        Self {
            docs: Mutex::new(docs),
        }
    }

    /// Number of documents currently held
    pub fn len(&self) -> usize {
        self.docs.lock().expect("store poisoned").len()
    }

    /// True when the store holds no documents
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn list_all(&self) -> Result<Vec<ClusterDocument>> {
        Ok(self.docs.lock().expect("store poisoned").clone())
    }

    async fn find_by_id(&self, cluster_id: &str) -> Result<Option<ClusterDocument>> {
        Ok(self
            .docs
            .lock()
            .expect("store poisoned")
            .iter()
            .find(|d| d.cluster_id == cluster_id)
            .cloned())
    }

    async fn insert(&self, doc: &ClusterDocument) -> Result<()> {
        let mut docs = self.docs.lock().expect("store poisoned");
        if docs.iter().any(|d| d.cluster_id == doc.cluster_id) {
            return Err(Error::DuplicateId(doc.cluster_id.clone()));
        }
        docs.push(doc.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> ClusterDocument {
        ClusterDocument {
            cluster_id: id.to_string(),
            cluster_name: format!("cluster-{id}"),
            provider: "bluekingCloud".to_string(),
            region: "default".to_string(),
            project_id: "p1".to_string(),
            business_id: "1".to_string(),
            environment: "prod".to_string(),
            engine_type: "k8s".to_string(),
            cluster_type: "single".to_string(),
            creator: "admin".to_string(),
            manage_type: "INDEPENDENT_CLUSTER".to_string(),
            status: "RUNNING".to_string(),
            network_type: "overlay".to_string(),
            description: String::new(),
            create_time: "2021-01-01T00:00:00Z".to_string(),
            update_time: "2021-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_identifiers() {
        let store = MemoryClusterStore::new();
        store.insert(&doc("BCS-K8S-1")).await.unwrap();

        let err = store.insert(&doc("BCS-K8S-1")).await.unwrap_err();
        assert!(err.is_duplicate_id());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn memory_store_finds_by_identifier() {
        let store = MemoryClusterStore::seeded(vec![doc("BCS-K8S-1"), doc("BCS-K8S-2")]);
        let found = store.find_by_id("BCS-K8S-2").await.unwrap();
        assert_eq!(found.unwrap().cluster_name, "cluster-BCS-K8S-2");
        assert!(store.find_by_id("BCS-K8S-9").await.unwrap().is_none());
    }
}
