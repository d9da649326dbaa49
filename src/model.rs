//! Data model: legacy relational rows and target cluster documents
//!
//! [`SourceProject`] and [`SourceCluster`] mirror the legacy MySQL schema and
//! are read-only from this tool's point of view. [`ClusterDocument`] is the
//! shape stored in the MongoDB cluster collection; its identifier is the
//! natural key and the collection enforces uniqueness on it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Timestamp format used by the document store (`2006-01-02T15:04:05Z`)
const DOCUMENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Project row from the legacy relational store
#[derive(Clone, Debug, FromRow)]
pub struct SourceProject {
    /// Stable project identifier, caller-supplied and never remapped
    pub project_id: String,
    /// Display name
    pub name: String,
    /// Project code on the new platform (legacy "english name")
    pub english_name: String,
    /// Creating user
    pub creator: String,
    /// Free-form description
    pub description: String,
    /// Project kind (1 = k8s, 2 = mesos)
    pub kind: u32,
    /// External business-system application ID
    pub cc_app_id: u32,
    /// Deployment type, stored as a string in the legacy schema
    pub deploy_type: String,
    /// Project type code
    pub project_type: u32,
    /// Whether the project is offlined
    pub is_offlined: bool,
    /// Whether the project uses shared platform resources
    pub use_bk: bool,
    /// Whether the project is marked secret
    pub is_secrecy: bool,
    /// Business group ID
    pub bg_id: u32,
    /// Business group name
    pub bg_name: String,
    /// Department ID
    pub dept_id: u32,
    /// Department name
    pub dept_name: String,
    /// Center ID
    pub center_id: u32,
    /// Center name
    pub center_name: String,
}

/// Cluster row from the legacy relational store
///
/// Only rows in `normal` status are ever migrated; the reader filters on that.
#[derive(Clone, Debug, FromRow)]
pub struct SourceCluster {
    /// Legacy cluster identifier (`BCS-K8S-<n>`)
    pub cluster_id: String,
    /// Display name
    pub name: String,
    /// Owning project identifier
    pub project_id: String,
    /// Free-form description
    pub description: String,
    /// Creating user
    pub creator: String,
    /// Lifecycle status in the legacy store
    pub status: String,
    /// Deployment environment (stag, debug, prod)
    pub environment: String,
    /// Engine type (k8s, mesos); the legacy column is named `type`
    #[sqlx(rename = "type")]
    pub engine_type: String,
    /// Row creation time
    pub created_at: NaiveDateTime,
    /// Row update time
    pub updated_at: NaiveDateTime,
}

/// Cluster document in the target document store
///
/// Field names match the collection's bson keys. Documents are created once
/// per logical cluster and never updated by this tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDocument {
    /// Cluster identifier, the natural key (`BCS-K8S-<n>`)
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    /// Display name
    #[serde(rename = "clusterName")]
    pub cluster_name: String,
    /// Cloud provider, fixed for migrated clusters
    #[serde(rename = "provider")]
    pub provider: String,
    /// Region, fixed for migrated clusters
    #[serde(rename = "region")]
    pub region: String,
    /// Owning project identifier
    #[serde(rename = "projectID")]
    pub project_id: String,
    /// Business-system ID of the owning project, stringified
    #[serde(rename = "businessID")]
    pub business_id: String,
    /// Deployment environment
    #[serde(rename = "environment")]
    pub environment: String,
    /// Engine type (k8s, mesos)
    #[serde(rename = "engineType")]
    pub engine_type: String,
    /// Cluster topology, fixed `single`
    #[serde(rename = "clusterType")]
    pub cluster_type: String,
    /// Creating user
    #[serde(rename = "creator")]
    pub creator: String,
    /// Management type, fixed `INDEPENDENT_CLUSTER`
    #[serde(rename = "manageType")]
    pub manage_type: String,
    /// Status on creation, fixed `RUNNING`
    #[serde(rename = "status")]
    pub status: String,
    /// Network type, fixed `overlay`
    #[serde(rename = "networkType")]
    pub network_type: String,
    /// Free-form description
    #[serde(rename = "description")]
    pub description: String,
    /// Creation timestamp, document-store string format
    #[serde(rename = "createTime")]
    pub create_time: String,
    /// Update timestamp, document-store string format
    #[serde(rename = "updateTime")]
    pub update_time: String,
}

impl ClusterDocument {
    /// Build the target document for a source cluster row
    ///
    /// Carries the legacy identifier verbatim; the reconciler replaces it only
    /// when collision resolution mints a new one. `business_id` comes from the
    /// owning project's `cc_app_id`.
    pub fn from_source(cluster: &SourceCluster, business_id: String) -> Self {
        Self {
            cluster_id: cluster.cluster_id.clone(),
            cluster_name: cluster.name.clone(),
            provider: "bluekingCloud".to_string(),
            region: "default".to_string(),
            project_id: cluster.project_id.clone(),
            business_id,
            environment: cluster.environment.clone(),
            engine_type: cluster.engine_type.clone(),
            cluster_type: "single".to_string(),
            creator: cluster.creator.clone(),
            manage_type: "INDEPENDENT_CLUSTER".to_string(),
            status: "RUNNING".to_string(),
            network_type: "overlay".to_string(),
            description: cluster.description.clone(),
            create_time: cluster.created_at.format(DOCUMENT_TIME_FORMAT).to_string(),
            update_time: cluster.updated_at.format(DOCUMENT_TIME_FORMAT).to_string(),
        }
    }

    /// Copy of this document under a different cluster identifier
    ///
    /// Used by collision resolution: original attributes, newly minted key.
    pub fn with_cluster_id(&self, cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn source_cluster() -> SourceCluster {
        SourceCluster {
            cluster_id: "BCS-K8S-5".to_string(),
            name: "prod-main".to_string(),
            project_id: "p1".to_string(),
            description: "main prod cluster".to_string(),
            creator: "admin".to_string(),
            status: "normal".to_string(),
            environment: "prod".to_string(),
            engine_type: "k8s".to_string(),
            created_at: NaiveDate::from_ymd_opt(2021, 3, 4)
                .unwrap()
                .and_hms_opt(5, 6, 7)
                .unwrap(),
            updated_at: NaiveDate::from_ymd_opt(2022, 8, 9)
                .unwrap()
                .and_hms_opt(10, 11, 12)
                .unwrap(),
        }
    }

    #[test]
    fn document_carries_source_identifier_and_fixed_fields() {
        let doc = ClusterDocument::from_source(&source_cluster(), "42".to_string());
        assert_eq!(doc.cluster_id, "BCS-K8S-5");
        assert_eq!(doc.cluster_name, "prod-main");
        assert_eq!(doc.business_id, "42");
        assert_eq!(doc.provider, "bluekingCloud");
        assert_eq!(doc.region, "default");
        assert_eq!(doc.cluster_type, "single");
        assert_eq!(doc.manage_type, "INDEPENDENT_CLUSTER");
        assert_eq!(doc.status, "RUNNING");
        assert_eq!(doc.network_type, "overlay");
        assert_eq!(doc.create_time, "2021-03-04T05:06:07Z");
        assert_eq!(doc.update_time, "2022-08-09T10:11:12Z");
    }

    #[test]
    fn with_cluster_id_keeps_every_other_attribute() {
        let doc = ClusterDocument::from_source(&source_cluster(), "42".to_string());
        let remapped = doc.with_cluster_id("BCS-K8S-6");
        assert_eq!(remapped.cluster_id, "BCS-K8S-6");
        assert_eq!(remapped.cluster_name, doc.cluster_name);
        assert_eq!(remapped.project_id, doc.project_id);
        assert_eq!(remapped.description, doc.description);
        assert_eq!(remapped.create_time, doc.create_time);
    }

    #[test]
    fn document_serializes_with_collection_bson_keys() {
        let doc = ClusterDocument::from_source(&source_cluster(), "42".to_string());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["clusterID"], "BCS-K8S-5");
        assert_eq!(value["clusterName"], "prod-main");
        assert_eq!(value["businessID"], "42");
        assert_eq!(value["engineType"], "k8s");
        assert_eq!(value["manageType"], "INDEPENDENT_CLUSTER");
        assert_eq!(value["networkType"], "overlay");
    }
}
