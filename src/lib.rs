//! BCS upgrade tool - one-shot migration to the new platform generation
//!
//! Moves project and cluster records from the legacy relational store (MySQL)
//! into the document store (MongoDB) used by the newer platform, registers
//! migrated projects with the project-manager API, and provisions a kube-agent
//! Deployment in every migrated cluster so the new control plane can reach it.
//!
//! The tool is operational tooling: run once during a platform upgrade, or
//! re-run idempotently after a partial failure. Everything is sequential, and
//! re-invocation is the only retry mechanism.
//!
//! # Modules
//!
//! - [`config`] - Configuration file loading and validation
//! - [`model`] - Source rows (MySQL) and target cluster documents (MongoDB)
//! - [`source`] - Read-only queries against the legacy relational store
//! - [`store`] - Target cluster document store ([`store::ClusterStore`])
//! - [`reconcile`] - Cluster identity reconciliation (the core algorithm)
//! - [`migrate`] - Migration orchestration and per-phase tallies
//! - [`api`] - HTTP clients for the new platform and the legacy gateway
//! - [`agent`] - Kube-agent Secret/Deployment provisioning
//! - [`error`] - Error types for the tool

#![deny(missing_docs)]

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod migrate;
pub mod model;
pub mod reconcile;
pub mod source;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Shared Constants
// =============================================================================
// Fixed names from the platform deployment model. Centralizing them here
// keeps the store, the deployer, and the test fixtures consistent.

/// Prefix of every conforming cluster identifier (`BCS-K8S-<n>`)
pub const CLUSTER_ID_PREFIX: &str = "BCS-K8S-";

/// MongoDB database holding cluster documents
pub const CLUSTER_DATABASE: &str = "clustermanager";

/// MongoDB collection holding cluster documents
pub const CLUSTER_COLLECTION: &str = "bcsclustermanagerv2_cluster";

/// Name of the credentials Secret copied into every migrated cluster
pub const KUBE_AGENT_SECRET_NAME: &str = "bcs-client-bcs-kube-agent";

/// Namespace on the control-plane cluster that holds the credentials Secret
pub const CONTROL_PLANE_NAMESPACE: &str = "bcs-system";

/// Timeout applied uniformly to every outbound store/HTTP/Kubernetes call
pub const REQUEST_TIMEOUT_SECS: u64 = 60;
