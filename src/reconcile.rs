//! Cluster identity reconciliation
//!
//! For every source cluster the reconciler decides the identifier it ends up
//! with in the target store: reuse the legacy identifier, detect that an
//! earlier run already committed the cluster under a different identifier, or
//! mint a fresh one when the legacy identifier collides with an unrelated
//! document. This is the one place with real invariants:
//!
//! - resulting identifiers are pairwise distinct (the store's unique index is
//!   the backstop, the algorithm never relies on winning a race);
//! - a minted suffix is strictly greater than every conforming suffix present
//!   at allocation time;
//! - a second run against the store produced by the first inserts nothing and
//!   yields the same resolved mapping.
//!
//! Match decisions use one snapshot of the target store taken at the start of
//! the pass, so classification is not skewed by inserts made for earlier rows.
//! Suffix allocation re-reads the store at each collision so monotonicity
//! holds across in-pass inserts too.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::model::ClusterDocument;
use crate::store::ClusterStore;
use crate::{Result, CLUSTER_ID_PREFIX};

/// Predicate deciding whether two documents describe the same logical cluster
pub type MatchPredicate = fn(&ClusterDocument, &ClusterDocument) -> bool;

/// Default "same logical cluster" predicate
///
/// Exact equality on owning project, name, and description. Intentionally
/// strict: a cosmetic description edit between runs breaks match detection and
/// produces a duplicate migration. Kept as a named, swappable function because
/// the matching key is the part of this algorithm that history shows gets
/// revisited.
pub fn same_logical_cluster(existing: &ClusterDocument, candidate: &ClusterDocument) -> bool {
    existing.project_id == candidate.project_id
        && existing.cluster_name == candidate.cluster_name
        && existing.description == candidate.description
}

/// Numeric suffix of a conforming cluster identifier
///
/// Conforming means exactly three hyphen-separated segments with a numeric
/// third segment (`BCS-K8S-<n>`). Anything else is foreign to the allocation
/// scheme and is ignored, never an error.
pub fn cluster_suffix(cluster_id: &str) -> Option<u64> {
    let mut segments = cluster_id.split('-');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_), Some(_), Some(n), None) => n.parse().ok(),
        _ => None,
    }
}

/// Per-cluster reconciliation outcome, in source order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Inserted under the legacy identifier, unchanged
    Migrated {
        /// Identifier in the target store (same as the legacy one)
        cluster_id: String,
    },
    /// A document for this logical cluster already exists; nothing inserted
    ///
    /// `cluster_id` and `source_id` differ when an earlier run remapped the
    /// identifier; they are equal on a plain idempotent re-run.
    AlreadyMigrated {
        /// Identifier committed to the target store
        cluster_id: String,
        /// Identifier in the legacy source store
        source_id: String,
    },
    /// Legacy identifier collided with an unrelated document; a new one was minted
    Reassigned {
        /// Newly minted identifier in the target store
        cluster_id: String,
        /// Identifier in the legacy source store
        source_id: String,
    },
    /// Insert failed; logged and skipped, never retried
    Failed {
        /// Identifier in the legacy source store
        source_id: String,
        /// What the store said
        reason: String,
    },
}

/// Result of one reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    outcomes: Vec<Outcome>,
    resolved: BTreeMap<String, String>,
}

impl ReconcileReport {
    /// Per-cluster outcomes, in source order (collisions resolve last)
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Resolved map: target identifier to original legacy identifier
    ///
    /// The legacy gateway only knows original identifiers; the agent deployer
    /// uses this map to look up credentials for a possibly remapped cluster.
    pub fn resolved(&self) -> &BTreeMap<String, String> {
        &self.resolved
    }

    /// Number of fresh inserts
    pub fn migrated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Migrated { .. }))
    }

    /// Number of clusters already present in the target store
    pub fn already_migrated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::AlreadyMigrated { .. }))
    }

    /// Number of collisions resolved with a minted identifier
    pub fn reassigned(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Reassigned { .. }))
    }

    /// Number of clusters that failed to insert
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }

    fn record(&mut self, target_id: &str, source_id: &str, outcome: Outcome) {
        self.resolved
            .insert(target_id.to_string(), source_id.to_string());
        self.outcomes.push(outcome);
    }
}

/// The reconciler: decides identifiers, inserts documents, never updates
pub struct Reconciler<'a> {
    store: &'a dyn ClusterStore,
    matcher: MatchPredicate,
}

impl<'a> Reconciler<'a> {
    /// Reconciler with the default [`same_logical_cluster`] predicate
    pub fn new(store: &'a dyn ClusterStore) -> Self {
        Self {
            store,
            matcher: same_logical_cluster,
        }
    }

    /// Reconciler with a custom match predicate
    pub fn with_matcher(store: &'a dyn ClusterStore, matcher: MatchPredicate) -> Self {
        Self { store, matcher }
    }

    /// Reconcile candidate documents against the current target store
    ///
    /// Candidates carry the legacy identifier verbatim. A store read failure
    /// is fatal; per-candidate insert failures land in the report as
    /// [`Outcome::Failed`].
    pub async fn reconcile(&self, candidates: &[ClusterDocument]) -> Result<ReconcileReport> {
        let snapshot = self.store.list_all().await?;
        info!(
            candidates = candidates.len(),
            existing = snapshot.len(),
            "reconciling clusters against target store"
        );

        let mut report = ReconcileReport::default();
        let mut collisions: Vec<ClusterDocument> = Vec::new();

        for candidate in candidates {
            if let Some(existing) = snapshot.iter().find(|e| (self.matcher)(e, candidate)) {
                if existing.cluster_id == candidate.cluster_id {
                    info!(cluster = %candidate.cluster_id, "cluster already migrated, skipping");
                } else {
                    info!(
                        cluster = %existing.cluster_id,
                        source = %candidate.cluster_id,
                        "cluster already migrated under a remapped identifier"
                    );
                }
                report.record(
                    &existing.cluster_id,
                    &candidate.cluster_id,
                    Outcome::AlreadyMigrated {
                        cluster_id: existing.cluster_id.clone(),
                        source_id: candidate.cluster_id.clone(),
                    },
                );
                continue;
            }

            match self.store.insert(candidate).await {
                Ok(()) => {
                    info!(cluster = %candidate.cluster_id, "cluster migrated");
                    report.record(
                        &candidate.cluster_id,
                        &candidate.cluster_id,
                        Outcome::Migrated {
                            cluster_id: candidate.cluster_id.clone(),
                        },
                    );
                }
                Err(err) if err.is_duplicate_id() => {
                    info!(
                        cluster = %candidate.cluster_id,
                        "identifier taken by an unrelated document, deferring to collision resolution"
                    );
                    collisions.push(candidate.clone());
                }
                Err(err) => {
                    warn!(cluster = %candidate.cluster_id, error = %err, "cluster insert failed");
                    report.outcomes.push(Outcome::Failed {
                        source_id: candidate.cluster_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        for candidate in collisions {
            let suffix = self.next_suffix().await?;
            let new_id = format!("{CLUSTER_ID_PREFIX}{suffix}");
            let remapped = candidate.with_cluster_id(&new_id);

            match self.store.insert(&remapped).await {
                Ok(()) => {
                    info!(
                        cluster = %new_id,
                        source = %candidate.cluster_id,
                        "collision resolved with a new identifier"
                    );
                    report.record(
                        &new_id,
                        &candidate.cluster_id,
                        Outcome::Reassigned {
                            cluster_id: new_id.clone(),
                            source_id: candidate.cluster_id.clone(),
                        },
                    );
                }
                Err(err) => {
                    // No further remediation path: the cluster stays in the
                    // failed set and the operator re-runs the tool.
                    warn!(
                        cluster = %new_id,
                        source = %candidate.cluster_id,
                        error = %err,
                        "replacement insert failed"
                    );
                    report.outcomes.push(Outcome::Failed {
                        source_id: candidate.cluster_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Next free numeric suffix: max over all conforming identifiers, plus one
    ///
    /// Re-read from the store so suffixes minted earlier in this pass are
    /// seen. Defaults to 1 when no conforming identifier exists.
    async fn next_suffix(&self) -> Result<u64> {
        let docs = self.store.list_all().await?;
        Ok(docs
            .iter()
            .filter_map(|d| cluster_suffix(&d.cluster_id))
            .max()
            .map_or(1, |n| n + 1))
    }
}
