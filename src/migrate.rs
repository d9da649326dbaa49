//! Migration orchestration
//!
//! Single-threaded and fully sequential: projects first (optional), then
//! cluster reconciliation, then one agent deployment per resolved cluster.
//! Store-level failures abort the run; everything per-item is logged with the
//! offending identifier, tallied, and skipped. Re-running the tool is the
//! retry mechanism.

use std::collections::{BTreeMap, HashMap};

use tracing::{error, info, warn};

use crate::agent::{master_node_ips, AgentDeployer};
use crate::api::cc::{MasterData, SyncClusterRequest};
use crate::api::project::{CreateProjectRequest, RegisterOutcome};
use crate::api::{CcClient, ProjectClient};
use crate::config::UpgradeConfig;
use crate::model::ClusterDocument;
use crate::reconcile::Reconciler;
use crate::source::SourceReader;
use crate::store::{ClusterStore, MemoryClusterStore, MongoClusterStore};
use crate::Result;

/// Per-phase tallies for one run
///
/// Per-item failures land here; they never change the process exit code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Projects registered on the new platform
    pub projects_created: usize,
    /// Projects already present on the new platform
    pub projects_existing: usize,
    /// Projects whose registration failed
    pub projects_failed: usize,
    /// Clusters inserted under their legacy identifier
    pub clusters_migrated: usize,
    /// Clusters already present in the target store
    pub clusters_existing: usize,
    /// Clusters re-identified by collision resolution
    pub clusters_reassigned: usize,
    /// Clusters whose insert failed
    pub clusters_failed: usize,
    /// Agents deployed
    pub agents_deployed: usize,
    /// Agent deployments that failed
    pub agents_failed: usize,
    /// Clusters synced to the configuration center
    pub cc_synced: usize,
    /// Configuration-center syncs that failed
    pub cc_failed: usize,
}

/// The migration driver: owns both store handles and the tool configuration
pub struct Migrator {
    config: UpgradeConfig,
    source: SourceReader,
    store: MongoClusterStore,
}

impl Migrator {
    /// Connect to both stores; failure here is fatal for the whole run
    pub async fn connect(config: UpgradeConfig) -> Result<Self> {
        let source = SourceReader::connect(&config.mysql_dsn).await?;
        info!("connected to source relational store");
        let store = MongoClusterStore::connect(&config.mongo.uri()).await?;
        info!("connected to target document store");
        Ok(Self {
            config,
            source,
            store,
        })
    }

    /// Run the migration end to end
    ///
    /// With `dry_run`, reconciliation happens against an in-memory copy of the
    /// target snapshot and the agent/sync phases are skipped; the report shows
    /// what a real run would do without writing anywhere.
    pub async fn run(&self, dry_run: bool) -> Result<MigrationSummary> {
        let mut summary = MigrationSummary::default();

        if self.config.migrate_project_data && !dry_run {
            self.migrate_projects(&mut summary).await?;
        }

        self.migrate_clusters(&mut summary, dry_run).await?;

        info!(?summary, "migration finished");
        Ok(summary)
    }

    async fn migrate_projects(&self, summary: &mut MigrationSummary) -> Result<()> {
        let projects = self.source.list_projects(&self.config.project_ids).await?;
        info!(count = projects.len(), "migrating projects");

        let client = ProjectClient::new(
            &self.config.bcs_api_gateway.addr,
            &self.config.bcs_api_gateway.token,
        )?;

        for project in &projects {
            let request = CreateProjectRequest::from(project);
            match client.create_project(&request).await {
                Ok(RegisterOutcome::Created) => {
                    info!(project = %project.project_id, name = %project.name, "project registered");
                    summary.projects_created += 1;
                }
                Ok(RegisterOutcome::AlreadyExists) => {
                    info!(project = %project.project_id, "project already registered, skipping");
                    summary.projects_existing += 1;
                }
                Err(err) => {
                    error!(project = %project.project_id, error = %err, "project registration failed");
                    summary.projects_failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn migrate_clusters(&self, summary: &mut MigrationSummary, dry_run: bool) -> Result<()> {
        let clusters = self.source.list_clusters(&self.config.project_ids).await?;
        info!(count = clusters.len(), "migrating clusters in normal status");

        // Business IDs come from the owning project; one lookup per project.
        let mut business_ids: HashMap<String, String> = HashMap::new();
        let mut candidates = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            let business_id = match business_ids.get(&cluster.project_id) {
                Some(id) => id.clone(),
                None => {
                    let id = self.source.business_id(&cluster.project_id).await?;
                    business_ids.insert(cluster.project_id.clone(), id.clone());
                    id
                }
            };
            candidates.push(ClusterDocument::from_source(cluster, business_id));
        }

        let resolved: BTreeMap<String, String> = if dry_run {
            let shadow = MemoryClusterStore::seeded(self.store.list_all().await?);
            let report = Reconciler::new(&shadow).reconcile(&candidates).await?;
            record_reconcile(summary, &report);
            info!(resolved = report.resolved().len(), "dry run, no writes performed");
            return Ok(());
        } else if self.config.migrate_cluster_data {
            self.store.ensure_unique_index().await?;
            let report = Reconciler::new(&self.store).reconcile(&candidates).await?;
            record_reconcile(summary, &report);
            report.resolved().clone()
        } else {
            // Cluster data migration disabled: agents are still deployed, one
            // per source cluster, under the unchanged legacy identifier.
            trivial_mapping(&candidates)
        };

        if self.config.kube_agent.enable {
            self.deploy_agents(summary, &candidates, &resolved).await?;
        }
        Ok(())
    }

    async fn deploy_agents(
        &self,
        summary: &mut MigrationSummary,
        candidates: &[ClusterDocument],
        resolved: &BTreeMap<String, String>,
    ) -> Result<()> {
        let deployer = AgentDeployer::new(&self.config)?;

        let cc = if self.config.bcs_cc.enable {
            let client = CcClient::new(self.config.bcs_cc.clone())?;
            match client.access_token().await {
                Ok(token) => Some((client, token)),
                Err(err) => {
                    warn!(error = %err, "config-center access token unavailable, skipping sync");
                    None
                }
            }
        } else {
            None
        };

        for (cluster_id, original_id) in resolved {
            // The candidate still carries the original identifier; it holds
            // the project and metadata the deployer and the sync need.
            let Some(candidate) = candidates.iter().find(|c| &c.cluster_id == original_id) else {
                continue;
            };

            let client = match deployer
                .deploy(&candidate.project_id, cluster_id, original_id)
                .await
            {
                Ok(client) => {
                    summary.agents_deployed += 1;
                    client
                }
                Err(err) => {
                    error!(cluster = %cluster_id, error = %err, "kube agent deployment failed");
                    summary.agents_failed += 1;
                    continue;
                }
            };

            if let Some((cc_client, token)) = &cc {
                match self
                    .sync_to_cc(cc_client, token, &client, candidate, cluster_id)
                    .await
                {
                    Ok(()) => summary.cc_synced += 1,
                    Err(err) => {
                        error!(cluster = %cluster_id, error = %err, "config-center sync failed");
                        summary.cc_failed += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn sync_to_cc(
        &self,
        cc: &CcClient,
        token: &str,
        cluster_client: &kube::Client,
        candidate: &ClusterDocument,
        cluster_id: &str,
    ) -> Result<()> {
        let master_ips = master_node_ips(cluster_client).await?;
        let request = SyncClusterRequest {
            project_id: candidate.project_id.clone(),
            cluster_id: cluster_id.to_string(),
            name: candidate.cluster_name.clone(),
            creator: candidate.creator.clone(),
            description: candidate.description.clone(),
            engine_type: candidate.engine_type.clone(),
            environment: candidate.environment.clone(),
            status: "normal".to_string(),
            master_count: master_ips.len(),
            master_ips: master_ips
                .into_iter()
                .map(|inner_ip| MasterData {
                    inner_ip,
                    ..Default::default()
                })
                .collect(),
            state: "bcs_new".to_string(),
        };
        cc.sync_cluster(token, &request).await
    }
}

fn record_reconcile(summary: &mut MigrationSummary, report: &crate::reconcile::ReconcileReport) {
    summary.clusters_migrated = report.migrated();
    summary.clusters_existing = report.already_migrated();
    summary.clusters_reassigned = report.reassigned();
    summary.clusters_failed = report.failed();
}

/// Identity mapping used when cluster-data migration is disabled
fn trivial_mapping(candidates: &[ClusterDocument]) -> BTreeMap<String, String> {
    candidates
        .iter()
        .map(|c| (c.cluster_id.clone(), c.cluster_id.clone()))
        .collect()
}
