//! Read-only queries against the legacy relational store
//!
//! Two tables matter: `projects` and `clusters`. Both reads take an optional
//! project-ID allow-list (empty = no filter), and cluster reads only consider
//! rows in `normal` status. A query failure here aborts the whole run; there
//! is nothing to migrate without the source store.

use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::time::Duration;
use tracing::debug;

use crate::model::{SourceCluster, SourceProject};
use crate::{Result, REQUEST_TIMEOUT_SECS};

const PROJECT_COLUMNS: &str = "project_id, name, english_name, creator, description, kind, \
     cc_app_id, deploy_type, project_type, is_offlined, use_bk, is_secrecy, \
     bg_id, bg_name, dept_id, dept_name, center_id, center_name";

const CLUSTER_COLUMNS: &str = "cluster_id, name, project_id, description, creator, status, \
     environment, `type`, created_at, updated_at";

/// Reader over the legacy relational store
pub struct SourceReader {
    pool: MySqlPool,
}

impl SourceReader {
    /// Connect to the legacy store
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests)
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// List project rows, optionally restricted to an allow-list
    pub async fn list_projects(&self, project_ids: &[String]) -> Result<Vec<SourceProject>> {
        let mut query: QueryBuilder<MySql> =
            QueryBuilder::new(format!("SELECT {PROJECT_COLUMNS} FROM projects"));
        if !project_ids.is_empty() {
            query.push(" WHERE project_id IN (");
            let mut ids = query.separated(", ");
            for id in project_ids {
                ids.push_bind(id);
            }
            ids.push_unseparated(")");
        }

        let projects = query
            .build_query_as::<SourceProject>()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = projects.len(), "read projects from source store");
        Ok(projects)
    }

    /// List cluster rows in `normal` status, optionally restricted to an allow-list
    pub async fn list_clusters(&self, project_ids: &[String]) -> Result<Vec<SourceCluster>> {
        let mut query: QueryBuilder<MySql> = QueryBuilder::new(format!(
            "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE status = "
        ));
        query.push_bind("normal");
        if !project_ids.is_empty() {
            query.push(" AND project_id IN (");
            let mut ids = query.separated(", ");
            for id in project_ids {
                ids.push_bind(id);
            }
            ids.push_unseparated(")");
        }

        let clusters = query
            .build_query_as::<SourceCluster>()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = clusters.len(), "read clusters from source store");
        Ok(clusters)
    }

    /// Business-system ID of a project, stringified for the cluster document
    ///
    /// A project missing from the source store yields `"0"`, matching the
    /// legacy zero value rather than failing the cluster.
    pub async fn business_id(&self, project_id: &str) -> Result<String> {
        let cc_app_id: Option<u32> =
            sqlx::query_scalar("SELECT cc_app_id FROM projects WHERE project_id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cc_app_id.unwrap_or(0).to_string())
    }
}
