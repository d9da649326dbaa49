//! Legacy configuration-center sync
//!
//! Optional phase: after migration, each cluster is reported back to the
//! legacy configuration center so inventories stay consistent during the
//! upgrade window. Calls are authenticated with a short-lived access token
//! obtained from the SSM host.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CcConfig;
use crate::{Error, Result};

const SERVICE: &str = "config-center";

#[derive(Serialize)]
struct AccessTokenRequest<'a> {
    grant_type: &'a str,
    id_provider: &'a str,
    bk_token: &'a str,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: AccessTokenData,
}

#[derive(Default, Deserialize)]
struct AccessTokenData {
    #[serde(default)]
    access_token: String,
}

/// One master node reported to the configuration center
#[derive(Clone, Debug, Default, Serialize)]
pub struct MasterData {
    /// Node internal IP
    pub inner_ip: String,
    /// Node hostname
    pub hostname: String,
    /// Node status
    pub status: String,
}

/// Cluster-sync request body
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncClusterRequest {
    /// Owning project identifier
    pub project_id: String,
    /// Cluster identifier as committed to the target store
    pub cluster_id: String,
    /// Display name
    pub name: String,
    /// Creating user
    pub creator: String,
    /// Free-form description
    pub description: String,
    /// Engine type (k8s, mesos)
    #[serde(rename = "type")]
    pub engine_type: String,
    /// Deployment environment
    pub environment: String,
    /// Lifecycle status
    pub status: String,
    /// Number of master nodes
    pub master_count: usize,
    /// Master node records
    pub master_ips: Vec<MasterData>,
    /// Migration state marker
    pub state: String,
}

#[derive(Deserialize)]
struct SyncClusterResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

/// Client for the legacy configuration center
pub struct CcClient {
    http: reqwest::Client,
    config: CcConfig,
}

impl CcClient {
    /// Client from the configuration-center settings
    pub fn new(config: CcConfig) -> Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            config,
        })
    }

    /// Exchange the login token for an access token at the SSM host
    pub async fn access_token(&self) -> Result<String> {
        let url = format!("{}/api/v1/auth/access-tokens", self.config.ssm_host);
        let request = AccessTokenRequest {
            grant_type: "authorization_code",
            id_provider: "bk_login",
            bk_token: &self.config.bk_token,
        };

        let response = self
            .http
            .post(&url)
            .header("X-BK-APP-CODE", &self.config.app_code)
            .header("X-BK-APP-SECRET", &self.config.app_secret)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(SERVICE, status.as_u16() as u32, body));
        }

        let body: AccessTokenResponse = response.json().await?;
        if body.code != 0 {
            return Err(Error::api(SERVICE, body.code, body.message));
        }
        Ok(body.data.access_token)
    }

    /// Report one migrated cluster to the configuration center
    pub async fn sync_cluster(
        &self,
        access_token: &str,
        request: &SyncClusterRequest,
    ) -> Result<()> {
        let url = format!(
            "{}/projects/{}/clusters?access_token={}",
            self.config.addr, request.project_id, access_token
        );
        debug!(cluster = %request.cluster_id, "syncing cluster to config center");

        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(SERVICE, status.as_u16() as u32, body));
        }

        let body: SyncClusterResponse = response.json().await?;
        if body.code != 0 {
            return Err(Error::api(SERVICE, body.code, body.message));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_uses_legacy_field_names() {
        let request = SyncClusterRequest {
            project_id: "p1".to_string(),
            cluster_id: "BCS-K8S-6".to_string(),
            name: "prod-main".to_string(),
            engine_type: "k8s".to_string(),
            master_count: 3,
            master_ips: vec![MasterData {
                inner_ip: "10.0.0.1".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "k8s");
        assert_eq!(value["cluster_id"], "BCS-K8S-6");
        assert_eq!(value["master_ips"][0]["inner_ip"], "10.0.0.1");
        assert_eq!(value["master_count"], 3);
    }
}
