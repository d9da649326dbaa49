//! Legacy gateway lookups: cluster identity and connection credentials
//!
//! The gateway only knows *original* legacy identifiers, never ones minted by
//! collision resolution; callers look up the original identifier in the
//! resolved map before asking here.

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

const SERVICE: &str = "legacy-gateway";

/// Internal identity of a cluster behind the legacy gateway
#[derive(Clone, Debug, Deserialize)]
pub struct ClusterIdentity {
    /// Internal record ID, used for the credentials lookup
    pub id: String,
    /// Tunnel identifier, path segment of the per-cluster tunnel endpoint
    pub identifier: String,
}

/// Connection credentials for a cluster behind the legacy gateway
#[derive(Clone, Debug, Deserialize)]
pub struct ClusterCredentials {
    /// Cluster identifier as the gateway knows it
    #[serde(default)]
    pub cluster_id: String,
    /// CA certificate, PEM
    #[serde(rename = "cacert_data", default)]
    pub ca_cert: String,
    /// Bearer token for the tunnel endpoint
    pub user_token: String,
}

/// Client for the legacy gateway REST API
pub struct GatewayClient {
    http: reqwest::Client,
    addr: String,
    token: String,
}

impl GatewayClient {
    /// Client against the given gateway address and bearer token
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            addr: addr.into(),
            token: token.into(),
        })
    }

    /// Gateway base address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Resolve the internal identity for (project, legacy cluster)
    pub async fn cluster_identity(
        &self,
        project_id: &str,
        cluster_id: &str,
    ) -> Result<ClusterIdentity> {
        let url = format!(
            "{}/rest/clusters/bcs/query_by_id?project_id={}&cluster_id={}",
            self.addr, project_id, cluster_id
        );
        debug!(cluster = %cluster_id, "looking up cluster identity");
        self.get_json(&url).await
    }

    /// Fetch the certificate/token bundle for an internal cluster ID
    pub async fn cluster_credentials(&self, internal_id: &str) -> Result<ClusterCredentials> {
        let url = format!("{}/rest/clusters/{}/client_credentials", self.addr, internal_id);
        debug!(id = %internal_id, "fetching cluster credentials");
        self.get_json(&url).await
    }

    /// Kubernetes endpoint of the per-cluster tunnel
    pub fn tunnel_url(&self, tunnel_identifier: &str) -> String {
        format!("{}/tunnels/clusters/{}", self.addr, tunnel_identifier)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(SERVICE, status.as_u16() as u32, body));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_url_points_at_the_per_cluster_endpoint() {
        let client = GatewayClient::new("https://legacy.bcs:8443", "t").unwrap();
        assert_eq!(
            client.tunnel_url("abcdef123"),
            "https://legacy.bcs:8443/tunnels/clusters/abcdef123"
        );
    }

    #[test]
    fn credentials_deserialize_from_gateway_field_names() {
        let creds: ClusterCredentials = serde_json::from_str(
            r#"{"cluster_id":"BCS-K8S-5","server_address_path":"/k8s","user_token":"tok","cacert_data":"-----BEGIN CERTIFICATE-----"}"#,
        )
        .unwrap();
        assert_eq!(creds.user_token, "tok");
        assert!(creds.ca_cert.starts_with("-----BEGIN"));
    }
}
