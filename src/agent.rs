//! Kube-agent provisioning in migrated clusters
//!
//! For each resolved cluster the deployer reaches the cluster's API server
//! through the legacy gateway's per-cluster tunnel, copies the control-plane
//! credentials Secret into the cluster, and creates the agent Deployment whose
//! args point it at the new gateway's websocket endpoint under the *new*
//! cluster identifier. The agent then dials out, so the new control plane can
//! reach the cluster without any inbound connectivity.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, KeyToPath, Node, PodSpec, PodTemplateSpec, Secret, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams, ObjectMeta, PostParams};
use tracing::{debug, info};

use crate::api::GatewayClient;
use crate::config::{websocket_address, UpgradeConfig};
use crate::{
    Error, Result, CONTROL_PLANE_NAMESPACE, KUBE_AGENT_SECRET_NAME, REQUEST_TIMEOUT_SECS,
};

/// Label selecting master nodes
const MASTER_ROLE_LABEL: &str = "node-role.kubernetes.io/master";

/// Path the agent's certificate files are mounted at
const AGENT_CERT_PATH: &str = "/data/bcs/cert/bcs";

/// Websocket path on the new gateway the agent connects to
const AGENT_WEBSOCKET_PATH: &str = "/bcsapi/v4/clustermanager/v1/websocket/connect";

/// Deploys the kube agent into migrated clusters
pub struct AgentDeployer {
    gateway: GatewayClient,
    namespace: String,
    service_account: String,
    image: String,
    deployment_name: String,
    websocket_addr: String,
    new_gateway_addr: String,
    new_gateway_token: String,
    cert_name: String,
    control_plane_cluster: String,
}

impl AgentDeployer {
    /// Deployer from the tool configuration
    pub fn new(config: &UpgradeConfig) -> Result<Self> {
        let tag = config.kube_agent.image_tag()?;
        Ok(Self {
            gateway: GatewayClient::new(&config.bcs_api.addr, &config.bcs_api.token)?,
            namespace: config.kube_agent.namespace.clone(),
            service_account: config.kube_agent.service_account.clone(),
            image: config.kube_agent.image.clone(),
            deployment_name: format!("bcs-kube-agent-{tag}"),
            websocket_addr: websocket_address(&config.bcs_api_gateway.addr)?,
            new_gateway_addr: config.bcs_api_gateway.addr.clone(),
            new_gateway_token: config.bcs_api_gateway.token.clone(),
            cert_name: config.bcs_cert_name.clone(),
            control_plane_cluster: config.bk_cluster_id.clone(),
        })
    }

    /// Deploy the agent into one cluster
    ///
    /// `cluster_id` is the identifier committed to the target store (what the
    /// agent announces); `original_id` is the legacy identifier (what the
    /// gateway knows). Returns the tunnel client so callers can run follow-up
    /// reads against the same cluster.
    pub async fn deploy(
        &self,
        project_id: &str,
        cluster_id: &str,
        original_id: &str,
    ) -> Result<kube::Client> {
        info!(cluster = %cluster_id, source = %original_id, "deploying kube agent");

        let identity = self.gateway.cluster_identity(project_id, original_id).await?;
        let credentials = self.gateway.cluster_credentials(&identity.id).await?;
        let target = tunnel_client(
            &self.gateway.tunnel_url(&identity.identifier),
            &credentials.user_token,
        )?;

        self.copy_agent_secret(&target).await?;
        self.create_agent_deployment(&target, cluster_id).await?;

        info!(cluster = %cluster_id, "kube agent deployed");
        Ok(target)
    }

    /// Copy the control-plane credentials Secret into the target cluster
    ///
    /// The agent authenticates back to the new gateway with the same client
    /// certificate the control plane uses, so the Secret is read from the
    /// well-known control-plane cluster and recreated under the agent's name.
    async fn copy_agent_secret(&self, target: &kube::Client) -> Result<()> {
        let control_plane = tunnel_client(
            &format!("{}/clusters/{}", self.new_gateway_addr, self.control_plane_cluster),
            &self.new_gateway_token,
        )?;

        let source: Api<Secret> = Api::namespaced(control_plane, CONTROL_PLANE_NAMESPACE);
        let secret = source.get(&self.cert_name).await?;

        let copy = Secret {
            metadata: ObjectMeta {
                name: Some(KUBE_AGENT_SECRET_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            immutable: secret.immutable,
            data: secret.data,
            string_data: secret.string_data,
            type_: secret.type_,
        };

        let secrets: Api<Secret> = Api::namespaced(target.clone(), &self.namespace);
        match secrets.create(&PostParams::default(), &copy).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(secret = KUBE_AGENT_SECRET_NAME, "secret already present, leaving it");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create the agent Deployment in the target cluster
    async fn create_agent_deployment(&self, target: &kube::Client, cluster_id: &str) -> Result<()> {
        let deployment = self.build_agent_deployment(cluster_id);
        let deployments: Api<Deployment> = Api::namespaced(target.clone(), &self.namespace);
        match deployments.create(&PostParams::default(), &deployment).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(deployment = %self.deployment_name, "agent deployment already present, leaving it");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Agent Deployment manifest for one cluster
    ///
    /// Single replica; args carry the new gateway's websocket address and the
    /// new cluster identifier, env carries the bearer token and the paths the
    /// copied Secret is mounted at.
    pub fn build_agent_deployment(&self, cluster_id: &str) -> Deployment {
        let labels = BTreeMap::from([("app".to_string(), self.deployment_name.clone())]);

        let container = Container {
            name: "bcs-kube-agent".to_string(),
            image: Some(self.image.clone()),
            args: Some(vec![
                format!("--bke-address={}", self.websocket_addr),
                format!("--cluster-id={cluster_id}"),
                "--insecureSkipVerify=true".to_string(),
                "--verbosity=3".to_string(),
                "--use-websocket=true".to_string(),
                format!("--websocket-path={AGENT_WEBSOCKET_PATH}"),
            ]),
            env: Some(vec![
                env_var("USER_TOKEN", &self.new_gateway_token),
                env_var("CLIENT_CA", &format!("{AGENT_CERT_PATH}/bcs-ca.crt")),
                env_var("CLIENT_CERT", &format!("{AGENT_CERT_PATH}/bcs-client.crt")),
                env_var("CLIENT_KEY", &format!("{AGENT_CERT_PATH}/bcs-client.key")),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: "bcs-certs".to_string(),
                mount_path: AGENT_CERT_PATH.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let volume = Volume {
            name: "bcs-certs".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(KUBE_AGENT_SECRET_NAME.to_string()),
                items: Some(vec![
                    key_to_path("ca.crt", "bcs-ca.crt"),
                    key_to_path("tls.crt", "bcs-client.crt"),
                    key_to_path("tls.key", "bcs-client.key"),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        Deployment {
            metadata: ObjectMeta {
                name: Some(self.deployment_name.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(self.service_account.clone()),
                        containers: vec![container],
                        volumes: Some(vec![volume]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Kubernetes client for a tunnel endpoint: bearer token, no TLS verification
///
/// The legacy gateway presents no externally verifiable certificate in this
/// deployment model, so verification is disabled on purpose.
fn tunnel_client(url: &str, token: &str) -> Result<kube::Client> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e| Error::deploy(format!("invalid cluster endpoint {url:?}: {e}")))?;

    let mut config = kube::Config::new(uri);
    config.accept_invalid_certs = true;
    config.auth_info.token = Some(token.to_string().into());
    config.connect_timeout = Some(Duration::from_secs(REQUEST_TIMEOUT_SECS));
    config.read_timeout = Some(Duration::from_secs(REQUEST_TIMEOUT_SECS));

    Ok(kube::Client::try_from(config)?)
}

/// Internal IPs of the cluster's master nodes
///
/// Used by the configuration-center sync to report cluster topology.
pub async fn master_node_ips(client: &kube::Client) -> Result<Vec<String>> {
    let nodes: Api<Node> = Api::all(client.clone());
    let params = ListParams::default().labels(MASTER_ROLE_LABEL);
    let list = nodes.list(&params).await?;

    let mut ips = Vec::new();
    for node in list {
        let Some(addresses) = node.status.and_then(|s| s.addresses) else {
            continue;
        };
        for address in addresses {
            if address.type_ == "InternalIP" {
                ips.push(address.address);
            }
        }
    }
    Ok(ips)
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn key_to_path(key: &str, path: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: path.to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CcConfig, EndpointConfig, KubeAgentConfig, MongoConfig};

    fn deployer() -> AgentDeployer {
        let config = UpgradeConfig {
            debug: false,
            project_ids: vec![],
            migrate_project_data: true,
            migrate_cluster_data: true,
            mysql_dsn: "mysql://u:p@h:3306/db".to_string(),
            mongo: MongoConfig {
                host: "mongo".to_string(),
                port: 27017,
                username: "u".to_string(),
                password: "p".to_string(),
            },
            bcs_api: EndpointConfig {
                addr: "https://legacy.bcs:8443".to_string(),
                token: "legacy-token".to_string(),
            },
            bcs_api_gateway: EndpointConfig {
                addr: "https://gateway.bcs:8443".to_string(),
                token: "gateway-token".to_string(),
            },
            bcs_cert_name: "bcs-client-cert".to_string(),
            bk_cluster_id: "BCS-K8S-1".to_string(),
            bcs_cc: CcConfig::default(),
            kube_agent: KubeAgentConfig {
                enable: true,
                namespace: "bcs-system".to_string(),
                service_account: "bcs-kube-agent".to_string(),
                image: "registry.bcs/bcs/kube-agent:v1.21.1".to_string(),
            },
        };
        AgentDeployer::new(&config).unwrap()
    }

    #[test]
    fn deployment_is_named_after_the_image_tag() {
        let deployment = deployer().build_agent_deployment("BCS-K8S-6");
        assert_eq!(
            deployment.metadata.name.as_deref(),
            Some("bcs-kube-agent-v1.21.1")
        );
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(
            spec.selector.match_labels.unwrap()["app"],
            "bcs-kube-agent-v1.21.1"
        );
    }

    #[test]
    fn container_args_carry_gateway_address_and_new_identifier() {
        let deployment = deployer().build_agent_deployment("BCS-K8S-6");
        let container = &deployment.spec.unwrap().template.spec.unwrap().containers[0];
        let args = container.args.as_ref().unwrap();

        assert!(args.contains(&"--bke-address=wss://gateway.bcs:8443".to_string()));
        assert!(args.contains(&"--cluster-id=BCS-K8S-6".to_string()));
        assert!(args.contains(&"--use-websocket=true".to_string()));
        assert!(args
            .iter()
            .any(|a| a.ends_with("/bcsapi/v4/clustermanager/v1/websocket/connect")));
    }

    #[test]
    fn pod_carries_token_env_and_mounted_certificates() {
        let deployment = deployer().build_agent_deployment("BCS-K8S-6");
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some("bcs-kube-agent"));

        let env = pod.containers[0].env.as_ref().unwrap();
        let token = env.iter().find(|e| e.name == "USER_TOKEN").unwrap();
        assert_eq!(token.value.as_deref(), Some("gateway-token"));
        let ca = env.iter().find(|e| e.name == "CLIENT_CA").unwrap();
        assert_eq!(ca.value.as_deref(), Some("/data/bcs/cert/bcs/bcs-ca.crt"));

        let volume = &pod.volumes.as_ref().unwrap()[0];
        let source = volume.secret.as_ref().unwrap();
        assert_eq!(source.secret_name.as_deref(), Some(KUBE_AGENT_SECRET_NAME));
        let items = source.items.as_ref().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().any(|i| i.key == "tls.crt" && i.path == "bcs-client.crt"));
    }
}
