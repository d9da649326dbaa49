//! HTTP clients for sibling services
//!
//! Three services sit around the migration: the new platform's project-manager
//! (project registration), the legacy gateway (cluster identifier/credential
//! lookup), and the legacy configuration center (cluster sync). All calls use
//! a uniform 60s timeout and accept invalid certificates; none of these
//! services present an externally verifiable certificate in this deployment
//! model.

use std::time::Duration;

use crate::{Result, REQUEST_TIMEOUT_SECS};

pub mod cc;
pub mod gateway;
pub mod project;

pub use cc::CcClient;
pub use gateway::GatewayClient;
pub use project::ProjectClient;

/// HTTP client shared by the service clients
pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?)
}
