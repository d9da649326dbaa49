//! Error types for the upgrade tool

use thiserror::Error;

/// Main error type for migration operations
///
/// Whether an error is fatal (aborts the run) or per-item (logged, tallied,
/// loop continues) is a call-site policy, not an error property: store
/// connection and configuration failures abort, everything else is tallied.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration error (missing file, malformed YAML, invalid values)
    #[error("configuration error: {0}")]
    Config(String),

    /// Legacy relational store error
    #[error("source store error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Target document store error
    #[error("target store error: {0}")]
    Store(#[from] mongodb::error::Error),

    /// Insert rejected because the cluster identifier already exists
    ///
    /// Not a failure: this is the signal that drives collision resolution
    /// in the reconciler.
    #[error("duplicate cluster identifier: {0}")]
    DuplicateId(String),

    /// HTTP transport error talking to a sibling service
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A sibling service answered with a non-success payload
    #[error("api error from {service}: code {code}, {message}")]
    Api {
        /// Which service answered
        service: &'static str,
        /// Numeric status code from the response body (0 = success)
        code: u32,
        /// Human-readable message from the response body
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Agent deployment error (credential lookup, manifest building)
    #[error("agent deploy error: {0}")]
    Deploy(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an agent deployment error with the given message
    pub fn deploy(msg: impl Into<String>) -> Self {
        Self::Deploy(msg.into())
    }

    /// Create an API error for the given service
    pub fn api(service: &'static str, code: u32, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            code,
            message: message.into(),
        }
    }

    /// True when the error is a duplicate-identifier rejection from the store
    pub fn is_duplicate_id(&self) -> bool {
        matches!(self, Self::DuplicateId(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A duplicate-key insert must be distinguishable from every other store
    /// failure: it selects the collision branch instead of the failed branch.
    #[test]
    fn duplicate_id_is_not_a_generic_store_error() {
        let err = Error::DuplicateId("BCS-K8S-5".to_string());
        assert!(err.is_duplicate_id());
        assert!(err.to_string().contains("BCS-K8S-5"));

        let err = Error::config("missing mongo credentials");
        assert!(!err.is_duplicate_id());
    }

    #[test]
    fn api_errors_carry_service_and_code() {
        let err = Error::api("project-manager", 1405, "project already exists");
        let text = err.to_string();
        assert!(text.contains("project-manager"));
        assert!(text.contains("1405"));
        assert!(text.contains("already exists"));
    }

    #[test]
    fn constructors_accept_str_and_string() {
        let err = Error::config(format!("bad port: {}", 0));
        assert!(err.to_string().contains("bad port"));
        let err = Error::deploy("invalid kube agent image");
        assert!(err.to_string().contains("agent deploy error"));
    }
}
