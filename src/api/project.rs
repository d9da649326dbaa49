//! Project registration against the new platform's project-manager

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::SourceProject;
use crate::{Error, Result};

const SERVICE: &str = "project-manager";

/// Project-creation request body
///
/// Numeric legacy fields are stringified exactly the way the new API expects
/// them; project identifiers are caller-supplied and stable, so no
/// reconciliation is needed on this path.
#[derive(Clone, Debug, Serialize)]
pub struct CreateProjectRequest {
    /// Creating user
    pub creator: String,
    /// Stable project identifier
    #[serde(rename = "projectID")]
    pub project_id: String,
    /// Display name
    pub name: String,
    /// Project code (legacy "english name")
    #[serde(rename = "projectCode")]
    pub project_code: String,
    /// Whether the project uses shared platform resources
    #[serde(rename = "useBKRes")]
    pub use_bk_res: bool,
    /// Free-form description
    pub description: String,
    /// Whether the project is offlined
    #[serde(rename = "isOffline")]
    pub is_offline: bool,
    /// Project kind as a string ("1" = k8s, "2" = mesos)
    pub kind: String,
    /// Business-system ID as a string
    #[serde(rename = "businessID")]
    pub business_id: String,
    /// Whether the project is marked secret
    #[serde(rename = "isSecret")]
    pub is_secret: bool,
    /// Project type code
    #[serde(rename = "projectType")]
    pub project_type: u32,
    /// Deployment type code
    #[serde(rename = "deployType")]
    pub deploy_type: u32,
    /// Business group ID as a string
    #[serde(rename = "BGID")]
    pub bg_id: String,
    /// Business group name
    #[serde(rename = "BGName")]
    pub bg_name: String,
    /// Department ID as a string
    #[serde(rename = "deptID")]
    pub dept_id: String,
    /// Department name
    #[serde(rename = "deptName")]
    pub dept_name: String,
    /// Center ID as a string
    #[serde(rename = "centerID")]
    pub center_id: String,
    /// Center name
    #[serde(rename = "centerName")]
    pub center_name: String,
}

impl From<&SourceProject> for CreateProjectRequest {
    fn from(p: &SourceProject) -> Self {
        // The legacy schema stores deploy_type as a string; a value that does
        // not parse maps to 0, matching the legacy zero value.
        let deploy_type = p.deploy_type.parse().unwrap_or(0);
        Self {
            creator: p.creator.clone(),
            project_id: p.project_id.clone(),
            name: p.name.clone(),
            project_code: p.english_name.clone(),
            use_bk_res: p.use_bk,
            description: p.description.clone(),
            is_offline: p.is_offlined,
            kind: p.kind.to_string(),
            business_id: p.cc_app_id.to_string(),
            is_secret: p.is_secrecy,
            project_type: p.project_type,
            deploy_type,
            bg_id: p.bg_id.to_string(),
            bg_name: p.bg_name.clone(),
            dept_id: p.dept_id.to_string(),
            dept_name: p.dept_name.clone(),
            center_id: p.center_id.to_string(),
            center_name: p.center_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

/// How a registration call ended, both counted as success
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Project created on the new platform
    Created,
    /// Project was already present (idempotent re-run)
    AlreadyExists,
}

/// True when a non-zero response means the project is already registered
pub fn is_already_exists(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already exists")
}

/// Client for the project-manager registration API
pub struct ProjectClient {
    http: reqwest::Client,
    addr: String,
    token: String,
}

impl ProjectClient {
    /// Client against the given gateway address and bearer token
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            addr: addr.into(),
            token: token.into(),
        })
    }

    /// Register one project; HTTP 200 with body code 0 is the only success
    ///
    /// An "already exists" answer is success too: re-running the tool must not
    /// fail on projects migrated by an earlier run.
    pub async fn create_project(&self, req: &CreateProjectRequest) -> Result<RegisterOutcome> {
        let url = format!("{}/bcsapi/v4/bcsproject/v1/projects", self.addr);
        debug!(project = %req.project_id, %url, "registering project");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(SERVICE, status.as_u16() as u32, body));
        }

        let body: ProjectResponse = response.json().await?;
        if body.code == 0 {
            Ok(RegisterOutcome::Created)
        } else if is_already_exists(&body.message) {
            Ok(RegisterOutcome::AlreadyExists)
        } else {
            Err(Error::api(SERVICE, body.code, body.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_project() -> SourceProject {
        SourceProject {
            project_id: "p1".to_string(),
            name: "blueking".to_string(),
            english_name: "blueking".to_string(),
            creator: "admin".to_string(),
            description: "platform project".to_string(),
            kind: 1,
            cc_app_id: 42,
            deploy_type: "2".to_string(),
            project_type: 3,
            is_offlined: false,
            use_bk: true,
            is_secrecy: false,
            bg_id: 7,
            bg_name: "bg".to_string(),
            dept_id: 8,
            dept_name: "dept".to_string(),
            center_id: 9,
            center_name: "center".to_string(),
        }
    }

    #[test]
    fn request_stringifies_numeric_legacy_fields() {
        let req = CreateProjectRequest::from(&source_project());
        assert_eq!(req.kind, "1");
        assert_eq!(req.business_id, "42");
        assert_eq!(req.deploy_type, 2);
        assert_eq!(req.bg_id, "7");
        assert_eq!(req.dept_id, "8");
        assert_eq!(req.center_id, "9");
        assert_eq!(req.project_code, "blueking");
    }

    #[test]
    fn unparseable_deploy_type_maps_to_zero() {
        let mut p = source_project();
        p.deploy_type = "container".to_string();
        assert_eq!(CreateProjectRequest::from(&p).deploy_type, 0);
    }

    #[test]
    fn request_serializes_with_api_field_names() {
        let value = serde_json::to_value(CreateProjectRequest::from(&source_project())).unwrap();
        assert_eq!(value["projectID"], "p1");
        assert_eq!(value["projectCode"], "blueking");
        assert_eq!(value["businessID"], "42");
        assert_eq!(value["useBKRes"], true);
        assert_eq!(value["BGID"], "7");
        assert_eq!(value["deptName"], "dept");
    }

    #[test]
    fn already_exists_detection_is_case_insensitive() {
        assert!(is_already_exists("project already exists"));
        assert!(is_already_exists("Project Already Exists in db"));
        assert!(!is_already_exists("permission denied"));
    }
}
