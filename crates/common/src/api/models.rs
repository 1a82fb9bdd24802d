//! Resource representations returned by the Presentation API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::storage::S3Location;

/// A repository container, or a shallow child listing entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(rename = "@id", alias = "id", default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub binaries: Vec<Binary>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// A stored binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binary {
    #[serde(rename = "@id", alias = "id", default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Version information of a preserved archival group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectVersion {
    #[serde(default)]
    pub ocfl_version: Option<String>,
    #[serde(default)]
    pub mementor_timestamp: Option<String>,
}

/// A versioned, preserved object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalGroup {
    #[serde(rename = "@id", alias = "id", default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<ObjectVersion>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub binaries: Vec<Binary>,
}

/// A deposit: staging space backed by object storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    #[serde(rename = "@id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub archival_group: Option<String>,
    #[serde(default)]
    pub archival_group_name: Option<String>,
    /// `s3://` location of the working files
    pub files: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submission_text: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub preserved: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub lock_date: Option<DateTime<Utc>>,
}

impl Deposit {
    /// Trailing identifier segment of the deposit URI
    pub fn short_id(&self) -> &str {
        self.id.trim_end_matches('/').rsplit('/').next().unwrap_or(&self.id)
    }

    pub fn handle(&self) -> Result<DepositHandle> {
        Ok(DepositHandle {
            id: self.short_id().to_string(),
            uri: self.id.clone(),
            files: S3Location::parse(&self.files)?,
        })
    }
}

/// Scenario-local record of a deposit, torn down at scenario end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositHandle {
    pub id: String,
    pub uri: String,
    pub files: S3Location,
}

/// Body of `POST /deposits`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeposit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archival_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archival_group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_text: Option<String>,
}

/// Body of `PATCH /deposits/{id}`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archival_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archival_group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_text: Option<String>,
}

/// A file or directory to record in a deposit's METS
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetsItem {
    /// Path relative to the deposit root, e.g. `objects/a.txt`
    pub local_path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl MetsItem {
    pub fn file(local_path: &str, content_type: &str, digest: Option<String>, size: u64) -> Self {
        Self {
            local_path: local_path.to_string(),
            name: leaf_name(local_path),
            content_type: Some(content_type.to_string()),
            digest,
            size: Some(size),
        }
    }

    pub fn directory(local_path: &str) -> Self {
        Self {
            local_path: local_path.to_string(),
            name: leaf_name(local_path),
            content_type: None,
            digest: None,
            size: None,
        }
    }
}

fn leaf_name(path: &str) -> String {
    path.trim_matches('/').rsplit('/').next().unwrap_or_default().to_string()
}

/// Computed difference between a deposit and the last preserved version.
///
/// Fields the harness does not inspect are kept verbatim so the diff can be
/// posted back unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    #[serde(default)]
    pub containers_to_add: Vec<Value>,
    #[serde(default)]
    pub binaries_to_add: Vec<Value>,
    #[serde(default)]
    pub containers_to_delete: Vec<Value>,
    #[serde(default)]
    pub binaries_to_delete: Vec<Value>,
    #[serde(default)]
    pub binaries_to_patch: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImportJob {
    pub fn is_empty(&self) -> bool {
        self.containers_to_add.is_empty()
            && self.binaries_to_add.is_empty()
            && self.containers_to_delete.is_empty()
            && self.binaries_to_delete.is_empty()
            && self.binaries_to_patch.is_empty()
    }
}

/// Status of an executed import job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobResult {
    #[serde(rename = "@id", alias = "id")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub archival_group: Option<String>,
    #[serde(default)]
    pub new_version: Option<String>,
}
