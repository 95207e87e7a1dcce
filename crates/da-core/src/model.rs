use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Client credentials for the two-legged token grant. Never persisted
/// beyond the process lifetime.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// An authenticated session for one scope set. Immutable once issued;
/// renewing means authenticating again and getting a new value.
#[derive(Clone, Debug)]
pub struct Session {
    pub access_token: String,
    pub scopes: Vec<String>,
    pub issued_at: SystemTime,
}

/// Bucket retention policy, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    Transient,
    Temporary,
    Persistent,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Persistent
    }
}

/// How the holder of a signed URL will use it. Issuance is the same
/// either way; only the verb the caller applies differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Expiry and reuse policy for issued signed URLs. The service defaults
/// (45 minutes, single use) are unexplained upstream constants, so they
/// are configuration defaults rather than fixed values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedUrlPolicy {
    #[serde(default = "default_minutes_expiration")]
    pub minutes_expiration: u32,
    #[serde(default = "default_single_use")]
    pub single_use: bool,
}

fn default_minutes_expiration() -> u32 {
    45
}

fn default_single_use() -> bool {
    true
}

impl Default for SignedUrlPolicy {
    fn default() -> Self {
        Self {
            minutes_expiration: default_minutes_expiration(),
            single_use: default_single_use(),
        }
    }
}

/// A capability URL granting one read or write of one object.
#[derive(Clone, Debug)]
pub struct SignedUrl {
    pub url: String,
    pub direction: Direction,
}

/// Pre-signed multipart upload target returned by a package
/// create/version call. Tied to that specific version, single use.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadParameters {
    #[serde(rename = "endpointURL")]
    pub endpoint_url: String,
    #[serde(rename = "formData")]
    pub form_data: BTreeMap<String, String>,
}

/// Response shape shared by package/activity create and version calls.
/// The remote assigns the version; the caller never chooses it.
#[derive(Clone, Debug, Deserialize)]
pub struct VersionedResource {
    pub version: u64,
    #[serde(rename = "uploadParameters", default)]
    pub upload_parameters: Option<UploadParameters>,
}

/// Work-item status. `pending` and `inprogress` are the only
/// non-terminal states; `error` and `timeout` are synthetic local
/// classifications that never come from the remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemStatus {
    Pending,
    Inprogress,
    Success,
    Failed,
    Cancelled,
    /// Transport failure while polling.
    Error,
    /// Poll policy exhausted before a terminal remote status.
    Timeout,
}

impl WorkItemStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkItemStatus::Pending | WorkItemStatus::Inprogress)
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::Inprogress => "inprogress",
            WorkItemStatus::Success => "success",
            WorkItemStatus::Failed => "failed",
            WorkItemStatus::Cancelled => "cancelled",
            WorkItemStatus::Error => "error",
            WorkItemStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one work item. Immutable once produced.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub status: WorkItemStatus,
    pub report_url: Option<String>,
}
