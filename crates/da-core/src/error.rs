use crate::model::WorkItemStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The token grant was rejected (bad credentials or scope).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A 403 on a bucket/object lookup: the key is held by another
    /// principal. Whether that is the only possible cause is unknown;
    /// the classification is kept distinct without assuming the root
    /// cause.
    #[error("resource conflict: {0}")]
    ResourceConflict(String),

    /// Any other non-2xx response or a network-level failure.
    /// `status` is None when the request never produced a response.
    #[error("transport error (status {status:?}): {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Missing/unreadable local input or a failed local write.
    #[error("local io error: {0}")]
    LocalIo(String),

    /// A work item reached a terminal non-success status.
    #[error("work item {id} ended with status {status}")]
    WorkItemFailure { id: String, status: WorkItemStatus },

    /// The submission argument map does not match the activity's
    /// parameter contract.
    #[error("argument map does not match activity contract: {0}")]
    ContractMismatch(String),
}

impl Error {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Transport {
            status,
            message: message.into(),
        }
    }

    /// True when this is a transport error carrying the given HTTP status.
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, Error::Transport { status: Some(s), .. } if *s == code)
    }
}
