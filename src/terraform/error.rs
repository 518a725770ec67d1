use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or interpreting a Terraform state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed loading statefile: {0}")]
    Open(#[source] std::io::Error),

    #[error("failed reading {} as a statefile: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported state file format version {0}")]
    UnsupportedVersion(u64),

    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid resource mode {0:?}")]
    InvalidMode(String),

    #[error("duplicate current object for {0}")]
    DuplicateInstance(String),
}
