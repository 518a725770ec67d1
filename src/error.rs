use thiserror::Error;

use crate::providers::ProviderError;
use crate::terraform::StateError;

/// Fatal errors of a sweep run. Per-resource import failures are not errors;
/// they end up in the sweep report instead.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to load Terraform AWS resource provider")]
    LoadProvider(#[source] ProviderError),

    #[error("failed to configure Terraform provider")]
    Configure(#[source] ProviderError),

    #[error("failed to read tfstate from local file")]
    ReadState(#[source] StateError),

    #[error("failed to render report: {0}")]
    Report(#[from] serde_json::Error),
}
