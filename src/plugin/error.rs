use thiserror::Error;

use super::Diagnostics;

/// Errors raised while launching or talking to a provider plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to start plugin {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin exited before we could connect")]
    ExitedEarly,

    #[error("timeout while waiting for plugin to start")]
    StartTimeout,

    #[error("invalid plugin handshake {line:?}: {reason}")]
    Handshake { line: String, reason: String },

    #[error("failed to connect to plugin at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("plugin RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("msgpack encoding error: {0}")]
    Encoding(String),

    #[error("{0}")]
    Diagnostics(Diagnostics),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Diagnostic, Severity};

    #[test]
    fn test_handshake_error_display() {
        let err = PluginError::Handshake {
            line: "garbage".to_string(),
            reason: "expected 5 or 6 fields".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid plugin handshake \"garbage\": expected 5 or 6 fields"
        );
    }

    #[test]
    fn test_diagnostics_error_uses_diagnostic_text() {
        let diags = Diagnostics::from(vec![Diagnostic::error(
            "Invalid credentials",
            "no valid credential sources found",
        )]);
        let err = PluginError::Diagnostics(diags);
        assert_eq!(
            err.to_string(),
            "Invalid credentials: no valid credential sources found"
        );
        assert!(matches!(
            err,
            PluginError::Diagnostics(ref d) if d.iter().all(|d| d.severity == Severity::Error)
        ));
    }

    #[test]
    fn test_status_conversion() {
        let err: PluginError = tonic::Status::unavailable("socket closed").into();
        assert!(matches!(err, PluginError::Rpc(_)));
        assert!(err.to_string().contains("socket closed"));
    }
}
