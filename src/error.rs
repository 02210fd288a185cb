//! Client error taxonomy and create-failure classification.

use crate::process::{ProcessError, ProcessResult};
use crate::types::{ContainerId, ValidationError};
use std::path::PathBuf;
use std::sync::Arc;

/// Convenience result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the container runtime client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// No executable engine binary was found at startup. Fatal, not retried.
    #[error("no executable engine binary among candidates {candidates:?}")]
    BinaryNotFound {
        /// Candidate paths that were tried, in order
        candidates: Vec<PathBuf>,
    },

    /// The startup version query failed. Fatal: if a plain version query
    /// fails, later commands are unlikely to succeed.
    #[error("engine version query failed")]
    VersionQuery(#[source] ProcessError),

    /// A subprocess invocation failed (timeout, non-zero exit, or spawn
    /// failure).
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A failed create left a container behind that must still be removed.
    #[error("broken container {id} (exit status {status}): {message}")]
    BrokenContainer {
        /// Id of the orphaned container
        id: ContainerId,
        /// Human-readable engine output
        message: String,
        /// Exit status of the create command (125 or 127)
        status: i32,
    },

    /// A value failed validation at its construction point.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The engine reported no address for the container on the given
    /// network.
    #[error("no address for container {id} on network {network:?}")]
    AddressNotFound {
        /// Container that was inspected
        id: ContainerId,
        /// Network that was queried
        network: String,
    },

    /// A deduplicated pull that this caller joined failed.
    #[error("{0}")]
    Pull(Arc<ClientError>),

    /// The engine produced output the client could not interpret.
    #[error("unexpected engine output for {operation}: {output:?}")]
    UnexpectedOutput {
        /// Operation whose output could not be parsed
        operation: &'static str,
        /// The offending output
        output: String,
    },
}

/// Exit statuses after which the engine may still have created a container:
/// 125 is the daemon-reported error exit, 127 is command-not-found inside
/// the container.
const BROKEN_CONTAINER_STATUSES: [i32; 2] = [125, 127];

/// Classify a failed container-create invocation.
///
/// When the exit status indicates the daemon may have created the container
/// anyway and stdout parses as a container id, the failure becomes
/// [`ClientError::BrokenContainer`] so the caller knows an orphan must still
/// be removed. Every other failure propagates unchanged. Only the create
/// path applies this; other operations pass their failures through as-is.
pub(crate) fn classify_create_failure(err: ProcessError) -> ClientError {
    match err {
        ProcessError::Unsuccessful { result, command }
            if BROKEN_CONTAINER_STATUSES.contains(&result.status) =>
        {
            match ContainerId::parse(&result.stdout) {
                Ok(id) => ClientError::BrokenContainer {
                    id,
                    message: broken_message(&result),
                    status: result.status,
                },
                Err(_) => ClientError::Process(ProcessError::Unsuccessful { result, command }),
            }
        }
        other => ClientError::Process(other),
    }
}

fn broken_message(result: &ProcessResult) -> String {
    let stderr = result.stderr.trim();
    if stderr.is_empty() {
        format!("create exited with status {}", result.status)
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_ID: &str = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";

    fn unsuccessful(status: i32, stdout: &str, stderr: &str) -> ProcessError {
        ProcessError::Unsuccessful {
            result: ProcessResult {
                status,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            command: "docker run".to_string(),
        }
    }

    #[test]
    fn test_exit_125_with_id_is_broken_container() {
        let classified = classify_create_failure(unsuccessful(125, HEX_ID, "oci runtime error"));
        match classified {
            ClientError::BrokenContainer { id, message, status } => {
                assert_eq!(id.as_str(), HEX_ID);
                assert_eq!(status, 125);
                assert_eq!(message, "oci runtime error");
            }
            other => panic!("expected BrokenContainer, got {other:?}"),
        }
    }

    #[test]
    fn test_exit_127_with_id_is_broken_container() {
        let classified = classify_create_failure(unsuccessful(127, &format!("{HEX_ID}\n"), ""));
        assert!(matches!(
            classified,
            ClientError::BrokenContainer { status: 127, .. }
        ));
    }

    #[test]
    fn test_exit_125_without_id_propagates_unchanged() {
        let classified = classify_create_failure(unsuccessful(125, "garbage output", "err"));
        match classified {
            ClientError::Process(ProcessError::Unsuccessful { result, .. }) => {
                assert_eq!(result.status, 125);
                assert_eq!(result.stdout, "garbage output");
            }
            other => panic!("expected original failure, got {other:?}"),
        }
    }

    #[test]
    fn test_other_statuses_propagate_unchanged() {
        let classified = classify_create_failure(unsuccessful(1, HEX_ID, ""));
        assert!(matches!(classified, ClientError::Process(_)));
    }

    #[test]
    fn test_timeout_propagates_unchanged() {
        let err = ProcessError::Timeout {
            timeout: std::time::Duration::from_secs(60),
            command: "docker run".to_string(),
        };
        assert!(matches!(
            classify_create_failure(err),
            ClientError::Process(ProcessError::Timeout { .. })
        ));
    }
}
