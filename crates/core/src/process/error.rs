//! Error types for the process module.

use thiserror::Error;

/// Errors raised by [`ProcessExecutor`](super::ProcessExecutor).
///
/// A nonzero exit code is not an error; it is reported through
/// [`ExecutionOutcome::exit_code`](super::ExecutionOutcome::exit_code).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The binary does not exist.
    #[error("Command not found: {command}")]
    NotFound { command: String },

    /// The process could not be started for any other reason.
    #[error("Failed to spawn {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutorError {
    pub(crate) fn from_spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        let command = command.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { command }
        } else {
            Self::Spawn { command, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_mapped() {
        let err = ExecutorError::from_spawn(
            "nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(matches!(err, ExecutorError::NotFound { .. }));
        assert_eq!(err.to_string(), "Command not found: nope");
    }

    #[test]
    fn test_other_io_errors_keep_source() {
        let err = ExecutorError::from_spawn(
            "tool",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ExecutorError::Spawn { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
