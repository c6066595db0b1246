//! Error types shared by the vcqueue crates
//!
//! Errors carry the resource they concern so that the retry decision and the
//! Warning event emitted on a dropped request can say what failed.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for queue controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The referenced object no longer exists
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (Queue, Command, ...)
        kind: String,
        /// Resource name, `namespace/name` for namespaced kinds
        name: String,
    },

    /// A Queue declares a state the state machine has no handler for
    #[error("queue {queue} state {state} is invalid")]
    InvalidState {
        /// Name of the queue
        queue: String,
        /// The unrecognized state as observed
        state: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "index", "watcher")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for the given kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an invalid-state error for a queue
    pub fn invalid_state(queue: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState {
            queue: queue.into(),
            state: state.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Whether the error means the object is already gone.
    ///
    /// Covers both the explicit [`Error::NotFound`] variant and a 404 returned
    /// by the API server.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Whatever".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_variant_is_not_found() {
        let err = Error::not_found("Queue", "default");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Queue default not found");
    }

    #[test]
    fn api_404_is_not_found() {
        let err = Error::from(api_error(404));
        assert!(err.is_not_found());
    }

    #[test]
    fn other_api_errors_are_not_not_found() {
        assert!(!Error::from(api_error(409)).is_not_found());
        assert!(!Error::from(api_error(500)).is_not_found());
        assert!(!Error::internal("x").is_not_found());
    }

    #[test]
    fn invalid_state_names_queue_and_state() {
        let err = Error::invalid_state("research", "Draining");
        assert_eq!(err.to_string(), "queue research state Draining is invalid");
    }

    #[test]
    fn internal_error_formats_context() {
        let err = Error::internal("stream ended");
        assert_eq!(err.to_string(), "internal error [unknown]: stream ended");
    }
}
