//! Status and error types shared by every simstub component.
//!
//! - [`Status`]: successful outcomes, including the idempotent [`Status::Already`].
//! - [`StubError`]: failures returned by queues, registries, the dispatcher and managers.
//! - [`ErrorCode`]: operation result handed to application callbacks.
//!
//! `StubError` provides helper methods (`as_label`, `as_message`) for logs and
//! runtime events, mirroring the error types of the rest of the runtime.

use thiserror::Error;

/// Successful outcome of a registration-style call.
///
/// `Already` is **not** an error: registering something twice is idempotent and
/// callers usually treat both variants the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The call changed state.
    Success,
    /// Nothing to do, the requested state already held.
    Already,
}

impl Status {
    /// Returns `true` for [`Status::Already`].
    #[inline]
    pub fn is_already(self) -> bool {
        matches!(self, Status::Already)
    }
}

/// # Errors produced by the manager-stub runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StubError {
    /// The referenced subscription, listener or filter key does not exist.
    ///
    /// Distinguishes "nothing to do" from a real failure; managers often treat it
    /// as non-fatal.
    #[error("no such subscription")]
    NoSuch,

    /// The manager is not in the AVAILABLE state.
    #[error("service not ready")]
    NotReady,

    /// Generic failure (transport error, no runtime to host a worker, ...).
    #[error("operation failed: {reason}")]
    Failed {
        /// Human-readable failure description.
        reason: String,
    },

    /// Invalid input (empty mask on deregister, dead listener, bad segment info).
    #[error("invalid parameter: {reason}")]
    InvalidParam {
        /// What was wrong with the input.
        reason: String,
    },

    /// The component is shutting down and accepts no new work.
    #[error("not allowed: shutting down")]
    NotAllowed,
}

impl StubError {
    /// Shorthand for [`StubError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        StubError::Failed {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`StubError::InvalidParam`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        StubError::InvalidParam {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use simstub::StubError;
    ///
    /// assert_eq!(StubError::NoSuch.as_label(), "no_such");
    /// assert_eq!(StubError::failed("grpc down").as_label(), "failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StubError::NoSuch => "no_such",
            StubError::NotReady => "not_ready",
            StubError::Failed { .. } => "failed",
            StubError::InvalidParam { .. } => "invalid_param",
            StubError::NotAllowed => "not_allowed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StubError::NoSuch => "no such subscription".to_string(),
            StubError::NotReady => "service not ready".to_string(),
            StubError::Failed { reason } => format!("failed: {reason}"),
            StubError::InvalidParam { reason } => format!("invalid param: {reason}"),
            StubError::NotAllowed => "not allowed: shutting down".to_string(),
        }
    }

    /// Indicates whether the error only means "nothing was registered".
    ///
    /// Managers use this to treat a missing optional subscription as success.
    pub fn is_no_such(&self) -> bool {
        matches!(self, StubError::NoSuch)
    }
}

/// Convenience alias used across the crate.
pub type StubResult<T> = Result<T, StubError>;

/// Result code delivered to application callbacks.
///
/// The transport reports one of these per request; the runtime never interprets
/// it beyond forwarding it to the terminal callback of the operation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCode {
    #[default]
    Success,
    GenericFailure,
    NotReady,
    InvalidArguments,
    NoMemory,
    InternalError,
    RequestNotSupported,
    Timeout,
}

impl ErrorCode {
    /// Returns `true` for [`ErrorCode::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl From<&StubError> for ErrorCode {
    fn from(err: &StubError) -> Self {
        match err {
            StubError::NotReady => ErrorCode::NotReady,
            StubError::InvalidParam { .. } => ErrorCode::InvalidArguments,
            StubError::NoSuch | StubError::Failed { .. } | StubError::NotAllowed => {
                ErrorCode::GenericFailure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(StubError::NotReady.as_label(), "not_ready");
        assert_eq!(StubError::invalid("empty mask").as_label(), "invalid_param");
        assert_eq!(StubError::NotAllowed.as_label(), "not_allowed");
    }

    #[test]
    fn message_carries_reason() {
        let err = StubError::failed("no tokio runtime");
        assert!(err.as_message().contains("no tokio runtime"));
        assert!(err.to_string().contains("no tokio runtime"));
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(ErrorCode::from(&StubError::NotReady), ErrorCode::NotReady);
        assert_eq!(
            ErrorCode::from(&StubError::invalid("x")),
            ErrorCode::InvalidArguments
        );
        assert_eq!(ErrorCode::from(&StubError::NoSuch), ErrorCode::GenericFailure);
        assert!(ErrorCode::default().is_success());
    }

    #[test]
    fn already_is_not_an_error() {
        assert!(Status::Already.is_already());
        assert!(!Status::Success.is_already());
    }
}
