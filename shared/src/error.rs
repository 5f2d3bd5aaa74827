//! Error taxonomy of the task framework
//!
//! Every lifecycle, mailbox, routing, subscription and publishing operation
//! reports failures as a [`FrameworkError`]. Only [`FrameworkError::Fatal`]
//! stops the node; every other class is logged and processing continues.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameworkError {
    /// A required capability could not be brought up; startup must abort
    #[error("fatal: {0}")]
    Fatal(String),

    /// The operation may succeed later (queue full, transport not connected)
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    /// A command parameter was malformed or out of range
    #[error("invalid parameter: {0}")]
    Validation(String),

    /// Unknown activity, topic or command name
    #[error("not found: {0}")]
    NotFound(String),

    /// The activity has not been initialised yet
    #[error("not initialised: {0}")]
    NotInitialized(String),
}

pub type FrameworkResult<T = ()> = Result<T, FrameworkError>;

impl FrameworkError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::NotInitialized(message.into())
    }

    /// Short stable label for log fields
    pub fn as_label(&self) -> &'static str {
        match self {
            FrameworkError::Fatal(_) => "fatal",
            FrameworkError::Transient(_) => "transient",
            FrameworkError::Validation(_) => "validation",
            FrameworkError::NotFound(_) => "not_found",
            FrameworkError::NotInitialized(_) => "not_initialized",
        }
    }

    /// Whether retrying later can succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(self, FrameworkError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameworkError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(FrameworkError::transient("queue full").as_label(), "transient");
        assert_eq!(FrameworkError::not_found("FOO").as_label(), "not_found");
        assert_eq!(
            FrameworkError::not_initialized("Sensor").as_label(),
            "not_initialized"
        );
    }

    #[test]
    fn test_classification() {
        assert!(FrameworkError::transient("x").is_transient());
        assert!(!FrameworkError::validation("x").is_transient());
        assert!(FrameworkError::fatal("x").is_fatal());
    }

    #[test]
    fn test_display_carries_message() {
        let err = FrameworkError::validation("1 is below minimum 5000");
        assert_eq!(err.to_string(), "invalid parameter: 1 is below minimum 5000");
    }
}
