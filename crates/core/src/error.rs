/// Failure reported by a backend collaborator: a human-readable message and,
/// when available, the underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Failure {
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_is_the_message_and_source_is_the_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let failure = Failure::with_cause("network error", io);
        assert_eq!(failure.to_string(), "network error");
        assert_eq!(failure.source().map(|s| s.to_string()).as_deref(), Some("refused"));
    }

    #[test]
    fn plain_failure_has_no_cause() {
        let failure = Failure::new("boom");
        assert!(failure.cause().is_none());
        assert_eq!(failure.message(), "boom");
    }
}
