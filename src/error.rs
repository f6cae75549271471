/// Errors raised by the records client, the configuration loader and the
/// pipeline stages that call them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    /// A required identifier was absent; no request was sent.
    #[error("Missing required fields: {}", .missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request completed with a non-2xx status or an unusable body.
    #[error("{message}")]
    Response { status: u16, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    pub fn response(status: u16, message: impl Into<String>) -> Self {
        TrackerError::Response {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_missing_field() {
        let err = TrackerError::Validation {
            missing: vec!["termCode", "bannerId"],
        };
        assert_eq!(err.to_string(), "Missing required fields: termCode, bannerId");
    }

    #[test]
    fn response_message_is_shown_verbatim() {
        let err = TrackerError::response(404, "Student not found");
        assert_eq!(err.to_string(), "Student not found");
    }
}
