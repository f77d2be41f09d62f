/// Parameter kind reported when an email template name cannot be resolved.
pub const EMAIL_TEMPLATE_TYPE: &str = "emailTemplateType";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid value {value} for parameter {kind}")]
    InvalidParameterValue { value: String, kind: &'static str },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable error code echoed back to callers in error replies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "invalidRequestData",
            CoreError::InvalidParameterValue { .. } => "invalidParameterValue",
            CoreError::MissingField(_) => "mandatoryParamsMissing",
            CoreError::Internal(_) => "internalError",
        }
    }

    /// Whether the error was caused by the caller's data rather than the system.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CoreError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_value_carries_offending_value() {
        let err = CoreError::InvalidParameterValue {
            value: "batchMentorEnrol".to_string(),
            kind: EMAIL_TEMPLATE_TYPE,
        };
        assert_eq!(
            err.to_string(),
            "Invalid value batchMentorEnrol for parameter emailTemplateType"
        );
        assert_eq!(err.code(), "invalidParameterValue");
        assert!(err.is_client_error());
    }

    #[test]
    fn internal_is_not_a_client_error() {
        assert!(!CoreError::Internal("boom".into()).is_client_error());
    }
}
