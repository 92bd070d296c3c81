//! Errors returned by provider handlers.
//!
//! Handler failures that should reach the host as user-facing problems belong
//! in response diagnostics. A [`ProviderError`] aborts the RPC instead: the
//! server turns it into a [`tonic::Status`] with a code per variant.

use thiserror::Error;

/// Failure of a [`ProviderService`](crate::ProviderService) handler.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested object was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request data was rejected by the provider.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The provider process is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request named a resource, data source, or other type the provider
    /// does not have.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A JSON payload could not be handled.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value did not match its type or could not be encoded.
    #[error("Value error: {0}")]
    Value(#[from] crate::tftypes::Error),

    /// A backing API is temporarily out of reach.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The provider is not in a state to serve the request.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The provider does not implement this operation.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// The host sent a malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The server was stopped while the request was in flight.
    #[error("Canceled: {0}")]
    Canceled(String),
}

impl ProviderError {
    /// The message carried by the error, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Serialization(_) => "serialization error (see Debug output)",
            Self::Value(_) => "value error (see Debug output)",
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Internal(msg)
            | Self::Configuration(msg)
            | Self::UnknownType(msg)
            | Self::Unavailable(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg)
            | Self::InvalidRequest(msg)
            | Self::Canceled(msg) => msg,
        }
    }

    /// Error for an operation the provider does not support.
    pub fn unimplemented(rpc: &str) -> Self {
        Self::Unimplemented(format!("{} is not supported by this provider", rpc))
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        use tonic::Status;

        match err {
            ProviderError::NotFound(msg) | ProviderError::UnknownType(msg) => Status::not_found(msg),
            ProviderError::Validation(msg) | ProviderError::InvalidRequest(msg) => {
                Status::invalid_argument(msg)
            },
            ProviderError::Configuration(msg) | ProviderError::FailedPrecondition(msg) => {
                Status::failed_precondition(msg)
            },
            ProviderError::Internal(msg) => Status::internal(msg),
            ProviderError::Serialization(err) => {
                Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Value(err) => Status::invalid_argument(format!("Value error: {}", err)),
            ProviderError::Unavailable(msg) => Status::unavailable(msg),
            ProviderError::Unimplemented(msg) => Status::unimplemented(msg),
            ProviderError::Canceled(msg) => Status::cancelled(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftypes::{Type, Value};

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("instance i-123".to_string());
        assert_eq!(format!("{}", err), "Not found: instance i-123");

        let err = ProviderError::UnknownType("examplecloud_thing".to_string());
        assert_eq!(format!("{}", err), "Unknown type: examplecloud_thing");

        let err = ProviderError::Canceled("server stopped".to_string());
        assert_eq!(format!("{}", err), "Canceled: server stopped");
    }

    #[test]
    fn test_error_to_status() {
        let cases = [
            (ProviderError::NotFound("x".into()), tonic::Code::NotFound),
            (ProviderError::Validation("x".into()), tonic::Code::InvalidArgument),
            (ProviderError::Configuration("x".into()), tonic::Code::FailedPrecondition),
            (ProviderError::Internal("x".into()), tonic::Code::Internal),
            (ProviderError::UnknownType("x".into()), tonic::Code::NotFound),
            (ProviderError::Unavailable("x".into()), tonic::Code::Unavailable),
            (ProviderError::FailedPrecondition("x".into()), tonic::Code::FailedPrecondition),
            (ProviderError::Unimplemented("x".into()), tonic::Code::Unimplemented),
            (ProviderError::InvalidRequest("x".into()), tonic::Code::InvalidArgument),
            (ProviderError::Canceled("x".into()), tonic::Code::Cancelled),
        ];
        for (err, code) in cases {
            let status: tonic::Status = err.into();
            assert_eq!(status.code(), code);
            assert_eq!(status.message(), "x");
        }
    }

    #[test]
    fn test_value_error_conversion() {
        let err = Value::from_msgpack(&[0xc3], &Type::String).unwrap_err();
        let err: ProviderError = err.into();
        assert_eq!(err.message(), "value error (see Debug output)");

        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().starts_with("Value error: "));
    }

    #[test]
    fn test_unimplemented_helper() {
        let err = ProviderError::unimplemented("ListResource");
        assert_eq!(err.message(), "ListResource is not supported by this provider");
    }

    #[test]
    fn test_message_strips_prefix() {
        let err = ProviderError::Configuration("missing region".to_string());
        assert_eq!(err.message(), "missing region");
        assert_eq!(err.to_string(), "Configuration error: missing region");
    }
}
