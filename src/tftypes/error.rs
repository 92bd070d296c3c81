use thiserror::Error;

use super::AttributePath;

/// Errors raised while constructing, traversing, or encoding values.
#[derive(Debug, Error)]
pub enum Error {
    /// A type's JSON form could not be parsed.
    #[error("invalid type JSON: {0}")]
    InvalidType(String),

    /// A value did not conform to its type, or a path did not resolve.
    #[error("{}", at_path(.path, .message))]
    Value {
        /// Where in the value tree the problem was found.
        path: AttributePath,
        /// What was wrong.
        message: String,
    },

    /// The MessagePack payload was malformed.
    #[error("msgpack error: {0}")]
    MsgPack(String),

    /// The JSON payload was malformed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown values have no JSON representation.
    #[error("{}", at_path(.0, "unknown values cannot be encoded as JSON"))]
    UnknownInJson(AttributePath),

    /// The refinements of an unknown value did not fit in the wire limit.
    #[error("unknown value refinements are {size} bytes, the limit is {limit}")]
    RefinementsTooLarge {
        /// Encoded size after every degradation step.
        size: usize,
        /// The limit that was exceeded.
        limit: usize,
    },

    /// A MessagePack extension type other than the unknown-value marker.
    #[error("unsupported msgpack extension type {0}")]
    UnknownExtension(i8),
}

impl Error {
    pub(crate) fn value(path: &AttributePath, message: impl Into<String>) -> Self {
        Self::Value {
            path: path.clone(),
            message: message.into(),
        }
    }
}

fn at_path(path: &AttributePath, message: &str) -> String {
    if path.is_empty() {
        message.to_string()
    } else {
        format!("{}: {}", path, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_error_display() {
        let err = Error::value(&AttributePath::new(), "unexpected type");
        assert_eq!(err.to_string(), "unexpected type");

        let path = AttributePath::new()
            .with_attribute_name("tags")
            .with_element_key_string("env");
        let err = Error::value(&path, "unexpected type");
        assert_eq!(
            err.to_string(),
            "AttributeName(\"tags\").ElementKeyString(\"env\"): unexpected type"
        );
    }

    #[test]
    fn test_unknown_in_json_display() {
        let err = Error::UnknownInJson(AttributePath::new().with_attribute_name("id"));
        assert_eq!(
            err.to_string(),
            "AttributeName(\"id\"): unknown values cannot be encoded as JSON"
        );
    }
}
