use thiserror::Error as ThisError;

/// Every anticipated translation failure. Translators return these instead of
///  panicking, and never hand back a partially built command alongside one.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{domain} translator does not support {feature}")]
    UnsupportedCommand { domain: String, feature: String },

    #[error("Operator {operator} has no {syntax} rendering")]
    UnsupportedOperator { operator: String, syntax: String },

    #[error("Malformed expression: {0}")]
    MalformedExpression(String),

    #[error("Entity could not be serialized: {0}")]
    Serialization(String),

    #[error("No translator registered for domain {0}")]
    UnknownDomain(String),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedExpression(msg.into())
    }

    pub(crate) fn unsupported(domain: &str, feature: impl Into<String>) -> Self {
        Self::UnsupportedCommand {
            domain: domain.to_string(),
            feature: feature.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
