//! Failure kinds of the inference gateway.
//!
//! Each variant is fatal for the attempt that produced it. The retry
//! wrapper swallows all but the last one; the recognizer reports the last
//! one wrapped in [`GatewayError::ExhaustedRetries`].

use bubble_contracts::words::UnknownWord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownWord,
    SchemaMismatch,
    MalformedResponse,
    TransportFailure,
    Credential,
    ExhaustedRetries,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A surface form that the word table does not know.
    #[error("unknown word '{0}'")]
    UnknownWord(String),

    /// The upstream reply does not have the provider's documented shape.
    #[error("{provider} response schema mismatch: {message}")]
    SchemaMismatch { provider: String, message: String },

    /// The model answered but no guess could be extracted.
    #[error("malformed model answer: {message}")]
    MalformedResponse { message: String, answer: String },

    /// Connection, I/O or HTTP status failure.
    #[error("transport failure ({url}): {message}")]
    TransportFailure {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// No API key could be resolved.
    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        operation: String,
        attempts: usize,
        #[source]
        last_error: Box<GatewayError>,
    },
}

impl GatewayError {
    pub fn schema(provider: &str, message: impl Into<String>) -> Self {
        GatewayError::SchemaMismatch {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        GatewayError::TransportFailure {
            url: url.to_string(),
            status: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::UnknownWord(_) => ErrorKind::UnknownWord,
            GatewayError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            GatewayError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            GatewayError::TransportFailure { .. } => ErrorKind::TransportFailure,
            GatewayError::Credential(_) => ErrorKind::Credential,
            GatewayError::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
        }
    }

    /// Kind of the innermost error, looking through retry exhaustion.
    pub fn last_kind(&self) -> ErrorKind {
        match self {
            GatewayError::ExhaustedRetries { last_error, .. } => last_error.last_kind(),
            other => other.kind(),
        }
    }
}

impl From<UnknownWord> for GatewayError {
    fn from(err: UnknownWord) -> Self {
        GatewayError::UnknownWord(err.0)
    }
}

#[cfg(test)]
mod tests {
    use bubble_contracts::words::UnknownWord;

    use super::{ErrorKind, GatewayError};

    #[test]
    fn exhausted_retries_carries_last_kind() {
        let err = GatewayError::ExhaustedRetries {
            operation: "recognition".to_string(),
            attempts: 3,
            last_error: Box::new(GatewayError::schema("openai_chat", "two choices")),
        };
        assert_eq!(err.kind(), ErrorKind::ExhaustedRetries);
        assert_eq!(err.last_kind(), ErrorKind::SchemaMismatch);
        assert_eq!(
            err.to_string(),
            "recognition failed after 3 attempts: openai_chat response schema mismatch: two choices"
        );
    }

    #[test]
    fn unknown_word_converts_from_index_error() {
        let err: GatewayError = UnknownWord("Spaceship".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::UnknownWord);
        assert_eq!(err.to_string(), "unknown word 'Spaceship'");
    }
}
