use serde::{Deserialize, Serialize};

/// The failure classes an operation of this library can report. Every kind is
/// terminal for the triggering call; none of them describes a transient
/// condition worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A request carried missing or nonsensical fields.
    Validation,
    /// A document or signature id did not resolve to a record.
    NotFound,
    /// The acting user does not own the resource.
    Unauthorized,
    /// The stored bytes do not form a parseable PDF.
    MalformedInput,
    /// A signing link token is past its embedded expiry.
    Expired,
    /// A signing link token is malformed or its signature does not verify.
    InvalidToken,
    /// Reading or writing persistent state failed.
    Storage,
    /// A transform was invoked before the preview layout was measured.
    Precondition,
    /// A status update targeted a record already in a terminal state.
    Conflict,
}

/// A struct that represents an error with a kind, a context and possibly the
/// propagated source error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SigningError {
    pub kind: ErrorKind,
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for SigningError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for SigningError {}

impl SigningError {
    /// Create a new `SigningError` with the given kind and context.
    pub fn with_context<S: Into<String>>(kind: ErrorKind, context: S) -> SigningError {
        SigningError {
            kind,
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `SigningError` with the given kind, context and source error.
    pub fn with_error<S: Into<String>>(
        kind: ErrorKind,
        context: S,
        error: &dyn std::error::Error,
    ) -> SigningError {
        SigningError {
            kind,
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }

    /// The failure class of this error, for callers that dispatch on it.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}
