// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for remote store operations.

/// An error from a remote store operation.
///
/// This is an opaque error type that wraps whatever transport or protocol
/// error the backend produced. A store error always means the store could not
/// be reached or refused the operation - legitimate absence of a key is never
/// an error, it is `Ok(None)`.
///
/// Use [`std::error::Error::source()`] to access the underlying cause if
/// needed.
///
/// # Examples
///
/// ```
/// use turnstile_store::Error;
///
/// let error = Error::from_message("connection refused");
/// assert!(error.to_string().contains("connection refused"));
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Creates a new error from a plain message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new error wrapping an underlying cause.
    ///
    /// The display message is taken from the cause; the cause itself remains
    /// reachable through [`std::error::Error::source()`].
    pub fn from_source(source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        let source = source.into();
        Self {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// A specialized [`Result`] type for remote store operations.
pub type Result<T> = std::result::Result<T, Error>;
