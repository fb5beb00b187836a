// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

/// The result for fallible cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from a cache operation.
///
/// A cache error always means infrastructure failed: the remote store was
/// unreachable, a payload could not be encoded or decoded, or the caller's
/// fetch against the system of record failed. Legitimate absence is never an
/// error - every query returns `Ok(None)` for it - and neither is lock
/// contention, which the mutex strategy degrades to `Ok(None)` after its
/// bounded retries.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    Store(#[from] turnstile_store::Error),

    #[error("cache payload could not be encoded or decoded")]
    Codec(#[source] serde_json::Error),

    #[error("fetch against the system of record failed")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    pub(crate) fn codec(source: serde_json::Error) -> Self {
        Self(ErrorKind::Codec(source))
    }

    pub(crate) fn fetch(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(ErrorKind::Fetch(Box::new(source)))
    }
}

impl From<turnstile_store::Error> for Error {
    fn from(error: turnstile_store::Error) -> Self {
        Self(ErrorKind::Store(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_convert_transparently() {
        let error: Error = turnstile_store::Error::from_message("store down").into();
        assert!(format!("{error}").contains("store down"));
    }

    #[test]
    fn fetch_errors_keep_their_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "query timed out");
        let error = Error::fetch(cause);
        let source = std::error::Error::source(&error).expect("fetch cause is reachable");
        assert!(format!("{source}").contains("query timed out"));
    }
}
