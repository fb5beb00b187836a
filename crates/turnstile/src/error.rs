// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for the flash-sale service.

/// The result for fallible flash-sale operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from the flash-sale service.
///
/// Submission errors are always infrastructure errors: the remote store was
/// unreachable during the admission step, or the sequence generator could
/// not mint an order id. Business rejections (sold out, duplicate, closed,
/// busy) are [`Admission`](crate::Admission) outcomes, never errors.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    Store(#[from] turnstile_store::Error),

    #[error(transparent)]
    Sequence(#[from] turnstile_sequence::Error),
}

impl From<turnstile_store::Error> for Error {
    fn from(error: turnstile_store::Error) -> Self {
        Self(ErrorKind::Store(error))
    }
}

impl From<turnstile_sequence::Error> for Error {
    fn from(error: turnstile_sequence::Error) -> Self {
        Self(ErrorKind::Sequence(error))
    }
}
