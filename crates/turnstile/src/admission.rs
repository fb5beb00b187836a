// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Admission outcomes.

use turnstile_store::AdmitCode;

/// The outcome of one flash-sale submission.
///
/// Everything except [`Admission::Admitted`] is an expected business
/// rejection, not an error. An admitted outcome is *provisional*: the order
/// id is minted and the persistence task enqueued, but the order is not yet
/// durable when the caller sees it - callers needing certainty must confirm
/// the order's existence independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The caller won a unit of stock; the order will be persisted
    /// asynchronously under the returned id.
    Admitted {
        /// The minted order identifier.
        order_id: i64,
    },
    /// No stock remains.
    SoldOut,
    /// The caller already bought this voucher.
    Duplicate,
    /// The sale window is not open (not started, already over, or the sale
    /// was never staged).
    Closed,
    /// The order queue is at capacity; the service is shedding load and the
    /// caller's purchase marker remains in place.
    Busy,
}

impl Admission {
    pub(crate) fn rejected(code: AdmitCode) -> Option<Self> {
        match code {
            AdmitCode::Admitted => None,
            AdmitCode::SoldOut => Some(Self::SoldOut),
            AdmitCode::Duplicate => Some(Self::Duplicate),
            AdmitCode::Closed => Some(Self::Closed),
        }
    }

    /// Returns the minted order id for an admitted outcome.
    #[must_use]
    pub fn order_id(&self) -> Option<i64> {
        match self {
            Self::Admitted { order_id } => Some(*order_id),
            _ => None,
        }
    }
}
