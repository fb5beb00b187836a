// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Flash-sale admission pipeline with exactly-once inventory decrement.
//!
//! This crate coordinates limited-stock sales ("flash sales") under high
//! concurrent contention. The hot path never touches the slow system of
//! record: eligibility, remaining stock, and duplicate-purchase rejection
//! are decided by one atomic operation at the remote store, which serializes
//! all concurrent attempts for the same voucher. Admitted purchases get a
//! time-ordered order id immediately and are persisted asynchronously by a
//! single serialized worker.
//!
//! ```text
//! caller ──> FlashSale::submit ──> atomic admission at the store
//!                                   │ admitted
//!                                   ▼
//!                            mint order id ──> bounded queue ──> optimistic ack
//!                                                   │
//!                                                   ▼ (background)
//!                              order worker: per-user lock, idempotency
//!                              re-check, conditional decrement, persist
//! ```
//!
//! The pieces, each usable on its own:
//!
//! - [`FlashSale`]: the service - staging, submission, worker lifecycle.
//! - [`Admission`]: the submission outcome; rejections are values, not
//!   errors, and an admitted ack is provisional until the worker persists.
//! - [`SystemOfRecord`]: the collaborator interface the worker persists
//!   through; implement it over your durable storage.
//! - [`Order`] / [`OrderTask`]: the records flowing through the pipeline.
//!
//! Related concerns live in sibling crates: the cache-aside strategies in
//! `turnstile_cache`, the lease lock in `turnstile_lock`, id minting in
//! `turnstile_sequence`, and the store abstraction (plus its Redis backend)
//! in `turnstile_store` / `turnstile_store_redis`.

mod admission;
mod error;
mod order;
mod service;
mod sor;
mod worker;

pub use admission::Admission;
pub use error::{Error, Result};
pub use order::{Order, OrderTask};
pub use service::{FlashSale, FlashSaleBuilder};
pub use sor::SystemOfRecord;
