//! Errors returned by the Cuttle SVM harness.
//!
//! Two families live here:
//!
//! * [`TransactionError`](error::TransactionError) - every way a transaction
//!   can be rejected or fail while moving through the processing pipeline.
//! * [`CuttleError`](error::CuttleError) and
//!   [`DeployError`](error::DeployError) - failures of the harness-level
//!   operations that sit outside the pipeline, such as overwriting accounts
//!   or deploying programs.
//!
//! None of these are fatal to a harness instance. A failed transaction never
//! leaves partial writes behind, so callers are free to retry.

pub mod error;
