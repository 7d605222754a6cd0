//! SVM transaction results and validation.
//!
//! This crate provides the types returned by the Cuttle harness when a
//! transaction is sent or simulated, along with a small validation toolkit
//! for asserting on them in tests.
//!
//! # Core Types
//!
//! * [`TransactionMetadata`] - Execution details of a transaction
//! * [`FailedTransaction`] - The error kind plus the metadata captured up to
//!   the point of failure
//! * [`TransactionResult`] - `Result<TransactionMetadata, FailedTransaction>`
//!
//! # Validation
//!
//! * [`Check`] - Validate individual transaction results
//! * [`Config`] - Configuration for validation behavior
//! * [`CheckContext`] - Context trait for rent and account lookups
//!
//! # Example
//!
//! ```rust,ignore
//! use cuttle_svm_result::{Check, Config, RunChecks};
//!
//! let result = cuttle.send_transaction(transaction);
//! let checks = vec![Check::success(), Check::compute_units(150)];
//!
//! result.run_checks(&checks, &Config::default(), &cuttle);
//! ```

pub mod check;
pub mod config;
pub mod types;

pub use {
    check::{AccountCheckBuilder, Check, RunChecks},
    config::{CheckContext, Config},
    types::{
        FailedTransaction, ReturnData, TransactionMetadata, TransactionResult,
        TransactionResultExt,
    },
};
