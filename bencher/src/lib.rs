//! The Cuttle Compute Unit Bencher can be used to benchmark the compute unit
//! usage of transactions against a Cuttle harness. It provides a simple API
//! for developers to write benchmarks for their programs, or to compare
//! several configurations of a harness in a matrix, which can be checked
//! while making changes to a program.
//!
//! A markdown file is generated, which captures all of the compute unit
//! benchmarks. If a benchmark has a previous value, the delta is also
//! recorded. The latest numbers are also written as JSON for tooling.
//!
//! Benches are simulated, so every bench runs against the same state and the
//! harness is left untouched.
//!
//! ```rust,ignore
//! use {
//!     cuttle_svm_bencher::CuttleComputeUnitBencher,
//!     cuttle_svm::Cuttle,
//!     /* ... */
//! };
//!
//! // Optionally disable logging.
//! solana_logger::setup_with("");
//!
//! /* Harness & transaction setup ... */
//!
//! CuttleComputeUnitBencher::new(cuttle)
//!     .bench(("bench0", &transaction0))
//!     .bench(("bench1", &transaction1))
//!     .must_pass(true)
//!     .out_dir("../target/benches")
//!     .execute()?;
//! ```
//!
//! The `must_pass` argument can be provided to trigger a panic if any defined
//! benchmark transactions fail. `out_dir` specifies the directory where the
//! markdown and JSON files will be written.
//!
//! ```markdown
//! | Name   | CUs   | Delta  |
//! |--------|-------|--------|
//! | bench0 | 450   | --     |
//! | bench1 | 579   | -129   |
//! ```
//!
//! ### Matrix Benchmarking
//!
//! `CuttleComputeUnitMatrixBencher` runs the same transactions against
//! several harnesses, for example one per build of a program deployed at the
//! same address, and writes a table with one column per harness. Every
//! harness starts from the same genesis blockhash, so a transaction signed
//! for one is valid for all of them.
//!
//! ```rust,ignore
//! CuttleComputeUnitMatrixBencher::new()
//!     .harness("v1", &cuttle_v1)
//!     .harness("v2", &cuttle_v2)
//!     .bench(("bench0", &transaction0))
//!     .execute()?;
//! ```

pub mod result;

use {
    chrono::Utc,
    cuttle_svm::{result::TransactionResult, Cuttle},
    result::{
        mx_write_results, write_results, ComputeUnitBenchResult, ComputeUnitMatrixBenchResult,
    },
    solana_transaction::Transaction,
    std::{io, path::PathBuf},
};

/// A bench is a tuple of a name and a transaction.
pub type Bench<'a> = (&'a str, &'a Transaction);

const CUTTLE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn default_out_dir() -> PathBuf {
    let mut out_dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_default();
    out_dir.push("benches");
    out_dir
}

fn check_must_pass(must_pass: bool, name: &str, result: &TransactionResult) {
    if let Err(failed) = result {
        if must_pass {
            panic!("Bench `{name}` failed, but `must_pass` was set. Error: {failed}");
        }
        log::warn!("bench `{name}` failed: {}", failed.err);
    }
}

/// Cuttle's compute unit bencher.
///
/// Allows developers to bench test compute unit usage on their programs.
pub struct CuttleComputeUnitBencher<'a> {
    benches: Vec<Bench<'a>>,
    cuttle: Cuttle,
    must_pass: bool,
    out_dir: PathBuf,
}

impl<'a> CuttleComputeUnitBencher<'a> {
    /// Create a new bencher, to which benches and configurations can be added.
    pub fn new(cuttle: Cuttle) -> Self {
        Self {
            benches: Vec::new(),
            cuttle,
            must_pass: false,
            out_dir: default_out_dir(),
        }
    }

    /// Add a bench to the bencher.
    pub fn bench(mut self, bench: Bench<'a>) -> Self {
        self.benches.push(bench);
        self
    }

    /// Set whether the bencher should panic if a transaction fails.
    pub const fn must_pass(mut self, must_pass: bool) -> Self {
        self.must_pass = must_pass;
        self
    }

    /// Set the output directory for the results.
    pub fn out_dir(mut self, out_dir: &str) -> Self {
        self.out_dir = PathBuf::from(out_dir);
        self
    }

    /// Execute the benches.
    pub fn execute(&mut self) -> io::Result<()> {
        let table_header = Utc::now().to_string();
        let bench_results = std::mem::take(&mut self.benches)
            .into_iter()
            .map(|(name, transaction)| {
                let result = self.cuttle.simulate_transaction(transaction);
                check_must_pass(self.must_pass, name, &result);
                ComputeUnitBenchResult::new(name, &result)
            })
            .collect::<Vec<_>>();
        write_results(&self.out_dir, &table_header, CUTTLE_VERSION, bench_results)
    }
}

/// Cuttle's matrix compute unit bencher.
///
/// Allows developers to compare compute unit usage of the same transactions
/// across several harnesses.
pub struct CuttleComputeUnitMatrixBencher<'a> {
    harnesses: Vec<(&'a str, &'a Cuttle)>,
    benches: Vec<Bench<'a>>,
    must_pass: bool,
    out_dir: PathBuf,
}

impl Default for CuttleComputeUnitMatrixBencher<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CuttleComputeUnitMatrixBencher<'a> {
    /// Create a new matrix bencher, to which harnesses, benches and
    /// configurations can be added.
    pub fn new() -> Self {
        Self {
            harnesses: Vec::new(),
            benches: Vec::new(),
            must_pass: false,
            out_dir: default_out_dir(),
        }
    }

    /// Add a harness, which becomes a column of the table.
    pub fn harness(mut self, name: &'a str, cuttle: &'a Cuttle) -> Self {
        self.harnesses.push((name, cuttle));
        self
    }

    /// Add a bench to the bencher.
    pub fn bench(mut self, bench: Bench<'a>) -> Self {
        self.benches.push(bench);
        self
    }

    /// Set whether the bencher should panic if a transaction fails.
    pub fn must_pass(mut self, must_pass: bool) -> Self {
        self.must_pass = must_pass;
        self
    }

    /// Set the output directory for the results.
    pub fn out_dir(mut self, out_dir: &str) -> Self {
        self.out_dir = PathBuf::from(out_dir);
        self
    }

    /// Execute the benches.
    pub fn execute(&mut self) -> io::Result<()> {
        let table_header = Utc::now().to_string();

        let mut bench_results = Vec::with_capacity(self.harnesses.len());
        for &(harness_name, cuttle) in &self.harnesses {
            let mut harness_results = ComputeUnitMatrixBenchResult::new(harness_name);
            for &(name, transaction) in &self.benches {
                let result = cuttle.simulate_transaction(transaction);
                check_must_pass(self.must_pass, name, &result);
                harness_results.add_result(name, &result);
            }
            bench_results.push(harness_results);
        }

        mx_write_results(&self.out_dir, &table_header, CUTTLE_VERSION, &bench_results)
    }
}
