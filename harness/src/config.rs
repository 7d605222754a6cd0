//! Harness configuration, captured once at construction.

use serde::{Deserialize, Serialize};

/// Ceiling on the compute units a transaction may request.
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;
/// Smallest heap a transaction may request.
pub const MIN_HEAP_FRAME_BYTES: u32 = 32 * 1024;
/// Largest heap a transaction may request.
pub const MAX_HEAP_FRAME_BYTES: u32 = 256 * 1024;

/// Per-transaction execution ceilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBudget {
    /// Compute units available to a transaction. Requests for a higher
    /// limit are lowered to this value.
    pub compute_unit_limit: u64,
    /// Heap bytes available when the transaction does not request a heap
    /// frame of its own.
    pub heap_size: u32,
    /// Largest heap frame a transaction may request. Larger requests are
    /// lowered to this value.
    pub max_heap_size: u32,
    /// Bytes of stack available to a single call frame.
    pub stack_frame_size: usize,
    /// Maximum bytes of program logs retained per transaction.
    pub log_bytes_limit: usize,
    /// Maximum height of the cross-program invocation stack, counting the
    /// top-level instruction.
    pub max_invoke_depth: usize,
    /// Maximum number of nested call frames within a program.
    pub max_call_depth: usize,
}

impl Default for ComputeBudget {
    fn default() -> Self {
        Self {
            compute_unit_limit: MAX_COMPUTE_UNIT_LIMIT as u64,
            heap_size: MIN_HEAP_FRAME_BYTES,
            max_heap_size: MAX_HEAP_FRAME_BYTES,
            stack_frame_size: 4_096,
            log_bytes_limit: 10_000,
            max_invoke_depth: 5,
            max_call_depth: 64,
        }
    }
}

/// Immutable configuration of a `Cuttle` instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttleConfig {
    /// Verify transaction signatures.
    pub sigverify: bool,
    /// Reject transactions whose blockhash is not in the queue.
    pub blockhash_check: bool,
    /// Number of processed transactions retained for lookup and replay
    /// protection. Zero disables both.
    pub transaction_history_capacity: usize,
    /// Lamports credited to the harness payer at construction.
    pub starting_lamports: u64,
    pub compute_budget: ComputeBudget,
    /// Number of recent blockhashes considered valid.
    pub blockhash_queue_capacity: usize,
    pub lamports_per_signature: u64,
    /// Maximum data length of any stored account.
    pub max_account_data_size: usize,
    /// Maximum size of a deployed program image.
    pub max_program_size: usize,
}

impl Default for CuttleConfig {
    fn default() -> Self {
        Self {
            sigverify: true,
            blockhash_check: true,
            transaction_history_capacity: 10_000,
            starting_lamports: 1_000_000_000_000_000,
            compute_budget: ComputeBudget::default(),
            blockhash_queue_capacity: 150,
            lamports_per_signature: 5_000,
            max_account_data_size: 10 * 1024 * 1024,
            max_program_size: 10 * 1024 * 1024,
        }
    }
}

impl CuttleConfig {
    pub fn with_sigverify(mut self, sigverify: bool) -> Self {
        self.sigverify = sigverify;
        self
    }

    pub fn with_blockhash_check(mut self, blockhash_check: bool) -> Self {
        self.blockhash_check = blockhash_check;
        self
    }

    pub fn with_transaction_history(mut self, capacity: usize) -> Self {
        self.transaction_history_capacity = capacity;
        self
    }

    pub fn with_starting_lamports(mut self, lamports: u64) -> Self {
        self.starting_lamports = lamports;
        self
    }

    pub fn with_compute_budget(mut self, compute_budget: ComputeBudget) -> Self {
        self.compute_budget = compute_budget;
        self
    }

    pub fn with_blockhash_queue_capacity(mut self, capacity: usize) -> Self {
        self.blockhash_queue_capacity = capacity;
        self
    }

    pub fn with_lamports_per_signature(mut self, lamports: u64) -> Self {
        self.lamports_per_signature = lamports;
        self
    }

    pub fn with_max_account_data_size(mut self, size: usize) -> Self {
        self.max_account_data_size = size;
        self
    }

    pub fn with_max_program_size(mut self, size: usize) -> Self {
        self.max_program_size = size;
        self
    }
}
