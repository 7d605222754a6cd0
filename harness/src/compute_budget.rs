//! Compute budget requests carried by a transaction and the fee they imply.

use {
    crate::config::{ComputeBudget, MAX_COMPUTE_UNIT_LIMIT, MAX_HEAP_FRAME_BYTES, MIN_HEAP_FRAME_BYTES},
    cuttle_svm_error::error::TransactionError,
    solana_compute_budget_interface::ComputeBudgetInstruction,
    solana_instruction::error::InstructionError,
    solana_message::Message,
    solana_sdk_ids::compute_budget,
};

const MICRO_LAMPORTS_PER_LAMPORT: u128 = 1_000_000;
const HEAP_FRAME_GRANULARITY: u32 = 1024;

/// The effective limits of one transaction, after applying its compute
/// budget instructions on top of the harness defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComputeBudgetLimits {
    pub compute_unit_limit: u64,
    /// Micro-lamports per compute unit.
    pub compute_unit_price: u64,
    pub heap_size: u32,
}

impl ComputeBudgetLimits {
    /// The prioritization fee, rounded up to the next lamport.
    pub fn prioritization_fee(&self) -> u64 {
        let micro_lamports =
            u128::from(self.compute_unit_price) * u128::from(self.compute_unit_limit);
        let lamports = micro_lamports.div_ceil(MICRO_LAMPORTS_PER_LAMPORT);
        u64::try_from(lamports).unwrap_or(u64::MAX)
    }
}

/// Instruction and account positions reported in errors. Sanitized messages
/// hold at most 256 of each.
pub(crate) fn error_index(index: usize) -> u8 {
    u8::try_from(index).unwrap_or(u8::MAX)
}

fn invalid(index: usize) -> TransactionError {
    TransactionError::InstructionError {
        index: error_index(index),
        detail: InstructionError::InvalidInstructionData,
    }
}

/// Scan a message for compute budget instructions.
///
/// Each kind of request may appear at most once. Requested limits never
/// exceed the configured ones.
pub fn process_compute_budget_instructions(
    message: &Message,
    defaults: &ComputeBudget,
) -> Result<ComputeBudgetLimits, TransactionError> {
    let mut unit_limit = None;
    let mut unit_price = None;
    let mut heap_size = None;
    let mut loaded_accounts_data_size = None;

    for (index, instruction) in message.instructions.iter().enumerate() {
        let program_id = message.account_keys.get(usize::from(instruction.program_id_index));
        if program_id != Some(&compute_budget::id()) {
            continue;
        }
        let duplicate = TransactionError::DuplicateInstruction(error_index(index));
        match borsh::from_slice::<ComputeBudgetInstruction>(&instruction.data) {
            Ok(ComputeBudgetInstruction::RequestHeapFrame(bytes)) => {
                if heap_size.replace(bytes).is_some() {
                    return Err(duplicate);
                }
                if !(MIN_HEAP_FRAME_BYTES..=MAX_HEAP_FRAME_BYTES).contains(&bytes)
                    || bytes % HEAP_FRAME_GRANULARITY != 0
                {
                    return Err(invalid(index));
                }
            }
            Ok(ComputeBudgetInstruction::SetComputeUnitLimit(units)) => {
                if unit_limit.replace(units).is_some() {
                    return Err(duplicate);
                }
            }
            Ok(ComputeBudgetInstruction::SetComputeUnitPrice(price)) => {
                if unit_price.replace(price).is_some() {
                    return Err(duplicate);
                }
            }
            Ok(ComputeBudgetInstruction::SetLoadedAccountsDataSizeLimit(bytes)) => {
                if loaded_accounts_data_size.replace(bytes).is_some() {
                    return Err(duplicate);
                }
                if bytes == 0 {
                    return Err(invalid(index));
                }
            }
            _ => return Err(invalid(index)),
        }
    }

    let compute_unit_limit = unit_limit
        .map(u64::from)
        .unwrap_or(defaults.compute_unit_limit)
        .min(defaults.compute_unit_limit)
        .min(u64::from(MAX_COMPUTE_UNIT_LIMIT));
    let heap_size = heap_size
        .unwrap_or(defaults.heap_size)
        .min(defaults.max_heap_size);
    Ok(ComputeBudgetLimits {
        compute_unit_limit,
        compute_unit_price: unit_price.unwrap_or(0),
        heap_size,
    })
}
