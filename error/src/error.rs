use {solana_instruction::error::InstructionError, solana_pubkey::Pubkey, thiserror::Error};

/// Reasons a transaction can fail, in the order the pipeline checks them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// The message is structurally malformed (signature count, header, or
    /// account index bounds).
    #[error("Transaction failed to sanitize accounts offsets correctly")]
    SanitizeFailure,

    /// The same account key appears more than once in the message.
    #[error("Account loaded twice")]
    AccountLoadedTwice,

    /// A transaction with this signature has already been recorded.
    #[error("This transaction has already been processed")]
    AlreadyProcessed,

    /// The declared blockhash is not present in the blockhash queue.
    #[error("Blockhash not found")]
    BlockhashNotFound,

    /// One of the required signatures did not verify against the message.
    #[error("Transaction did not pass signature verification")]
    SignatureVerificationFailed,

    /// A compute budget instruction was specified more than once.
    #[error("Transaction contains a duplicate instruction ({0}) that is not allowed")]
    DuplicateInstruction(u8),

    /// The fee payer is not a system-owned account.
    #[error("This account may not be used to pay transaction fees")]
    InvalidAccountForFee,

    /// The fee payer cannot cover the transaction fee.
    #[error("Insufficient funds for fee")]
    InsufficientFundsForFee,

    /// An invoked program account does not exist.
    #[error("Attempt to load a program that does not exist")]
    ProgramAccountNotFound,

    /// An invoked program account exists but is not executable.
    #[error("Attempt to load a program that is not executable")]
    InvalidProgramForExecution,

    /// An instruction failed.
    #[error("Error processing Instruction {index}: {detail:?}")]
    InstructionError {
        index: u8,
        detail: InstructionError,
    },

    /// The cross-program invocation depth limit was exceeded while
    /// processing the instruction at `index`.
    #[error("Instruction {index} exceeded the maximum call depth")]
    CallDepthExceeded { index: u8 },

    /// The compute budget (units, heap, or stack) was exhausted while
    /// processing the instruction at `index`.
    #[error("Instruction {index} exceeded the compute budget")]
    ComputeBudgetExceeded { index: u8 },

    /// A resulting account would exceed the maximum account size.
    #[error("Resulting account data is invalid")]
    InvalidAccountData,

    /// A writable account would be left rent-paying after the transaction.
    #[error("Transaction results in an account ({account_index}) with insufficient funds for rent")]
    InsufficientFundsForRent { account_index: u8 },
}

impl TransactionError {
    /// Map an instruction-level failure into the transaction taxonomy.
    ///
    /// Budget exhaustion and call depth violations are surfaced as their own
    /// kinds, everything else is wrapped with the failing index.
    pub fn from_instruction_error(index: u8, detail: InstructionError) -> Self {
        match detail {
            InstructionError::ComputationalBudgetExceeded => Self::ComputeBudgetExceeded { index },
            InstructionError::CallDepth => Self::CallDepthExceeded { index },
            detail => Self::InstructionError { index, detail },
        }
    }

    /// The index of the failing instruction, if the failure happened during
    /// execution.
    pub fn instruction_index(&self) -> Option<u8> {
        match self {
            Self::InstructionError { index, .. }
            | Self::CallDepthExceeded { index }
            | Self::ComputeBudgetExceeded { index } => Some(*index),
            _ => None,
        }
    }
}

/// Program deployment failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeployError {
    #[error("Program is too large: {size} bytes exceeds the {max} byte limit")]
    ProgramTooLarge { size: usize, max: usize },

    #[error("Invalid ELF: {0}")]
    InvalidElf(&'static str),

    #[error("Address {0} is reserved for a sysvar or builtin program")]
    ReservedAddress(Pubkey),
}

/// Failures of harness-level operations performed outside the pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CuttleError {
    #[error("Account {pubkey} data length {len} exceeds the maximum of {max}")]
    InvalidAccountData { pubkey: Pubkey, len: usize, max: usize },

    #[error("Account {0} is reserved and can only be written through its dedicated setter")]
    ReservedAccount(Pubkey),

    #[error("Crediting account {0} would overflow its lamport balance")]
    LamportsOverflow(Pubkey),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}
