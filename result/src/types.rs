//! Core result types for SVM transaction processing.

use {
    cuttle_svm_error::error::TransactionError, solana_account::Account, solana_pubkey::Pubkey,
    solana_signature::Signature, std::fmt,
};

/// Data returned by the last program that set it during the transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReturnData {
    pub program_id: Pubkey,
    pub data: Vec<u8>,
}

/// Execution details of a processed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionMetadata {
    /// The transaction's first signature.
    pub signature: Signature,
    /// The fee charged to the fee payer, in lamports.
    pub fee: u64,
    /// The compute units consumed across every instruction.
    pub compute_units_consumed: u64,
    /// Program log lines, in the order they were emitted.
    pub logs: Vec<String>,
    /// The return data produced by the transaction, if any.
    pub return_data: ReturnData,
    /// The writable accounts as they stand after execution.
    ///
    /// For a sent transaction these are exactly the accounts committed to the
    /// store. For a simulation they are what would have been committed. Empty
    /// when the transaction failed.
    pub post_accounts: Vec<(Pubkey, Account)>,
}

impl TransactionMetadata {
    /// Get a post-execution account by its pubkey.
    pub fn get_account(&self, pubkey: &Pubkey) -> Option<&Account> {
        self.post_accounts
            .iter()
            .find(|(k, _)| k == pubkey)
            .map(|(_, a)| a)
    }

    /// The logs joined into a single newline-separated block.
    pub fn pretty_logs(&self) -> String {
        self.logs.join("\n")
    }
}

/// A transaction that failed at some stage of the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedTransaction {
    pub err: TransactionError,
    /// Metadata captured up to the point of failure.
    pub meta: TransactionMetadata,
}

impl fmt::Display for FailedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.err)?;
        if !self.meta.logs.is_empty() {
            write!(f, "\n{}", self.meta.pretty_logs())?;
        }
        Ok(())
    }
}

impl std::error::Error for FailedTransaction {}

/// The outcome of sending or simulating a transaction.
pub type TransactionResult = Result<TransactionMetadata, FailedTransaction>;

/// Uniform access to the metadata of a result, whichever way it went.
pub trait TransactionResultExt {
    fn meta(&self) -> &TransactionMetadata;
    fn error(&self) -> Option<&TransactionError>;
}

impl TransactionResultExt for TransactionResult {
    fn meta(&self) -> &TransactionMetadata {
        match self {
            Ok(meta) => meta,
            Err(failed) => &failed.meta,
        }
    }

    fn error(&self) -> Option<&TransactionError> {
        self.as_ref().err().map(|failed| &failed.err)
    }
}
