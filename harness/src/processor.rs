//! The transaction pipeline.
//!
//! Checks run in a fixed order: sanitize, duplicate signature, blockhash,
//! signatures, then compute budget and fee. Everything after that point
//! happens on a private working set of accounts, which the caller either
//! commits in one batch or throws away.

use {
    crate::{
        account_store::AccountsDb,
        blockhash_queue::BlockhashQueue,
        compute_budget::{error_index, process_compute_budget_instructions, ComputeBudgetLimits},
        config::CuttleConfig,
        history::TransactionHistory,
        invoke_context::{InstructionAccount, InvokeContext, TransactionAccount},
        program::ProgramCache,
        sysvar::{get_sysvar, is_sysvar_id},
    },
    cuttle_svm_error::error::TransactionError,
    cuttle_svm_result::{FailedTransaction, TransactionMetadata, TransactionResult},
    solana_account::Account,
    solana_message::Message,
    solana_rent::Rent,
    solana_sdk_ids::system_program,
    solana_signature::Signature,
    solana_transaction::Transaction,
    std::collections::HashSet,
};

/// The outcome of running a transaction through the pipeline.
pub struct ProcessedTransaction {
    pub result: TransactionResult,
    /// Whether the transaction got far enough to be charged a fee and so
    /// belongs in the history.
    pub recordable: bool,
}

impl ProcessedTransaction {
    fn rejected(signature: Signature, err: TransactionError) -> Self {
        Self {
            result: Err(FailedTransaction {
                err,
                meta: TransactionMetadata {
                    signature,
                    ..Default::default()
                },
            }),
            recordable: false,
        }
    }
}

/// A read-only view of the harness state a transaction is processed
/// against.
pub struct TransactionProcessor<'a> {
    pub accounts_db: &'a AccountsDb,
    pub blockhash_queue: &'a BlockhashQueue,
    pub history: &'a TransactionHistory,
    pub programs: &'a ProgramCache,
    pub config: &'a CuttleConfig,
}

impl TransactionProcessor<'_> {
    pub fn process(&self, transaction: &Transaction) -> ProcessedTransaction {
        let signature = transaction.signatures.first().copied().unwrap_or_default();
        if let Err(err) = self.validate(transaction) {
            log::debug!("transaction {signature} rejected: {err}");
            return ProcessedTransaction::rejected(signature, err);
        }

        let mut meta = TransactionMetadata {
            signature,
            ..Default::default()
        };
        let result = match self.load_and_execute(&transaction.message, &mut meta) {
            Ok(()) => Ok(meta),
            Err(err) => {
                log::debug!("transaction {signature} failed: {err}");
                meta.fee = 0;
                meta.post_accounts.clear();
                Err(FailedTransaction { err, meta })
            }
        };
        ProcessedTransaction {
            result,
            recordable: true,
        }
    }

    /// Checks that reject a transaction before it is charged anything.
    fn validate(&self, transaction: &Transaction) -> Result<(), TransactionError> {
        sanitize(transaction)?;

        if self.history.is_enabled() && self.history.contains(&transaction.signatures[0]) {
            return Err(TransactionError::AlreadyProcessed);
        }

        if self.config.blockhash_check
            && !self
                .blockhash_queue
                .is_valid(&transaction.message.recent_blockhash)
        {
            return Err(TransactionError::BlockhashNotFound);
        }

        if self.config.sigverify && transaction.verify_with_results().iter().any(|ok| !ok) {
            return Err(TransactionError::SignatureVerificationFailed);
        }
        Ok(())
    }

    fn calculate_fee(&self, message: &Message, limits: &ComputeBudgetLimits) -> u64 {
        let lamports_per_signature = self
            .blockhash_queue
            .lamports_per_signature(&message.recent_blockhash)
            .unwrap_or(self.config.lamports_per_signature);
        u64::from(message.header.num_required_signatures)
            .saturating_mul(lamports_per_signature)
            .saturating_add(limits.prioritization_fee())
    }

    fn load_accounts(&self, message: &Message) -> Vec<TransactionAccount> {
        let called_as_program: HashSet<usize> = message
            .instructions
            .iter()
            .map(|instruction| usize::from(instruction.program_id_index))
            .collect();
        message
            .account_keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                let reserved = is_sysvar_id(key)
                    || called_as_program.contains(&index)
                    || self.programs.builtin_name(key).is_some();
                TransactionAccount {
                    key: *key,
                    account: self
                        .accounts_db
                        .get_account(key)
                        .unwrap_or_else(|| Account::new(0, 0, &system_program::id())),
                    is_signer: index < usize::from(message.header.num_required_signatures),
                    is_writable: is_writable_index(message, index) && !reserved,
                }
            })
            .collect()
    }

    fn load_and_execute(
        &self,
        message: &Message,
        meta: &mut TransactionMetadata,
    ) -> Result<(), TransactionError> {
        let limits = process_compute_budget_instructions(message, &self.config.compute_budget)?;
        let fee = self.calculate_fee(message, &limits);

        let mut accounts = self.load_accounts(message);
        let pre_accounts: Vec<Account> = accounts.iter().map(|a| a.account.clone()).collect();
        validate_fee_payer(&mut accounts[0].account, fee)?;
        meta.fee = fee;

        for instruction in &message.instructions {
            let program_id = &message.account_keys[usize::from(instruction.program_id_index)];
            let program = self
                .accounts_db
                .get_account_ref(program_id)
                .ok_or(TransactionError::ProgramAccountNotFound)?;
            if !program.executable {
                return Err(TransactionError::InvalidProgramForExecution);
            }
        }

        let privileges: Vec<(bool, bool)> = accounts
            .iter()
            .map(|account| (account.is_signer, account.is_writable))
            .collect();
        let mut invoke_context = InvokeContext::new(
            accounts,
            self.programs,
            self.accounts_db,
            self.config.compute_budget,
            limits.compute_unit_limit,
            u64::from(limits.heap_size),
        );
        let mut status = Ok(());
        for (index, instruction) in message.instructions.iter().enumerate() {
            let program_id = message.account_keys[usize::from(instruction.program_id_index)];
            let instruction_accounts = instruction
                .accounts
                .iter()
                .map(|account_index| {
                    let index_in_transaction = usize::from(*account_index);
                    let (is_signer, is_writable) = privileges[index_in_transaction];
                    InstructionAccount {
                        index_in_transaction,
                        is_signer,
                        is_writable,
                    }
                })
                .collect();
            if let Err(err) = invoke_context.process_instruction(
                program_id,
                instruction_accounts,
                instruction.data.clone(),
            ) {
                status = Err(TransactionError::from_instruction_error(
                    error_index(index),
                    err,
                ));
                break;
            }
        }

        let (accounts, logs, return_data, units_consumed) = invoke_context.into_parts();
        meta.logs = logs;
        meta.return_data = return_data;
        meta.compute_units_consumed = units_consumed;
        status?;

        let rent = get_sysvar::<Rent>(self.accounts_db);
        let max_data_len = self.accounts_db.max_account_data_size();
        for (index, (account, pre)) in accounts.iter().zip(&pre_accounts).enumerate() {
            if !account.is_writable {
                continue;
            }
            if account.account.data.len() > max_data_len {
                return Err(TransactionError::InvalidAccountData);
            }
            let pre_state = RentState::of(&rent, pre);
            let post_state = RentState::of(&rent, &account.account);
            if !post_state.transition_allowed_from(&pre_state) {
                log::debug!("account {} left rent paying", account.key);
                return Err(TransactionError::InsufficientFundsForRent {
                    account_index: error_index(index),
                });
            }
        }

        meta.post_accounts = accounts
            .into_iter()
            .filter(|account| account.is_writable)
            .map(|account| (account.key, account.account))
            .collect();
        Ok(())
    }
}

/// Structural checks on a transaction and its message.
fn sanitize(transaction: &Transaction) -> Result<(), TransactionError> {
    let message = &transaction.message;
    let header = &message.header;
    let num_keys = message.account_keys.len();
    let num_signers = usize::from(header.num_required_signatures);

    if num_signers == 0
        || transaction.signatures.len() != num_signers
        || header.num_readonly_signed_accounts >= header.num_required_signatures
        || num_signers + usize::from(header.num_readonly_unsigned_accounts) > num_keys
        || num_keys > usize::from(u8::MAX) + 1
        || message.instructions.len() > usize::from(u8::MAX) + 1
    {
        return Err(TransactionError::SanitizeFailure);
    }

    for instruction in &message.instructions {
        let program_index = usize::from(instruction.program_id_index);
        // The fee payer can never be invoked.
        if program_index == 0 || program_index >= num_keys {
            return Err(TransactionError::SanitizeFailure);
        }
        if instruction
            .accounts
            .iter()
            .any(|index| usize::from(*index) >= num_keys)
        {
            return Err(TransactionError::SanitizeFailure);
        }
    }

    let mut seen = HashSet::with_capacity(num_keys);
    if !message.account_keys.iter().all(|key| seen.insert(*key)) {
        return Err(TransactionError::AccountLoadedTwice);
    }
    Ok(())
}

/// Writability as declared by the message header, before any demotion.
fn is_writable_index(message: &Message, index: usize) -> bool {
    let header = &message.header;
    let num_signers = usize::from(header.num_required_signatures);
    if index < num_signers {
        index < num_signers - usize::from(header.num_readonly_signed_accounts)
    } else {
        index < message.account_keys.len() - usize::from(header.num_readonly_unsigned_accounts)
    }
}

fn validate_fee_payer(payer: &mut Account, fee: u64) -> Result<(), TransactionError> {
    if payer.owner != system_program::id() || !payer.data.is_empty() {
        return Err(TransactionError::InvalidAccountForFee);
    }
    payer.lamports = payer
        .lamports
        .checked_sub(fee)
        .ok_or(TransactionError::InsufficientFundsForFee)?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum RentState {
    Uninitialized,
    RentPaying { lamports: u64, data_size: usize },
    RentExempt,
}

impl RentState {
    fn of(rent: &Rent, account: &Account) -> Self {
        if account.lamports == 0 {
            Self::Uninitialized
        } else if rent.is_exempt(account.lamports, account.data.len()) {
            Self::RentExempt
        } else {
            Self::RentPaying {
                lamports: account.lamports,
                data_size: account.data.len(),
            }
        }
    }

    /// An account may only be left rent paying if it already was, with the
    /// same size and no more lamports than before.
    fn transition_allowed_from(&self, pre: &Self) -> bool {
        match (pre, self) {
            (_, Self::Uninitialized | Self::RentExempt) => true,
            (
                Self::RentPaying {
                    lamports: pre_lamports,
                    data_size: pre_size,
                },
                Self::RentPaying {
                    lamports,
                    data_size,
                },
            ) => data_size == pre_size && lamports <= pre_lamports,
            _ => false,
        }
    }
}
