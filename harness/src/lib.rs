//! # Cuttle
//!
//! Cuttle is an in-process Solana Virtual Machine (SVM) harness for testing
//! programs at the transaction level. It keeps a complete, if tiny, chain
//! state in memory: an account store, a blockhash queue, the sysvars and a
//! record of recent transactions. No validator, network or disk is involved.
//!
//! Transactions go through the same stages a validator would put them
//! through:
//!
//! * sanitization of the message,
//! * replay protection against recent signatures,
//! * blockhash validation,
//! * signature verification,
//! * compute budget parsing and fee deduction,
//! * instruction execution, including cross-program invocations,
//! * rent and account size checks,
//! * an all-or-nothing commit.
//!
//! Both `sigverify` and `blockhash_check` can be switched off through
//! `CuttleConfig` when a test does not care about them.
//!
//! Five main API methods are offered:
//!
//! * `send_transaction`: Process a transaction and commit its results.
//! * `simulate_transaction`: Process a transaction against the current state
//!   without changing anything.
//! * `send_and_validate_transaction` / `simulate_and_validate_transaction`:
//!   The above, followed by a series of checks on the result, panicking if
//!   any checks fail.
//! * `warp_to_slot`: Move the clock, the slot hashes and the blockhash queue
//!   forward.
//!
//! ```rust,ignore
//! use {
//!     cuttle_svm::{result::Check, Cuttle},
//!     solana_keypair::Keypair,
//!     solana_signer::Signer,
//!     solana_system_interface::instruction::transfer,
//!     solana_transaction::Transaction,
//! };
//!
//! let mut cuttle = Cuttle::default();
//! let sender = Keypair::new();
//! let recipient = Keypair::new().pubkey();
//!
//! cuttle.airdrop(&sender.pubkey(), 1_000_000_000).unwrap();
//!
//! let transaction = Transaction::new_signed_with_payer(
//!     &[transfer(&sender.pubkey(), &recipient, 500_000_000)],
//!     Some(&sender.pubkey()),
//!     &[&sender],
//!     cuttle.latest_blockhash(),
//! );
//!
//! cuttle.send_and_validate_transaction(
//!     transaction,
//!     &[
//!         Check::success(),
//!         Check::fee(5_000),
//!         Check::account(&recipient).lamports(500_000_000).build(),
//!     ],
//! );
//! ```
//!
//! ## Programs
//!
//! The system program and the compute budget program are always available.
//! Further native programs can be registered with `add_builtin`, which takes
//! any `ProgramExecutor`, including a plain closure wrapped by
//! `program::from_fn`.
//!
//! `deploy_program` stores an SBF ELF image under the BPF loader. Cuttle does
//! not interpret bytecode itself: it hands deployed images to the
//! `ProgramLoader` set with `set_program_loader`, and a deployed program with
//! no loader fails with `UnsupportedProgramId` when invoked.

pub mod account_store;
pub mod blockhash_queue;
pub mod compute_budget;
pub mod config;
pub mod history;
pub mod invoke_context;
pub mod processor;
pub mod program;
pub mod system_program;
pub mod sysvar;

// Re-export result module from cuttle-svm-result crate
pub use cuttle_svm_result as result;
pub use {
    config::{ComputeBudget, CuttleConfig},
    invoke_context::InvokeContext,
    program::{ProgramExecutor, ProgramLoader},
};
use {
    crate::{
        account_store::AccountsDb,
        blockhash_queue::BlockhashQueue,
        history::TransactionHistory,
        processor::{ProcessedTransaction, TransactionProcessor},
        program::{create_program_account, from_fn, loader_keys, validate_elf, ProgramCache},
    },
    cuttle_svm_error::error::{CuttleError, DeployError, TransactionError},
    cuttle_svm_result::{
        Check, CheckContext, Config, FailedTransaction, RunChecks, TransactionMetadata,
        TransactionResult,
    },
    serde::{de::DeserializeOwned, Serialize},
    solana_account::Account,
    solana_clock::Clock,
    solana_hash::Hash,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_rent::Rent,
    solana_sdk_ids::{compute_budget as compute_budget_program, system_program as system_program_id},
    solana_signature::Signature,
    solana_signer::Signer,
    solana_sysvar_id::SysvarId,
    solana_transaction::Transaction,
    std::sync::Arc,
};

/// The Cuttle API: an in-memory chain that transactions can be sent to.
///
/// Chain state is private so that the pipeline and the privileged setters
/// stay the only ways to change it. Only the check `config` is public.
pub struct Cuttle {
    /// How `*_and_validate_*` methods report failed checks.
    pub config: Config,
    settings: CuttleConfig,
    accounts: AccountsDb,
    blockhash_queue: BlockhashQueue,
    history: TransactionHistory,
    programs: ProgramCache,
    payer: Keypair,
}

impl Default for Cuttle {
    fn default() -> Self {
        Self::new(CuttleConfig::default())
    }
}

impl CheckContext for Cuttle {
    fn is_rent_exempt(&self, lamports: u64, space: usize) -> bool {
        lamports == 0 || self.get_sysvar::<Rent>().is_exempt(lamports, space)
    }

    fn get_account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.accounts.get_account(pubkey)
    }
}

impl Cuttle {
    /// Create a new harness from `settings`.
    ///
    /// The sysvars are seeded, the built-in programs registered, and the
    /// harness payer funded with `starting_lamports`.
    pub fn new(settings: CuttleConfig) -> Self {
        #[rustfmt::skip]
        solana_logger::setup_with_default(
            "cuttle_svm::processor=info,\
             cuttle_svm::program=info",
        );

        let mut accounts = AccountsDb::new(settings.max_account_data_size);
        let blockhash_queue = BlockhashQueue::new(
            settings.blockhash_queue_capacity,
            settings.lamports_per_signature,
        );
        sysvar::seed_sysvars(&mut accounts, blockhash_queue.latest(), 0);

        let mut cuttle = Self {
            config: Config::default(),
            history: TransactionHistory::new(settings.transaction_history_capacity),
            settings,
            accounts,
            blockhash_queue,
            programs: ProgramCache::default(),
            payer: Keypair::new(),
        };
        let builtins = [
            (
                system_program_id::id(),
                "system_program",
                from_fn(system_program::process_system_instruction),
            ),
            (
                compute_budget_program::id(),
                "compute_budget_program",
                from_fn(system_program::process_compute_budget_instruction),
            ),
        ];
        for (program_id, name, executor) in builtins {
            if let Err(err) = cuttle.add_builtin(program_id, name, executor) {
                log::error!("failed to register builtin {name}: {err}");
            }
        }

        let starting_lamports = cuttle.settings.starting_lamports;
        if starting_lamports > 0 {
            let payer = cuttle.payer.pubkey();
            if let Err(err) = cuttle.airdrop(&payer, starting_lamports) {
                log::error!("failed to fund harness payer: {err}");
            }
        }
        cuttle
    }

    /// The configuration this harness was created with.
    pub fn cuttle_config(&self) -> &CuttleConfig {
        &self.settings
    }

    /// The keypair funded with `starting_lamports` at construction.
    pub fn payer(&self) -> &Keypair {
        &self.payer
    }

    /// Register a native program. Sysvar addresses are refused.
    pub fn add_builtin(
        &mut self,
        program_id: Pubkey,
        name: &str,
        executor: Arc<dyn ProgramExecutor>,
    ) -> Result<(), CuttleError> {
        if sysvar::is_sysvar_id(&program_id) {
            return Err(CuttleError::ReservedAccount(program_id));
        }
        let account = create_program_account(
            &loader_keys::NATIVE_LOADER,
            name.as_bytes().to_vec(),
            &Rent::default(),
        );
        self.accounts.set_account(program_id, account)?;
        self.programs.add_builtin(program_id, name, executor);
        Ok(())
    }

    /// Set the loader that turns deployed images into executors. Applies to
    /// programs deployed from here on.
    pub fn set_program_loader<L: ProgramLoader + 'static>(&mut self, loader: L) {
        self.programs.set_loader(Arc::new(loader));
    }

    /// Deploy an SBF program image at `program_id`.
    ///
    /// Sysvar and builtin addresses cannot be deployed over.
    pub fn deploy_program(
        &mut self,
        program_id: Pubkey,
        program_bytes: &[u8],
    ) -> Result<(), DeployError> {
        if sysvar::is_sysvar_id(&program_id) || self.programs.builtin_name(&program_id).is_some() {
            return Err(DeployError::ReservedAddress(program_id));
        }
        let max = self
            .settings
            .max_program_size
            .min(self.accounts.max_account_data_size());
        if program_bytes.len() > max {
            return Err(DeployError::ProgramTooLarge {
                size: program_bytes.len(),
                max,
            });
        }
        validate_elf(program_bytes)?;
        self.programs.add_deployed(program_id, program_bytes)?;

        let account = create_program_account(
            &loader_keys::BPF_LOADER,
            program_bytes.to_vec(),
            &self.get_sysvar::<Rent>(),
        );
        self.accounts
            .set_account(program_id, account)
            .map_err(|_| DeployError::ProgramTooLarge {
                size: program_bytes.len(),
                max,
            })?;
        log::debug!("deployed {} bytes at {program_id}", program_bytes.len());
        Ok(())
    }

    /// Credit `lamports` to `pubkey`, creating a system account if needed.
    ///
    /// Sysvar addresses are reserved.
    pub fn airdrop(&mut self, pubkey: &Pubkey, lamports: u64) -> Result<(), CuttleError> {
        if sysvar::is_sysvar_id(pubkey) {
            return Err(CuttleError::ReservedAccount(*pubkey));
        }
        let mut account = self
            .accounts
            .get_account(pubkey)
            .unwrap_or_else(|| Account::new(0, 0, &system_program_id::id()));
        account.lamports = account
            .lamports
            .checked_add(lamports)
            .ok_or(CuttleError::LamportsOverflow(*pubkey))?;
        self.accounts.set_account(*pubkey, account)
    }

    pub fn get_account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.accounts.get_account(pubkey)
    }

    pub fn get_balance(&self, pubkey: &Pubkey) -> Option<u64> {
        self.accounts
            .get_account_ref(pubkey)
            .map(|account| account.lamports)
    }

    /// Overwrite an account outside of any transaction.
    ///
    /// Sysvar addresses are reserved; use `set_sysvar` for those.
    pub fn set_account(&mut self, pubkey: Pubkey, account: Account) -> Result<(), CuttleError> {
        if sysvar::is_sysvar_id(&pubkey) {
            return Err(CuttleError::ReservedAccount(pubkey));
        }
        self.accounts.set_account(pubkey, account)
    }

    pub fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> u64 {
        self.get_sysvar::<Rent>().minimum_balance(data_len)
    }

    pub fn get_sysvar<T>(&self) -> T
    where
        T: SysvarId + DeserializeOwned + Default,
    {
        sysvar::get_sysvar(&self.accounts)
    }

    pub fn set_sysvar<T>(&mut self, value: &T)
    where
        T: SysvarId + Serialize,
    {
        sysvar::set_sysvar(&mut self.accounts, value)
    }

    pub fn latest_blockhash(&self) -> Hash {
        self.blockhash_queue.latest()
    }

    /// Invalidate the latest blockhash, replacing it with a fresh one.
    pub fn expire_blockhash(&mut self) {
        let slot = self.get_sysvar::<Clock>().slot;
        self.blockhash_queue.expire_current(slot);
    }

    /// Warp the chain to `slot`, updating `Clock` and `SlotHashes` and
    /// registering a new blockhash.
    pub fn warp_to_slot(&mut self, slot: u64) {
        let latest = self.blockhash_queue.latest();
        sysvar::warp_sysvars(&mut self.accounts, slot, latest);
        self.blockhash_queue.advance(slot);
    }

    /// Look up a recorded transaction by its first signature.
    pub fn get_transaction(&self, signature: &Signature) -> Option<&TransactionResult> {
        self.history.lookup(signature)
    }

    fn processor(&self) -> TransactionProcessor<'_> {
        TransactionProcessor {
            accounts_db: &self.accounts,
            blockhash_queue: &self.blockhash_queue,
            history: &self.history,
            programs: &self.programs,
            config: &self.settings,
        }
    }

    /// Process a transaction and commit its results.
    ///
    /// A failed transaction changes nothing and is not charged a fee. Every
    /// transaction that got as far as fee processing is recorded in the
    /// history, successful or not.
    pub fn send_transaction(&mut self, transaction: Transaction) -> TransactionResult {
        let ProcessedTransaction { result, recordable } = self.processor().process(&transaction);
        let result = match result {
            Ok(meta) => match self.accounts.commit(&meta.post_accounts) {
                Ok(()) => Ok(meta),
                Err(err) => {
                    log::error!("failed to commit transaction {}: {err}", meta.signature);
                    Err(FailedTransaction {
                        err: TransactionError::InvalidAccountData,
                        meta: TransactionMetadata {
                            fee: 0,
                            post_accounts: Vec::new(),
                            ..meta
                        },
                    })
                }
            },
            Err(failed) => Err(failed),
        };
        if recordable {
            self.history
                .record(transaction.signatures[0], result.clone());
        }
        result
    }

    /// Process a transaction against the current state without committing or
    /// recording anything.
    pub fn simulate_transaction(&self, transaction: &Transaction) -> TransactionResult {
        self.processor().process(transaction).result
    }

    /// Send a transaction, then perform a series of checks on the result.
    /// Panics if any checks fail, unless `config.panic` is off.
    pub fn send_and_validate_transaction(
        &mut self,
        transaction: Transaction,
        checks: &[Check],
    ) -> TransactionResult {
        let result = self.send_transaction(transaction);
        result.run_checks(checks, &self.config, &*self);
        result
    }

    /// Simulate a transaction, then perform a series of checks on the
    /// result. Panics if any checks fail, unless `config.panic` is off.
    pub fn simulate_and_validate_transaction(
        &self,
        transaction: &Transaction,
        checks: &[Check],
    ) -> TransactionResult {
        let result = self.simulate_transaction(transaction);
        result.run_checks(checks, &self.config, self);
        result
    }
}
