//! The environment a program executes in.
//!
//! An `InvokeContext` lives for the duration of one transaction. It owns the
//! transaction's loaded accounts and keeps an explicit stack of instruction
//! frames: the top-level instruction is frame one, and each cross-program
//! invocation pushes another. The stack height is the invoke depth.
//!
//! Programs get at their accounts, meter compute, log, set return data and
//! invoke other programs through it. When a frame finishes, every account it
//! could reach is compared against a snapshot taken when it started, and any
//! change the program was not entitled to make fails the instruction.

use {
    crate::{account_store::AccountsDb, config::ComputeBudget, program::ProgramCache, sysvar},
    cuttle_svm_result::ReturnData,
    serde::de::DeserializeOwned,
    solana_account::Account,
    solana_instruction::{error::InstructionError, Instruction},
    solana_pubkey::Pubkey,
    solana_svm_log_collector::LogCollector,
    solana_sysvar_id::SysvarId,
    std::{cell::RefCell, rc::Rc},
};

/// Compute units charged for every cross-program invocation.
pub const INVOKE_UNITS: u64 = 1_000;
/// Maximum length of return data.
pub const MAX_RETURN_DATA: usize = 1_024;

/// An account loaded for a transaction, with its transaction-wide privileges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionAccount {
    pub key: Pubkey,
    pub account: Account,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// An account as seen by one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionAccount {
    pub index_in_transaction: usize,
    pub is_signer: bool,
    pub is_writable: bool,
}

struct InstructionFrame {
    program_id: Pubkey,
    accounts: Vec<InstructionAccount>,
    data: Vec<u8>,
    /// State of each distinct account at the start of the frame, or at the
    /// last point it was verified.
    pre_accounts: Vec<(usize, Account)>,
    /// Call frames pushed by the program itself.
    call_depth: usize,
}

pub struct InvokeContext<'a> {
    accounts: Vec<TransactionAccount>,
    programs: &'a ProgramCache,
    sysvars: &'a AccountsDb,
    compute_budget: ComputeBudget,
    compute_unit_limit: u64,
    remaining_units: u64,
    heap_limit: u64,
    heap_used: u64,
    frames: Vec<InstructionFrame>,
    log_collector: Rc<RefCell<LogCollector>>,
    return_data: ReturnData,
    /// Set by failures a program must not be able to swallow: exhausted
    /// budgets and failed invocations.
    fatal: Option<InstructionError>,
}

impl<'a> InvokeContext<'a> {
    pub fn new(
        accounts: Vec<TransactionAccount>,
        programs: &'a ProgramCache,
        sysvars: &'a AccountsDb,
        compute_budget: ComputeBudget,
        compute_unit_limit: u64,
        heap_limit: u64,
    ) -> Self {
        Self {
            accounts,
            programs,
            sysvars,
            log_collector: LogCollector::new_ref_with_limit(Some(compute_budget.log_bytes_limit)),
            compute_budget,
            compute_unit_limit,
            remaining_units: compute_unit_limit,
            heap_limit,
            heap_used: 0,
            frames: Vec::new(),
            return_data: ReturnData::default(),
            fatal: None,
        }
    }

    fn current_frame(&self) -> Result<&InstructionFrame, InstructionError> {
        self.frames.last().ok_or(InstructionError::CallDepth)
    }

    fn current_frame_mut(&mut self) -> Result<&mut InstructionFrame, InstructionError> {
        self.frames.last_mut().ok_or(InstructionError::CallDepth)
    }

    fn instruction_account(&self, index: usize) -> Result<InstructionAccount, InstructionError> {
        self.current_frame()?
            .accounts
            .get(index)
            .copied()
            .ok_or(InstructionError::NotEnoughAccountKeys)
    }

    fn fail(&mut self, err: InstructionError) -> InstructionError {
        if self.fatal.is_none() {
            self.fatal = Some(err.clone());
        }
        err
    }

    // Instruction inputs.

    /// The program being executed.
    pub fn program_id(&self) -> Result<Pubkey, InstructionError> {
        Ok(self.current_frame()?.program_id)
    }

    pub fn instruction_data(&self) -> Result<&[u8], InstructionError> {
        Ok(&self.current_frame()?.data)
    }

    /// Number of accounts passed to the current instruction.
    pub fn instruction_accounts_len(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.accounts.len())
    }

    /// Current invoke depth, with the top-level instruction at one.
    pub fn invoke_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn account_key(&self, index: usize) -> Result<&Pubkey, InstructionError> {
        let account = self.instruction_account(index)?;
        Ok(&self.accounts[account.index_in_transaction].key)
    }

    pub fn is_signer(&self, index: usize) -> Result<bool, InstructionError> {
        Ok(self.instruction_account(index)?.is_signer)
    }

    pub fn is_writable(&self, index: usize) -> Result<bool, InstructionError> {
        Ok(self.instruction_account(index)?.is_writable)
    }

    pub fn account(&self, index: usize) -> Result<&Account, InstructionError> {
        let account = self.instruction_account(index)?;
        Ok(&self.accounts[account.index_in_transaction].account)
    }

    /// Mutable access to an instruction account.
    ///
    /// Any modification is checked against the account's owner and
    /// privileges when the instruction completes.
    pub fn account_mut(&mut self, index: usize) -> Result<&mut Account, InstructionError> {
        let account = self.instruction_account(index)?;
        Ok(&mut self.accounts[account.index_in_transaction].account)
    }

    /// Largest data length an account may be resized to.
    pub fn max_account_data_size(&self) -> usize {
        self.sysvars.max_account_data_size()
    }

    // Metering.

    /// Charge compute units, failing the transaction once they run out.
    pub fn consume(&mut self, units: u64) -> Result<(), InstructionError> {
        if units > self.remaining_units {
            self.remaining_units = 0;
            return Err(self.fail(InstructionError::ComputationalBudgetExceeded));
        }
        self.remaining_units -= units;
        Ok(())
    }

    pub fn remaining_compute_units(&self) -> u64 {
        self.remaining_units
    }

    /// Claim heap bytes from the transaction's heap frame.
    pub fn allocate_heap(&mut self, bytes: u64) -> Result<(), InstructionError> {
        match self.heap_used.checked_add(bytes) {
            Some(used) if used <= self.heap_limit => {
                self.heap_used = used;
                Ok(())
            }
            _ => Err(self.fail(InstructionError::ComputationalBudgetExceeded)),
        }
    }

    /// Enter a call frame using `bytes` of stack.
    pub fn push_stack_frame(&mut self, bytes: usize) -> Result<(), InstructionError> {
        if bytes > self.compute_budget.stack_frame_size {
            return Err(self.fail(InstructionError::ComputationalBudgetExceeded));
        }
        let max_call_depth = self.compute_budget.max_call_depth;
        let frame = self.current_frame_mut()?;
        if frame.call_depth >= max_call_depth {
            return Err(self.fail(InstructionError::CallDepth));
        }
        frame.call_depth += 1;
        Ok(())
    }

    pub fn pop_stack_frame(&mut self) -> Result<(), InstructionError> {
        let frame = self.current_frame_mut()?;
        frame.call_depth = frame.call_depth.saturating_sub(1);
        Ok(())
    }

    // Logging and return data.

    fn log_raw(&self, message: &str) {
        self.log_collector.borrow_mut().log(message);
    }

    /// Emit a program log line.
    pub fn log(&self, message: &str) {
        self.log_raw(&format!("Program log: {message}"));
    }

    pub fn set_return_data(&mut self, data: &[u8]) -> Result<(), InstructionError> {
        if data.len() > MAX_RETURN_DATA {
            return Err(InstructionError::InvalidArgument);
        }
        self.return_data = ReturnData {
            program_id: self.program_id()?,
            data: data.to_vec(),
        };
        Ok(())
    }

    pub fn return_data(&self) -> &ReturnData {
        &self.return_data
    }

    pub fn get_sysvar<T>(&self) -> T
    where
        T: SysvarId + DeserializeOwned + Default,
    {
        sysvar::get_sysvar(self.sysvars)
    }

    // Execution.

    /// Run a top-level instruction.
    pub(crate) fn process_instruction(
        &mut self,
        program_id: Pubkey,
        accounts: Vec<InstructionAccount>,
        data: Vec<u8>,
    ) -> Result<(), InstructionError> {
        self.fatal = None;
        self.process_frame(program_id, accounts, data)
    }

    fn process_frame(
        &mut self,
        program_id: Pubkey,
        accounts: Vec<InstructionAccount>,
        data: Vec<u8>,
    ) -> Result<(), InstructionError> {
        if self.frames.len() >= self.compute_budget.max_invoke_depth {
            return Err(self.fail(InstructionError::CallDepth));
        }
        self.log_raw(&format!(
            "Program {program_id} invoke [{}]",
            self.frames.len() + 1
        ));

        let pre_accounts = self.snapshot(&accounts);
        self.frames.push(InstructionFrame {
            program_id,
            accounts,
            data,
            pre_accounts,
            call_depth: 0,
        });

        let units_before = self.remaining_units;
        let result = self
            .programs
            .executor(&program_id)
            .and_then(|executor| executor.execute(self));
        let result = match self.fatal.clone() {
            Some(err) => Err(err),
            None => result.and_then(|()| self.verify_current_frame()),
        };
        self.frames.pop();

        self.log_raw(&format!(
            "Program {program_id} consumed {} of {units_before} compute units",
            units_before - self.remaining_units
        ));
        match &result {
            Ok(()) => self.log_raw(&format!("Program {program_id} success")),
            Err(err) => self.log_raw(&format!("Program {program_id} failed: {err}")),
        }
        result
    }

    /// Invoke another program from the current one.
    pub fn invoke(&mut self, instruction: &Instruction) -> Result<(), InstructionError> {
        self.invoke_signed(instruction, &[])
    }

    /// Invoke another program, signing for program derived addresses of the
    /// calling program with `signers_seeds`.
    ///
    /// A failed invocation fails the whole transaction, even if the caller
    /// ignores the returned error.
    pub fn invoke_signed(
        &mut self,
        instruction: &Instruction,
        signers_seeds: &[&[&[u8]]],
    ) -> Result<(), InstructionError> {
        self.prepare_invoke(instruction, signers_seeds)
            .and_then(|accounts| {
                self.process_frame(instruction.program_id, accounts, instruction.data.clone())
            })
            .and_then(|()| self.snapshot_current_frame())
            .map_err(|err| self.fail(err))
    }

    fn prepare_invoke(
        &mut self,
        instruction: &Instruction,
        signers_seeds: &[&[&[u8]]],
    ) -> Result<Vec<InstructionAccount>, InstructionError> {
        self.consume(INVOKE_UNITS)?;

        let caller = self.current_frame()?;
        let caller_program_id = caller.program_id;
        let signers = signers_seeds
            .iter()
            .map(|seeds| {
                Pubkey::create_program_address(seeds, &caller_program_id)
                    .map_err(|_| InstructionError::InvalidSeeds)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Direct recursion is allowed, re-entering anything further down the
        // stack is not.
        let on_stack = self
            .frames
            .iter()
            .any(|frame| frame.program_id == instruction.program_id);
        if on_stack && caller_program_id != instruction.program_id {
            return Err(InstructionError::ReentrancyNotAllowed);
        }

        let caller = self.current_frame()?;
        let mut callee_accounts = Vec::with_capacity(instruction.accounts.len());
        for meta in &instruction.accounts {
            let caller_account = caller
                .accounts
                .iter()
                .find(|account| self.accounts[account.index_in_transaction].key == meta.pubkey)
                .ok_or(InstructionError::MissingAccount)?;
            if meta.is_writable && !caller_account.is_writable {
                log::debug!("{}'s writable privilege escalated", meta.pubkey);
                return Err(InstructionError::PrivilegeEscalation);
            }
            if meta.is_signer && !caller_account.is_signer && !signers.contains(&meta.pubkey) {
                log::debug!("{}'s signer privilege escalated", meta.pubkey);
                return Err(InstructionError::PrivilegeEscalation);
            }
            callee_accounts.push(InstructionAccount {
                index_in_transaction: caller_account.index_in_transaction,
                is_signer: meta.is_signer,
                is_writable: meta.is_writable,
            });
        }

        let program_account = self
            .accounts
            .iter()
            .find(|account| account.key == instruction.program_id)
            .ok_or(InstructionError::MissingAccount)?;
        if !program_account.account.executable {
            return Err(InstructionError::AccountNotExecutable);
        }

        // The caller's own changes so far must hold up before the callee sees
        // them.
        self.refresh_current_frame()?;
        Ok(callee_accounts)
    }

    fn snapshot(&self, accounts: &[InstructionAccount]) -> Vec<(usize, Account)> {
        let mut pre_accounts: Vec<(usize, Account)> = Vec::with_capacity(accounts.len());
        for account in accounts {
            let index = account.index_in_transaction;
            if !pre_accounts.iter().any(|(seen, _)| *seen == index) {
                pre_accounts.push((index, self.accounts[index].account.clone()));
            }
        }
        pre_accounts
    }

    /// Verify the current frame, then take fresh snapshots of its accounts.
    fn refresh_current_frame(&mut self) -> Result<(), InstructionError> {
        self.verify_current_frame()?;
        self.snapshot_current_frame()
    }

    /// Accept the current state of the frame's accounts as its new baseline,
    /// as after a callee's changes have been verified.
    fn snapshot_current_frame(&mut self) -> Result<(), InstructionError> {
        let accounts = self.current_frame()?.accounts.clone();
        let pre_accounts = self.snapshot(&accounts);
        self.current_frame_mut()?.pre_accounts = pre_accounts;
        Ok(())
    }

    fn verify_current_frame(&self) -> Result<(), InstructionError> {
        let frame = self.current_frame()?;
        let max_data_len = self.max_account_data_size();
        let mut pre_sum: u128 = 0;
        let mut post_sum: u128 = 0;
        for (index, pre) in &frame.pre_accounts {
            let is_writable = frame
                .accounts
                .iter()
                .any(|account| account.index_in_transaction == *index && account.is_writable);
            let post = &self.accounts[*index].account;
            verify_account(&frame.program_id, is_writable, pre, post, max_data_len)?;
            pre_sum += u128::from(pre.lamports);
            post_sum += u128::from(post.lamports);
        }
        if pre_sum != post_sum {
            return Err(InstructionError::UnbalancedInstruction);
        }
        Ok(())
    }

    /// Tear the context down into the final account states, the captured
    /// logs, the return data and the compute units consumed.
    pub(crate) fn into_parts(self) -> (Vec<TransactionAccount>, Vec<String>, ReturnData, u64) {
        let logs = self.log_collector.borrow().get_recorded_content().to_vec();
        let consumed = self.compute_unit_limit - self.remaining_units;
        (self.accounts, logs, self.return_data, consumed)
    }
}

fn is_zeroed(data: &[u8]) -> bool {
    data.iter().all(|byte| *byte == 0)
}

/// Check the changes an instruction made to one account against what its
/// program was allowed to do.
fn verify_account(
    program_id: &Pubkey,
    is_writable: bool,
    pre: &Account,
    post: &Account,
    max_data_len: usize,
) -> Result<(), InstructionError> {
    let is_owner = pre.owner == *program_id;

    // Only the owner of a writable, non-executable account may assign it,
    // and only while its data is zeroed.
    if pre.owner != post.owner
        && (!is_writable || pre.executable || !is_owner || !is_zeroed(&post.data))
    {
        return Err(InstructionError::ModifiedProgramId);
    }

    if pre.lamports != post.lamports {
        if !is_owner && post.lamports < pre.lamports {
            return Err(InstructionError::ExternalAccountLamportSpend);
        }
        if !is_writable {
            return Err(InstructionError::ReadonlyLamportChange);
        }
        if pre.executable {
            return Err(InstructionError::ExecutableLamportChange);
        }
    }

    if pre.data.len() != post.data.len() {
        if !(is_writable && is_owner && !pre.executable) {
            return Err(InstructionError::AccountDataSizeChanged);
        }
        if post.data.len() > max_data_len {
            return Err(InstructionError::InvalidRealloc);
        }
    }

    if pre.data != post.data && !(is_writable && is_owner && !pre.executable) {
        return Err(if pre.executable {
            InstructionError::ExecutableDataModified
        } else if is_writable {
            InstructionError::ExternalAccountDataModified
        } else {
            InstructionError::ReadonlyDataModified
        });
    }

    if pre.executable != post.executable
        && (pre.executable || !is_writable || !is_owner)
    {
        return Err(InstructionError::ExecutableModified);
    }

    if pre.rent_epoch != post.rent_epoch {
        return Err(InstructionError::RentEpochModified);
    }
    Ok(())
}
