//! Check system for validating individual transaction results.

use {
    crate::{
        config::{compare, throw, CheckContext, Config},
        types::{TransactionResult, TransactionResultExt},
    },
    cuttle_svm_error::error::TransactionError,
    solana_account::Account,
    solana_instruction::error::InstructionError,
    solana_pubkey::Pubkey,
};

enum CheckType<'a> {
    /// Check the number of compute units consumed by the transaction.
    ComputeUnitsConsumed(u64),
    /// Check the fee charged to the fee payer.
    Fee(u64),
    /// Check the outcome of the transaction.
    Outcome(Result<(), TransactionError>),
    /// Check the return data produced by the transaction.
    ReturnData(&'a [u8]),
    /// Check that some log line contains the given text.
    LogContains(&'a str),
    /// Check a resulting account after processing the transaction.
    ResultingAccount(AccountCheck<'a>),
    /// Check that all resulting accounts are rent exempt.
    AllRentExempt,
}

pub struct Check<'a> {
    check: CheckType<'a>,
}

impl<'a> Check<'a> {
    fn new(check: CheckType<'a>) -> Self {
        Self { check }
    }

    /// Check the number of compute units consumed by the transaction.
    pub fn compute_units(units: u64) -> Self {
        Check::new(CheckType::ComputeUnitsConsumed(units))
    }

    /// Check the fee charged to the fee payer.
    pub fn fee(lamports: u64) -> Self {
        Check::new(CheckType::Fee(lamports))
    }

    /// Assert that the transaction succeeded.
    pub fn success() -> Self {
        Check::new(CheckType::Outcome(Ok(())))
    }

    /// Assert that the transaction failed with the given error.
    pub fn err(error: TransactionError) -> Self {
        Check::new(CheckType::Outcome(Err(error)))
    }

    /// Assert that the instruction at `index` failed with the given error.
    pub fn instruction_err(index: u8, error: InstructionError) -> Self {
        Check::err(TransactionError::from_instruction_error(index, error))
    }

    /// Check the return data produced by the transaction.
    pub fn return_data(return_data: &'a [u8]) -> Self {
        Check::new(CheckType::ReturnData(return_data))
    }

    /// Check that at least one log line contains `text`.
    pub fn log(text: &'a str) -> Self {
        Check::new(CheckType::LogContains(text))
    }

    /// Check a resulting account after processing the transaction.
    pub fn account(pubkey: &Pubkey) -> AccountCheckBuilder<'a> {
        AccountCheckBuilder::new(pubkey)
    }

    /// Check that all resulting accounts are rent exempt.
    pub fn all_rent_exempt() -> Self {
        Check::new(CheckType::AllRentExempt)
    }
}

enum AccountStateCheck {
    Closed,
    RentExempt,
}

struct AccountCheck<'a> {
    pubkey: Pubkey,
    check_data: Option<&'a [u8]>,
    check_executable: Option<bool>,
    check_lamports: Option<u64>,
    check_owner: Option<&'a Pubkey>,
    check_space: Option<usize>,
    check_state: Option<AccountStateCheck>,
}

pub struct AccountCheckBuilder<'a> {
    check: AccountCheck<'a>,
}

impl<'a> AccountCheckBuilder<'a> {
    fn new(pubkey: &Pubkey) -> Self {
        Self {
            check: AccountCheck {
                pubkey: *pubkey,
                check_data: None,
                check_executable: None,
                check_lamports: None,
                check_owner: None,
                check_space: None,
                check_state: None,
            },
        }
    }

    pub fn closed(mut self) -> Self {
        self.check.check_state = Some(AccountStateCheck::Closed);
        self
    }

    pub fn data(mut self, data: &'a [u8]) -> Self {
        self.check.check_data = Some(data);
        self
    }

    pub fn executable(mut self, executable: bool) -> Self {
        self.check.check_executable = Some(executable);
        self
    }

    pub fn lamports(mut self, lamports: u64) -> Self {
        self.check.check_lamports = Some(lamports);
        self
    }

    pub fn owner(mut self, owner: &'a Pubkey) -> Self {
        self.check.check_owner = Some(owner);
        self
    }

    pub fn rent_exempt(mut self) -> Self {
        self.check.check_state = Some(AccountStateCheck::RentExempt);
        self
    }

    pub fn space(mut self, space: usize) -> Self {
        self.check.check_space = Some(space);
        self
    }

    pub fn build(self) -> Check<'a> {
        Check::new(CheckType::ResultingAccount(self.check))
    }
}

/// Run a series of checks against a transaction result.
pub trait RunChecks {
    /// Perform checks on the result with a custom context. Returns `true`
    /// if every check passed.
    ///
    /// Note: `Cuttle` implements `CheckContext`, in case you don't want to
    /// define a custom context.
    fn run_checks<C: CheckContext>(&self, checks: &[Check], config: &Config, context: &C) -> bool;
}

impl RunChecks for TransactionResult {
    fn run_checks<C: CheckContext>(&self, checks: &[Check], config: &Config, context: &C) -> bool {
        let c = config;
        let meta = self.meta();
        let mut pass = true;
        for check in checks {
            match &check.check {
                CheckType::ComputeUnitsConsumed(units) => {
                    pass &= compare!(c, "compute_units", *units, meta.compute_units_consumed);
                }
                CheckType::Fee(fee) => {
                    pass &= compare!(c, "fee", *fee, meta.fee);
                }
                CheckType::Outcome(expected) => {
                    let actual = self.error().map_or(Ok(()), |err| Err(err.clone()));
                    pass &= compare!(c, "outcome", *expected, actual);
                }
                CheckType::ReturnData(return_data) => {
                    let actual = meta.return_data.data.as_slice();
                    pass &= compare!(c, "return_data", *return_data, actual);
                }
                CheckType::LogContains(text) => {
                    if !meta.logs.iter().any(|line| line.contains(text)) {
                        pass &= throw!(
                            c,
                            "No log line contains {:?}. Logs:\n{}",
                            text,
                            meta.pretty_logs(),
                        );
                    }
                }
                CheckType::ResultingAccount(account) => {
                    let pubkey = account.pubkey;
                    let Some(resulting_account) = meta
                        .get_account(&pubkey)
                        .cloned()
                        .or_else(|| context.get_account(&pubkey))
                    else {
                        pass &= throw!(c, "Account not found in resulting accounts: {}", pubkey);
                        continue;
                    };
                    pass &= check_account(c, context, account, &resulting_account);
                }
                CheckType::AllRentExempt => {
                    for (pubkey, account) in &meta.post_accounts {
                        if !context.is_rent_exempt(account.lamports, account.data.len()) {
                            pass &= throw!(
                                c,
                                "Account {} is not rent exempt after execution (lamports: {}, \
                                 data_len: {})",
                                pubkey,
                                account.lamports,
                                account.data.len()
                            );
                        }
                    }
                }
            }
        }
        pass
    }
}

fn check_account<C: CheckContext>(
    c: &Config,
    context: &C,
    account: &AccountCheck,
    resulting_account: &Account,
) -> bool {
    let mut pass = true;
    if let Some(check_data) = account.check_data {
        let actual_data = resulting_account.data.as_slice();
        pass &= compare!(c, "account_data", check_data, actual_data);
    }
    if let Some(check_executable) = account.check_executable {
        pass &= compare!(
            c,
            "account_executable",
            check_executable,
            resulting_account.executable
        );
    }
    if let Some(check_lamports) = account.check_lamports {
        pass &= compare!(c, "account_lamports", check_lamports, resulting_account.lamports);
    }
    if let Some(check_owner) = account.check_owner {
        pass &= compare!(c, "account_owner", *check_owner, resulting_account.owner);
    }
    if let Some(check_space) = account.check_space {
        pass &= compare!(c, "account_space", check_space, resulting_account.data.len());
    }
    match &account.check_state {
        Some(AccountStateCheck::Closed) => {
            pass &= compare!(c, "account_closed", 0, resulting_account.lamports);
        }
        Some(AccountStateCheck::RentExempt) => {
            pass &= compare!(
                c,
                "account_rent_exempt",
                true,
                context.is_rent_exempt(resulting_account.lamports, resulting_account.data.len()),
            );
        }
        None => {}
    }
    pass
}
