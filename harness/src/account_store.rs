//! In-memory account storage.

use {
    cuttle_svm_error::error::CuttleError,
    solana_account::Account,
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

/// Address to account mapping owned by a single harness.
///
/// Writes go through one of two paths: `set_account` for privileged caller
/// overwrites, and `commit` for the results of a processed transaction.
#[derive(Debug, Default)]
pub struct AccountsDb {
    accounts: HashMap<Pubkey, Account>,
    max_account_data_size: usize,
}

impl AccountsDb {
    pub fn new(max_account_data_size: usize) -> Self {
        Self {
            accounts: HashMap::new(),
            max_account_data_size,
        }
    }

    /// Get an owned snapshot of the account at the given public key.
    pub fn get_account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.accounts.get(pubkey).cloned()
    }

    pub fn get_account_ref(&self, pubkey: &Pubkey) -> Option<&Account> {
        self.accounts.get(pubkey)
    }

    pub fn contains(&self, pubkey: &Pubkey) -> bool {
        self.accounts.contains_key(pubkey)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn max_account_data_size(&self) -> usize {
        self.max_account_data_size
    }

    fn check_size(&self, pubkey: &Pubkey, account: &Account) -> Result<(), CuttleError> {
        if account.data.len() > self.max_account_data_size {
            return Err(CuttleError::InvalidAccountData {
                pubkey: *pubkey,
                len: account.data.len(),
                max: self.max_account_data_size,
            });
        }
        Ok(())
    }

    /// Overwrite an account directly, outside of any transaction.
    pub fn set_account(&mut self, pubkey: Pubkey, account: Account) -> Result<(), CuttleError> {
        self.check_size(&pubkey, &account)?;
        self.accounts.insert(pubkey, account);
        Ok(())
    }

    /// Apply the writable accounts of a processed transaction.
    ///
    /// Every account is validated before any is written, so either the whole
    /// batch lands or nothing does.
    pub fn commit(&mut self, accounts: &[(Pubkey, Account)]) -> Result<(), CuttleError> {
        for (pubkey, account) in accounts {
            self.check_size(pubkey, account)?;
        }
        for (pubkey, account) in accounts {
            log::trace!("committing account {pubkey}: {} lamports", account.lamports);
            self.accounts.insert(*pubkey, account.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut db = AccountsDb::new(8);
        let key = Pubkey::new_unique();
        assert!(!db.contains(&key));

        let account = Account::new(42, 8, &Pubkey::new_unique());
        db.set_account(key, account.clone()).unwrap();
        assert!(db.contains(&key));
        assert_eq!(db.get_account(&key), Some(account));
    }

    #[test]
    fn test_oversized_account_rejected() {
        let mut db = AccountsDb::new(8);
        let key = Pubkey::new_unique();
        assert_eq!(
            db.set_account(key, Account::new(1, 9, &Pubkey::default())),
            Err(CuttleError::InvalidAccountData {
                pubkey: key,
                len: 9,
                max: 8,
            }),
        );
        assert!(db.get_account(&key).is_none());
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let mut db = AccountsDb::new(8);
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let result = db.commit(&[
            (a, Account::new(1, 0, &Pubkey::default())),
            (b, Account::new(1, 64, &Pubkey::default())),
        ]);
        assert!(result.is_err());
        assert!(db.is_empty());
    }
}
