//! Validation configuration and the reporting macros shared by checks.

use {solana_account::Account, solana_pubkey::Pubkey, std::fmt};

/// Configuration for how check failures are reported.
#[derive(Clone, Debug)]
pub struct Config {
    /// Panic on the first failed check.
    pub panic: bool,
    /// Log every failed check when not panicking.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            panic: true,
            verbose: false,
        }
    }
}

/// Environment-dependent information a check may need.
///
/// The Cuttle harness implements this, so most callers simply pass the
/// harness itself.
pub trait CheckContext {
    /// Whether an account with the given balance and size is rent exempt.
    fn is_rent_exempt(&self, lamports: u64, space: usize) -> bool;

    /// Look up an account that was not part of the transaction's writable
    /// set, such as when the transaction failed and nothing was committed.
    fn get_account(&self, _pubkey: &Pubkey) -> Option<Account> {
        None
    }
}

pub(crate) fn report(config: &Config, message: fmt::Arguments) -> bool {
    if config.panic {
        panic!("{}", message);
    }
    if config.verbose {
        log::error!("{}", message);
    }
    false
}

macro_rules! compare {
    ($c:expr, $name:expr, $expected:expr, $actual:expr $(,)?) => {{
        if $expected == $actual {
            true
        } else {
            $crate::config::report(
                $c,
                format_args!(
                    "CHECK FAILURE: {}\n  Expected: {:?}\n  Actual:   {:?}",
                    $name, $expected, $actual,
                ),
            )
        }
    }};
}

macro_rules! throw {
    ($c:expr, $($arg:tt)+) => {
        $crate::config::report($c, format_args!($($arg)+))
    };
}

pub(crate) use {compare, throw};
