//! Tally core library.
//!
//! Shared models, storage, and server wiring for the Tally expense tracker.

pub mod config;
pub mod db;
pub mod ledger;
pub mod models;
pub mod server;

pub use config::{Config, ConfigError};
pub use ledger::{compute_balances, BalanceSheet, MemberBalance};
pub use models::{
    Budget, Expense, ExpenseCategory, ExpenseShare, Group, GroupExpense, GroupMember, Settlement,
    User,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
