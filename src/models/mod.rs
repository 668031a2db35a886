mod budget;
mod expense;
mod group;
mod split;
mod user;

pub use budget::Budget;
pub use expense::{Expense, ExpenseCategory};
pub use group::{Group, GroupMember};
pub use split::{ExpenseShare, GroupExpense, Settlement};
pub use user::User;
