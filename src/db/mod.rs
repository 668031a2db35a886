mod budget_repo;
mod expense_repo;
mod group_repo;
mod split_repo;
mod user_repo;

pub use budget_repo::{BudgetRepository, BudgetStatus};
pub use expense_repo::{
    CategorySpending, ExpenseChanges, ExpenseFilter, ExpenseRepository, MonthlySpending,
};
pub use group_repo::{GroupError, GroupRepository, LeaveOutcome};
pub use split_repo::{NewShare, SplitError, SplitRepository};
pub use user_repo::{UserError, UserRepository};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations
pub async fn init_db(db_path: Option<PathBuf>) -> Result<SqlitePool, sqlx::Error> {
    let path = db_path.expect("database_path must be provided");

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create database directory");
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
