//! Monthly budget storage and remaining-budget math.

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::user_repo::parse_timestamp;
use crate::models::Budget;

/// A month's budget position: what was set, what was spent, what is left.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetStatus {
    pub budget_set: bool,
    pub total_budget: f64,
    pub total_spent: f64,
    pub remaining_amount: f64,
}

pub struct BudgetRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct BudgetRow {
    id: String,
    owner_id: String,
    month: i64,
    year: i64,
    amount: f64,
    created_at: String,
}

impl BudgetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Sets the budget for (owner, month, year), replacing the amount if
    /// one is already set.
    pub async fn upsert(
        &self,
        owner_id: Uuid,
        month: u32,
        year: i32,
        amount: f64,
    ) -> Result<Budget, sqlx::Error> {
        if let Some(mut existing) = self.get(owner_id, month, year).await? {
            sqlx::query("UPDATE budgets SET amount = ? WHERE id = ?")
                .bind(amount)
                .bind(existing.id.to_string())
                .execute(&self.pool)
                .await?;
            existing.amount = amount;
            return Ok(existing);
        }

        let budget = Budget::new(owner_id, month, year, amount);
        sqlx::query(
            r#"
            INSERT INTO budgets (id, owner_id, month, year, amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(budget.id.to_string())
        .bind(owner_id.to_string())
        .bind(month as i64)
        .bind(year as i64)
        .bind(amount)
        .bind(budget.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(budget)
    }

    pub async fn get(
        &self,
        owner_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Option<Budget>, sqlx::Error> {
        let row: Option<BudgetRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, month, year, amount, created_at
            FROM budgets WHERE owner_id = ? AND month = ? AND year = ?
            "#,
        )
        .bind(owner_id.to_string())
        .bind(month as i64)
        .bind(year as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Budget {
            id: Uuid::parse_str(&row.id).unwrap(),
            owner_id: Uuid::parse_str(&row.owner_id).unwrap(),
            month: row.month as u32,
            year: row.year as i32,
            amount: row.amount,
            created_at: parse_timestamp(&row.created_at),
        }))
    }

    /// Budget position for one month. With no budget set, everything is
    /// reported as zero rather than an error.
    pub async fn status(
        &self,
        owner_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<BudgetStatus, sqlx::Error> {
        let Some(budget) = self.get(owner_id, month, year).await? else {
            return Ok(BudgetStatus {
                budget_set: false,
                total_budget: 0.0,
                total_spent: 0.0,
                remaining_amount: 0.0,
            });
        };

        let total_spent = self.month_spending(owner_id, month, year).await?;
        Ok(BudgetStatus {
            budget_set: true,
            total_budget: budget.amount,
            total_spent,
            remaining_amount: budget.amount - total_spent,
        })
    }

    async fn month_spending(
        &self,
        owner_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<f64, sqlx::Error> {
        let (total,): (f64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0.0)
            FROM expenses
            WHERE owner_id = ?
              AND CAST(strftime('%m', spent_at) AS INTEGER) = ?
              AND CAST(strftime('%Y', spent_at) AS INTEGER) = ?
            "#,
        )
        .bind(owner_id.to_string())
        .bind(month as i64)
        .bind(year as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, ExpenseRepository, UserRepository};
    use crate::models::Expense;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct TestContext {
        budgets: BudgetRepository,
        expenses: ExpenseRepository,
        owner: Uuid,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        let owner = UserRepository::new(pool.clone())
            .create("alice", "alice@example.com", "secret")
            .await
            .unwrap()
            .id;
        TestContext {
            budgets: BudgetRepository::new(pool.clone()),
            expenses: ExpenseRepository::new(pool),
            owner,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_replaces() {
        let ctx = setup().await;

        let created = ctx.budgets.upsert(ctx.owner, 1, 2025, 500.0).await.unwrap();
        assert_eq!(created.amount, 500.0);

        let replaced = ctx.budgets.upsert(ctx.owner, 1, 2025, 650.0).await.unwrap();
        assert_eq!(replaced.id, created.id);
        assert_eq!(replaced.amount, 650.0);

        let fetched = ctx.budgets.get(ctx.owner, 1, 2025).await.unwrap().unwrap();
        assert_eq!(fetched.amount, 650.0);

        // A different month is a different budget
        assert!(ctx.budgets.get(ctx.owner, 2, 2025).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_without_budget() {
        let ctx = setup().await;

        let status = ctx.budgets.status(ctx.owner, 3, 2025).await.unwrap();
        assert_eq!(
            status,
            BudgetStatus {
                budget_set: false,
                total_budget: 0.0,
                total_spent: 0.0,
                remaining_amount: 0.0,
            }
        );
    }

    #[tokio::test]
    async fn test_status_subtracts_month_spending() {
        let ctx = setup().await;
        ctx.budgets.upsert(ctx.owner, 1, 2025, 500.0).await.unwrap();

        for (amount, day, month) in [(100.0, 5, 1), (20.5, 20, 1), (999.0, 5, 2)] {
            let expense = Expense::new(ctx.owner, "x", amount)
                .with_spent_at(Utc.with_ymd_and_hms(2025, month, day, 12, 0, 0).unwrap());
            ctx.expenses.create(&expense).await.unwrap();
        }

        let status = ctx.budgets.status(ctx.owner, 1, 2025).await.unwrap();
        assert!(status.budget_set);
        assert_eq!(status.total_budget, 500.0);
        // Only January's expenses count
        assert!((status.total_spent - 120.5).abs() < 1e-9);
        assert!((status.remaining_amount - 379.5).abs() < 1e-9);
    }
}
