//! Personal expense storage and spending aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::user_repo::parse_timestamp;
use crate::models::{Expense, ExpenseCategory};

/// Optional filters for listing a user's expenses.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub skip: i64,
    pub limit: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub category: Option<ExpenseCategory>,
}

/// Partial update for an expense. Unset fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseChanges {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<ExpenseCategory>,
    pub spent_at: Option<DateTime<Utc>>,
}

/// Total spent in one calendar month.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlySpending {
    pub year: i32,
    pub month: u32,
    pub total_spent: f64,
}

/// Total spent in one category.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategorySpending {
    pub category: ExpenseCategory,
    pub total_spent: f64,
}

pub struct ExpenseRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ExpenseRow {
    id: String,
    owner_id: String,
    description: String,
    amount: f64,
    category: String,
    spent_at: String,
    created_at: String,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, expense: &Expense) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, owner_id, description, amount, category, spent_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.id.to_string())
        .bind(expense.owner_id.to_string())
        .bind(&expense.description)
        .bind(expense.amount)
        .bind(expense.category.as_str())
        .bind(expense.spent_at.to_rfc3339())
        .bind(expense.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches one expense, scoped to its owner.
    pub async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Expense>, sqlx::Error> {
        let row: Option<ExpenseRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, description, amount, category, spent_at, created_at
            FROM expenses WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(id.to_string())
        .bind(owner_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(hydrate_expense))
    }

    /// Lists a user's expenses, oldest first, applying the filter.
    pub async fn list(
        &self,
        owner_id: Uuid,
        filter: &ExpenseFilter,
    ) -> Result<Vec<Expense>, sqlx::Error> {
        let mut sql = String::from(
            "SELECT id, owner_id, description, amount, category, spent_at, created_at \
             FROM expenses WHERE owner_id = ?",
        );
        if filter.start_date.is_some() {
            sql.push_str(" AND datetime(spent_at) >= datetime(?)");
        }
        if filter.end_date.is_some() {
            sql.push_str(" AND datetime(spent_at) <= datetime(?)");
        }
        if filter.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        sql.push_str(" ORDER BY spent_at ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, ExpenseRow>(&sql).bind(owner_id.to_string());
        if let Some(start) = &filter.start_date {
            query = query.bind(start.to_rfc3339());
        }
        if let Some(end) = &filter.end_date {
            query = query.bind(end.to_rfc3339());
        }
        if let Some(category) = filter.category {
            query = query.bind(category.as_str());
        }
        let rows = query
            .bind(filter.limit.unwrap_or(100))
            .bind(filter.skip)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(hydrate_expense).collect())
    }

    /// Applies the set fields of `changes` to an expense. Returns `None`
    /// when the expense does not exist or belongs to someone else.
    pub async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: ExpenseChanges,
    ) -> Result<Option<Expense>, sqlx::Error> {
        let Some(mut expense) = self.get(owner_id, id).await? else {
            return Ok(None);
        };

        if let Some(description) = changes.description {
            expense.description = description;
        }
        if let Some(amount) = changes.amount {
            expense.amount = amount;
        }
        if let Some(category) = changes.category {
            expense.category = category;
        }
        if let Some(spent_at) = changes.spent_at {
            expense.spent_at = spent_at;
        }

        sqlx::query(
            r#"
            UPDATE expenses SET description = ?, amount = ?, category = ?, spent_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(&expense.description)
        .bind(expense.amount)
        .bind(expense.category.as_str())
        .bind(expense.spent_at.to_rfc3339())
        .bind(id.to_string())
        .bind(owner_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(Some(expense))
    }

    /// Deletes an expense. Returns false when nothing matched.
    pub async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Total spending per calendar month across all years, ascending.
    pub async fn monthly_spending(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<MonthlySpending>, sqlx::Error> {
        let rows: Vec<(i64, i64, f64)> = sqlx::query_as(
            r#"
            SELECT CAST(strftime('%Y', spent_at) AS INTEGER) AS year,
                   CAST(strftime('%m', spent_at) AS INTEGER) AS month,
                   SUM(amount) AS total_spent
            FROM expenses
            WHERE owner_id = ?
            GROUP BY year, month
            ORDER BY year, month
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(year, month, total_spent)| MonthlySpending {
                year: year as i32,
                month: month as u32,
                total_spent,
            })
            .collect())
    }

    /// Total spending per category, optionally narrowed to one month/year.
    pub async fn spending_by_category(
        &self,
        owner_id: Uuid,
        month: Option<u32>,
        year: Option<i32>,
    ) -> Result<Vec<CategorySpending>, sqlx::Error> {
        let mut sql = String::from(
            "SELECT category, SUM(amount) AS total_spent FROM expenses WHERE owner_id = ?",
        );
        if month.is_some() {
            sql.push_str(" AND CAST(strftime('%m', spent_at) AS INTEGER) = ?");
        }
        if year.is_some() {
            sql.push_str(" AND CAST(strftime('%Y', spent_at) AS INTEGER) = ?");
        }
        sql.push_str(" GROUP BY category ORDER BY category");

        let mut query = sqlx::query_as::<_, (String, f64)>(&sql).bind(owner_id.to_string());
        if let Some(month) = month {
            query = query.bind(month as i64);
        }
        if let Some(year) = year {
            query = query.bind(year as i64);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(category, total_spent)| CategorySpending {
                category: category.parse().unwrap_or_default(),
                total_spent,
            })
            .collect())
    }
}

fn hydrate_expense(row: ExpenseRow) -> Expense {
    Expense {
        id: Uuid::parse_str(&row.id).unwrap(),
        owner_id: Uuid::parse_str(&row.owner_id).unwrap(),
        description: row.description,
        amount: row.amount,
        category: row.category.parse().unwrap_or_default(),
        spent_at: parse_timestamp(&row.spent_at),
        created_at: parse_timestamp(&row.created_at),
    }
}
