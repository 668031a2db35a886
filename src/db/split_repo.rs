//! Group expense ledger storage.
//!
//! A group expense and its per-member shares are one logical unit: they
//! commit together or not at all, and are immutable once recorded.

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::user_repo::parse_timestamp;
use crate::models::{ExpenseShare, GroupExpense, Settlement};

/// Shares may differ from the expense amount by at most this much before
/// the expense is rejected.
const SHARE_SUM_TOLERANCE: f64 = 0.01;

/// One requested share allocation for a new group expense.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewShare {
    #[serde(alias = "userId")]
    pub user_id: Uuid,
    #[serde(alias = "shareAmount")]
    pub share_amount: f64,
}

/// Errors that can occur recording or reading the group ledger.
#[derive(Debug)]
pub enum SplitError {
    /// Group does not exist.
    GroupNotFound,
    /// A referenced user is not a current member of the group.
    NotAMember(Uuid),
    /// Malformed amounts or shares.
    Validation(String),
    /// Underlying storage error.
    Database(sqlx::Error),
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitError::GroupNotFound => write!(f, "Group not found"),
            SplitError::NotAMember(user_id) => {
                write!(f, "User {} is not a member of this group", user_id)
            }
            SplitError::Validation(msg) => write!(f, "{}", msg),
            SplitError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SplitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SplitError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for SplitError {
    fn from(e: sqlx::Error) -> Self {
        SplitError::Database(e)
    }
}

pub struct SplitRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ExpenseRow {
    id: String,
    group_id: String,
    description: String,
    amount: f64,
    paid_by: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct ShareRow {
    user_id: String,
    share_amount: f64,
    is_paid: bool,
}

#[derive(sqlx::FromRow)]
struct SettlementRow {
    id: String,
    group_id: String,
    payer_id: String,
    receiver_id: String,
    amount: f64,
    settled_at: String,
}

impl SplitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records a group expense and its shares atomically.
    ///
    /// The payer and every share holder must be current members, share
    /// amounts must be positive and distinct per user, and non-empty
    /// shares must sum to the expense amount within [`SHARE_SUM_TOLERANCE`].
    /// An empty share list is allowed and means the amount splits evenly
    /// across current members when balances are computed.
    pub async fn record_expense(
        &self,
        group_id: Uuid,
        payer_id: Uuid,
        description: &str,
        amount: f64,
        shares: &[NewShare],
    ) -> Result<GroupExpense, SplitError> {
        let members = self.member_ids(group_id).await?;
        if members.is_empty() {
            return Err(SplitError::GroupNotFound);
        }

        if !amount.is_finite() || amount <= 0.0 {
            return Err(SplitError::Validation(
                "Expense amount must be positive".to_string(),
            ));
        }
        if !members.contains(&payer_id) {
            return Err(SplitError::NotAMember(payer_id));
        }

        let mut seen = Vec::with_capacity(shares.len());
        for share in shares {
            if !share.share_amount.is_finite() || share.share_amount <= 0.0 {
                return Err(SplitError::Validation(
                    "Share amounts must be positive".to_string(),
                ));
            }
            if seen.contains(&share.user_id) {
                return Err(SplitError::Validation(format!(
                    "Duplicate share for user {}",
                    share.user_id
                )));
            }
            if !members.contains(&share.user_id) {
                return Err(SplitError::NotAMember(share.user_id));
            }
            seen.push(share.user_id);
        }

        if !shares.is_empty() {
            let total: f64 = shares.iter().map(|s| s.share_amount).sum();
            if (total - amount).abs() > SHARE_SUM_TOLERANCE {
                return Err(SplitError::Validation(format!(
                    "Shares sum to {:.2} but the expense amount is {:.2}",
                    total, amount
                )));
            }
        }

        let expense = GroupExpense::new(group_id, payer_id, description, amount).with_shares(
            shares
                .iter()
                .map(|s| ExpenseShare {
                    user_id: s.user_id,
                    share_amount: s.share_amount,
                    is_paid: false,
                })
                .collect(),
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO group_expenses (id, group_id, description, amount, paid_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.id.to_string())
        .bind(group_id.to_string())
        .bind(&expense.description)
        .bind(expense.amount)
        .bind(payer_id.to_string())
        .bind(expense.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for share in &expense.shares {
            sqlx::query(
                "INSERT INTO expense_shares (expense_id, user_id, share_amount, is_paid) VALUES (?, ?, ?, ?)",
            )
            .bind(expense.id.to_string())
            .bind(share.user_id.to_string())
            .bind(share.share_amount)
            .bind(share.is_paid)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(expense)
    }

    /// All expenses of a group in creation order, shares attached in the
    /// order they were submitted.
    pub async fn list_expenses(&self, group_id: Uuid) -> Result<Vec<GroupExpense>, SplitError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(
            r#"
            SELECT id, group_id, description, amount, paid_by, created_at
            FROM group_expenses
            WHERE group_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut expenses = Vec::with_capacity(rows.len());
        for row in rows {
            expenses.push(self.hydrate_expense(row).await?);
        }
        Ok(expenses)
    }

    /// Records a direct payment from `payer_id` to `receiver_id`.
    pub async fn record_settlement(
        &self,
        group_id: Uuid,
        payer_id: Uuid,
        receiver_id: Uuid,
        amount: f64,
    ) -> Result<Settlement, SplitError> {
        let members = self.member_ids(group_id).await?;
        if members.is_empty() {
            return Err(SplitError::GroupNotFound);
        }

        if !amount.is_finite() || amount <= 0.0 {
            return Err(SplitError::Validation(
                "Settlement amount must be positive".to_string(),
            ));
        }
        if payer_id == receiver_id {
            return Err(SplitError::Validation(
                "Cannot settle with yourself".to_string(),
            ));
        }
        if !members.contains(&payer_id) {
            return Err(SplitError::NotAMember(payer_id));
        }
        if !members.contains(&receiver_id) {
            return Err(SplitError::NotAMember(receiver_id));
        }

        let settlement = Settlement::new(group_id, payer_id, receiver_id, amount);
        sqlx::query(
            r#"
            INSERT INTO settlements (id, group_id, payer_id, receiver_id, amount, settled_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(settlement.id.to_string())
        .bind(group_id.to_string())
        .bind(payer_id.to_string())
        .bind(receiver_id.to_string())
        .bind(settlement.amount)
        .bind(settlement.settled_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(settlement)
    }

    /// All settlements of a group, oldest first.
    pub async fn list_settlements(&self, group_id: Uuid) -> Result<Vec<Settlement>, SplitError> {
        let rows: Vec<SettlementRow> = sqlx::query_as(
            r#"
            SELECT id, group_id, payer_id, receiver_id, amount, settled_at
            FROM settlements
            WHERE group_id = ?
            ORDER BY settled_at ASC
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Settlement {
                id: Uuid::parse_str(&row.id).unwrap(),
                group_id: Uuid::parse_str(&row.group_id).unwrap(),
                payer_id: Uuid::parse_str(&row.payer_id).unwrap(),
                receiver_id: Uuid::parse_str(&row.receiver_id).unwrap(),
                amount: row.amount,
                settled_at: parse_timestamp(&row.settled_at),
            })
            .collect())
    }

    async fn member_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>, SplitError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM group_members WHERE group_id = ?")
                .bind(group_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id,)| Uuid::parse_str(&id).unwrap())
            .collect())
    }

    async fn hydrate_expense(&self, row: ExpenseRow) -> Result<GroupExpense, SplitError> {
        let shares: Vec<ShareRow> = sqlx::query_as(
            "SELECT user_id, share_amount, is_paid FROM expense_shares WHERE expense_id = ? ORDER BY rowid",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(GroupExpense {
            id: Uuid::parse_str(&row.id).unwrap(),
            group_id: Uuid::parse_str(&row.group_id).unwrap(),
            description: row.description,
            amount: row.amount,
            paid_by: Uuid::parse_str(&row.paid_by).unwrap(),
            created_at: parse_timestamp(&row.created_at),
            shares: shares
                .into_iter()
                .map(|s| ExpenseShare {
                    user_id: Uuid::parse_str(&s.user_id).unwrap(),
                    share_amount: s.share_amount,
                    is_paid: s.is_paid,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, GroupRepository, UserRepository};
    use crate::models::{Group, User};
    use tempfile::TempDir;

    struct TestContext {
        splits: SplitRepository,
        groups: GroupRepository,
        users: UserRepository,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            splits: SplitRepository::new(pool.clone()),
            groups: GroupRepository::new(pool.clone()),
            users: UserRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    /// Registers alice, bob, and carol and puts them in one group.
    async fn trio(ctx: &TestContext) -> (Group, User, User, User) {
        let alice = ctx
            .users
            .create("alice", "alice@example.com", "secret")
            .await
            .unwrap();
        let bob = ctx
            .users
            .create("bob", "bob@example.com", "secret")
            .await
            .unwrap();
        let carol = ctx
            .users
            .create("carol", "carol@example.com", "secret")
            .await
            .unwrap();
        let group = ctx
            .groups
            .create(
                "Trip",
                None,
                alice.id,
                &["bob@example.com".to_string(), "carol@example.com".to_string()],
            )
            .await
            .unwrap();
        (group, alice, bob, carol)
    }

    #[tokio::test]
    async fn test_record_and_list_roundtrip() {
        let ctx = setup().await;
        let (group, alice, bob, carol) = trio(&ctx).await;

        let created = ctx
            .splits
            .record_expense(
                group.id,
                alice.id,
                "Dinner",
                30.0,
                &[
                    NewShare {
                        user_id: alice.id,
                        share_amount: 10.0,
                    },
                    NewShare {
                        user_id: bob.id,
                        share_amount: 10.0,
                    },
                    NewShare {
                        user_id: carol.id,
                        share_amount: 10.0,
                    },
                ],
            )
            .await
            .unwrap();

        ctx.splits
            .record_expense(group.id, bob.id, "Taxi", 12.0, &[])
            .await
            .unwrap();

        let listed = ctx.splits.list_expenses(group.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        // Creation order, shares exactly as submitted
        assert_eq!(listed[0], created);
        assert_eq!(listed[0].shares.len(), 3);
        assert_eq!(listed[0].shares[0].user_id, alice.id);
        assert_eq!(listed[0].shares[1].user_id, bob.id);
        assert_eq!(listed[1].description, "Taxi");
        assert!(listed[1].shares.is_empty());
    }

    #[tokio::test]
    async fn test_record_expense_rejects_bad_amounts() {
        let ctx = setup().await;
        let (group, alice, _bob, _carol) = trio(&ctx).await;

        let err = ctx
            .splits
            .record_expense(group.id, alice.id, "Nothing", 0.0, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Validation(_)));

        let err = ctx
            .splits
            .record_expense(group.id, alice.id, "Negative", -5.0, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Validation(_)));
    }

    #[tokio::test]
    async fn test_record_expense_rejects_share_mismatch() {
        let ctx = setup().await;
        let (group, alice, bob, _carol) = trio(&ctx).await;

        let err = ctx
            .splits
            .record_expense(
                group.id,
                alice.id,
                "Dinner",
                30.0,
                &[
                    NewShare {
                        user_id: alice.id,
                        share_amount: 10.0,
                    },
                    NewShare {
                        user_id: bob.id,
                        share_amount: 10.0,
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Validation(_)));

        // And nothing was persisted
        assert!(ctx.splits.list_expenses(group.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_expense_tolerates_rounding() {
        let ctx = setup().await;
        let (group, alice, bob, carol) = trio(&ctx).await;

        // 10.00 split three ways: 3.33 + 3.33 + 3.34 is within tolerance
        ctx.splits
            .record_expense(
                group.id,
                alice.id,
                "Coffee",
                10.0,
                &[
                    NewShare {
                        user_id: alice.id,
                        share_amount: 3.33,
                    },
                    NewShare {
                        user_id: bob.id,
                        share_amount: 3.33,
                    },
                    NewShare {
                        user_id: carol.id,
                        share_amount: 3.34,
                    },
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_record_expense_rejects_non_members() {
        let ctx = setup().await;
        let (group, alice, _bob, _carol) = trio(&ctx).await;
        let stranger = ctx
            .users
            .create("dave", "dave@example.com", "secret")
            .await
            .unwrap();

        let err = ctx
            .splits
            .record_expense(group.id, stranger.id, "Sneaky", 10.0, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::NotAMember(id) if id == stranger.id));

        let err = ctx
            .splits
            .record_expense(
                group.id,
                alice.id,
                "Dinner",
                10.0,
                &[NewShare {
                    user_id: stranger.id,
                    share_amount: 10.0,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::NotAMember(id) if id == stranger.id));
    }

    #[tokio::test]
    async fn test_record_expense_rejects_duplicate_share_user() {
        let ctx = setup().await;
        let (group, alice, _bob, _carol) = trio(&ctx).await;

        let err = ctx
            .splits
            .record_expense(
                group.id,
                alice.id,
                "Dinner",
                20.0,
                &[
                    NewShare {
                        user_id: alice.id,
                        share_amount: 10.0,
                    },
                    NewShare {
                        user_id: alice.id,
                        share_amount: 10.0,
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_group() {
        let ctx = setup().await;
        let alice = ctx
            .users
            .create("alice", "alice@example.com", "secret")
            .await
            .unwrap();

        let err = ctx
            .splits
            .record_expense(Uuid::new_v4(), alice.id, "Ghost", 10.0, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::GroupNotFound));
    }

    #[tokio::test]
    async fn test_settlement_roundtrip_and_validation() {
        let ctx = setup().await;
        let (group, alice, bob, _carol) = trio(&ctx).await;

        let settlement = ctx
            .splits
            .record_settlement(group.id, bob.id, alice.id, 10.0)
            .await
            .unwrap();
        assert_eq!(settlement.payer_id, bob.id);
        assert_eq!(settlement.receiver_id, alice.id);

        let listed = ctx.splits.list_settlements(group.id).await.unwrap();
        assert_eq!(listed, vec![settlement]);

        let err = ctx
            .splits
            .record_settlement(group.id, bob.id, bob.id, 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Validation(_)));

        let err = ctx
            .splits
            .record_settlement(group.id, bob.id, alice.id, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Validation(_)));
    }
}
