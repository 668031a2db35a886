use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An expense paid on behalf of a group, immutable once recorded.
///
/// `shares` holds the explicit per-member allocation. An empty list means
/// the amount is split evenly across current members when balances are
/// computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupExpense {
    pub id: Uuid,
    pub group_id: Uuid,
    pub description: String,
    pub amount: f64,
    pub paid_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub shares: Vec<ExpenseShare>,
}

/// One member's slice of a group expense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseShare {
    pub user_id: Uuid,
    pub share_amount: f64,
    #[serde(default)]
    pub is_paid: bool,
}

/// A direct payment between two members reducing mutual debt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settlement {
    pub id: Uuid,
    pub group_id: Uuid,
    pub payer_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: f64,
    pub settled_at: DateTime<Utc>,
}

impl GroupExpense {
    pub fn new(
        group_id: Uuid,
        paid_by: Uuid,
        description: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            description: description.into(),
            amount,
            paid_by,
            created_at: Utc::now(),
            shares: Vec::new(),
        }
    }

    pub fn with_shares(mut self, shares: Vec<ExpenseShare>) -> Self {
        self.shares = shares;
        self
    }

    /// Sum of the explicit shares, 0.0 when none were recorded.
    pub fn shares_total(&self) -> f64 {
        self.shares.iter().map(|s| s.share_amount).sum()
    }
}

impl Settlement {
    pub fn new(group_id: Uuid, payer_id: Uuid, receiver_id: Uuid, amount: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            payer_id,
            receiver_id,
            amount,
            settled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shares_total() {
        let expense = GroupExpense::new(Uuid::new_v4(), Uuid::new_v4(), "Dinner", 30.0)
            .with_shares(vec![
                ExpenseShare {
                    user_id: Uuid::new_v4(),
                    share_amount: 10.0,
                    is_paid: false,
                },
                ExpenseShare {
                    user_id: Uuid::new_v4(),
                    share_amount: 20.0,
                    is_paid: false,
                },
            ]);
        assert_eq!(expense.shares_total(), 30.0);
    }

    #[test]
    fn test_shares_total_empty() {
        let expense = GroupExpense::new(Uuid::new_v4(), Uuid::new_v4(), "Taxi", 12.5);
        assert_eq!(expense.shares_total(), 0.0);
    }
}
