use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Spending categories for personal expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Food,
    Travel,
    Rent,
    Utilities,
    Entertainment,
    Shopping,
    Health,
    Education,
    Transportation,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 10] = [
        ExpenseCategory::Food,
        ExpenseCategory::Travel,
        ExpenseCategory::Rent,
        ExpenseCategory::Utilities,
        ExpenseCategory::Entertainment,
        ExpenseCategory::Shopping,
        ExpenseCategory::Health,
        ExpenseCategory::Education,
        ExpenseCategory::Transportation,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Food => "Food",
            ExpenseCategory::Travel => "Travel",
            ExpenseCategory::Rent => "Rent",
            ExpenseCategory::Utilities => "Utilities",
            ExpenseCategory::Entertainment => "Entertainment",
            ExpenseCategory::Shopping => "Shopping",
            ExpenseCategory::Health => "Health",
            ExpenseCategory::Education => "Education",
            ExpenseCategory::Transportation => "Transportation",
            ExpenseCategory::Other => "Other",
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpenseCategory::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown expense category: {}", s))
    }
}

impl Default for ExpenseCategory {
    fn default() -> Self {
        ExpenseCategory::Other
    }
}

/// A personal (non-group) expense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub description: String,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub spent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(owner_id: Uuid, description: impl Into<String>, amount: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            description: description.into(),
            amount,
            category: ExpenseCategory::Other,
            spent_at: now,
            created_at: now,
        }
    }

    pub fn with_category(mut self, category: ExpenseCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_spent_at(mut self, spent_at: DateTime<Utc>) -> Self {
        self.spent_at = spent_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("Food".parse::<ExpenseCategory>(), Ok(ExpenseCategory::Food));
        assert_eq!("food".parse::<ExpenseCategory>(), Ok(ExpenseCategory::Food));
        assert_eq!(
            "TRANSPORTATION".parse::<ExpenseCategory>(),
            Ok(ExpenseCategory::Transportation)
        );
        assert!("Groceries".parse::<ExpenseCategory>().is_err());
    }

    #[test]
    fn test_category_roundtrip() {
        for category in ExpenseCategory::ALL {
            assert_eq!(category.as_str().parse::<ExpenseCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_expense_builder() {
        let owner = Uuid::new_v4();
        let expense = Expense::new(owner, "Lunch", 14.5).with_category(ExpenseCategory::Food);
        assert_eq!(expense.owner_id, owner);
        assert_eq!(expense.category, ExpenseCategory::Food);
        assert_eq!(expense.amount, 14.5);
    }
}
