use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A monthly spending budget. One per (owner, month, year).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// 1 for January through 12 for December.
    pub month: u32,
    pub year: i32,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(owner_id: Uuid, month: u32, year: i32, amount: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            month,
            year,
            amount,
            created_at: Utc::now(),
        }
    }
}
