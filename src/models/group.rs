use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A split group. `created_by` is the current admin and must always be
/// one of `members`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub members: Vec<GroupMember>,
}

/// A user's membership in a group, carrying enough identity to render
/// rosters without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupMember {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, description: Option<String>, created_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description,
            created_by,
            created_at: Utc::now(),
            members: Vec::new(),
        }
    }

    /// Returns true if the user is currently a member.
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn member(&self, user_id: Uuid) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }
}
