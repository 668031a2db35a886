//! Split-group storage: rosters, admin succession, membership checks.
//!
//! Every group has exactly one admin (`created_by`) who is always a current
//! member. Leaving is the only mutation that can move adminship: the
//! successor is the remaining member with the earliest join time, user id
//! as the tiebreak.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::user_repo::parse_timestamp;
use crate::models::{Group, GroupMember};

/// Errors that can occur during group operations.
#[derive(Debug)]
pub enum GroupError {
    /// Group does not exist.
    GroupNotFound,
    /// An email did not resolve to a registered user.
    UserNotFound,
    /// The requester is not a member of the group.
    Forbidden,
    /// The target user is already in the group.
    AlreadyMember,
    /// Leaving a group the user is not in.
    NotInGroup,
    /// Underlying storage error.
    Database(sqlx::Error),
}

impl std::fmt::Display for GroupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupError::GroupNotFound => write!(f, "Group not found"),
            GroupError::UserNotFound => write!(f, "User with this email not found"),
            GroupError::Forbidden => {
                write!(f, "You do not have permission to access this group")
            }
            GroupError::AlreadyMember => {
                write!(f, "This user is already a member of the group")
            }
            GroupError::NotInGroup => write!(f, "You are not a member of this group"),
            GroupError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for GroupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GroupError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for GroupError {
    fn from(e: sqlx::Error) -> Self {
        GroupError::Database(e)
    }
}

/// Result of leaving a group.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub group_id: Uuid,
    /// True when the leaver was the sole member and the group was deleted.
    pub deleted: bool,
    pub remaining_members: Vec<String>,
    pub new_admin: Option<String>,
}

impl LeaveOutcome {
    pub fn message(&self) -> String {
        if self.deleted {
            "You left the group. Since you were the only member, the group has been deleted."
                .to_string()
        } else if let Some(name) = &self.new_admin {
            format!(
                "You have left the group. Admin rights transferred to {}.",
                name
            )
        } else {
            "You left the group.".to_string()
        }
    }
}

pub struct GroupRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    description: Option<String>,
    created_by: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    user_id: String,
    username: String,
    email: String,
    joined_at: String,
}

impl GroupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a group with the creator as member and admin, then resolves
    /// each invite email to a registered user and adds the matches.
    ///
    /// Emails that resolve to no user are skipped silently, as is the
    /// creator's own address.
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        creator_id: Uuid,
        member_emails: &[String],
    ) -> Result<Group, GroupError> {
        let creator = sqlx::query_as::<_, MemberRow>(
            "SELECT id AS user_id, username, email, created_at AS joined_at FROM users WHERE id = ?",
        )
        .bind(creator_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GroupError::UserNotFound)?;

        let group_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO groups (id, name, description, created_by, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(group_id.to_string())
        .bind(name)
        .bind(description)
        .bind(creator_id.to_string())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(group_id.to_string())
            .bind(creator_id.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        for email in member_emails {
            if email.eq_ignore_ascii_case(&creator.email) {
                continue;
            }
            let user: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?;
            match user {
                Some((user_id,)) => {
                    // OR IGNORE absorbs duplicate emails in the invite list
                    sqlx::query(
                        "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)",
                    )
                    .bind(group_id.to_string())
                    .bind(user_id)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    tracing::debug!("skipping unknown invite email {}", email);
                }
            }
        }

        tx.commit().await?;

        self.get(group_id).await?.ok_or(GroupError::GroupNotFound)
    }

    /// Loads a group with its member roster, ordered by join time.
    pub async fn get(&self, group_id: Uuid) -> Result<Option<Group>, GroupError> {
        let row: Option<GroupRow> = sqlx::query_as(
            "SELECT id, name, description, created_by, created_at FROM groups WHERE id = ?",
        )
        .bind(group_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let members = self.members(group_id).await?;
                Ok(Some(hydrate_group(row, members)))
            }
            None => Ok(None),
        }
    }

    /// All groups the user created or belongs to, members attached.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Group>, GroupError> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, created_by, created_at FROM groups
            WHERE created_by = ?
               OR id IN (SELECT group_id FROM group_members WHERE user_id = ?)
            ORDER BY created_at
            "#,
        )
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let id = Uuid::parse_str(&row.id).unwrap();
            let members = self.members(id).await?;
            groups.push(hydrate_group(row, members));
        }
        Ok(groups)
    }

    /// Adds the user behind `email` to the group on behalf of `requester_id`.
    pub async fn add_member(
        &self,
        group_id: Uuid,
        requester_id: Uuid,
        email: &str,
    ) -> Result<Group, GroupError> {
        let group = self.get(group_id).await?.ok_or(GroupError::GroupNotFound)?;

        if !group.has_member(requester_id) {
            return Err(GroupError::Forbidden);
        }

        let user: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        let user_id = match user {
            Some((id,)) => Uuid::parse_str(&id).unwrap(),
            None => return Err(GroupError::UserNotFound),
        };

        if group.has_member(user_id) {
            return Err(GroupError::AlreadyMember);
        }

        sqlx::query("INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(group_id.to_string())
            .bind(user_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        self.get(group_id).await?.ok_or(GroupError::GroupNotFound)
    }

    /// Returns the group roster for a current member.
    pub async fn detail(&self, group_id: Uuid, requester_id: Uuid) -> Result<Group, GroupError> {
        let group = self.get(group_id).await?.ok_or(GroupError::GroupNotFound)?;
        if !group.has_member(requester_id) {
            return Err(GroupError::Forbidden);
        }
        Ok(group)
    }

    /// Removes the user from the group.
    ///
    /// Sole member: the group and everything it owns is deleted. Admin with
    /// other members present: adminship moves to the earliest-joined
    /// remaining member before the membership row is removed, in one
    /// transaction so there is never a group without a member admin.
    pub async fn leave(&self, group_id: Uuid, user_id: Uuid) -> Result<LeaveOutcome, GroupError> {
        let group = self.get(group_id).await?.ok_or(GroupError::GroupNotFound)?;

        if !group.has_member(user_id) {
            return Err(GroupError::NotInGroup);
        }

        // Sole member leaving: drop the whole group, cascade cleans up
        // memberships, expenses, shares, and settlements.
        if group.members.len() == 1 {
            sqlx::query("DELETE FROM groups WHERE id = ?")
                .bind(group_id.to_string())
                .execute(&self.pool)
                .await?;
            return Ok(LeaveOutcome {
                group_id,
                deleted: true,
                remaining_members: Vec::new(),
                new_admin: None,
            });
        }

        let mut tx = self.pool.begin().await?;
        let mut new_admin = None;

        if group.created_by == user_id {
            // Members are already ordered by (joined_at, user_id); the first
            // one that is not the leaver succeeds as admin.
            let successor = group
                .members
                .iter()
                .find(|m| m.user_id != user_id)
                .expect("group with more than one member has a successor");

            sqlx::query("UPDATE groups SET created_by = ? WHERE id = ?")
                .bind(successor.user_id.to_string())
                .bind(group_id.to_string())
                .execute(&mut *tx)
                .await?;
            new_admin = Some(successor.username.clone());
        }

        sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.to_string())
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let remaining = self.members(group_id).await?;
        Ok(LeaveOutcome {
            group_id,
            deleted: false,
            remaining_members: remaining.into_iter().map(|m| m.username).collect(),
            new_admin,
        })
    }

    /// True when the user is currently in the group.
    pub async fn is_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, GroupError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ?")
                .bind(group_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, GroupError> {
        let rows: Vec<MemberRow> = sqlx::query_as(
            r#"
            SELECT gm.user_id, u.username, u.email, gm.joined_at
            FROM group_members gm
            JOIN users u ON u.id = gm.user_id
            WHERE gm.group_id = ?
            ORDER BY gm.joined_at ASC, gm.user_id ASC
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(hydrate_member).collect())
    }
}

fn hydrate_group(row: GroupRow, members: Vec<GroupMember>) -> Group {
    Group {
        id: Uuid::parse_str(&row.id).unwrap(),
        name: row.name,
        description: row.description,
        created_by: Uuid::parse_str(&row.created_by).unwrap(),
        created_at: parse_timestamp(&row.created_at),
        members,
    }
}

fn hydrate_member(row: MemberRow) -> GroupMember {
    GroupMember {
        user_id: Uuid::parse_str(&row.user_id).unwrap(),
        username: row.username,
        email: row.email,
        joined_at: parse_timestamp(&row.joined_at),
    }
}
