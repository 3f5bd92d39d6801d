//! Postgres directory store.
//!
//! Uses sqlx with runtime-checked queries so no live database is needed at
//! compile time. Rows are addressed by username/group name; ids stay inside
//! the database. Uniqueness conflicts come back as `Ok(false)` through
//! `ON CONFLICT DO NOTHING` rather than as errors.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{
    DirectoryStore, FriendEdge, FriendStatus, GroupRecord, MemberRequestRecord, RequestStatus,
    UserRecord,
};
use crate::error::StoreError;

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    password_hash: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    admin: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct FriendRow {
    requester: String,
    addressee: String,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRequestRow {
    id: i64,
    group_name: String,
    requester: String,
    target: String,
    status: String,
}

fn unknown_status(raw: &str) -> StoreError {
    StoreError::Constraint(format!("unknown status value '{raw}'"))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they are missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    // ═══════════════════════════════════════════════════════════
    // Users
    // ═══════════════════════════════════════════════════════════

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, username, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, username, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_usernames(&self) -> Result<Vec<String>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT username FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    // ═══════════════════════════════════════════════════════════
    // Groups
    // ═══════════════════════════════════════════════════════════

    async fn group(&self, name: &str) -> Result<Option<GroupRecord>, StoreError> {
        let row: Option<GroupRow> = sqlx::query_as(
            r#"
            SELECT g.id, g.name, u.username AS admin
            FROM groups g
            LEFT JOIN users u ON u.id = g.admin_id
            WHERE g.name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| GroupRecord {
            id: r.id,
            name: r.name,
            admin: r.admin,
        }))
    }

    async fn create_group(&self, name: &str, admin: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let group_id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO groups (name, admin_id)
            SELECT $1, id FROM users WHERE username = $2
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(admin)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(group_id) = group_id else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id)
            SELECT $1, id FROM users WHERE username = $2
            "#,
        )
        .bind(group_id)
        .bind(admin)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn user_groups(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let groups: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT g.name
            FROM groups g
            JOIN group_members gm ON gm.group_id = g.id
            JOIN users u ON u.id = gm.user_id
            WHERE u.username = $1
            ORDER BY g.name
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    async fn group_members(&self, group: &str) -> Result<Vec<String>, StoreError> {
        let members: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT u.username
            FROM group_members gm
            JOIN groups g ON g.id = gm.group_id
            JOIN users u ON u.id = gm.user_id
            WHERE g.name = $1
            ORDER BY gm.joined_at, gm.id
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn is_member(&self, group: &str, username: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM group_members gm
                JOIN groups g ON g.id = gm.group_id
                JOIN users u ON u.id = gm.user_id
                WHERE g.name = $1 AND u.username = $2
            )
            "#,
        )
        .bind(group)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_member(&self, group: &str, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id)
            SELECT g.id, u.id FROM groups g, users u
            WHERE g.name = $1 AND u.username = $2
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(group)
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_member(&self, group: &str, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM group_members gm
            USING groups g, users u
            WHERE gm.group_id = g.id AND gm.user_id = u.id
              AND g.name = $1 AND u.username = $2
            "#,
        )
        .bind(group)
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ═══════════════════════════════════════════════════════════
    // Message logs
    // ═══════════════════════════════════════════════════════════

    async fn save_private_message(
        &self,
        from: &str,
        to: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO private_messages (sender_id, receiver_id, message)
            SELECT s.id, r.id, $3 FROM users s, users r
            WHERE s.username = $1 AND r.username = $2
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(text)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!(
                "private message {from} → {to}: unknown user"
            )));
        }
        Ok(())
    }

    async fn save_group_message(
        &self,
        group: &str,
        from: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO group_messages (group_id, sender_id, message)
            SELECT g.id, u.id, $3 FROM groups g, users u
            WHERE g.name = $1 AND u.username = $2
            "#,
        )
        .bind(group)
        .bind(from)
        .bind(text)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!(
                "group message {from} → {group}: unknown group or user"
            )));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // Friends
    // ═══════════════════════════════════════════════════════════

    async fn friendship(&self, a: &str, b: &str) -> Result<Option<FriendEdge>, StoreError> {
        let row: Option<FriendRow> = sqlx::query_as(
            r#"
            SELECT r.username AS requester, ad.username AS addressee, f.status
            FROM friend_requests f
            JOIN users r ON r.id = f.requester_id
            JOIN users ad ON ad.id = f.addressee_id
            WHERE (r.username = $1 AND ad.username = $2)
               OR (r.username = $2 AND ad.username = $1)
            LIMIT 1
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let status = FriendStatus::parse(&r.status).ok_or_else(|| unknown_status(&r.status))?;
            Ok(FriendEdge {
                requester: r.requester,
                addressee: r.addressee,
                status,
            })
        })
        .transpose()
    }

    async fn create_friend_request(
        &self,
        requester: &str,
        addressee: &str,
    ) -> Result<bool, StoreError> {
        // The unordered-pair unique index makes this reject both directions.
        let result = sqlx::query(
            r#"
            INSERT INTO friend_requests (requester_id, addressee_id, status)
            SELECT r.id, ad.id, 'pending' FROM users r, users ad
            WHERE r.username = $1 AND ad.username = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(requester)
        .bind(addressee)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn accept_friend_request(
        &self,
        addressee: &str,
        requester: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE friend_requests f SET status = 'accepted'
            FROM users r, users ad
            WHERE f.requester_id = r.id AND f.addressee_id = ad.id
              AND r.username = $2 AND ad.username = $1
              AND f.status = 'pending'
            "#,
        )
        .bind(addressee)
        .bind(requester)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn friends(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let friends: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT u.username
            FROM friend_requests f
            JOIN users me ON me.username = $1
            JOIN users u ON u.id = CASE
                WHEN f.requester_id = me.id THEN f.addressee_id
                ELSE f.requester_id
            END
            WHERE f.status = 'accepted'
              AND me.id IN (f.requester_id, f.addressee_id)
            ORDER BY u.username
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(friends)
    }

    async fn pending_friend_requests(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let pending: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.username
            FROM friend_requests f
            JOIN users r ON r.id = f.requester_id
            JOIN users ad ON ad.id = f.addressee_id
            WHERE ad.username = $1 AND f.status = 'pending'
            ORDER BY f.created_at, f.id
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(pending)
    }

    // ═══════════════════════════════════════════════════════════
    // Membership requests
    // ═══════════════════════════════════════════════════════════

    async fn create_member_request(
        &self,
        group: &str,
        requester: &str,
        target: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO group_member_requests (group_id, requester_id, target_user_id, status)
            SELECT g.id, r.id, t.id, 'pending' FROM groups g, users r, users t
            WHERE g.name = $1 AND r.username = $2 AND t.username = $3
            ON CONFLICT (group_id, requester_id, target_user_id) DO NOTHING
            "#,
        )
        .bind(group)
        .bind(requester)
        .bind(target)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn pending_member_requests(
        &self,
        group: &str,
    ) -> Result<Vec<MemberRequestRecord>, StoreError> {
        let rows: Vec<MemberRequestRow> = sqlx::query_as(
            r#"
            SELECT m.id, g.name AS group_name, r.username AS requester,
                   t.username AS target, m.status
            FROM group_member_requests m
            JOIN groups g ON g.id = m.group_id
            JOIN users r ON r.id = m.requester_id
            JOIN users t ON t.id = m.target_user_id
            WHERE g.name = $1 AND m.status = 'pending'
            ORDER BY m.created_at, m.id
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let status =
                    RequestStatus::parse(&r.status).ok_or_else(|| unknown_status(&r.status))?;
                Ok(MemberRequestRecord {
                    id: r.id,
                    group: r.group_name,
                    requester: r.requester,
                    target: r.target,
                    status,
                })
            })
            .collect()
    }

    async fn approve_member_request(&self, group: &str, target: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE group_member_requests m SET status = 'approved'
            FROM groups g, users t
            WHERE m.group_id = g.id AND m.target_user_id = t.id
              AND g.name = $1 AND t.username = $2
              AND m.status = 'pending'
            "#,
        )
        .bind(group)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        // A duplicate membership aborts here and the update rolls back.
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id)
            SELECT g.id, u.id FROM groups g, users u
            WHERE g.name = $1 AND u.username = $2
            "#,
        )
        .bind(group)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn reject_member_request(&self, group: &str, target: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE group_member_requests m SET status = 'rejected'
            FROM groups g, users t
            WHERE m.group_id = g.id AND m.target_user_id = t.id
              AND g.name = $1 AND t.username = $2
              AND m.status = 'pending'
            "#,
        )
        .bind(group)
        .bind(target)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
