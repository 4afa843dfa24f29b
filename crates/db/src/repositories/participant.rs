use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tradelane_core::domain::organization::OrganizationId;
use tradelane_core::domain::participant::{Participant, ParticipantId, ParticipantRole};
use tradelane_core::domain::thread::ThreadId;
use tradelane_core::domain::user::UserId;
use tradelane_core::ports::{ParticipantStore, StoreError};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

const PARTICIPANT_COLUMNS: &str = "id,
        thread_id,
        user_id,
        organization_id,
        role,
        identity,
        external_role_id,
        joined_at,
        left_at,
        updated_at";

pub struct SqlParticipantRepository {
    pool: DbPool,
}

impl SqlParticipantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_active(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS}
             FROM conversation_participant
             WHERE thread_id = ? AND user_id = ? AND left_at IS NULL"
        ))
        .bind(&thread_id.0)
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(participant_from_row).transpose()
    }

    /// The row id and `joined_at` of an existing row are kept; `joined_at` is
    /// only refreshed when the participant is coming back after leaving.
    async fn upsert(&self, participant: &Participant) -> Result<Participant, RepositoryError> {
        let row = sqlx::query(&format!(
            "INSERT INTO conversation_participant (
                id,
                thread_id,
                user_id,
                organization_id,
                role,
                identity,
                external_role_id,
                joined_at,
                left_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)
             ON CONFLICT(thread_id, user_id) DO UPDATE SET
                organization_id = excluded.organization_id,
                role = excluded.role,
                identity = excluded.identity,
                external_role_id = excluded.external_role_id,
                joined_at = CASE
                    WHEN conversation_participant.left_at IS NULL
                        THEN conversation_participant.joined_at
                    ELSE excluded.joined_at
                END,
                left_at = NULL,
                updated_at = excluded.updated_at
             RETURNING {PARTICIPANT_COLUMNS}"
        ))
        .bind(&participant.id.0)
        .bind(&participant.thread_id.0)
        .bind(&participant.user_id.0)
        .bind(&participant.organization_id.0)
        .bind(participant.role.as_str())
        .bind(&participant.identity)
        .bind(&participant.external_role_id)
        .bind(format_timestamp(&participant.joined_at))
        .bind(format_timestamp(&participant.updated_at))
        .fetch_one(&self.pool)
        .await?;

        participant_from_row(row)
    }

    async fn list_active(&self, thread_id: &ThreadId) -> Result<Vec<Participant>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS}
             FROM conversation_participant
             WHERE thread_id = ? AND left_at IS NULL
             ORDER BY joined_at ASC, rowid ASC"
        ))
        .bind(&thread_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(participant_from_row).collect()
    }

    async fn mark_left(&self, thread_id: &ThreadId, user_id: &UserId) -> Result<bool, RepositoryError> {
        let now = format_timestamp(&Utc::now());
        let result = sqlx::query(
            "UPDATE conversation_participant
             SET left_at = ?, updated_at = ?
             WHERE thread_id = ? AND user_id = ? AND left_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(&thread_id.0)
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ParticipantStore for SqlParticipantRepository {
    async fn find_active_participant(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, StoreError> {
        Ok(self.find_active(thread_id, user_id).await?)
    }

    async fn upsert_participant(
        &self,
        participant: &Participant,
    ) -> Result<Participant, StoreError> {
        Ok(self.upsert(participant).await?)
    }

    async fn list_active_participants(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Vec<Participant>, StoreError> {
        Ok(self.list_active(thread_id).await?)
    }

    async fn mark_participant_left(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        Ok(self.mark_left(thread_id, user_id).await?)
    }
}

fn participant_from_row(row: SqliteRow) -> Result<Participant, RepositoryError> {
    let role_raw: String = row.try_get("role")?;
    let role = ParticipantRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown participant role `{role_raw}`")))?;

    Ok(Participant {
        id: ParticipantId(row.try_get("id")?),
        thread_id: ThreadId(row.try_get("thread_id")?),
        user_id: UserId(row.try_get("user_id")?),
        organization_id: OrganizationId(row.try_get("organization_id")?),
        role,
        identity: row.try_get("identity")?,
        external_role_id: row.try_get("external_role_id")?,
        joined_at: parse_timestamp("joined_at", row.try_get("joined_at")?)?,
        left_at: parse_optional_timestamp("left_at", row.try_get("left_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
