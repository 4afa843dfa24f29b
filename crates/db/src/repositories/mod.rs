use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use tradelane_core::ports::StoreError;

pub mod directory;
pub mod participant;
pub mod thread;

pub use directory::SqlDirectoryRepository;
pub use participant::SqlParticipantRepository;
pub use thread::SqlThreadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Database(sqlx::Error::Database(error)) if error.is_unique_violation())
    }
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        if error.is_unique_violation() {
            return StoreError::UniqueViolation(error.to_string());
        }
        match error {
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
        }
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    pub async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    pub async fn insert_organization(pool: &DbPool, id: &str, org_type: &str) {
        sqlx::query(
            "INSERT INTO organization (id, name, org_type, logo_url, location_label)
             VALUES (?, ?, ?, NULL, 'Basel')",
        )
        .bind(id)
        .bind(format!("{id} name"))
        .bind(org_type)
        .execute(pool)
        .await
        .expect("insert organization");
    }

    pub async fn insert_user(pool: &DbPool, id: &str, organization_id: &str) {
        sqlx::query("INSERT OR IGNORE INTO app_user (id, display_name, email) VALUES (?, ?, NULL)")
            .bind(id)
            .bind(format!("{id} display"))
            .execute(pool)
            .await
            .expect("insert user");
        sqlx::query(
            "INSERT INTO organization_membership (user_id, organization_id, member_role)
             VALUES (?, ?, 'member')",
        )
        .bind(id)
        .bind(organization_id)
        .execute(pool)
        .await
        .expect("insert membership");
    }

    pub async fn insert_quote(
        pool: &DbPool,
        id: &str,
        owner_org_id: &str,
        shipment_id: Option<&str>,
        status: &str,
    ) {
        sqlx::query(
            "INSERT INTO quote (
                id, title, owner_org_id, shipment_id, shipment_reference,
                submitted_by, status, created_at
             ) VALUES (?, ?, ?, ?, NULL, NULL, ?, '2026-03-01T09:00:00.000000Z')",
        )
        .bind(id)
        .bind(format!("Quote {id}"))
        .bind(owner_org_id)
        .bind(shipment_id)
        .bind(status)
        .execute(pool)
        .await
        .expect("insert quote");
    }
}
