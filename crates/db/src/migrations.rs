use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "organization",
        "app_user",
        "organization_membership",
        "quote",
        "conversation_thread",
        "conversation_participant",
        "idx_organization_membership_organization_id",
        "idx_quote_owner_org_status",
        "idx_conversation_thread_unique_name_active",
        "idx_conversation_thread_scope_active",
        "idx_conversation_thread_shipment_id",
        "idx_conversation_participant_user_id",
    ];

    #[tokio::test]
    async fn migrations_create_conversation_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let table_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master
             WHERE type = 'table'
               AND name IN ('conversation_thread', 'conversation_participant', 'quote', 'organization')",
        )
        .fetch_one(&pool)
        .await
        .expect("check tables")
        .get::<i64, _>("count");

        assert_eq!(table_count, 4);
    }

    #[tokio::test]
    async fn scope_index_treats_null_columns_as_equal() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query("INSERT INTO organization (id, name, org_type) VALUES ('org-1', 'Org', 'gallery')")
            .execute(&pool)
            .await
            .expect("insert organization");
        sqlx::query(
            "INSERT INTO quote (id, owner_org_id, status, created_at)
             VALUES ('Q1', 'org-1', 'open', '2026-03-01T09:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert quote");

        let insert = |id: &'static str, name: &'static str| {
            sqlx::query(
                "INSERT INTO conversation_thread (
                    id, quote_id, organization_id, external_conversation_id,
                    external_unique_name, created_by, created_at, updated_at
                 ) VALUES (?, 'Q1', 'org-1', 'CH1', ?, 'u1', 'now', 'now')",
            )
            .bind(id)
            .bind(name)
        };

        insert("T1", "quote::Q1").execute(&pool).await.expect("first legacy thread");
        let duplicate = insert("T2", "quote::Q1-other").execute(&pool).await;

        let is_unique = matches!(
            duplicate,
            Err(sqlx::Error::Database(ref error)) if error.is_unique_violation()
        );
        assert!(is_unique, "second unscoped thread for the same quote must be rejected");
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
