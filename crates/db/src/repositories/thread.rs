use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use tradelane_core::conversations::scope::{FieldFilter, ScopeFilter};
use tradelane_core::domain::metadata::ThreadMetadata;
use tradelane_core::domain::organization::OrganizationId;
use tradelane_core::domain::quote::{QuoteId, ShipmentId};
use tradelane_core::domain::thread::{Thread, ThreadId, ThreadScope, ThreadStatus};
use tradelane_core::domain::user::UserId;
use tradelane_core::ports::{StoreError, ThreadStore};

use super::{format_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

const THREAD_COLUMNS: &str = "SELECT
        id,
        quote_id,
        organization_id,
        shipment_id,
        requester_branch_org_id,
        provider_branch_org_id,
        external_conversation_id,
        external_unique_name,
        status,
        metadata_json,
        created_by,
        created_at,
        updated_at
     FROM conversation_thread";

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_first(
        &self,
        mut builder: QueryBuilder<'_, Sqlite>,
    ) -> Result<Option<Thread>, RepositoryError> {
        builder.push(" ORDER BY created_at ASC, rowid ASC LIMIT 1");
        let row = builder.build().fetch_optional(&self.pool).await?;
        row.map(thread_from_row).transpose()
    }

    async fn find_by_id(&self, id: &ThreadId) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query(&format!("{THREAD_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(thread_from_row).transpose()
    }

    async fn find_quote_scope(
        &self,
        quote_id: &QuoteId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, RepositoryError> {
        let mut builder = active_threads();
        builder.push(" AND quote_id = ").push_bind(quote_id.0.clone());
        push_filter(&mut builder, "shipment_id", filter.shipment_id.map(|id| id.0.clone()));
        push_branch_filters(&mut builder, filter);
        self.fetch_first(builder).await
    }

    async fn find_shipment_scope(
        &self,
        shipment_id: &ShipmentId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, RepositoryError> {
        let mut builder = active_threads();
        builder.push(" AND shipment_id = ").push_bind(shipment_id.0.clone());
        push_branch_filters(&mut builder, filter);
        self.fetch_first(builder).await
    }

    async fn find_first(&self, quote_id: &QuoteId) -> Result<Option<Thread>, RepositoryError> {
        let mut builder = active_threads();
        builder.push(" AND quote_id = ").push_bind(quote_id.0.clone());
        self.fetch_first(builder).await
    }

    async fn insert(&self, thread: &Thread) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation_thread (
                id,
                quote_id,
                organization_id,
                shipment_id,
                requester_branch_org_id,
                provider_branch_org_id,
                external_conversation_id,
                external_unique_name,
                status,
                metadata_json,
                created_by,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thread.id.0)
        .bind(&thread.quote_id.0)
        .bind(&thread.organization_id.0)
        .bind(thread.scope.shipment_id.as_ref().map(|id| id.0.as_str()))
        .bind(thread.scope.requester_branch_org_id.as_ref().map(|id| id.0.as_str()))
        .bind(thread.scope.provider_branch_org_id.as_ref().map(|id| id.0.as_str()))
        .bind(&thread.external_conversation_id)
        .bind(&thread.external_unique_name)
        .bind(thread.status.as_str())
        .bind(thread.metadata.to_json().to_string())
        .bind(&thread.created_by.0)
        .bind(format_timestamp(&thread.created_at))
        .bind(format_timestamp(&thread.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_scope(
        &self,
        id: &ThreadId,
        scope: &ThreadScope,
        metadata: &ThreadMetadata,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE conversation_thread
             SET shipment_id = ?,
                 requester_branch_org_id = ?,
                 provider_branch_org_id = ?,
                 metadata_json = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(scope.shipment_id.as_ref().map(|id| id.0.as_str()))
        .bind(scope.requester_branch_org_id.as_ref().map(|id| id.0.as_str()))
        .bind(scope.provider_branch_org_id.as_ref().map(|id| id.0.as_str()))
        .bind(metadata.to_json().to_string())
        .bind(format_timestamp(&Utc::now()))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_metadata(
        &self,
        id: &ThreadId,
        metadata: &ThreadMetadata,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE conversation_thread SET metadata_json = ?, updated_at = ? WHERE id = ?")
            .bind(metadata.to_json().to_string())
            .bind(format_timestamp(&Utc::now()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ThreadStore for SqlThreadRepository {
    async fn find_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn find_by_quote_scope(
        &self,
        quote_id: &QuoteId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, StoreError> {
        Ok(self.find_quote_scope(quote_id, filter).await?)
    }

    async fn find_by_shipment_scope(
        &self,
        shipment_id: &ShipmentId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, StoreError> {
        Ok(self.find_shipment_scope(shipment_id, filter).await?)
    }

    async fn find_first_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Option<Thread>, StoreError> {
        Ok(self.find_first(quote_id).await?)
    }

    async fn insert_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        Ok(self.insert(thread).await?)
    }

    async fn update_thread_scope(
        &self,
        id: &ThreadId,
        scope: &ThreadScope,
        metadata: &ThreadMetadata,
    ) -> Result<(), StoreError> {
        Ok(self.update_scope(id, scope, metadata).await?)
    }

    async fn update_thread_metadata(
        &self,
        id: &ThreadId,
        metadata: &ThreadMetadata,
    ) -> Result<(), StoreError> {
        Ok(self.update_metadata(id, metadata).await?)
    }
}

fn active_threads() -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(THREAD_COLUMNS);
    builder.push(" WHERE status = 'active'");
    builder
}

fn push_branch_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ScopeFilter) {
    push_filter(
        builder,
        "requester_branch_org_id",
        filter.requester_branch_org_id.map(|id| id.0.clone()),
    );
    push_filter(
        builder,
        "provider_branch_org_id",
        filter.provider_branch_org_id.map(|id| id.0.clone()),
    );
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, filter: FieldFilter<String>) {
    match filter {
        FieldFilter::Any => {}
        FieldFilter::Null => {
            builder.push(" AND ").push(column).push(" IS NULL");
        }
        FieldFilter::Eq(value) => {
            builder.push(" AND ").push(column).push(" = ").push_bind(value);
        }
    }
}

fn thread_from_row(row: SqliteRow) -> Result<Thread, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = ThreadStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown thread status `{status_raw}`")))?;
    let metadata_raw: String = row.try_get("metadata_json")?;

    Ok(Thread {
        id: ThreadId(row.try_get("id")?),
        quote_id: QuoteId(row.try_get("quote_id")?),
        organization_id: OrganizationId(row.try_get("organization_id")?),
        scope: ThreadScope {
            shipment_id: row.try_get::<Option<String>, _>("shipment_id")?.map(ShipmentId),
            requester_branch_org_id: row
                .try_get::<Option<String>, _>("requester_branch_org_id")?
                .map(OrganizationId),
            provider_branch_org_id: row
                .try_get::<Option<String>, _>("provider_branch_org_id")?
                .map(OrganizationId),
        },
        external_conversation_id: row.try_get("external_conversation_id")?,
        external_unique_name: row.try_get("external_unique_name")?,
        status,
        metadata: ThreadMetadata::from_json_str(&metadata_raw),
        created_by: UserId(row.try_get("created_by")?),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    use tradelane_core::conversations::scope::{FieldFilter, ScopeFilter};
    use tradelane_core::domain::metadata::ThreadMetadata;
    use tradelane_core::domain::organization::OrganizationId;
    use tradelane_core::domain::quote::{QuoteId, ShipmentId};
    use tradelane_core::domain::thread::{Thread, ThreadId, ThreadScope, ThreadStatus};
    use tradelane_core::domain::user::UserId;
    use tradelane_core::ports::{StoreError, ThreadStore};

    use super::SqlThreadRepository;
    use crate::repositories::test_support::{insert_organization, insert_quote, setup_pool};
    use crate::DbPool;

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid timestamp").with_timezone(&Utc)
    }

    fn org(id: &str) -> OrganizationId {
        OrganizationId(id.to_string())
    }

    fn thread(id: &str, quote: &str, scope: ThreadScope, name: &str, minute: i64) -> Thread {
        let created_at = parse_ts("2026-03-01T10:00:00Z") + Duration::minutes(minute);
        Thread {
            id: ThreadId(id.to_string()),
            quote_id: QuoteId(quote.to_string()),
            organization_id: org("org-gallery"),
            scope,
            external_conversation_id: format!("CH-{id}"),
            external_unique_name: name.to_string(),
            status: ThreadStatus::Active,
            metadata: ThreadMetadata::from_json(json!({"quoteId": quote, "pinned": true})),
            created_by: UserId("u-gallery".to_string()),
            created_at,
            updated_at: created_at,
        }
    }

    fn scoped(shipment: Option<&str>, requester: Option<&str>, provider: Option<&str>) -> ThreadScope {
        ThreadScope {
            shipment_id: shipment.map(|id| ShipmentId(id.to_string())),
            requester_branch_org_id: requester.map(org),
            provider_branch_org_id: provider.map(org),
        }
    }

    async fn seeded_pool() -> DbPool {
        let pool = setup_pool().await;
        insert_organization(&pool, "org-gallery", "gallery").await;
        insert_quote(&pool, "Q1", "org-gallery", Some("SHP-1"), "open").await;
        insert_quote(&pool, "Q2", "org-gallery", Some("SHP-1"), "open").await;
        pool
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let pool = seeded_pool().await;
        let repo = SqlThreadRepository::new(pool.clone());
        let legacy = thread("T1", "Q1", ThreadScope::default(), "quote::Q1", 0);

        repo.insert_thread(&legacy).await.expect("insert thread");

        let found = repo.find_thread(&legacy.id).await.expect("find thread");
        assert_eq!(found, Some(legacy.clone()));
        let first = repo.find_first_for_quote(&legacy.quote_id).await.expect("first for quote");
        assert_eq!(first.map(|thread| thread.id), Some(legacy.id));

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_scope_or_name_is_a_unique_violation() {
        let pool = seeded_pool().await;
        let repo = SqlThreadRepository::new(pool.clone());
        let scope = scoped(Some("SHP-1"), Some("org-gallery"), None);

        repo.insert_thread(&thread("T1", "Q1", scope.clone(), "quote::Q1::scope::a", 0))
            .await
            .expect("insert thread");
        let same_scope =
            repo.insert_thread(&thread("T2", "Q1", scope, "quote::Q1::scope::b", 1)).await;
        let same_name = repo
            .insert_thread(&thread("T3", "Q2", ThreadScope::default(), "quote::Q1::scope::a", 2))
            .await;

        assert!(matches!(same_scope, Err(StoreError::UniqueViolation(_))));
        assert!(matches!(same_name, Err(StoreError::UniqueViolation(_))));

        pool.close().await;
    }

    #[tokio::test]
    async fn scope_filters_distinguish_null_from_unfiltered() {
        let pool = seeded_pool().await;
        let repo = SqlThreadRepository::new(pool.clone());
        let scope = scoped(Some("SHP-1"), Some("org-gallery"), Some("org-shipper"));
        repo.insert_thread(&thread("T1", "Q1", scope, "quote::Q1::scope::a", 0))
            .await
            .expect("insert thread");

        let unfiltered_provider = ScopeFilter {
            shipment_id: FieldFilter::Any,
            requester_branch_org_id: FieldFilter::Eq(org("org-gallery")),
            provider_branch_org_id: FieldFilter::Any,
        };
        let null_provider = ScopeFilter {
            provider_branch_org_id: FieldFilter::Null,
            ..unfiltered_provider.clone()
        };
        let other_shipment = ScopeFilter {
            shipment_id: FieldFilter::Eq(ShipmentId("SHP-2".to_string())),
            ..unfiltered_provider.clone()
        };

        let quote = QuoteId("Q1".to_string());
        assert!(repo.find_by_quote_scope(&quote, &unfiltered_provider).await.expect("q").is_some());
        assert!(repo.find_by_quote_scope(&quote, &null_provider).await.expect("q").is_none());
        assert!(repo.find_by_quote_scope(&quote, &other_shipment).await.expect("q").is_none());

        let by_shipment = repo
            .find_by_shipment_scope(&ShipmentId("SHP-1".to_string()), &unfiltered_provider)
            .await
            .expect("shipment query");
        assert_eq!(by_shipment.map(|thread| thread.id.0), Some("T1".to_string()));

        pool.close().await;
    }

    #[tokio::test]
    async fn scope_promotion_and_metadata_updates_persist() {
        let pool = seeded_pool().await;
        let repo = SqlThreadRepository::new(pool.clone());
        let legacy = thread("T1", "Q1", ThreadScope::default(), "quote::Q1", 0);
        repo.insert_thread(&legacy).await.expect("insert thread");

        let scope = scoped(Some("SHP-1"), Some("org-gallery"), Some("org-shipper"));
        let mut metadata = legacy.metadata.clone();
        metadata.apply_scope(&scope);
        repo.update_thread_scope(&legacy.id, &scope, &metadata).await.expect("promote");

        metadata.quote_title = Some("Bronze to Basel".to_string());
        repo.update_thread_metadata(&legacy.id, &metadata).await.expect("metadata update");

        let stored = repo.find_thread(&legacy.id).await.expect("find").expect("exists");
        assert_eq!(stored.scope, scope);
        assert_eq!(stored.metadata, metadata);
        assert_eq!(stored.metadata.extra.get("pinned"), Some(&json!(true)));

        pool.close().await;
    }

    #[tokio::test]
    async fn malformed_metadata_decodes_as_empty_document() {
        let pool = seeded_pool().await;
        let repo = SqlThreadRepository::new(pool.clone());
        repo.insert_thread(&thread("T1", "Q1", ThreadScope::default(), "quote::Q1", 0))
            .await
            .expect("insert thread");
        sqlx::query("UPDATE conversation_thread SET metadata_json = '\"legacy\"' WHERE id = 'T1'")
            .execute(&pool)
            .await
            .expect("corrupt metadata");

        let stored = repo
            .find_thread(&ThreadId("T1".to_string()))
            .await
            .expect("find")
            .expect("exists");

        assert_eq!(stored.metadata, ThreadMetadata::default());
        pool.close().await;
    }
}
