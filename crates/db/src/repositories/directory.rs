//! Read-only queries over the quote, organization and user tables.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tradelane_core::domain::organization::{
    OrganizationId, OrganizationMembership, OrganizationSummary, OrganizationType,
};
use tradelane_core::domain::quote::{QuoteContext, QuoteId, QuoteStatus, ShipmentId};
use tradelane_core::domain::user::{UserId, UserProfile};
use tradelane_core::ports::{DirectoryStore, StoreError};

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

const QUOTE_COLUMNS: &str = "SELECT
        id,
        title,
        owner_org_id,
        shipment_id,
        shipment_reference,
        submitted_by,
        status,
        created_at
     FROM quote";

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn quote(&self, id: &QuoteId) -> Result<Option<QuoteContext>, RepositoryError> {
        let row = sqlx::query(&format!("{QUOTE_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(quote_from_row).transpose()
    }

    async fn organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<OrganizationSummary>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, org_type, logo_url, location_label FROM organization WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(organization_from_row).transpose()
    }

    async fn user(&self, id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query("SELECT id, display_name, email FROM app_user WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(user_from_row).transpose()
    }

    async fn membership_exists(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<bool, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM organization_membership
             WHERE user_id = ? AND organization_id = ?",
        )
        .bind(&user_id.0)
        .bind(&organization_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn memberships(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrganizationMembership>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, organization_id, member_role
             FROM organization_membership
             WHERE user_id = ?
             ORDER BY organization_id ASC",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(membership_from_row).collect()
    }

    async fn members(&self, organization_id: &OrganizationId) -> Result<Vec<UserId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id FROM organization_membership
             WHERE organization_id = ?
             ORDER BY user_id ASC",
        )
        .bind(&organization_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_get("user_id").map(UserId).map_err(RepositoryError::from))
            .collect()
    }

    async fn open_quotes(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<QuoteContext>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{QUOTE_COLUMNS}
             WHERE owner_org_id = ? AND status = 'open'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&organization_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(quote_from_row).collect()
    }
}

#[async_trait]
impl DirectoryStore for SqlDirectoryRepository {
    async fn find_quote(&self, id: &QuoteId) -> Result<Option<QuoteContext>, StoreError> {
        Ok(self.quote(id).await?)
    }

    async fn find_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<OrganizationSummary>, StoreError> {
        Ok(self.organization(id).await?)
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.user(id).await?)
    }

    async fn is_member(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<bool, StoreError> {
        Ok(self.membership_exists(user_id, organization_id).await?)
    }

    async fn list_memberships(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        Ok(self.memberships(user_id).await?)
    }

    async fn list_organization_members(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<UserId>, StoreError> {
        Ok(self.members(organization_id).await?)
    }

    async fn list_open_quotes(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<QuoteContext>, StoreError> {
        Ok(self.open_quotes(organization_id).await?)
    }
}

fn quote_from_row(row: SqliteRow) -> Result<QuoteContext, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = QuoteStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown quote status `{status_raw}`")))?;

    Ok(QuoteContext {
        id: QuoteId(row.try_get("id")?),
        title: row.try_get("title")?,
        owner_org_id: OrganizationId(row.try_get("owner_org_id")?),
        shipment_id: row.try_get::<Option<String>, _>("shipment_id")?.map(ShipmentId),
        shipment_reference: row.try_get("shipment_reference")?,
        submitted_by: row.try_get::<Option<String>, _>("submitted_by")?.map(UserId),
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn user_from_row(row: SqliteRow) -> Result<UserProfile, RepositoryError> {
    Ok(UserProfile {
        id: UserId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
    })
}

fn membership_from_row(row: SqliteRow) -> Result<OrganizationMembership, RepositoryError> {
    Ok(OrganizationMembership {
        user_id: UserId(row.try_get("user_id")?),
        organization_id: OrganizationId(row.try_get("organization_id")?),
        member_role: row.try_get("member_role")?,
    })
}

fn organization_from_row(row: SqliteRow) -> Result<OrganizationSummary, RepositoryError> {
    let org_type: String = row.try_get("org_type")?;
    Ok(OrganizationSummary {
        id: OrganizationId(row.try_get("id")?),
        name: row.try_get("name")?,
        org_type: OrganizationType::parse(&org_type),
        logo_url: row.try_get("logo_url")?,
        location_label: row.try_get("location_label")?,
    })
}

#[cfg(test)]
mod tests {
    use tradelane_core::domain::organization::{OrganizationId, OrganizationType};
    use tradelane_core::domain::quote::{QuoteId, QuoteStatus, ShipmentId};
    use tradelane_core::domain::user::UserId;
    use tradelane_core::ports::DirectoryStore;

    use super::SqlDirectoryRepository;
    use crate::repositories::test_support::{
        insert_organization, insert_quote, insert_user, setup_pool,
    };

    #[tokio::test]
    async fn quotes_organizations_and_users_are_readable() {
        let pool = setup_pool().await;
        insert_organization(&pool, "org-shipper", "Carrier").await;
        insert_user(&pool, "u-shipper", "org-shipper").await;
        insert_quote(&pool, "Q1", "org-shipper", Some("SHP-1"), "awarded").await;
        let repo = SqlDirectoryRepository::new(pool.clone());

        let quote = repo.find_quote(&QuoteId("Q1".to_string())).await.expect("quote").expect("Q1");
        assert_eq!(quote.status, QuoteStatus::Awarded);
        assert_eq!(quote.shipment_id, Some(ShipmentId("SHP-1".to_string())));
        assert_eq!(quote.friendly_name(), "Quote Q1");

        let org = repo
            .find_organization(&OrganizationId("org-shipper".to_string()))
            .await
            .expect("organization")
            .expect("org-shipper");
        assert_eq!(org.org_type, OrganizationType::Shipper);
        assert_eq!(org.location_label.as_deref(), Some("Basel"));

        let user = repo.find_user(&UserId("u-shipper".to_string())).await.expect("user");
        assert_eq!(user.map(|user| user.display_name), Some("u-shipper display".to_string()));
        assert!(repo.find_quote(&QuoteId("missing".to_string())).await.expect("quote").is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn membership_queries_follow_the_membership_table() {
        let pool = setup_pool().await;
        insert_organization(&pool, "org-gallery", "gallery").await;
        insert_organization(&pool, "org-shipper", "shipper").await;
        insert_user(&pool, "u-gallery", "org-gallery").await;
        insert_user(&pool, "u-gallery", "org-shipper").await;
        insert_user(&pool, "u-gallery-2", "org-gallery").await;
        let repo = SqlDirectoryRepository::new(pool.clone());
        let gallery = OrganizationId("org-gallery".to_string());

        assert!(repo.is_member(&UserId("u-gallery-2".to_string()), &gallery).await.expect("member"));
        assert!(!repo
            .is_member(&UserId("u-gallery-2".to_string()), &OrganizationId("org-shipper".to_string()))
            .await
            .expect("member"));

        let memberships =
            repo.list_memberships(&UserId("u-gallery".to_string())).await.expect("memberships");
        assert_eq!(memberships.len(), 2);

        let members = repo.list_organization_members(&gallery).await.expect("members");
        assert_eq!(
            members,
            vec![UserId("u-gallery".to_string()), UserId("u-gallery-2".to_string())]
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn open_quotes_exclude_other_statuses_and_owners() {
        let pool = setup_pool().await;
        insert_organization(&pool, "org-gallery", "gallery").await;
        insert_organization(&pool, "org-other", "gallery").await;
        insert_quote(&pool, "Q1", "org-gallery", None, "open").await;
        insert_quote(&pool, "Q2", "org-gallery", None, "closed").await;
        insert_quote(&pool, "Q3", "org-other", None, "open").await;
        insert_quote(&pool, "Q4", "org-gallery", Some("SHP-4"), "open").await;
        let repo = SqlDirectoryRepository::new(pool.clone());

        let ids: Vec<String> = repo
            .list_open_quotes(&OrganizationId("org-gallery".to_string()))
            .await
            .expect("open quotes")
            .into_iter()
            .map(|quote| quote.id.0)
            .collect();

        assert_eq!(ids, vec!["Q1".to_string(), "Q4".to_string()]);
        pool.close().await;
    }
}
