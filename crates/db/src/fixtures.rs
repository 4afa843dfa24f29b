use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_ORGANIZATION_IDS: &[&str] =
    &["org-gallery", "org-gallery-basel", "org-shipper", "org-shipper-milan"];

const SEED_USER_IDS: &[&str] =
    &["u-gallery", "u-gallery-2", "u-gallery-basel", "u-shipper", "u-shipper-milan"];

const SEED_MEMBERSHIP_COUNT: i64 = 6;

/// Quotes in the demo directory with the status the fixture gives them.
const SEED_QUOTES: &[(&str, &str)] = &[
    ("quote-demo-001", "open"),
    ("quote-demo-002", "open"),
    ("quote-demo-003", "open"),
    ("quote-demo-004", "closed"),
];

/// Demo directory used by `tradelane seed` and by end-to-end runs against a
/// local database.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;
        tracing::info!(
            event_name = "db.fixtures.demo_loaded",
            organizations = SEED_ORGANIZATION_IDS.len(),
            quotes = SEED_QUOTES.len(),
            "demo directory loaded"
        );

        Ok(SeedResult {
            organizations: SEED_ORGANIZATION_IDS.len(),
            users: SEED_USER_IDS.len(),
            quotes: SEED_QUOTES.iter().map(|(id, _)| *id).collect(),
        })
    }

    /// Checks every seeded row is present with the expected quote status.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let organizations: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM organization WHERE id IN {}",
            sql_array_from_ids(SEED_ORGANIZATION_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("organizations", organizations == SEED_ORGANIZATION_IDS.len() as i64));

        let users: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM app_user WHERE id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("users", users == SEED_USER_IDS.len() as i64));

        let memberships: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM organization_membership WHERE user_id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("memberships", memberships == SEED_MEMBERSHIP_COUNT));

        for (quote_id, status) in SEED_QUOTES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM quote WHERE id = ?1 AND status = ?2)",
            )
            .bind(*quote_id)
            .bind(*status)
            .fetch_one(pool)
            .await?;
            checks.push((*quote_id, exists == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo directory together with any conversations created
    /// against its quotes.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let quote_ids: Vec<&str> = SEED_QUOTES.iter().map(|(id, _)| *id).collect();
        let quoted_quotes = sql_array_from_ids(&quote_ids);
        let quoted_users = sql_array_from_ids(SEED_USER_IDS);
        let quoted_orgs = sql_array_from_ids(SEED_ORGANIZATION_IDS);

        let mut tx = pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM conversation_participant WHERE thread_id IN
                (SELECT id FROM conversation_thread WHERE quote_id IN {quoted_quotes})"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM conversation_thread WHERE quote_id IN {quoted_quotes}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM quote WHERE id IN {quoted_quotes}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM organization_membership WHERE user_id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM app_user WHERE id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM organization WHERE id IN {quoted_orgs}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub organizations: usize,
    pub users: usize,
    pub quotes: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
