use crate::commands::{load_config, open_database, runtime, CommandResult, StepFailure};
use tradelane_db::{DemoSeedDataset, SeedResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let outcome = load_and_verify(&pool).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo directory loaded: {} organizations, {} users, quotes {}",
                seeded.organizations,
                seeded.users,
                seeded.quotes.join(", ")
            ),
        ),
        Err(step) => CommandResult::from_step("seed", step),
    }
}

async fn load_and_verify(pool: &tradelane_db::DbPool) -> Result<SeedResult, StepFailure> {
    let seeded = DemoSeedDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    let verification = DemoSeedDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
    if !verification.all_present {
        return Err(("seed_verification", verification_message(&verification.checks), 6u8));
    }

    Ok(seeded)
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "some demo rows failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_message_names_failed_checks() {
        let checks = [("organizations", true), ("quote-demo-002", false), ("memberships", false)];

        assert_eq!(
            verification_message(&checks),
            "seed verification failed for checks: quote-demo-002, memberships"
        );
    }

    #[test]
    fn verification_message_is_generic_without_failed_labels() {
        assert_eq!(verification_message(&[("users", true)]), "some demo rows failed to load");
    }
}
