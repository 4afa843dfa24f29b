use std::sync::Arc;

use tradelane_core::config::AppConfig;
use tradelane_core::{
    ConversationService, ConversationSettings, OrganizationId, ProvisioningOptions,
    ProvisioningReport, UserId,
};
use tradelane_db::{SqlDirectoryRepository, SqlParticipantRepository, SqlThreadRepository};
use tradelane_messaging::HttpMessagingProvider;

use crate::commands::{load_config, open_database, runtime, CommandResult, StepFailure};

/// Warms up every open-quote conversation of `user_id`, limited to
/// `organization_ids` when any are given.
pub fn run(user_id: &str, organization_ids: &[String]) -> CommandResult {
    if user_id.trim().is_empty() {
        return CommandResult::failure("provision", "invalid_arguments", "--user must not be empty", 2);
    }
    let config = match load_config("provision") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("provision") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let options = ProvisioningOptions {
        organization_ids: organization_ids.iter().cloned().map(OrganizationId).collect(),
    };
    let user_id = UserId(user_id.trim().to_string());
    let result = runtime.block_on(provision(&config, &user_id, options));

    match result {
        Ok(report) => CommandResult::success("provision", summary(&user_id, &report)),
        Err(step) => CommandResult::from_step("provision", step),
    }
}

async fn provision(
    config: &AppConfig,
    user_id: &UserId,
    options: ProvisioningOptions,
) -> Result<ProvisioningReport, StepFailure> {
    let settings = ConversationSettings::from_config(&config.messaging)
        .map_err(|error| ("config_validation", error.to_string(), 2u8))?;
    let provider = HttpMessagingProvider::from_config(&config.messaging)
        .map_err(|error| ("messaging_client", error.to_string(), 2u8))?;

    let pool = open_database(config).await?;
    let service = ConversationService::new(
        Arc::new(SqlThreadRepository::new(pool.clone())),
        Arc::new(SqlParticipantRepository::new(pool.clone())),
        Arc::new(SqlDirectoryRepository::new(pool.clone())),
        Arc::new(provider),
        settings,
    );

    let report = service
        .provision_user_conversations(user_id, options)
        .await
        .map_err(|error| ("provision", error.to_string(), 7u8));
    pool.close().await;
    report
}

fn summary(user_id: &UserId, report: &ProvisioningReport) -> String {
    let mut message = format!(
        "provisioned `{}`: {} organizations, {} threads, {} participants, skipped {}",
        user_id.0,
        report.processed_organizations,
        report.ensured_threads,
        report.ensured_participants,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        let quote = skipped.quote_id.as_ref().map(|id| id.0.as_str()).unwrap_or("*");
        message.push_str(&format!(
            "; {}/{}: {}",
            skipped.organization_id.0, quote, skipped.reason
        ));
    }
    message
}
