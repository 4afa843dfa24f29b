pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tradelane",
    about = "Tradelane operator CLI",
    long_about = "Operate the Tradelane conversation store: migrations, demo fixtures, config inspection and conversation provisioning.",
    after_help = "Examples:\n  tradelane migrate\n  tradelane seed\n  tradelane provision --user u-gallery --org org-gallery"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo organization, user and quote directory")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Ensure conversations and membership for every open quote of a user")]
    Provision {
        #[arg(long = "user", help = "User whose conversations are provisioned")]
        user_id: String,
        #[arg(
            long = "org",
            help = "Restrict provisioning to this organization (repeatable)"
        )]
        organization_ids: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Provision { user_id, organization_ids } => {
            commands::provision::run(&user_id, &organization_ids)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
