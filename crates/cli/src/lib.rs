pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tagwatch",
    about = "tagwatch operator CLI",
    long_about = "Inspect tagwatch configuration, readiness, and the subscription store.",
    after_help = "Examples:\n  tagwatch doctor --json\n  tagwatch config\n  tagwatch subscriptions --chat -1001234"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, bot token shape, and subscription store readability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Dump stored subscriptions as JSON with API tokens redacted")]
    Subscriptions {
        #[arg(long, allow_hyphen_values = true, help = "Only list subscriptions of this chat id")]
        chat: Option<i64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Subscriptions { chat } => commands::subscriptions::run(chat),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
