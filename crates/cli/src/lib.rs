pub mod api;
pub mod commands;
pub mod console;
pub mod controller;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "debrief",
    about = "Debrief operator CLI",
    long_about = "Run a console debrief interview against a Debrief server, inspect configuration, check readiness, and apply the session schema.",
    after_help = "Examples:\n  debrief interview 1001\n  debrief doctor --json\n  debrief config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Debrief a deal from the terminal; each line you type is one spoken turn")]
    Interview {
        #[arg(help = "CRM deal id to debrief")]
        deal_id: String,
        #[arg(long, default_value = commands::interview::DEFAULT_SERVER_URL, help = "Debrief server base URL")]
        server_url: String,
        #[arg(long, help = "Wait for whole replies instead of streaming tokens")]
        no_stream: bool,
    },
    #[command(about = "Apply the sqlite session schema and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and session store readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Interview { deal_id, server_url, no_stream } => {
            commands::interview::run(&deal_id, &server_url, !no_stream)
        }
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (output, passed) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if passed { 0 } else { 1 }, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
