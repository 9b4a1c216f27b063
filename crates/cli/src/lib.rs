pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::estimate::EstimateArgs;
use commands::plan_order::PlanOrderArgs;

#[derive(Debug, Parser)]
#[command(
    name = "roofline",
    about = "Roofline operator CLI",
    long_about = "Draft roofing quotes, preview material orders, inspect configuration, and run readiness checks.",
    after_help = "Examples:\n  roofline estimate --damage-type roof_leak --severity moderate --area 200 --customer 'Dana Ruiz' --address '14 Elm St'\n  roofline plan-order --quote-id Q-... --required-by 2026-03-20\n  roofline config\n  roofline smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Draft a quote from a damage assessment and print it as JSON")]
    Estimate(EstimateArgs),
    #[command(about = "Preview supplier allocations and delivery for a stored, accepted quote")]
    PlanOrder(PlanOrderArgs),
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Run end-to-end readiness checks with per-check timing details")]
    Smoke,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Estimate(args) => commands::estimate::run(args),
        Command::PlanOrder(args) => commands::plan_order::run(args),
        Command::Migrate => commands::migrate::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
