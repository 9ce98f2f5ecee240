use crate::demo::{run_allocation, run_demo, DemoArgs, RunArgs};
use apartment_queue::config::AppConfig;
use apartment_queue::error::AppError;
use apartment_queue::telemetry;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "apartment-queue",
    about = "Rehearse apartment queue intake and lottery distribution from CSV fixtures",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load unit and application fixtures, distribute the project, and print the queues
    Run(RunArgs),
    /// Distribute the bundled sample projects (default command)
    Demo(DemoArgs),
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Demo(DemoArgs::default()));

    match command {
        Command::Run(args) => run_allocation(args, &config),
        Command::Demo(args) => run_demo(args, &config),
    }
}
