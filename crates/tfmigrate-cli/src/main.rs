//! tfmigrate: migrate Terraform configuration and state between provider
//! versions.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tfmigrate_cli::{list_migrators, run, Cli, CliError, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "tfmigrate=debug" } else { "tfmigrate=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match execute(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn execute(command: Command) -> Result<ExitCode, CliError> {
    let table = tfmigrate_migrators::builtin_table();
    match command {
        Command::Migrate(args) => {
            let config = args.into_config();
            let report = run(&config, &table)?;
            println!("{}", report.render(config.format)?);
            Ok(if report.status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::List(args) => {
            for key in list_migrators(&table, args.from.as_deref(), args.to.as_deref()) {
                println!("{}", key);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
