use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use dbkit::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    init_tracing();
    dbkit::metrics::describe_metrics();

    match args.get_command() {
        cli::Commands::Check { timeout } => {
            commands::check::execute(&args.config, timeout).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("dbkit v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
