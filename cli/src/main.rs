use clap::Parser;
use dotenv::dotenv;
use marketsync::setup_info_logger;

mod cli_interface;
mod commands;
mod console;

use cli_interface::{Commands, FetchSubcommands, TableSubcommands, CLI};
use commands::{
    fetch::handle_fetch_exchange_rates_command, run::handle_run_command,
    table::handle_table_create_command, upsert::handle_upsert_command,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    setup_info_logger();

    let cli = CLI::parse();

    let outcome = match cli.command {
        Commands::Table { subcommand } => match subcommand {
            TableSubcommands::Create {
                file,
                table,
                keys,
                no_created_at,
                no_updated_at,
                drop_if_exists,
            } => {
                handle_table_create_command(
                    file,
                    table,
                    keys,
                    !no_created_at,
                    !no_updated_at,
                    drop_if_exists,
                )
                .await
            }
        },
        Commands::Upsert { file, table } => handle_upsert_command(file, table).await,
        Commands::Fetch { subcommand } => match subcommand {
            FetchSubcommands::ExchangeRates { base, targets, start, end, table } => {
                handle_fetch_exchange_rates_command(base, targets, start, end, table).await
            }
        },
        Commands::Run { manifest } => handle_run_command(manifest).await,
    };

    if outcome.is_err() {
        std::process::exit(1);
    }
}
