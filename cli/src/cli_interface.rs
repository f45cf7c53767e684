use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[allow(clippy::upper_case_acronyms)]
#[derive(Parser, Debug)]
#[clap(name = "marketsync", about, version)]
pub struct CLI {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage warehouse tables built from payload samples.
    ///
    /// Example:
    /// `marketsync table create --file report.csv --table analytics.cerebro --keys date,asin`
    #[clap(name = "table")]
    Table {
        #[clap(subcommand)]
        subcommand: TableSubcommands,
    },

    /// Bulk upserts a CSV payload into an existing table.
    ///
    /// Rows whose primary key already exists are updated, the rest are
    /// inserted, all in one transaction.
    ///
    /// Example:
    /// `marketsync upsert --file report.csv --table analytics.cerebro`
    #[clap(name = "upsert")]
    Upsert {
        /// The CSV file holding the payload
        #[clap(long, short)]
        file: PathBuf,

        /// The target table, `schema.table` or a bare name in public
        #[clap(long, short)]
        table: String,
    },

    /// Fetches data from a built-in source and loads it into the warehouse.
    ///
    /// Example:
    /// `marketsync fetch exchange-rates --targets CAD,GBP`
    #[clap(name = "fetch")]
    Fetch {
        #[clap(subcommand)]
        subcommand: FetchSubcommands,
    },

    /// Reads the project manifest and loads every configured source.
    ///
    /// Creates the managed schemas, installs the `updated_at` triggers and
    /// then runs the exchange-rates fetch and report-directory loads the
    /// manifest describes.
    ///
    /// Example:
    /// `marketsync run --manifest ./marketsync.yaml`
    #[clap(name = "run")]
    Run {
        /// Path to the manifest, defaults to ./marketsync.yaml
        #[clap(long, short)]
        manifest: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TableSubcommands {
    /// Infers column types from a CSV payload sample and creates the table.
    ///
    /// Column names are standardized to sql-safe snake_case. Audit columns
    /// and the `updated_at` trigger are added unless switched off.
    ///
    /// Example:
    /// `marketsync table create --file report.csv --table analytics.cerebro --keys date,asin`
    Create {
        /// The CSV file to sample
        #[clap(long, short)]
        file: PathBuf,

        /// The table to create, `schema.table` or a bare name in public
        #[clap(long, short)]
        table: String,

        /// Comma-separated primary key columns (standardized names)
        #[clap(long, value_delimiter = ',')]
        keys: Option<Vec<String>>,

        /// Skip the created_at audit column
        #[clap(long)]
        no_created_at: bool,

        /// Skip the updated_at audit column and its trigger
        #[clap(long)]
        no_updated_at: bool,

        /// Drop any existing table of the same name first
        #[clap(long)]
        drop_if_exists: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum FetchSubcommands {
    /// Pulls daily currency quotes from exchangerate.host and upserts them.
    ///
    /// Defaults to the daily top-up window, yesterday through today. Needs
    /// EXCHANGERATE_HOST_ACCESS_KEY in the environment.
    ///
    /// Example:
    /// `marketsync fetch exchange-rates --base USD --targets CAD,GBP`
    #[clap(name = "exchange-rates")]
    ExchangeRates {
        /// Base currency code
        #[clap(long, default_value = "USD")]
        base: String,

        /// Comma-separated target currency codes
        #[clap(long, value_delimiter = ',')]
        targets: Vec<String>,

        /// First day of the window (YYYY-MM-DD), defaults to yesterday
        #[clap(long)]
        start: Option<NaiveDate>,

        /// Last day of the window (YYYY-MM-DD), defaults to today
        #[clap(long)]
        end: Option<NaiveDate>,

        /// The table the rates land in
        #[clap(long, default_value = "finance.exchange_rates")]
        table: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_parses_manifest_path() {
        let cli =
            CLI::try_parse_from(["marketsync", "run", "--manifest", "project/marketsync.yaml"])
                .unwrap();
        match cli.command {
            Commands::Run { manifest } => {
                assert_eq!(manifest, Some(PathBuf::from("project/marketsync.yaml")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_command_manifest_defaults_to_none() {
        let cli = CLI::try_parse_from(["marketsync", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { manifest: None }));
    }
}
