use std::{
    env,
    path::{Path, PathBuf},
};

use chrono::{Duration, Local};
use marketsync::{
    manifest::{
        source::{ExchangeRatesSource, ReportSource},
        yaml::{read_manifest, YAML_CONFIG_NAME},
    },
    setup_postgres,
    sources::{load_report_dir, ExchangeRatesClient},
    upsert_bulk, PostgresClient, Value,
};

use crate::console::{print_error_message, print_success_message, print_warn_message};

pub async fn handle_run_command(
    manifest_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = manifest_path.unwrap_or_else(|| PathBuf::from(YAML_CONFIG_NAME));
    let manifest = read_manifest(&path).map_err(|e| {
        print_error_message(&format!("Could not read manifest {}: {}", path.display(), e));
        e
    })?;

    let client = setup_postgres(&manifest).await.map_err(|e| {
        print_error_message(&format!("Could not set up postgres: {}", e));
        e
    })?;

    if manifest.sources.is_empty() {
        print_warn_message("The manifest configures no sources, nothing to load.");
        return Ok(());
    }

    if let Some(rates) = &manifest.sources.exchange_rates {
        load_exchange_rates_source(&client, rates).await?;
    }

    for report in &manifest.sources.reports {
        load_report_source(&client, report).await?;
    }

    Ok(())
}

/// Tops up the configured rates table with the daily window, yesterday
/// through today.
async fn load_exchange_rates_source(
    client: &PostgresClient,
    source: &ExchangeRatesSource,
) -> Result<(), Box<dyn std::error::Error>> {
    let access_key = env::var("EXCHANGERATE_HOST_ACCESS_KEY").map_err(|e| {
        print_error_message(
            "EXCHANGERATE_HOST_ACCESS_KEY is not set, add it to your environment or .env file.",
        );
        e
    })?;

    let mut rates_client = ExchangeRatesClient::new(access_key);
    if let Some(api_url) = &source.api_url {
        rates_client = rates_client.with_api_url(api_url.as_str());
    }

    let end = Local::now().date_naive();
    let start = end - Duration::days(1);

    let payload =
        rates_client.fetch_timeframe(&source.base, &source.targets, start, end).await.map_err(
            |e| {
                print_error_message(&format!("Could not fetch exchange rates: {}", e));
                e
            },
        )?;

    if payload.is_empty() {
        print_warn_message("The exchange rate API returned no quotes for the daily window.");
        return Ok(());
    }

    upsert_bulk(client, &source.table, &payload).await.map_err(|e| {
        print_error_message(&format!("Could not upsert into {}: {}", source.table, e));
        e
    })?;

    print_success_message(&format!(
        "Upserted {} exchange rate rows into {}.",
        payload.rows(),
        source.table
    ));
    Ok(())
}

async fn load_report_source(
    client: &PostgresClient,
    source: &ReportSource,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut constants: Vec<(&str, Value)> = vec![];
    if let Some(marketplace) = &source.marketplace {
        constants.push(("marketplace", Value::Text(marketplace.clone())));
    }

    let reports = load_report_dir(Path::new(&source.directory), &constants).map_err(|e| {
        print_error_message(&format!("Could not load reports for {}: {}", source.name, e));
        e
    })?;

    if reports.is_empty() {
        print_warn_message(&format!("No reports found in {}.", source.directory));
        return Ok(());
    }

    for report in &reports {
        upsert_bulk(client, &source.table, &report.payload).await.map_err(|e| {
            print_error_message(&format!(
                "Could not upsert {} into {}: {}",
                report.report, source.table, e
            ));
            e
        })?;
    }

    print_success_message(&format!(
        "Loaded {} {} reports into {}.",
        reports.len(),
        source.name,
        source.table
    ));
    Ok(())
}
