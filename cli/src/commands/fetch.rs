use std::env;

use chrono::{Duration, Local, NaiveDate};
use marketsync::{sources::ExchangeRatesClient, upsert_bulk, PostgresClient};

use crate::console::{print_error_message, print_success_message, print_warn_message};

pub async fn handle_fetch_exchange_rates_command(
    base: String,
    targets: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    table: String,
) -> Result<(), Box<dyn std::error::Error>> {
    if targets.is_empty() {
        let error = "No target currencies given, pass --targets CAD,GBP.";
        print_error_message(error);
        return Err(error.into());
    }

    let access_key = env::var("EXCHANGERATE_HOST_ACCESS_KEY").map_err(|e| {
        print_error_message(
            "EXCHANGERATE_HOST_ACCESS_KEY is not set, add it to your environment or .env file.",
        );
        e
    })?;

    // daily top-up window by default
    let end = end.unwrap_or_else(|| Local::now().date_naive());
    let start = start.unwrap_or_else(|| end - Duration::days(1));

    let rates_client = ExchangeRatesClient::new(access_key);
    let payload = rates_client.fetch_timeframe(&base, &targets, start, end).await.map_err(|e| {
        print_error_message(&format!("Could not fetch exchange rates: {}", e));
        e
    })?;

    if payload.is_empty() {
        print_warn_message("The API returned no quotes for the requested window.");
        return Ok(());
    }

    let client = PostgresClient::new().await.map_err(|e| {
        print_error_message(&format!("Could not connect to postgres: {}", e));
        e
    })?;

    upsert_bulk(&client, &table, &payload).await.map_err(|e| {
        print_error_message(&format!("Could not upsert into {}: {}", table, e));
        e
    })?;

    print_success_message(&format!(
        "Upserted {} exchange rate rows into {}.",
        payload.rows(),
        table
    ));
    Ok(())
}
