use std::{collections::BTreeMap, str::FromStr};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::{
    payload::{Payload, Value},
    sources::{with_retry, FetchError, RetryPolicy},
};

pub const EXCHANGE_RATE_API_URL: &str = "https://api.exchangerate.host/timeframe";

/// currencylayer-style timeframe body: quotes keyed by date, each holding
/// `<base><target>` pairs. BTreeMap keeps the payload sorted by date.
#[derive(Debug, Deserialize)]
struct TimeframeResponse {
    #[serde(default)]
    success: bool,

    #[serde(default)]
    error: Option<serde_json::Value>,

    #[serde(default)]
    source: Option<String>,

    #[serde(default)]
    quotes: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Pulls daily currency quotes from exchangerate.host into a payload shaped
/// for the `exchange_rates` table (`recorded_at`, `base`, `target`, `rate`).
pub struct ExchangeRatesClient {
    http: reqwest::Client,
    api_url: String,
    access_key: String,
    retry: RetryPolicy,
}

impl ExchangeRatesClient {
    pub fn new(access_key: impl Into<String>) -> Self {
        ExchangeRatesClient {
            http: reqwest::Client::new(),
            api_url: EXCHANGE_RATE_API_URL.to_string(),
            access_key: access_key.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn fetch_timeframe(
        &self,
        base: &str,
        targets: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Payload, FetchError> {
        let currencies = targets.join(",");
        let start = start_date.format("%Y-%m-%d").to_string();
        let end = end_date.format("%Y-%m-%d").to_string();

        info!("Fetching exchange rates {} -> {} for {} to {}", base, currencies, start, end);

        let body = with_retry(&self.retry, || {
            let params = [
                ("access_key", self.access_key.as_str()),
                ("base", base),
                ("currencies", currencies.as_str()),
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
            ];
            async move {
                let response =
                    self.http.get(&self.api_url).query(&params).send().await?.error_for_status()?;
                let body: TimeframeResponse = response.json().await?;
                if !body.success {
                    let reason = body
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "api reported success=false".to_string());
                    return Err(FetchError::Upstream(reason));
                }
                Ok(body)
            }
        })
        .await?;

        let source = body.source.unwrap_or_else(|| base.to_string());

        let mut recorded_at: Vec<Value> = vec![];
        let mut bases: Vec<Value> = vec![];
        let mut quote_targets: Vec<Value> = vec![];
        let mut rates: Vec<Value> = vec![];

        for (date_str, quotes) in &body.quotes {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
                FetchError::UnexpectedResponse(format!("bad quote date '{date_str}'"))
            })?;
            for (pair, rate) in quotes {
                // pairs arrive as "USDCAD", the target is the last three chars
                let target = pair.get(pair.len().saturating_sub(3)..).unwrap_or(pair);
                let rate = Decimal::from_str(&rate.to_string()).map_err(|_| {
                    FetchError::UnexpectedResponse(format!("bad rate for '{pair}': {rate}"))
                })?;

                recorded_at.push(Value::Date(date));
                bases.push(Value::Text(source.clone()));
                quote_targets.push(Value::Text(target.to_string()));
                rates.push(Value::Decimal(rate));
            }
        }

        let mut payload = Payload::new();
        payload.push_column("recorded_at", recorded_at)?;
        payload.push_column("base", bases)?;
        payload.push_column("target", quote_targets)?;
        payload.push_column("rate", rates)?;

        info!("Fetched {} exchange rate rows", payload.rows());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn instant_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    #[tokio::test]
    async fn test_fetch_timeframe_builds_sorted_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/timeframe")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("base".into(), "USD".into()),
                mockito::Matcher::UrlEncoded("currencies".into(), "CAD,GBP".into()),
                mockito::Matcher::UrlEncoded("start_date".into(), "2024-01-01".into()),
                mockito::Matcher::UrlEncoded("end_date".into(), "2024-01-02".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "success": true,
                    "source": "USD",
                    "quotes": {
                        "2024-01-02": {"USDCAD": 1.35},
                        "2024-01-01": {"USDCAD": 1.33, "USDGBP": 0.79}
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = ExchangeRatesClient::new("test-key")
            .with_api_url(format!("{}/timeframe", server.url()));
        let payload = client
            .fetch_timeframe(
                "USD",
                &["CAD".to_string(), "GBP".to_string()],
                date(2024, 1, 1),
                date(2024, 1, 2),
            )
            .await
            .unwrap();

        mock.assert_async().await;

        assert_eq!(payload.column_names(), vec!["recorded_at", "base", "target", "rate"]);
        assert_eq!(payload.rows(), 3);

        let recorded_at = payload.column("recorded_at").unwrap();
        assert_eq!(recorded_at.values[0], Value::Date(date(2024, 1, 1)));
        assert_eq!(recorded_at.values[2], Value::Date(date(2024, 1, 2)));

        let targets = payload.column("target").unwrap();
        assert_eq!(targets.values[0], Value::Text("CAD".to_string()));
        assert_eq!(targets.values[1], Value::Text("GBP".to_string()));

        let rates = payload.column("rate").unwrap();
        assert_eq!(rates.values[0], Value::Decimal(Decimal::from_str("1.33").unwrap()));
    }

    #[tokio::test]
    async fn test_api_failure_surfaces_as_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/timeframe")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": false, "error": {"code": 101, "info": "missing key"}}"#)
            .create_async()
            .await;

        let client = ExchangeRatesClient::new("bad-key")
            .with_api_url(format!("{}/timeframe", server.url()))
            .with_retry(instant_retry(1));
        let err = client
            .fetch_timeframe("USD", &["CAD".to_string()], date(2024, 1, 1), date(2024, 1, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/timeframe")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let client = ExchangeRatesClient::new("test-key")
            .with_api_url(format!("{}/timeframe", server.url()))
            .with_retry(instant_retry(2));
        let err = client
            .fetch_timeframe("USD", &["CAD".to_string()], date(2024, 1, 1), date(2024, 1, 2))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 2, .. }));
    }
}
