use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExchangeRatesSource {
    pub base: String,

    pub targets: Vec<String>,

    pub table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// A download directory of browser-scraped CSV reports and the table they
/// land in.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReportSource {
    pub name: String,

    pub directory: String,

    pub table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Sources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rates: Option<ExchangeRatesSource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<ReportSource>,
}

impl Sources {
    pub fn is_empty(&self) -> bool {
        self.exchange_rates.is_none() && self.reports.is_empty()
    }
}
