use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    helpers::standardize,
    payload::{read_csv_payload, Payload, Value},
    sources::FetchError,
};

/// One scraped report, parsed and tagged.
#[derive(Debug)]
pub struct ReportFile {
    pub path: PathBuf,
    /// Standardized file stem, e.g. `us_amazon_cerebro_b08611lcc7_2023_01_12`.
    pub report: String,
    pub payload: Payload,
}

fn load_report_file(path: &Path, constants: &[(&str, Value)]) -> Result<ReportFile, FetchError> {
    let mut payload = read_csv_payload(path)?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let report = standardize(stem, true, false);

    payload.push_constant_column("report", Value::Text(report.clone()))?;
    for (name, value) in constants {
        payload.push_constant_column(*name, value.clone())?;
    }

    Ok(ReportFile { path: path.to_path_buf(), report, payload })
}

/// Walks a download directory of scraped CSV reports and yields one payload
/// per file, each tagged with its standardized file name and the given
/// constant columns. A file that fails to parse is logged and skipped so one
/// bad download cannot sink the batch.
pub fn load_report_dir(
    directory: &Path,
    constants: &[(&str, Value)],
) -> Result<Vec<ReportFile>, FetchError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();

    let mut reports = vec![];
    for path in paths {
        match load_report_file(&path, constants) {
            Ok(report) => {
                info!("Loaded report {} with {} rows", report.report, report.payload.rows());
                reports.push(report);
            }
            Err(e) => {
                warn!("Skipping report {}: {}", path.display(), e);
            }
        }
    }

    Ok(reports)
}
