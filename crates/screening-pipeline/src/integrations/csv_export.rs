use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use tracing::info;

use crate::workflows::screening::collaborators::{CandidateSource, SourceError};
use crate::workflows::screening::domain::RawCandidate;

/// Columns whose numeric cells are spreadsheet serial dates rather than text.
const SERIAL_DATE_COLUMNS: &[&str] = &["REQUEST_DATE", "CALL_TIMESTAMP"];

/// Candidate source backed by a CSV export of the report, for offline runs.
#[derive(Debug, Clone)]
pub struct CsvCandidateSource {
    path: PathBuf,
}

impl CsvCandidateSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for CsvCandidateSource {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, SourceError> {
        let file = std::fs::File::open(&self.path)?;
        let candidates = parse_export(file)?;
        info!(
            path = %self.path.display(),
            records = candidates.len(),
            "candidate export loaded"
        );
        Ok(candidates)
    }
}

/// Read an export whose header row uses the report's column names.
pub fn parse_export<R: Read>(reader: R) -> Result<Vec<RawCandidate>, SourceError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut candidates = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), cell_value(header, cell)))
            .collect();
        let candidate = serde_json::from_value(Value::Object(row))
            .map_err(|err| SourceError::Format(err.to_string()))?;
        candidates.push(candidate);
    }
    Ok(candidates)
}

fn cell_value(header: &str, cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if SERIAL_DATE_COLUMNS.contains(&header) {
        if let Some(serial) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(serial);
        }
    }
    Value::String(cell.to_string())
}
