//! CSV bulk import of traffic violations.
//!
//! The file must have a header row. Only the `licence_number` and
//! `isSorted` columns are read; any others are ignored. Rows are created
//! one at a time in file order so a partial import leaves a prefix of the
//! file behind, never a random subset.

use std::io::Read;
use std::path::Path;

use patrol_desk_case_models::resources::NewTrafficViolation;
use patrol_desk_store::{RecordStore, StoreError};
use serde::Deserialize;

use crate::create_violation;
use crate::progress::ProgressCallback;

/// Rows shown before committing an import.
pub const PREVIEW_ROWS: usize = 5;

/// Errors from reading or importing a violations file.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The file could not be opened.
    #[error("Failed to open {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The CSV header could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// The store became unreachable part way through.
    #[error("Import aborted after {imported} records: {source}")]
    Store {
        /// Records created before the failure.
        imported: usize,
        /// Underlying error.
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    licence_number: Option<String>,
    #[serde(rename = "isSorted")]
    is_sorted: Option<String>,
}

impl CsvRow {
    fn into_violation(self) -> Option<NewTrafficViolation> {
        let licence_number = self
            .licence_number
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())?;
        Some(NewTrafficViolation {
            licence_number,
            is_sorted: self.is_sorted.as_deref().map(str::trim) == Some("true"),
        })
    }
}

/// Rows accepted from a CSV file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsv {
    /// Violations to create, in file order.
    pub rows: Vec<NewTrafficViolation>,
    /// Rows dropped for a blank licence number or bad encoding.
    pub skipped: usize,
}

/// Parses a violations CSV.
///
/// # Errors
///
/// Returns [`ImportError::Csv`] if the header row cannot be read.
pub fn parse_rows(reader: impl Read) -> Result<ParsedCsv, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    csv_reader.headers()?;

    let mut parsed = ParsedCsv::default();
    for (index, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                log::trace!("  skipping malformed row {}: {e}", index + 1);
                parsed.skipped += 1;
                continue;
            }
        };
        match row.into_violation() {
            Some(violation) => parsed.rows.push(violation),
            None => {
                log::trace!("  skipping row {} without a licence number", index + 1);
                parsed.skipped += 1;
            }
        }
    }

    log::debug!(
        "Parsed {} violation rows ({} skipped)",
        parsed.rows.len(),
        parsed.skipped
    );
    Ok(parsed)
}

/// Opens and parses a violations CSV file.
///
/// # Errors
///
/// Returns [`ImportError::Io`] if the file cannot be opened, or
/// [`ImportError::Csv`] if it has no readable header.
pub fn parse_file(path: &Path) -> Result<ParsedCsv, ImportError> {
    let file = std::fs::File::open(path).map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_rows(std::io::BufReader::new(file))
}

/// The header and leading rows of a CSV, exactly as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvPreview {
    /// Column names.
    pub headers: Vec<String>,
    /// Up to [`PREVIEW_ROWS`] rows.
    pub rows: Vec<Vec<String>>,
}

/// Reads the header and first [`PREVIEW_ROWS`] rows without interpreting
/// them.
///
/// # Errors
///
/// Returns [`ImportError::Csv`] if the header or a previewed row cannot be
/// read.
pub fn preview(reader: impl Read) -> Result<CsvPreview, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.iter().map(str::to_string).collect();
    let rows = csv_reader
        .records()
        .take(PREVIEW_ROWS)
        .map(|record| Ok(record?.iter().map(str::to_string).collect()))
        .collect::<Result<_, csv::Error>>()?;
    Ok(CsvPreview { headers, rows })
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records created.
    pub imported: usize,
    /// Rows dropped while parsing.
    pub skipped: usize,
    /// Rows the store rejected.
    pub failed: usize,
}

/// Creates every parsed row, one at a time, in file order.
///
/// Rows the store rejects (a non-2xx response) are counted as failed and
/// the import continues. Any other store error means the store itself is
/// unreachable, so the import stops there.
///
/// # Errors
///
/// Returns [`ImportError::Store`] if the store becomes unreachable.
pub async fn import(
    store: &dyn RecordStore,
    parsed: &ParsedCsv,
    progress: &dyn ProgressCallback,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary {
        skipped: parsed.skipped,
        ..ImportSummary::default()
    };
    progress.set_total(parsed.rows.len() as u64);
    progress.relabel("Importing violations");

    for row in &parsed.rows {
        match create_violation(store, row).await {
            Ok(_) => summary.imported += 1,
            Err(e @ StoreError::Status { .. }) => {
                log::warn!("Rejected violation {}: {e}", row.licence_number);
                summary.failed += 1;
            }
            Err(source) => {
                progress.abandon();
                return Err(ImportError::Store {
                    imported: summary.imported,
                    source,
                });
            }
        }
        progress.inc(1);
    }

    progress.complete(&format!(
        "Imported {} violations ({} skipped, {} failed)",
        summary.imported, summary.skipped, summary.failed
    ));
    log::info!(
        "Imported {} violations ({} skipped, {} failed)",
        summary.imported,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use patrol_desk_store::memory::MemoryStore;
    use patrol_desk_store_models::Collection;

    use super::*;
    use crate::progress::NullProgress;

    const SAMPLE: &str = "\
licence_number,isSorted,notes
AAB 1234,true,parked on kerb
,true,no plate
ACD 9876,TRUE,shouty
AEF 5555,,
AGH 0001,false
";

    #[test]
    fn parse_skips_blank_plates_and_reads_literal_true() {
        let parsed = parse_rows(SAMPLE.as_bytes()).unwrap();
        assert_eq!(parsed.skipped, 1);
        assert_eq!(
            parsed.rows,
            vec![
                NewTrafficViolation {
                    licence_number: "AAB 1234".to_string(),
                    is_sorted: true,
                },
                NewTrafficViolation {
                    licence_number: "ACD 9876".to_string(),
                    is_sorted: false,
                },
                NewTrafficViolation {
                    licence_number: "AEF 5555".to_string(),
                    is_sorted: false,
                },
                NewTrafficViolation {
                    licence_number: "AGH 0001".to_string(),
                    is_sorted: false,
                },
            ]
        );
    }

    #[test]
    fn missing_licence_column_skips_everything() {
        let parsed = parse_rows("plate,isSorted\nAAB 1234,true\n".as_bytes()).unwrap();
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn preview_keeps_first_five_rows_verbatim() {
        let mut csv = String::from("licence_number,isSorted\n");
        for i in 0..8 {
            csv.push_str(&format!("P{i},true\n"));
        }
        let preview = preview(csv.as_bytes()).unwrap();
        assert_eq!(preview.headers, vec!["licence_number", "isSorted"]);
        assert_eq!(preview.rows.len(), PREVIEW_ROWS);
        assert_eq!(preview.rows[4], vec!["P4", "true"]);
    }

    #[derive(Default)]
    struct CountingProgress {
        total: Mutex<u64>,
        done: Mutex<u64>,
    }

    impl ProgressCallback for CountingProgress {
        fn set_total(&self, total: u64) {
            *self.total.lock().unwrap() = total;
        }
        fn inc(&self, delta: u64) {
            *self.done.lock().unwrap() += delta;
        }
        fn relabel(&self, _label: &str) {}
        fn complete(&self, _summary: &str) {}
        fn abandon(&self) {}
    }

    #[tokio::test]
    async fn import_creates_rows_in_file_order() {
        let store = MemoryStore::new();
        let parsed = parse_rows(SAMPLE.as_bytes()).unwrap();
        let progress = CountingProgress::default();

        let summary = import(&store, &parsed, &progress).await.unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                imported: 4,
                skipped: 1,
                failed: 0,
            }
        );
        assert_eq!(*progress.total.lock().unwrap(), 4);
        assert_eq!(*progress.done.lock().unwrap(), 4);

        let plates: Vec<String> = store
            .records(Collection::TrafficViolations)
            .iter()
            .filter_map(|r| r["licence_number"].as_str().map(str::to_string))
            .collect();
        assert_eq!(plates, vec!["AAB 1234", "ACD 9876", "AEF 5555", "AGH 0001"]);
    }

    #[tokio::test]
    async fn empty_file_imports_nothing() {
        let store = MemoryStore::new();
        let parsed = parse_rows("licence_number,isSorted\n".as_bytes()).unwrap();
        let summary = import(&store, &parsed, &NullProgress).await.unwrap();
        assert_eq!(summary, ImportSummary::default());
    }
}
