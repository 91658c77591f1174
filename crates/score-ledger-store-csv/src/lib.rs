use std::fs;
use std::path::{Path, PathBuf};

use score_ledger_core::{
    format_date, parse_date, DayRecord, LedgerError, LedgerStore, LABEL_SEPARATOR,
};
use serde::{Deserialize, Serialize};
use time::Date;

const HEADERS: [&str; 5] =
    ["date", "reward_labels", "penalty_labels", "day_total", "cumulative_total"];

/// One persisted CSV row. Label sequences are a single field joined with
/// [`LABEL_SEPARATOR`]; scores are kept as text so legacy float artifacts
/// (`2.0`) can be normalized on load.
#[derive(Debug, Serialize, Deserialize)]
struct RawRow {
    date: String,
    reward_labels: String,
    penalty_labels: String,
    day_total: String,
    cumulative_total: String,
}

/// File-backed ledger table with full-file rewrite semantics: every write
/// loads the whole table, mutates it in memory, and rewrites the file. O(n)
/// per write, single-process single-writer only; two concurrent submitters
/// race read-modify-write and the earlier write is silently lost.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    /// Open the ledger file, creating a header-only table on first run.
    ///
    /// # Errors
    /// Returns [`LedgerError::Store`] when the file cannot be created or
    /// written.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let store = Self { path: path.to_path_buf() };
        if !path.exists() {
            store.write_rows(&[])?;
        }
        Ok(store)
    }

    /// The ledger file this store reads and rewrites.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<DayRecord>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|err| {
                LedgerError::Store(format!(
                    "failed to open ledger file {}: {err}",
                    self.path.display()
                ))
            })?;

        let mut records = Vec::new();
        for row in reader.deserialize::<RawRow>() {
            let raw = row.map_err(|err| {
                LedgerError::Store(format!(
                    "failed to read ledger row from {}: {err}",
                    self.path.display()
                ))
            })?;
            records.push(from_raw(&raw)?);
        }
        Ok(records)
    }

    /// Serialize the whole table to a sibling temp file, then rename it over
    /// the ledger path, so a failed write leaves the previous table intact.
    fn write_rows(&self, records: &[DayRecord]) -> Result<(), LedgerError> {
        let tmp_path = self.tmp_path();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp_path)
            .map_err(|err| {
                LedgerError::Store(format!(
                    "failed to create ledger temp file {}: {err}",
                    tmp_path.display()
                ))
            })?;

        let write_failure = |err: csv::Error| {
            LedgerError::Store(format!(
                "failed to write ledger temp file {}: {err}",
                tmp_path.display()
            ))
        };
        writer.write_record(HEADERS).map_err(write_failure)?;
        for record in records {
            writer.serialize(to_raw(record)?).map_err(write_failure)?;
        }
        writer.flush().map_err(|err| {
            LedgerError::Store(format!(
                "failed to flush ledger temp file {}: {err}",
                tmp_path.display()
            ))
        })?;
        drop(writer);

        fs::rename(&tmp_path, &self.path).map_err(|err| {
            LedgerError::Store(format!(
                "failed to replace ledger file {}: {err}",
                self.path.display()
            ))
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map_or_else(
            || "score_ledger.csv".to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        name.push_str(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for CsvStore {
    fn load_all(&self) -> Result<Vec<DayRecord>, LedgerError> {
        self.read_rows()
    }

    fn find_by_date(&self, date: Date) -> Result<Option<DayRecord>, LedgerError> {
        let records = self.read_rows()?;
        Ok(records.into_iter().rev().find(|record| record.date == date))
    }

    fn append_row(&mut self, record: &DayRecord) -> Result<(), LedgerError> {
        let mut records = self.read_rows()?;
        records.push(record.clone());
        self.write_rows(&records)
    }

    fn update_row(
        &mut self,
        date: Date,
        mutate: &mut dyn FnMut(&mut DayRecord),
    ) -> Result<(), LedgerError> {
        let mut records = self.read_rows()?;
        let Some(row) = records.iter_mut().rev().find(|record| record.date == date) else {
            return Err(LedgerError::RecordNotFound { date });
        };
        mutate(row);
        self.write_rows(&records)
    }

    fn last_cumulative(&self) -> Result<i64, LedgerError> {
        let records = self.read_rows()?;
        Ok(records.last().map_or(0, |record| record.cumulative_total))
    }
}

fn to_raw(record: &DayRecord) -> Result<RawRow, LedgerError> {
    Ok(RawRow {
        date: format_date(record.date)?,
        reward_labels: record.reward_labels.join(LABEL_SEPARATOR),
        penalty_labels: record.penalty_labels.join(LABEL_SEPARATOR),
        day_total: record.day_total.to_string(),
        cumulative_total: record.cumulative_total.to_string(),
    })
}

fn from_raw(raw: &RawRow) -> Result<DayRecord, LedgerError> {
    Ok(DayRecord {
        date: parse_date(&raw.date)?,
        reward_labels: split_labels(&raw.reward_labels),
        penalty_labels: split_labels(&raw.penalty_labels),
        day_total: parse_score(&raw.day_total)?,
        cumulative_total: parse_score(&raw.cumulative_total)?,
    })
}

fn split_labels(field: &str) -> Vec<String> {
    if field.is_empty() {
        return Vec::new();
    }
    field.split(LABEL_SEPARATOR).map(str::to_string).collect()
}

/// Scores are integers, but tables written by spreadsheet-style aggregation
/// may carry them as floats (`2.0`). Accept those and normalize.
fn parse_score(value: &str) -> Result<i64, LedgerError> {
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Ok(parsed);
    }

    let parsed: f64 = trimmed
        .parse()
        .map_err(|err| LedgerError::Store(format!("invalid score value {value:?}: {err}")))?;
    if parsed.fract() != 0.0 {
        return Err(LedgerError::Store(format!(
            "score value {value:?} is not a whole number"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let normalized = parsed as i64;
    Ok(normalized)
}
