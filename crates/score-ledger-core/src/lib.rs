use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::Date;

/// Joins label sequences inside a single persisted field. Multi-byte on
/// purpose: catalog item names must never contain it, and ordinary
/// punctuation never collides with it.
pub const LABEL_SEPARATOR: &str = "，";

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

time::serde::format_description!(ymd_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LedgerError {
    #[error("unknown {kind} item: {name}")]
    UnknownItem { kind: ItemKind, name: String },
    #[error("no ledger record for date {date}")]
    RecordNotFound { date: Date },
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Reward,
    Penalty,
}

impl ItemKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reward => "reward",
            Self::Penalty => "penalty",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reward" => Some(Self::Reward),
            "penalty" => Some(Self::Penalty),
            _ => None,
        }
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One behavior in a scoring catalog. Points are positive for rewards and
/// negative for penalties.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub points: i64,
}

/// The fixed reward/penalty vocabulary for one run. Loaded once at process
/// start and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Catalog {
    pub rewards: Vec<CatalogEntry>,
    pub penalties: Vec<CatalogEntry>,
}

fn entry(name: &str, points: i64) -> CatalogEntry {
    CatalogEntry { name: name.to_string(), points }
}

impl Catalog {
    /// The catalog compiled into the binary, used when no catalog file is
    /// supplied.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            rewards: vec![
                entry("up-before-8am", 2),
                entry("vocabulary-review", 2),
                entry("english-reading", 2),
                entry("major-coursework", 1),
                entry("reviewed-yesterday", 3),
                entry("studied-6h", 3),
                entry("studied-7h", 5),
                entry("studied-8h", 7),
                entry("studied-10h", 9),
                entry("studied-12h", 15),
                entry("regular-meals", 3),
                entry("exercise-break", 4),
                entry("short-video-under-90min", 8),
                entry("shopping-apps-under-1h", 2),
            ],
            penalties: vec![
                entry("slept-after-midnight", -5),
                entry("english-target-missed", -2),
                entry("coursework-target-missed", -4),
                entry("no-review", -1),
                entry("study-anxiety-spiral", -4),
                entry("shows-over-90min", -8),
                entry("studied-under-3h", -10),
                entry("gave-up-for-the-day", -20),
            ],
        }
    }

    /// Ordered item listing for display and selection.
    #[must_use]
    pub fn items(&self, kind: ItemKind) -> &[CatalogEntry] {
        match kind {
            ItemKind::Reward => &self.rewards,
            ItemKind::Penalty => &self.penalties,
        }
    }

    /// Resolve one item name to its point value.
    ///
    /// # Errors
    /// Returns [`LedgerError::UnknownItem`] when the name is not present in
    /// the catalog for `kind`. Unknown names are rejected, never treated as
    /// zero-valued.
    pub fn lookup(&self, kind: ItemKind, name: &str) -> Result<i64, LedgerError> {
        self.items(kind)
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.points)
            .ok_or_else(|| LedgerError::UnknownItem { kind, name: name.to_string() })
    }

    /// Check the catalog invariants: non-empty unique names that are safe to
    /// persist, positive reward points, negative penalty points.
    ///
    /// # Errors
    /// Returns [`LedgerError::Catalog`] describing the first violation found.
    pub fn validate(&self) -> Result<(), LedgerError> {
        for (kind, items) in [(ItemKind::Reward, &self.rewards), (ItemKind::Penalty, &self.penalties)] {
            let mut seen: Vec<&str> = Vec::with_capacity(items.len());
            for item in items {
                if item.name.trim().is_empty() {
                    return Err(LedgerError::Catalog(format!("{kind} item name MUST be non-empty")));
                }
                if item.name.contains(LABEL_SEPARATOR) {
                    return Err(LedgerError::Catalog(format!(
                        "{kind} item {:?} MUST NOT contain the label separator {LABEL_SEPARATOR:?}",
                        item.name
                    )));
                }
                if seen.contains(&item.name.as_str()) {
                    return Err(LedgerError::Catalog(format!(
                        "duplicate {kind} item name: {}",
                        item.name
                    )));
                }
                seen.push(&item.name);
                match kind {
                    ItemKind::Reward if item.points <= 0 => {
                        return Err(LedgerError::Catalog(format!(
                            "reward item {} MUST have positive points (got {})",
                            item.name, item.points
                        )));
                    }
                    ItemKind::Penalty if item.points >= 0 => {
                        return Err(LedgerError::Catalog(format!(
                            "penalty item {} MUST have negative points (got {})",
                            item.name, item.points
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// One row of the ledger: the per-date aggregate of every submission ever
/// recorded for that calendar date. At most one record exists per date; the
/// merge path of [`submit`] enforces that, not the raw store.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DayRecord {
    #[serde(with = "ymd_date")]
    pub date: Date,
    pub reward_labels: Vec<String>,
    pub penalty_labels: Vec<String>,
    pub day_total: i64,
    pub cumulative_total: i64,
}

/// Durable table of [`DayRecord`] rows in append order.
///
/// An empty table is a valid steady state, not an error: `load_all` returns
/// an empty vec and `last_cumulative` returns 0.
pub trait LedgerStore {
    /// Read the full persisted table in row order.
    ///
    /// # Errors
    /// Returns [`LedgerError::Store`] on read or decode failure.
    fn load_all(&self) -> Result<Vec<DayRecord>, LedgerError>;

    /// Locate the record for `date`, the last match if duplicates ever exist.
    ///
    /// # Errors
    /// Returns [`LedgerError::Store`] on read or decode failure.
    fn find_by_date(&self, date: Date) -> Result<Option<DayRecord>, LedgerError>;

    /// Add `record` as the new last row.
    ///
    /// # Errors
    /// Returns [`LedgerError::Store`] on write failure.
    fn append_row(&mut self, record: &DayRecord) -> Result<(), LedgerError>;

    /// Mutate the row for `date` in place (last match) and rewrite the table.
    ///
    /// # Errors
    /// Returns [`LedgerError::RecordNotFound`] when `date` has no row and
    /// [`LedgerError::Store`] on write failure.
    fn update_row(
        &mut self,
        date: Date,
        mutate: &mut dyn FnMut(&mut DayRecord),
    ) -> Result<(), LedgerError>;

    /// The `cumulative_total` of whichever record occupies the last row
    /// position, or 0 for an empty table.
    ///
    /// This is the most-recently-appended row, not the row for the most
    /// recent date: with out-of-order historical rows the baseline can come
    /// from a different date than the one being merged. The merge path keeps
    /// the original semantics; see DESIGN.md.
    ///
    /// # Errors
    /// Returns [`LedgerError::Store`] on read or decode failure.
    fn last_cumulative(&self) -> Result<i64, LedgerError>;
}

/// Sum the catalog point values of every selected item across both sets.
///
/// Empty selections on both sides yield 0, which is still a valid submission.
///
/// # Errors
/// Returns [`LedgerError::UnknownItem`] when any selection is absent from its
/// catalog; the caller must abort before any store mutation.
pub fn compute_total(
    catalog: &Catalog,
    rewards: &[String],
    penalties: &[String],
) -> Result<i64, LedgerError> {
    let mut total = 0_i64;
    for name in rewards {
        total += catalog.lookup(ItemKind::Reward, name)?;
    }
    for name in penalties {
        total += catalog.lookup(ItemKind::Penalty, name)?;
    }
    Ok(total)
}

/// Running-total step: the cumulative score after a day total of `total`.
#[must_use]
pub fn next_cumulative(prior: i64, total: i64) -> i64 {
    prior + total
}

/// What one successful submission did to the ledger. The three score fields
/// are the numbers the caller is expected to surface together.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SubmissionOutcome {
    #[serde(with = "ymd_date")]
    pub date: Date,
    pub day_total: i64,
    pub prior_cumulative: i64,
    pub cumulative_total: i64,
    pub merged: bool,
}

/// Record one submission: merge into the existing record for `date` or
/// append a new one.
///
/// The whole pass is compute, read baseline, then a single write. A record
/// that exists at lookup time but vanishes before `update_row` is a store
/// inconsistency; the resulting [`LedgerError::RecordNotFound`] propagates
/// unchanged rather than being downgraded to an append, which would fork the
/// one-record-per-date invariant.
///
/// # Errors
/// Returns [`LedgerError::UnknownItem`] before any store mutation when a
/// selection is not in its catalog, otherwise whatever the store write
/// returns.
pub fn submit<S: LedgerStore + ?Sized>(
    store: &mut S,
    catalog: &Catalog,
    date: Date,
    rewards: &[String],
    penalties: &[String],
) -> Result<SubmissionOutcome, LedgerError> {
    let total = compute_total(catalog, rewards, penalties)?;
    let prior = store.last_cumulative()?;
    let cumulative = next_cumulative(prior, total);

    let merged = if store.find_by_date(date)?.is_some() {
        store.update_row(date, &mut |record| {
            record.reward_labels.extend(rewards.iter().cloned());
            record.penalty_labels.extend(penalties.iter().cloned());
            record.day_total += total;
            record.cumulative_total = cumulative;
        })?;
        true
    } else {
        store.append_row(&DayRecord {
            date,
            reward_labels: rewards.to_vec(),
            penalty_labels: penalties.to_vec(),
            day_total: total,
            cumulative_total: cumulative,
        })?;
        false
    };

    Ok(SubmissionOutcome {
        date,
        day_total: total,
        prior_cumulative: prior,
        cumulative_total: cumulative,
        merged,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TrendPoint {
    #[serde(with = "ymd_date")]
    pub date: Date,
    pub value: i64,
}

/// The two date-ascending series consumed by an external chart renderer,
/// aligned by index.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TrendSeries {
    pub daily: Vec<TrendPoint>,
    pub cumulative: Vec<TrendPoint>,
}

/// Build the daily and cumulative trend series from the persisted records.
///
/// Returns `None` for an empty ledger: no data is an expected steady state
/// (first run), not an error.
#[must_use]
pub fn build_trend(records: &[DayRecord]) -> Option<TrendSeries> {
    if records.is_empty() {
        return None;
    }

    let mut sorted: Vec<&DayRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.date);

    let daily = sorted
        .iter()
        .map(|record| TrendPoint { date: record.date, value: record.day_total })
        .collect();
    let cumulative = sorted
        .iter()
        .map(|record| TrendPoint { date: record.date, value: record.cumulative_total })
        .collect();

    Some(TrendSeries { daily, cumulative })
}

/// Sum of `day_total` across every record, submission history included.
#[must_use]
pub fn history_total(records: &[DayRecord]) -> i64 {
    records.iter().map(|record| record.day_total).sum()
}

/// Parse a persisted `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`LedgerError::Store`] when the value is not a valid date.
pub fn parse_date(value: &str) -> Result<Date, LedgerError> {
    Date::parse(value, DATE_FORMAT)
        .map_err(|err| LedgerError::Store(format!("invalid date {value:?}: {err}")))
}

/// Format a calendar date in the persisted `YYYY-MM-DD` form.
///
/// # Errors
/// Returns [`LedgerError::Store`] when formatting fails.
pub fn format_date(date: Date) -> Result<String, LedgerError> {
    date.format(DATE_FORMAT)
        .map_err(|err| LedgerError::Store(format!("failed to format date {date}: {err}")))
}
