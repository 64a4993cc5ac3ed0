use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::RecordStore;
use crate::date_util::{format_date, parse_date, weekday_abbrev};
use crate::error::{Error, Result};
use crate::types::scalar_to_string;

pub const HEADER: &str = "date,puzzle_id,weekday,solve_time_secs,opened_unix,solved_unix,cheated";

/// One day's summary stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub date: NaiveDate,
    pub puzzle_id: String,
    pub weekday: String,
    pub solve_time_secs: Option<i64>,
    pub opened_unix: Option<i64>,
    pub solved_unix: Option<i64>,
    pub cheated: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Calcs {
    #[serde(default)]
    solved: bool,
    #[serde(rename = "secondsSpentSolving")]
    seconds_spent_solving: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct Firsts {
    opened: Option<i64>,
    solved: Option<i64>,
    checked: Option<i64>,
    revealed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct JoinedStats {
    print_date: String,
    puzzle_id: Value,
    #[serde(default)]
    calcs: Calcs,
    #[serde(default)]
    firsts: Firsts,
}

impl LedgerRow {
    /// Summarise a stats response joined with its puzzle metadata.
    ///
    /// Solve time and timestamps are only filled for solved puzzles. A
    /// puzzle counts as cheated when a check or reveal was ever used.
    pub fn from_stats(record: &Value) -> Result<Self> {
        let stats = JoinedStats::deserialize(record)?;
        let date = parse_date(&stats.print_date)?;
        let puzzle_id = scalar_to_string(&stats.puzzle_id).unwrap_or_default();

        let mut row = LedgerRow {
            date,
            puzzle_id,
            weekday: weekday_abbrev(date),
            solve_time_secs: None,
            opened_unix: None,
            solved_unix: None,
            cheated: false,
        };
        if stats.calcs.solved {
            row.solve_time_secs = stats.calcs.seconds_spent_solving;
            row.opened_unix = stats.firsts.opened;
            row.solved_unix = stats.firsts.solved;
            row.cheated = stats.firsts.checked.is_some() || stats.firsts.revealed.is_some();
        }
        Ok(row)
    }

    fn to_csv(&self) -> String {
        let opt = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
        [
            format_date(self.date),
            csv_escape(&self.puzzle_id),
            self.weekday.clone(),
            opt(self.solve_time_secs),
            opt(self.opened_unix),
            opt(self.solved_unix),
            self.cheated.to_string(),
        ]
        .join(",")
    }

    fn from_csv(line: &str) -> std::result::Result<Self, String> {
        let fields = split_csv_line(line);
        let [date, puzzle_id, weekday, solve, opened, solved, cheated] = fields.as_slice() else {
            return Err(format!("expected 7 fields, found {}", fields.len()));
        };
        let opt = |name: &str, s: &str| -> std::result::Result<Option<i64>, String> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse()
                    .map(Some)
                    .map_err(|_| format!("{name} is not a number: {s:?}"))
            }
        };
        Ok(LedgerRow {
            date: parse_date(date).map_err(|e| e.to_string())?,
            puzzle_id: puzzle_id.clone(),
            weekday: weekday.clone(),
            solve_time_secs: opt("solve_time_secs", solve)?,
            opened_unix: opt("opened_unix", opened)?,
            solved_unix: opt("solved_unix", solved)?,
            cheated: cheated == "true",
        })
    }
}

/// Right-biased merge: rows in `incoming` replace rows in `existing` with the
/// same date. The result is ordered by date.
pub fn merge_rows(
    mut existing: BTreeMap<NaiveDate, LedgerRow>,
    incoming: impl IntoIterator<Item = LedgerRow>,
) -> BTreeMap<NaiveDate, LedgerRow> {
    for row in incoming {
        existing.insert(row.date, row);
    }
    existing
}

/// A single CSV file holding one row per date, sorted ascending.
#[derive(Debug)]
pub struct StatsLedger {
    path: PathBuf,
    rows: BTreeMap<NaiveDate, LedgerRow>,
}

impl StatsLedger {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        Ok(Self {
            path,
            rows: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &BTreeMap<NaiveDate, LedgerRow> {
        &self.rows
    }

    /// Load every row on disk. A missing file is an empty ledger.
    fn load(&self) -> Result<BTreeMap<NaiveDate, LedgerRow>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No ledger at {} yet, starting empty", self.path.display());
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        let mut rows = BTreeMap::new();
        for (i, line) in text.lines().enumerate() {
            if i == 0 || line.trim().is_empty() {
                continue;
            }
            let row = LedgerRow::from_csv(line).map_err(|message| Error::Ledger {
                path: self.path.display().to_string(),
                line: i + 1,
                message,
            })?;
            rows.insert(row.date, row);
        }
        Ok(rows)
    }

    /// Rewrite the whole ledger through a temp file so a crash never leaves
    /// a half-written row behind.
    fn save(&self, rows: &BTreeMap<NaiveDate, LedgerRow>) -> Result<()> {
        let mut out = String::with_capacity(64 * (rows.len() + 1));
        out.push_str(HEADER);
        out.push('\n');
        for row in rows.values() {
            out.push_str(&row.to_csv());
            out.push('\n');
        }
        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, out).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }
}

impl RecordStore for StatsLedger {
    /// The ledger is always rewritten whole, so every row is loaded
    /// regardless of `since`.
    fn read(&mut self, _since: NaiveDate) -> Result<usize> {
        self.rows = self.load()?;
        Ok(self.rows.len())
    }

    /// A date only counts as present once it has a solve time.
    fn missing_days(&self, dates: &[NaiveDate]) -> Vec<NaiveDate> {
        dates
            .iter()
            .copied()
            .filter(|d| {
                self.rows
                    .get(d)
                    .map_or(true, |row| row.solve_time_secs.is_none())
            })
            .collect()
    }

    fn write(&mut self, records: &[Value]) -> Result<usize> {
        let mut incoming = Vec::with_capacity(records.len());
        for record in records {
            match LedgerRow::from_stats(record) {
                Ok(row) => incoming.push(row),
                Err(e) => log::warn!("Skipping stats record for {}: {e}", self.path.display()),
            }
        }
        let written = incoming.len();
        let merged = merge_rows(self.load()?, incoming);
        self.save(&merged)?;
        self.rows = merged;
        Ok(written)
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Split one CSV line, honouring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
