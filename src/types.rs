use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::date_util::parse_date;
use crate::error::{Error, Result};

/// Puzzle category. Every stored file belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Daily,
    Mini,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Mini, Variant::Daily];

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Daily => "daily",
            Variant::Mini => "mini",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(Variant::Daily),
            "mini" => Ok(Variant::Mini),
            other => Err(Error::Config(format!("unknown puzzle variant: {other}"))),
        }
    }
}

/// Which aspect of a date's data a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Puzzle body JSON tree.
    Puzzle,
    /// Per-variant CSV ledger of solve times.
    Stats,
    /// Raw stats JSON tree, joined with puzzle metadata.
    FullStats,
}

impl DataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Puzzle => "puzzle",
            DataKind::Stats => "stats",
            DataKind::FullStats => "full_stats",
        }
    }

    pub fn is_stat(self) -> bool {
        matches!(self, DataKind::Stats | DataKind::FullStats)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry from the puzzle metadata listing.
///
/// The parsed fields drive the sync; `raw` keeps everything the listing
/// returned so it can be joined into the stored stats record.
#[derive(Debug, Clone, PartialEq)]
pub struct PuzzleInfo {
    pub puzzle_id: String,
    pub print_date: NaiveDate,
    pub solved: bool,
    pub raw: Value,
}

impl PuzzleInfo {
    pub fn from_value(raw: Value) -> Result<Self> {
        let puzzle_id = raw
            .get("puzzle_id")
            .and_then(scalar_to_string)
            .ok_or_else(|| Error::Other(format!("puzzle info without puzzle_id: {raw}")))?;
        let print_date = raw
            .get("print_date")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Other(format!("puzzle info without print_date: {raw}")))
            .and_then(parse_date)?;
        let solved = raw.get("solved").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            puzzle_id,
            print_date,
            solved,
            raw,
        })
    }

    /// Merge a stats response with this metadata. Metadata fields win on
    /// key collisions.
    pub fn join(&self, stats: Value) -> Value {
        let mut joined = match stats {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("stats".to_string(), other);
                map
            }
        };
        if let Value::Object(info) = &self.raw {
            for (k, v) in info {
                joined.insert(k.clone(), v.clone());
            }
        }
        Value::Object(joined)
    }
}

/// Render a JSON string or number as a plain string.
pub fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The date a stored record belongs to: stats carry `print_date`, puzzle
/// bodies carry `publicationDate`.
pub fn record_date(record: &Value) -> Option<NaiveDate> {
    record
        .get("print_date")
        .or_else(|| record.get("publicationDate"))
        .and_then(Value::as_str)
        .and_then(|s| parse_date(s).ok())
}
