use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use super::RecordStore;
use crate::error::{Error, Result};
use crate::types::record_date;

/// One JSON file per date under `<root>/<YYYY>/<MM>/<basename>-<DD>.json`.
#[derive(Debug)]
pub struct DataDir {
    root: PathBuf,
    basename: String,
    records: BTreeMap<NaiveDate, Value>,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>, basename: &str) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self {
            root,
            basename: basename.to_string(),
            records: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Records loaded by the last `read`, plus anything written since.
    pub fn records(&self) -> &BTreeMap<NaiveDate, Value> {
        &self.records
    }

    pub fn date_to_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{}-{:02}.json", self.basename, date.day()))
    }

    /// Inverse of [`date_to_path`](Self::date_to_path). `None` for any path
    /// that is not exactly `<root>/<YYYY>/<MM>/<basename>-<DD>.json`.
    pub fn path_to_date(&self, path: &Path) -> Option<NaiveDate> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel.iter().map(|p| p.to_str()).collect::<Option<_>>()?;
        let [year, month, file] = parts.as_slice() else {
            return None;
        };
        let day = file
            .strip_prefix(self.basename.as_str())?
            .strip_prefix('-')?
            .strip_suffix(".json")?;
        let date =
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?;
        // Only the exact spelling `date_to_path` produces, so "24" or "+2024"
        // never alias a real year.
        let canonical = self.date_to_path(date);
        (canonical.as_path() == path).then_some(date)
    }

    fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for year in read_dir_sorted(&self.root)? {
            if !year.is_dir() {
                continue;
            }
            for month in read_dir_sorted(&year)? {
                if !month.is_dir() {
                    continue;
                }
                files.extend(
                    read_dir_sorted(&month)?
                        .into_iter()
                        .filter(|p| p.extension().is_some_and(|e| e == "json")),
                );
            }
        }
        Ok(files)
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        paths.push(entry.map_err(|e| Error::io(dir, e))?.path());
    }
    paths.sort();
    Ok(paths)
}

impl RecordStore for DataDir {
    fn read(&mut self, since: NaiveDate) -> Result<usize> {
        let mut records = BTreeMap::new();
        for path in self.list_files()? {
            let Some(date) = self.path_to_date(&path) else {
                log::debug!("Ignoring unrecognised file {}", path.display());
                continue;
            };
            if date < since {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let record: Value = match serde_json::from_str(&text) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Skipping unreadable {}: {e}", path.display());
                    continue;
                }
            };
            match record_date(&record) {
                Some(embedded) if embedded != date => log::warn!(
                    "{} claims date {embedded} but is stored under {date}",
                    path.display()
                ),
                None => log::warn!("{} has no embedded date", path.display()),
                _ => {}
            }
            records.insert(date, record);
        }
        log::debug!("Read {} records from {}", records.len(), self.root.display());
        self.records = records;
        Ok(self.records.len())
    }

    fn missing_days(&self, dates: &[NaiveDate]) -> Vec<NaiveDate> {
        dates
            .iter()
            .copied()
            .filter(|d| !self.records.contains_key(d))
            .collect()
    }

    fn write(&mut self, records: &[Value]) -> Result<usize> {
        let mut written = 0;
        for record in records {
            let Some(date) = record_date(record) else {
                log::warn!("Not storing record without a date in {}", self.root.display());
                continue;
            };
            let path = self.date_to_path(date);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            let text = serde_json::to_string_pretty(record)?;
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, text).map_err(|e| Error::io(&tmp, e))?;
            fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
            self.records.insert(date, record.clone());
            written += 1;
        }
        Ok(written)
    }
}
