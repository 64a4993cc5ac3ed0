//! Local persistence for synced data.
//!
//! Every (data kind, variant) pair gets its own [`RecordStore`]:
//!
//! ```text
//! <data>/
//! ├── puzzles/<variant>/YYYY/MM/puzzle-DD.json       # DataKind::Puzzle
//! └── <user id>/
//!     ├── full_stats/<variant>/YYYY/MM/stats-DD.json # DataKind::FullStats
//!     └── stats/<variant>.csv                        # DataKind::Stats
//! ```
//!
//! The files are the source of truth. Each store keeps an in-memory copy of
//! what it last read so `missing_days` needs no disk access.

pub mod datadir;
pub mod ledger;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{DataKind, Variant};

pub use datadir::DataDir;
pub use ledger::{LedgerRow, StatsLedger};

/// Date-keyed storage with merge-on-write semantics.
pub trait RecordStore: Send {
    /// Reload from disk, keeping records dated on or after `since`.
    /// Returns the number of records held.
    fn read(&mut self, since: NaiveDate) -> Result<usize>;

    /// The subset of `dates` this store has nothing useful for.
    fn missing_days(&self, dates: &[NaiveDate]) -> Vec<NaiveDate>;

    /// Persist records, replacing only the dates they carry. Returns the
    /// number of records stored.
    fn write(&mut self, records: &[Value]) -> Result<usize>;
}

/// All record stores for one sync run.
pub struct Store {
    dir: PathBuf,
    stores: BTreeMap<(DataKind, Variant), Box<dyn RecordStore>>,
}

impl Store {
    /// Open stores for every requested kind and variant under `dir`, creating
    /// directories as needed.
    pub fn open(
        dir: impl AsRef<Path>,
        user_id: &str,
        kinds: &[DataKind],
        variants: &[Variant],
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let mut stores: BTreeMap<(DataKind, Variant), Box<dyn RecordStore>> = BTreeMap::new();
        for &kind in kinds {
            for &variant in variants {
                let store: Box<dyn RecordStore> = match kind {
                    DataKind::Puzzle => Box::new(DataDir::new(
                        dir.join("puzzles").join(variant.as_str()),
                        "puzzle",
                    )?),
                    DataKind::FullStats => Box::new(DataDir::new(
                        dir.join(user_id).join("full_stats").join(variant.as_str()),
                        "stats",
                    )?),
                    DataKind::Stats => Box::new(StatsLedger::new(
                        dir.join(user_id)
                            .join("stats")
                            .join(format!("{}.csv", variant.as_str())),
                    )?),
                };
                stores.insert((kind, variant), store);
            }
        }
        Ok(Self { dir, stores })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every store from `since` onwards.
    pub fn read(&mut self, since: NaiveDate) -> Result<()> {
        for ((kind, variant), store) in self.stores.iter_mut() {
            let n = store.read(since)?;
            log::info!("Loaded {n} existing {kind} records for {variant}");
        }
        Ok(())
    }

    pub fn missing_days(
        &self,
        kind: DataKind,
        variant: Variant,
        dates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>> {
        Ok(self.get(kind, variant)?.missing_days(dates))
    }

    /// Write `records` to the store for each of `kinds`. Returns the total
    /// stored across all of them.
    pub fn write(&mut self, kinds: &[DataKind], variant: Variant, records: &[Value]) -> Result<usize> {
        let mut total = 0;
        for &kind in kinds {
            let store = self
                .stores
                .get_mut(&(kind, variant))
                .ok_or_else(|| not_open(kind, variant))?;
            let written = store.write(records)?;
            log::debug!("Stored {written} {kind} records for {variant}");
            total += written;
        }
        Ok(total)
    }

    fn get(&self, kind: DataKind, variant: Variant) -> Result<&dyn RecordStore> {
        self.stores
            .get(&(kind, variant))
            .map(|s| s.as_ref())
            .ok_or_else(|| not_open(kind, variant))
    }
}

fn not_open(kind: DataKind, variant: Variant) -> Error {
    Error::Config(format!("no {kind} store open for {variant}"))
}
