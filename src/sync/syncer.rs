use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde_json::Value;

use crate::api::ApiClient;
use crate::date_util::date_range;
use crate::error::{Error, Result};
use crate::storage::Store;
use crate::sync::fetcher::Fetcher;
use crate::sync::{SyncOptions, SyncProgress, SyncReport};
use crate::types::{DataKind, PuzzleInfo, Variant};

/// Run one incremental sync: puzzles first, then stats, one report per
/// (stage, variant).
///
/// Per-item failures are counted in the reports and leave their dates
/// missing for the next run. Only store I/O errors and a stats/metadata
/// misalignment abort the run.
pub async fn sync(
    store: &mut Store,
    client: &ApiClient,
    fetcher: &Fetcher,
    options: &SyncOptions,
    progress: &dyn SyncProgress,
) -> Result<Vec<SyncReport>> {
    store.read(options.begin)?;
    let dates = date_range(options.begin, options.end);
    log::info!(
        "Syncing {} days ({} through {})",
        dates.len(),
        options.begin,
        options.end
    );

    let mut reports = Vec::new();
    if options.puzzles {
        for &variant in &options.variants {
            let report = sync_puzzles(store, client, fetcher, variant, &dates, progress).await?;
            progress.on_stage_complete(&report);
            reports.push(report);
        }
    }

    let stat_kinds: Vec<DataKind> = options
        .stat_kinds
        .iter()
        .copied()
        .filter(|k| k.is_stat())
        .collect();
    if !stat_kinds.is_empty() {
        for &variant in &options.variants {
            let report =
                sync_stats(store, client, fetcher, variant, &stat_kinds, &dates, progress).await?;
            progress.on_stage_complete(&report);
            reports.push(report);
        }
    }
    Ok(reports)
}

/// Fetch and store the puzzle body for every missing date.
async fn sync_puzzles(
    store: &mut Store,
    client: &ApiClient,
    fetcher: &Fetcher,
    variant: Variant,
    dates: &[NaiveDate],
    progress: &dyn SyncProgress,
) -> Result<SyncReport> {
    let stage = format!("puzzle:{variant}");
    let missing = store.missing_days(DataKind::Puzzle, variant, dates)?;
    progress.on_stage_start(&stage, missing.len());
    log::info!("{stage}: {} puzzles to fetch", missing.len());

    let urls = missing
        .iter()
        .map(|&date| client.puzzle_url(date, variant))
        .collect::<Result<Vec<_>>>()?;
    let responses = fetcher
        .fetch(&stage, urls, client.puzzle_headers(), progress)
        .await;

    let total = responses.len();
    let bodies: Vec<Value> = responses.into_iter().filter_map(|r| r.ok()).collect();
    let written = store.write(&[DataKind::Puzzle], variant, &bodies)?;
    let failed = total - written;
    if failed > 0 {
        log::warn!("{stage}: {failed} of {total} puzzles not stored; they will be retried next run");
    }
    Ok(SyncReport::from_counts(stage, written as u64, failed as u64, 0, 0))
}

/// Fetch and store stats for every date some requested stat kind is
/// missing.
///
/// Metadata is listed first. Only solved puzzles have stats worth fetching;
/// unsolved ones still get a ledger row so the ledger covers every listed
/// date, but since that row has no solve time the date stays missing and is
/// listed again next run.
async fn sync_stats(
    store: &mut Store,
    client: &ApiClient,
    fetcher: &Fetcher,
    variant: Variant,
    stat_kinds: &[DataKind],
    dates: &[NaiveDate],
    progress: &dyn SyncProgress,
) -> Result<SyncReport> {
    let stage = format!("stats:{variant}");

    let mut missing = BTreeSet::new();
    for &kind in stat_kinds {
        missing.extend(store.missing_days(kind, variant, dates)?);
    }
    let missing: Vec<NaiveDate> = missing.into_iter().collect();
    progress.on_stage_start(&stage, missing.len());
    if missing.is_empty() {
        log::info!("{stage}: up to date");
        return Ok(SyncReport::from_counts(stage, 0, 0, 0, 0));
    }

    let listing = client.get_puzzle_info(&missing, variant, progress).await;
    let (solved, unsolved): (Vec<PuzzleInfo>, Vec<PuzzleInfo>) =
        listing.puzzles.into_iter().partition(|p| p.solved);
    log::info!(
        "{stage}: {} missing days listed {} solved and {} unsolved puzzles",
        missing.len(),
        solved.len(),
        unsolved.len()
    );

    let urls = solved
        .iter()
        .map(|info| client.stats_url(info))
        .collect::<Result<Vec<_>>>()?;
    let responses = fetcher
        .fetch(&stage, urls, client.stats_headers(), progress)
        .await;
    if responses.len() != solved.len() {
        return Err(Error::Misaligned {
            expected: solved.len(),
            actual: responses.len(),
        });
    }

    let mut joined = Vec::with_capacity(solved.len());
    let mut failed = 0u64;
    for (info, response) in solved.iter().zip(responses) {
        match response {
            Ok(stats) => joined.push(info.join(stats)),
            Err(_) => failed += 1,
        }
    }

    for &kind in stat_kinds {
        match kind {
            DataKind::Stats => {
                let mut rows = joined.clone();
                rows.extend(unsolved.iter().map(|info| info.raw.clone()));
                store.write(&[kind], variant, &rows)?;
            }
            _ => {
                store.write(&[kind], variant, &joined)?;
            }
        }
    }
    if failed > 0 {
        log::warn!("{stage}: {failed} stats fetches failed; they will be retried next run");
    }

    let windows = listing.windows as u32;
    let skipped = listing.skipped as u32;
    Ok(SyncReport::from_counts(
        stage,
        joined.len() as u64,
        failed,
        windows - skipped,
        windows,
    ))
}
