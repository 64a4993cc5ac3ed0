use chrono::{Duration, NaiveDate};

/// A date range [start, end] inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Break a set of possibly non-contiguous dates into windows of at most
/// `max_window` days. Each window covers only dates that were asked for, and
/// windows come back in ascending order.
pub fn chunk_dates(dates: &[NaiveDate], max_window: usize) -> Vec<DateRange> {
    let max_window = max_window.max(1);

    let mut sorted = dates.to_vec();
    sorted.sort();
    sorted.dedup();

    split_into_runs(&sorted)
        .into_iter()
        .flat_map(|run| split_run(run, max_window))
        .collect()
}

/// Coalesce sorted, deduplicated dates into maximal runs of consecutive days.
fn split_into_runs(dates: &[NaiveDate]) -> Vec<&[NaiveDate]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..dates.len() {
        if dates[i] - dates[i - 1] != Duration::days(1) {
            runs.push(&dates[start..i]);
            start = i;
        }
    }
    if start < dates.len() {
        runs.push(&dates[start..]);
    }
    runs
}

fn split_run(run: &[NaiveDate], max_window: usize) -> Vec<DateRange> {
    run.chunks(max_window)
        .filter_map(|c| {
            Some(DateRange {
                start: *c.first()?,
                end: *c.last()?,
            })
        })
        .collect()
}
