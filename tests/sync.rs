use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};

use xwordsync::date_util::{date_range, format_date, parse_date};
use xwordsync::{
    ApiConfig, DataKind, Error, Headers, NoopProgress, Result, SyncOptions, SyncStatus, Transport,
    Variant, XwordSync,
};

const CONFIG: &str = r#"
general:
  threads: 4
  qps: 50
user:
  url: https://api.test/svc/graphql
  query:
    operationName: Me
puzzle:
  url: https://api.test/puzzle/{type}/{date-str}.json
info:
  url: https://api.test/users/{userId}/puzzles.json
  max-chunk-size: 100
stats:
  url: https://api.test/game/{puzzle_id}.json
"#;

/// In-memory stand-in for the puzzle service. Days 1-3 of any month are
/// solved, later days are not. Puzzle ids are `1000 + day of year`.
#[derive(Default)]
struct FakeService {
    reject_auth: bool,
    /// Every puzzle request fails.
    puzzles_down: bool,
    stats_calls: AtomicUsize,
    info_calls: AtomicUsize,
    puzzle_calls: AtomicUsize,
    /// Puzzle ids whose next stats request fails.
    fail_once: Mutex<HashSet<u32>>,
}

fn puzzle_id(date: NaiveDate) -> u32 {
    1000 + date.ordinal()
}

fn query_date(query: &[(String, String)], key: &str) -> NaiveDate {
    let value = &query.iter().find(|(k, _)| k == key).unwrap().1;
    parse_date(value).unwrap()
}

#[async_trait]
impl Transport for FakeService {
    async fn get(&self, url: &str, query: &[(String, String)], _h: &Headers) -> Result<Value> {
        if url == "https://api.test/users/42/puzzles.json" {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(query.iter().find(|(k, _)| k == "publish_type").unwrap().1, "daily");
            let start = query_date(query, "date_start");
            let end = query_date(query, "date_end");
            let results: Vec<Value> = date_range(start, end)
                .into_iter()
                .map(|d| {
                    json!({
                        "puzzle_id": puzzle_id(d),
                        "print_date": format_date(d),
                        "solved": d.day() <= 3,
                    })
                })
                .collect();
            return Ok(json!({"status": "OK", "results": results}));
        }

        if let Some(rest) = url.strip_prefix("https://api.test/puzzle/daily/") {
            self.puzzle_calls.fetch_add(1, Ordering::SeqCst);
            if self.puzzles_down {
                return Err(Error::Http {
                    status: 503,
                    url: url.to_string(),
                });
            }
            let date = rest.trim_end_matches(".json");
            return Ok(json!({"publicationDate": date, "body": [{"cells": []}]}));
        }

        if let Some(rest) = url.strip_prefix("https://api.test/game/") {
            self.stats_calls.fetch_add(1, Ordering::SeqCst);
            let id: u32 = rest.trim_end_matches(".json").parse().unwrap();
            if self.fail_once.lock().unwrap().remove(&id) {
                return Err(Error::Http {
                    status: 502,
                    url: url.to_string(),
                });
            }
            let mut firsts = json!({"opened": 1_704_000_000 + id, "solved": 1_704_000_600 + id});
            if id % 2 == 0 {
                firsts["checked"] = json!(1_704_000_100 + id);
            }
            return Ok(json!({
                "puzzle_id": id,
                "calcs": {"solved": true, "secondsSpentSolving": 600},
                "firsts": firsts
            }));
        }

        Err(Error::Http {
            status: 404,
            url: url.to_string(),
        })
    }

    async fn post(&self, _url: &str, _body: &Value, _h: &Headers) -> Result<Value> {
        if self.reject_auth {
            return Err(Error::Http {
                status: 403,
                url: "https://api.test/svc/graphql".into(),
            });
        }
        Ok(json!({"data": {"user": {"userInfo": {"regiId": "42"}}}}))
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn options() -> SyncOptions {
    SyncOptions {
        begin: d(2024, 1, 1),
        end: d(2024, 1, 5),
        variants: vec![Variant::Daily],
        puzzles: true,
        stat_kinds: vec![DataKind::Stats],
    }
}

async fn connect(service: Arc<FakeService>) -> XwordSync {
    let config = ApiConfig::from_yaml(CONFIG).unwrap();
    XwordSync::connect(config, service).await.unwrap()
}

fn ledger_lines(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("42/stats/daily.csv"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_first_sync_into_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    let app = connect(service.clone()).await;
    assert_eq!(app.user_id(), "42");

    let reports = app.sync(dir.path(), &options(), &NoopProgress).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.status == SyncStatus::Success));

    for day in 1..=5 {
        let path = dir.path().join(format!("puzzles/daily/2024/01/puzzle-{day:02}.json"));
        assert!(path.is_file(), "missing {}", path.display());
    }
    assert_eq!(service.puzzle_calls.load(Ordering::SeqCst), 5);
    assert_eq!(service.info_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.stats_calls.load(Ordering::SeqCst), 3);

    let lines = ledger_lines(dir.path());
    assert_eq!(
        lines[0],
        "date,puzzle_id,weekday,solve_time_secs,opened_unix,solved_unix,cheated"
    );
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[1], "2024-01-01,1001,Mon,600,1704001001,1704001601,false");
    assert_eq!(lines[2], "2024-01-02,1002,Tue,600,1704001002,1704001602,true");
    assert_eq!(lines[3], "2024-01-03,1003,Wed,600,1704001003,1704001603,false");
    assert_eq!(lines[4], "2024-01-04,1004,Thu,,,,false");
    assert_eq!(lines[5], "2024-01-05,1005,Fri,,,,false");
}

#[tokio::test]
async fn test_rerun_only_revisits_unsolved_days() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    let app = connect(service.clone()).await;
    app.sync(dir.path(), &options(), &NoopProgress).await.unwrap();
    let first = ledger_lines(dir.path());

    let reports = app.sync(dir.path(), &options(), &NoopProgress).await.unwrap();
    assert_eq!(reports[0].items_synced, 0);
    assert_eq!(service.puzzle_calls.load(Ordering::SeqCst), 5);
    // Days 4-5 have no solve time, so they are listed again but still
    // never reach the stats endpoint.
    assert_eq!(service.info_calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.stats_calls.load(Ordering::SeqCst), 3);
    assert_eq!(ledger_lines(dir.path()), first);
}

#[tokio::test]
async fn test_failed_stats_fetch_is_retried_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    service.fail_once.lock().unwrap().insert(puzzle_id(d(2024, 1, 2)));
    let app = connect(service.clone()).await;

    let mut options = options();
    options.stat_kinds = vec![DataKind::Stats, DataKind::FullStats];
    let reports = app.sync(dir.path(), &options, &NoopProgress).await.unwrap();
    let stats = &reports[1];
    assert_eq!(stats.stage, "stats:daily");
    assert_eq!(stats.status, SyncStatus::PartialFailure);
    assert_eq!(stats.items_synced, 2);
    assert_eq!(stats.items_failed, 1);

    let full = dir.path().join("42/full_stats/daily/2024/01");
    assert!(full.join("stats-01.json").is_file());
    assert!(!full.join("stats-02.json").exists());
    assert!(!full.join("stats-04.json").exists());
    assert_eq!(ledger_lines(dir.path()).len(), 5);

    let reports = app.sync(dir.path(), &options, &NoopProgress).await.unwrap();
    assert_eq!(reports[1].status, SyncStatus::Success);
    assert_eq!(reports[1].items_synced, 1);
    assert!(full.join("stats-02.json").is_file());

    let joined: Value =
        serde_json::from_str(&std::fs::read_to_string(full.join("stats-02.json")).unwrap()).unwrap();
    assert_eq!(joined["print_date"], "2024-01-02");
    assert_eq!(joined["puzzle_id"], 1002);
    assert_eq!(joined["calcs"]["secondsSpentSolving"], 600);

    let lines = ledger_lines(dir.path());
    assert_eq!(lines.len(), 6);
    assert!(lines[2].starts_with("2024-01-02,1002,Tue,600,"));
}

#[tokio::test]
async fn test_puzzle_stage_fails_when_nothing_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService {
        puzzles_down: true,
        ..Default::default()
    });
    let app = connect(service.clone()).await;

    let mut options = options();
    options.stat_kinds = vec![];
    let reports = app.sync(dir.path(), &options, &NoopProgress).await.unwrap();
    assert_eq!(reports[0].status, SyncStatus::Failed);
    assert_eq!(reports[0].items_synced, 0);
    assert_eq!(reports[0].items_failed, 5);
    assert_eq!(reports[0].error.as_deref(), Some("5 items failed"));
}

#[tokio::test]
async fn test_begin_date_limits_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    let app = connect(service.clone()).await;

    let mut options = options();
    options.begin = d(2024, 1, 4);
    options.stat_kinds = vec![];
    app.sync(dir.path(), &options, &NoopProgress).await.unwrap();
    assert_eq!(service.puzzle_calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.info_calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("puzzles/daily/2024/01/puzzle-03.json").exists());
}

#[tokio::test]
async fn test_auth_failure_is_fatal() {
    let service = Arc::new(FakeService {
        reject_auth: true,
        ..Default::default()
    });
    let config = ApiConfig::from_yaml(CONFIG).unwrap();
    let err = XwordSync::connect(config, service.clone()).await.err().unwrap();
    assert!(matches!(err, Error::Auth(_)));
    assert_eq!(service.info_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_requires_a_selection() {
    let dir = tempfile::tempdir().unwrap();
    let app = connect(Arc::new(FakeService::default())).await;

    let mut options = options();
    options.variants.clear();
    assert!(app.sync(dir.path(), &options, &NoopProgress).await.is_err());

    let mut options = self::options();
    options.puzzles = false;
    options.stat_kinds.clear();
    assert!(app.sync(dir.path(), &options, &NoopProgress).await.is_err());
}
