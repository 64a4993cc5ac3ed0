pub mod session;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::date_util::format_date;
use crate::error::{Error, Result};
use crate::sync::chunk::{chunk_dates, DateRange};
use crate::sync::rate_limit::retry_fixed;
use crate::sync::SyncProgress;
use crate::types::{PuzzleInfo, Variant};
use crate::url::{render_template, vars_from_json};

use session::{Headers, Transport};

/// Result of listing puzzle metadata over a set of dates.
#[derive(Debug, Clone, Default)]
pub struct PuzzleListing {
    pub puzzles: Vec<PuzzleInfo>,
    /// Date windows queried.
    pub windows: usize,
    /// Windows dropped after exhausting their attempts.
    pub skipped: usize,
}

/// Builds requests for the puzzle service and owns the authenticated
/// session plus the resolved user id.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    config: ApiConfig,
    user_id: String,
    info_url: String,
}

impl ApiClient {
    /// Resolve the user id and return a ready client. An unresolvable id is
    /// fatal: the cookie has most likely expired.
    pub async fn connect(config: ApiConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let user_id = fetch_user_id(transport.as_ref(), &config).await?;
        log::info!("Authenticated as user {user_id}");

        let mut vars = BTreeMap::new();
        vars.insert("userId".to_string(), user_id.clone());
        let info_url = render_template(&config.info.url, &vars)?;

        Ok(Self {
            transport,
            config,
            user_id,
            info_url,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn puzzle_headers(&self) -> &Headers {
        &self.config.puzzle.headers
    }

    pub fn stats_headers(&self) -> &Headers {
        &self.config.stats.headers
    }

    pub fn puzzle_url(&self, date: NaiveDate, variant: Variant) -> Result<String> {
        let mut vars = BTreeMap::new();
        vars.insert("type".to_string(), variant.as_str().to_string());
        vars.insert("date-str".to_string(), format_date(date));
        render_template(&self.config.puzzle.url, &vars)
    }

    /// Stats URL for one listed puzzle, filled from the listing's fields.
    pub fn stats_url(&self, info: &PuzzleInfo) -> Result<String> {
        let mut vars = vars_from_json(&info.raw);
        vars.insert("puzzle_id".to_string(), info.puzzle_id.clone());
        render_template(&self.config.stats.url, &vars)
    }

    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    /// Query parameters listing one variant's puzzles within `range`.
    pub fn info_query(&self, range: DateRange, variant: Variant) -> Vec<(String, String)> {
        vec![
            ("publish_type".to_string(), variant.as_str().to_string()),
            ("sort_order".to_string(), "asc".to_string()),
            ("sort_by".to_string(), "print_date".to_string()),
            ("date_start".to_string(), format_date(range.start)),
            ("date_end".to_string(), format_date(range.end)),
        ]
    }

    /// List puzzle metadata for `dates`, one request per window.
    ///
    /// Each window gets several attempts; a window that keeps failing is
    /// logged and skipped so the rest of the run can proceed.
    pub async fn get_puzzle_info(
        &self,
        dates: &[NaiveDate],
        variant: Variant,
        progress: &dyn SyncProgress,
    ) -> PuzzleListing {
        let stage = format!("info:{variant}");
        let chunks = chunk_dates(dates, self.config.info.max_chunk_size);
        let total = chunks.len();

        let mut listing = PuzzleListing {
            windows: total,
            ..Default::default()
        };
        for (i, chunk) in chunks.iter().enumerate() {
            progress.on_chunk(&stage, chunk, i, total);
            let query = self.info_query(*chunk, variant);
            let label = format!(
                "{stage} {} - {}",
                format_date(chunk.start),
                format_date(chunk.end)
            );
            let response: Result<Value> = retry_fixed!(
                label,
                self.transport
                    .get(&self.info_url, &query, &self.config.info.headers)
            );
            match response {
                Ok(body) => listing.puzzles.extend(parse_info_response(&label, body)),
                Err(e) => {
                    log::error!("{label}: giving up after repeated failures: {e}");
                    listing.skipped += 1;
                }
            }
        }
        listing
    }
}

async fn fetch_user_id(transport: &dyn Transport, config: &ApiConfig) -> Result<String> {
    let user = &config.user;
    let response = transport
        .post(&user.url, &user.query, &user.headers)
        .await
        .map_err(|e| Error::Auth(format!("identity lookup failed: {e}")))?;

    response
        .pointer("/data/user/userInfo/regiId")
        .and_then(crate::types::scalar_to_string)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            Error::Auth(
                "unable to get user id; retry or regenerate your cookie file".to_string(),
            )
        })
}

/// Pull the listed puzzles out of a metadata response. Only a response with
/// `"status": "OK"` carries results.
fn parse_info_response(label: &str, body: Value) -> Vec<PuzzleInfo> {
    if body.get("status").and_then(Value::as_str) != Some("OK") {
        log::warn!("{label}: listing returned status {}", body["status"]);
        return Vec::new();
    }
    let Some(Value::Array(results)) = body.get("results").cloned() else {
        return Vec::new();
    };
    results
        .into_iter()
        .filter_map(|raw| match PuzzleInfo::from_value(raw) {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("{label}: skipping malformed entry: {e}");
                None
            }
        })
        .collect()
}
