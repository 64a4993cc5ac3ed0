pub mod api;
pub mod config;
pub mod date_util;
pub mod error;
pub mod storage;
pub mod sync;
pub mod types;
pub mod url;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use api::session::{Headers, HttpSession, Transport};
pub use api::{ApiClient, PuzzleListing};
pub use config::ApiConfig;
pub use error::{Error, Result};
pub use storage::{RecordStore, Store};
pub use sync::chunk::{chunk_dates, DateRange};
pub use sync::fetcher::Fetcher;
pub use sync::{NoopProgress, SyncOptions, SyncProgress, SyncReport, SyncStatus};
pub use types::{DataKind, PuzzleInfo, Variant};

/// Main entry point: an authenticated client plus the shared fetcher.
pub struct XwordSync {
    client: ApiClient,
    fetcher: Fetcher,
}

impl XwordSync {
    /// Authenticate over `transport`. Fails if the user id cannot be
    /// resolved.
    pub async fn connect(config: ApiConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let fetcher = Fetcher::new(
            Arc::clone(&transport),
            config.general.threads,
            config.general.qps,
        );
        let client = ApiClient::connect(config, transport).await?;
        Ok(Self { client, fetcher })
    }

    /// Load the config and cookie files and authenticate over HTTP.
    pub async fn from_files(
        config_path: impl AsRef<Path>,
        cookie_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let config = ApiConfig::load(config_path)?;
        let timeout = Duration::from_secs(config.general.timeout_secs);
        let session = HttpSession::from_cookie_file(cookie_path, timeout)?;
        Self::connect(config, Arc::new(session)).await
    }

    pub fn user_id(&self) -> &str {
        self.client.user_id()
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Bring the data directory up to date for `options`.
    pub async fn sync(
        &self,
        data_dir: impl AsRef<Path>,
        options: &SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<Vec<SyncReport>> {
        if options.variants.is_empty() {
            return Err(Error::Config("no puzzle variant selected".into()));
        }
        let kinds = options.kinds();
        if kinds.is_empty() {
            return Err(Error::Config("no data kind selected".into()));
        }
        let mut store = Store::open(data_dir, self.client.user_id(), &kinds, &options.variants)?;
        sync::syncer::sync(&mut store, &self.client, &self.fetcher, options, progress).await
    }
}
