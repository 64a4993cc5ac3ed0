use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::api::session::{Headers, Transport};
use crate::error::{Error, Result};
use crate::sync::rate_limit::RateLimiter;
use crate::sync::SyncProgress;

/// Bounded-concurrency GET executor.
///
/// At most `threads` requests are in flight at once, and at most `qps` are
/// dispatched in any one-second window. Failures are returned per item and
/// never retried here.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    slots: Arc<Semaphore>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, threads: usize, qps: usize) -> Self {
        let threads = threads.max(1);
        Self {
            transport,
            limiter: Arc::new(RateLimiter::new(qps)),
            slots: Arc::new(Semaphore::new(threads)),
        }
    }

    /// GET every URL and return the decoded bodies. `results[i]` always
    /// belongs to `urls[i]`, whatever order the responses arrive in.
    pub async fn fetch(
        &self,
        stage: &str,
        urls: Vec<String>,
        headers: &Headers,
        progress: &dyn SyncProgress,
    ) -> Vec<Result<Value>> {
        let total = urls.len();
        let headers = Arc::new(headers.clone());

        let handles: Vec<_> = urls
            .into_iter()
            .map(|url| {
                let transport = Arc::clone(&self.transport);
                let limiter = Arc::clone(&self.limiter);
                let slots = Arc::clone(&self.slots);
                let headers = Arc::clone(&headers);
                tokio::spawn(async move {
                    let _permit = match slots.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return Err(Error::Other(e.to_string())),
                    };
                    limiter.acquire().await;
                    log::trace!("GET {url}");
                    transport.get(&url, &[], &headers).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        for (i, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) => Err(Error::Other(format!("fetch task failed: {e}"))),
            };
            if let Err(ref e) = result {
                log::warn!("{stage}: request {} of {total} failed: {e}", i + 1);
            }
            progress.on_fetch_progress(stage, i + 1, total);
            results.push(result);
        }
        results
    }
}
