//! Bounded-concurrency tile fetching.
//!
//! Requests are executed against a [`TileSource`] with at most `concurrency` calls in flight.
//! Each request keeps its `{date, group}` labels from planning through to the resulting
//! [`Frame`]. What happens on a failed request is decided by [`FetchPolicy`]:
//!
//! - `FailFast`: the first failure aborts every in-flight request and no frames are returned
//! - `CollectErrors`: failures are recorded next to the frames that did arrive
//!
//! Network errors, timeouts and 5xx answers are retried with exponential backoff; 4xx answers
//! are final.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use futures::{StreamExt as _, future, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    dates::format_iso_date,
    foundation::error::{AnimatorError, AnimatorResult},
    layers::LayerGroup,
    loading::LoadingFlag,
    plan::TileRequest,
};

/// Anything that can answer a `GET` for a planned tile URL with the body bytes.
///
/// Implementations must map a non-2xx answer to [`AnimatorError::http_status`].
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn get(&self, url: &str) -> AnimatorResult<Bytes>;
}

/// [`TileSource`] backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTileSource {
    client: reqwest::Client,
}

impl HttpTileSource {
    pub fn new(connect_timeout: Duration) -> AnimatorResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(16)
            .tcp_nodelay(true)
            .user_agent(concat!("gibs-animator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnimatorError::Other(anyhow::anyhow!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn get(&self, url: &str) -> AnimatorResult<Bytes> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AnimatorError::fetch(url, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AnimatorError::http_status(url, status.as_u16()));
        }

        resp.bytes()
            .await
            .map_err(|e| AnimatorError::fetch(url, format!("failed to read body: {e}")))
    }
}

/// A fetched tile image, labeled with the month and group it was requested for.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Encoded image bytes as returned by the service (PNG).
    pub image: Bytes,
    pub date: NaiveDate,
    pub group: LayerGroup,
}

impl Frame {
    pub fn date_string(&self) -> String {
        format_iso_date(self.date)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// The first failed request (after retries) aborts the whole fetch.
    #[default]
    FailFast,
    /// Failures are recorded in [`FetchReport::failures`] and fetching continues.
    CollectErrors,
}

/// How requests are scheduled onto the concurrency limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSchedule {
    /// A new request starts as soon as any slot frees up.
    #[default]
    Pool,
    /// Fixed-size batches; batch N+1 starts only after batch N fully settles.
    Batches,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum requests in flight (pool) or batch size (batches).
    pub concurrency: usize,
    pub policy: FetchPolicy,
    pub schedule: FetchSchedule,
    /// Timeout of a single attempt, seconds.
    pub request_timeout_secs: f64,
    /// Extra attempts for network errors, timeouts and 5xx answers.
    pub max_retries: u32,
    /// Delay before the first retry; doubled per retry, capped at 30 s.
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 15,
            policy: FetchPolicy::FailFast,
            schedule: FetchSchedule::Pool,
            request_timeout_secs: 60.0,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> AnimatorResult<()> {
        if self.concurrency == 0 {
            return Err(AnimatorError::validation("fetch concurrency must be >= 1"));
        }
        self.request_timeout()?;
        Ok(())
    }

    /// Per-request timeout; rejects values that are not a positive, representable duration.
    pub fn request_timeout(&self) -> AnimatorResult<Duration> {
        match Duration::try_from_secs_f64(self.request_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(AnimatorError::validation(format!(
                "fetch request_timeout_secs must be a positive duration, got {}",
                self.request_timeout_secs
            ))),
        }
    }
}

#[derive(Debug)]
pub struct FetchFailure {
    pub request: TileRequest,
    pub error: AnimatorError,
}

/// Outcome of [`BatchFetcher::fetch_all`]. `failures` is always empty under `FailFast`.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Frames in request order.
    pub frames: Vec<Frame>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct BatchFetcher {
    source: Arc<dyn TileSource>,
    config: FetchConfig,
    loading: Option<LoadingFlag>,
    cancel: CancellationToken,
}

type Attempt = Result<Frame, (TileRequest, AnimatorError)>;

impl BatchFetcher {
    pub fn new(source: Arc<dyn TileSource>, config: FetchConfig) -> Self {
        Self {
            source,
            config,
            loading: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_loading(mut self, loading: LoadingFlag) -> Self {
        self.loading = Some(loading);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute every request and collect labeled frames in request order.
    ///
    /// The loading flag (if any) is raised before the first request and released after the last
    /// one settles, on success, failure and cancellation alike.
    #[instrument(skip_all, fields(requests = requests.len(), concurrency = self.config.concurrency))]
    pub async fn fetch_all(&self, requests: Vec<TileRequest>) -> AnimatorResult<FetchReport> {
        self.config.validate()?;
        let timeout = self.config.request_timeout()?;
        let _loading = self.loading.as_ref().map(LoadingFlag::raise);

        info!(
            policy = ?self.config.policy,
            schedule = ?self.config.schedule,
            "fetching tiles"
        );

        let report = match self.config.schedule {
            FetchSchedule::Pool => self.run_pool(requests, timeout).await?,
            FetchSchedule::Batches => self.run_batches(requests, timeout).await?,
        };

        info!(
            frames = report.frames.len(),
            failures = report.failures.len(),
            "tile fetch finished"
        );
        Ok(report)
    }

    async fn run_pool(
        &self,
        requests: Vec<TileRequest>,
        timeout: Duration,
    ) -> AnimatorResult<FetchReport> {
        let mut report = FetchReport {
            frames: Vec::with_capacity(requests.len()),
            failures: Vec::new(),
        };
        let mut pending = stream::iter(requests)
            .map(|req| self.fetch_one(req, timeout))
            .buffered(self.config.concurrency);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AnimatorError::Cancelled),
                next = pending.next() => next,
            };
            let Some(attempt) = next else {
                break;
            };
            self.record(&mut report, attempt)?;
        }
        Ok(report)
    }

    async fn run_batches(
        &self,
        requests: Vec<TileRequest>,
        timeout: Duration,
    ) -> AnimatorResult<FetchReport> {
        let mut report = FetchReport {
            frames: Vec::with_capacity(requests.len()),
            failures: Vec::new(),
        };
        let batch_count = requests.len().div_ceil(self.config.concurrency);

        for (idx, batch) in requests.chunks(self.config.concurrency).enumerate() {
            let calls = batch.iter().cloned().map(|req| self.fetch_one(req, timeout));
            let settled = match self.config.policy {
                FetchPolicy::FailFast => {
                    let all = future::try_join_all(calls.map(|f| async move {
                        f.await.map_err(|(_, err)| err)
                    }));
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(AnimatorError::Cancelled),
                        res = all => res?.into_iter().map(Ok).collect::<Vec<Attempt>>(),
                    }
                }
                FetchPolicy::CollectErrors => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(AnimatorError::Cancelled),
                        res = future::join_all(calls) => res,
                    }
                }
            };
            for attempt in settled {
                self.record(&mut report, attempt)?;
            }
            debug!(batch = idx + 1, of = batch_count, "batch settled");
        }
        Ok(report)
    }

    fn record(&self, report: &mut FetchReport, attempt: Attempt) -> AnimatorResult<()> {
        match attempt {
            Ok(frame) => report.frames.push(frame),
            Err((request, error)) => match self.config.policy {
                FetchPolicy::FailFast => {
                    warn!(url = %request.url, error = %error, "tile fetch failed, aborting");
                    return Err(error);
                }
                FetchPolicy::CollectErrors => {
                    warn!(url = %request.url, error = %error, "tile fetch failed, continuing");
                    report.failures.push(FetchFailure { request, error });
                }
            },
        }
        Ok(())
    }

    async fn fetch_one(&self, req: TileRequest, timeout: Duration) -> Attempt {
        let mut delay = Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 0u32;

        loop {
            let res = match tokio::time::timeout(timeout, self.source.get(&req.url)).await {
                Ok(res) => res,
                Err(_) => Err(AnimatorError::fetch(
                    &req.url,
                    format!("timed out after {:.1}s", timeout.as_secs_f64()),
                )),
            };

            match res {
                Ok(image) => {
                    debug!(group = %req.group, date = %req.date, bytes = image.len(), "tile fetched");
                    return Ok(Frame {
                        image,
                        date: req.date,
                        group: req.group,
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        url = %req.url,
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying tile fetch"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
                Err(err) => return Err((req, err)),
            }
        }
    }
}
