//! Sync pipeline orchestration: plan years, fetch, extract, merge, persist.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use loto6_adapters::{ohtashp_adapter, SourceAdapter};
use loto6_core::DrawRecord;
use loto6_storage::{
    BackoffPolicy, FetchClient, HttpClientConfig, HttpFetcher, PageSource, StoreFile, YearPage,
    YearUrls, DEFAULT_BASE_URL, DEFAULT_USER_AGENT,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_STORE_PATH: &str = "loto6_data.js";
/// First year scanned on a full rebuild.
pub const DEFAULT_EPOCH_YEAR: i32 = 2000;

/// How the caller wants the start year chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanRequest {
    /// Incremental from the newest stored record, full rescan if there is none.
    #[default]
    Auto,
    Full,
    FromYear(i32),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub store_path: PathBuf,
    pub base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub max_attempts: usize,
    pub retry_delay: Duration,
    /// Pause between consecutive year fetches.
    pub year_delay: Duration,
    pub epoch_year: i32,
    pub plan: PlanRequest,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 15,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            year_delay: Duration::from_secs(1),
            epoch_year: DEFAULT_EPOCH_YEAR,
            plan: PlanRequest::Auto,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_path: std::env::var("LOTO6_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            base_url: std::env::var("LOTO6_BASE_URL").unwrap_or(defaults.base_url),
            user_agent: std::env::var("LOTO6_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parse("LOTO6_HTTP_TIMEOUT_SECS")
                .unwrap_or(defaults.http_timeout_secs),
            max_attempts: env_parse("LOTO6_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            retry_delay: env_parse("LOTO6_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            year_delay: env_parse("LOTO6_YEAR_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.year_delay),
            epoch_year: env_parse("LOTO6_EPOCH_YEAR").unwrap_or(defaults.epoch_year),
            plan: PlanRequest::Auto,
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            backoff: self.backoff(),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::fixed(self.max_attempts, self.retry_delay)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanMode {
    /// Starts at the year of the newest stored record.
    Incremental,
    /// Starts at the epoch year.
    Full,
    /// Starts at a caller-chosen year.
    Pinned,
}

/// Inclusive range of calendar years to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearPlan {
    pub start: i32,
    pub end: i32,
    pub mode: PlanMode,
}

impl YearPlan {
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        self.end
            .checked_sub(self.start)
            .and_then(|span| usize::try_from(span).ok())
            .map_or(0, |span| span + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Incremental when the newest record has a parseable year, otherwise a full rescan.
pub fn plan_years(existing: &[DrawRecord], current_year: i32, epoch_year: i32) -> YearPlan {
    let newest_year = existing
        .iter()
        .max_by_key(|r| r.round)
        .and_then(DrawRecord::year);
    let (start, mode) = match newest_year {
        Some(year) => (year, PlanMode::Incremental),
        None => (epoch_year, PlanMode::Full),
    };
    YearPlan {
        start: start.min(current_year),
        end: current_year,
        mode,
    }
}

pub fn plan_for_request(
    request: PlanRequest,
    existing: &[DrawRecord],
    current_year: i32,
    epoch_year: i32,
) -> YearPlan {
    match request {
        PlanRequest::Auto => plan_years(existing, current_year, epoch_year),
        PlanRequest::Full => plan_years(&[], current_year, epoch_year),
        // Nothing is published before the epoch.
        PlanRequest::FromYear(year) => YearPlan {
            start: year.max(epoch_year).min(current_year),
            end: current_year,
            mode: PlanMode::Pinned,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Unique by round, newest first.
    pub records: Vec<DrawRecord>,
    pub added: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

/// Overlays `fetched` onto `existing` by round. Fetched records always win.
pub fn merge_records(existing: Vec<DrawRecord>, fetched: Vec<DrawRecord>) -> MergeOutcome {
    let mut by_round: BTreeMap<u32, DrawRecord> =
        existing.into_iter().map(|r| (r.round, r)).collect();
    let (mut added, mut replaced, mut unchanged) = (0, 0, 0);

    for record in fetched {
        let round = record.round;
        match by_round.insert(round, record) {
            None => added += 1,
            Some(previous) if by_round.get(&round) == Some(&previous) => unchanged += 1,
            Some(_) => replaced += 1,
        }
    }

    MergeOutcome {
        records: by_round.into_values().rev().collect(),
        added,
        replaced,
        unchanged,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum YearStatus {
    Parsed {
        records: usize,
        rejected_rows: usize,
        attempts: usize,
    },
    NotFound,
    Failed {
        attempts: usize,
        error: String,
    },
    ParseFailed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearOutcome {
    pub year: i32,
    pub url: String,
    #[serde(flatten)]
    pub status: YearStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub existing_records: usize,
    pub plan: YearPlan,
    pub years: Vec<YearOutcome>,
    pub fetched_records: usize,
    pub added: usize,
    pub replaced: usize,
    pub total_records: usize,
    pub newest: Option<DrawRecord>,
    pub store_path: String,
    pub content_hash: String,
}

impl SyncRunSummary {
    pub fn failed_years(&self) -> Vec<i32> {
        self.years
            .iter()
            .filter(|y| {
                matches!(
                    y.status,
                    YearStatus::Failed { .. } | YearStatus::ParseFailed { .. }
                )
            })
            .map(|y| y.year)
            .collect()
    }
}

pub struct SyncPipeline<S> {
    config: SyncConfig,
    store: StoreFile,
    fetch: FetchClient<S>,
    adapter: Box<dyn SourceAdapter>,
}

impl SyncPipeline<HttpFetcher> {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(&config.http_client_config())?;
        Ok(Self::with_source(config, http))
    }
}

impl<S: PageSource> SyncPipeline<S> {
    pub fn with_source(config: SyncConfig, source: S) -> Self {
        let fetch = FetchClient::new(source, YearUrls::new(config.base_url.clone()), config.backoff());
        Self {
            store: StoreFile::new(config.store_path.clone()),
            fetch,
            adapter: Box::new(ohtashp_adapter()),
            config,
        }
    }

    pub fn fetch_client(&self) -> &FetchClient<S> {
        &self.fetch
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        self.run_for_year(Local::now().year()).await
    }

    /// One full run with `current_year` as the end of the plan.
    ///
    /// Only the final store write can fail the run.
    pub async fn run_for_year(&self, current_year: i32) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let existing = self.load_existing().await;
        let existing_records = existing.len();
        let plan = plan_for_request(
            self.config.plan,
            &existing,
            current_year,
            self.config.epoch_year,
        );
        match plan.mode {
            PlanMode::Incremental => info!(start = plan.start, "incremental update"),
            PlanMode::Full => info!(start = plan.start, "full rescan"),
            PlanMode::Pinned => info!(start = plan.start, "start year pinned"),
        }
        info!(
            %run_id,
            source = self.adapter.source_id(),
            start = plan.start,
            end = plan.end,
            "starting scrape"
        );

        let mut fetched = Vec::new();
        let mut years = Vec::with_capacity(plan.len());
        for (idx, year) in plan.years().enumerate() {
            if idx > 0 && !self.config.year_delay.is_zero() {
                tokio::time::sleep(self.config.year_delay).await;
            }
            years.push(self.fetch_year(year, current_year, &mut fetched).await);
        }

        let fetched_records = fetched.len();
        let merged = merge_records(existing, fetched);
        info!(
            total = merged.records.len(),
            added = merged.added,
            replaced = merged.replaced,
            "merged records"
        );

        let stored = self
            .store
            .write(&merged.records)
            .await
            .with_context(|| format!("saving {}", self.store.path().display()))?;

        let newest = merged.records.first().cloned();
        if let Some(latest) = &newest {
            info!(round = latest.round, date = %latest.date, "latest draw");
        }
        info!(path = %stored.path.display(), bytes = stored.byte_size, "saved store");

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            existing_records,
            plan,
            years,
            fetched_records,
            added: merged.added,
            replaced: merged.replaced,
            total_records: merged.records.len(),
            newest,
            store_path: stored.path.display().to_string(),
            content_hash: stored.content_hash,
        })
    }

    async fn load_existing(&self) -> Vec<DrawRecord> {
        match self.store.load().await {
            Ok(Some(records)) => {
                info!(count = records.len(), "loaded existing records");
                records
            }
            Ok(None) => {
                info!(path = %self.store.path().display(), "no existing store, starting empty");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "existing store unreadable, starting empty");
                Vec::new()
            }
        }
    }

    async fn fetch_year(
        &self,
        year: i32,
        current_year: i32,
        fetched: &mut Vec<DrawRecord>,
    ) -> YearOutcome {
        info!(year, "fetching year");
        let page = self.fetch.fetch_year(year, current_year).await;
        let url = page.url().to_string();

        let status = match page {
            YearPage::Found { page, attempts, .. } => match self.adapter.parse_page(&page.text) {
                Ok(extraction) => {
                    info!(
                        year,
                        records = extraction.records.len(),
                        rejected = extraction.rejected.len(),
                        duplicates = extraction.duplicates,
                        "parsed records"
                    );
                    let status = YearStatus::Parsed {
                        records: extraction.records.len(),
                        rejected_rows: extraction.rejected.len(),
                        attempts,
                    };
                    fetched.extend(extraction.records);
                    status
                }
                Err(err) => {
                    warn!(year, error = %err, "page could not be parsed");
                    YearStatus::ParseFailed {
                        error: err.to_string(),
                    }
                }
            },
            YearPage::NotFound { .. } => YearStatus::NotFound,
            YearPage::Exhausted {
                attempts,
                last_error,
                ..
            } => {
                warn!(year, attempts, error = %last_error, "year failed, continuing");
                YearStatus::Failed {
                    attempts,
                    error: last_error,
                }
            }
        };

        YearOutcome { year, url, status }
    }
}

pub async fn run_sync_once(config: SyncConfig) -> Result<SyncRunSummary> {
    let pipeline = SyncPipeline::new(config)?;
    pipeline.run_once().await
}

/// Reads the store for read-only consumers. A missing file is an empty history.
pub async fn load_history(store_path: impl Into<PathBuf>) -> Result<Vec<DrawRecord>> {
    let store = StoreFile::new(store_path);
    let records = store
        .load()
        .await
        .with_context(|| format!("loading {}", store.path().display()))?;
    Ok(records.unwrap_or_default())
}
