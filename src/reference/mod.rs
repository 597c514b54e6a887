//! Reference data bundle: the four tables a session reasons over
//!
//! Loading is all-or-nothing. Each source is fetched and parsed independently (and
//! concurrently); the first failure fails the whole load and no partial bundle is
//! returned. A loaded bundle is never mutated, only replaced.

pub mod snapshot;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::error::{Result, WarRoomError};
use crate::ingest::{Record, TabularIngestor};

pub use snapshot::{MetricComparison, PerformanceSnapshot, competitive_context};

/// Where one table is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Path(PathBuf),
    Url(String),
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            SourceLocation::Url(raw.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(raw))
        }
    }

    async fn fetch(&self, client: &reqwest::Client) -> std::result::Result<String, String> {
        match self {
            SourceLocation::Path(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("read {}: {}", path.display(), e)),
            SourceLocation::Url(url) => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| format!("GET {}: {}", url, e))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(format!("GET {} returned {}", url, status));
                }
                resp.text()
                    .await
                    .map_err(|e| format!("read body of {}: {}", url, e))
            }
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Path(p) => write!(f, "{}", p.display()),
            SourceLocation::Url(u) => f.write_str(u),
        }
    }
}

/// Locations of the four reference tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSources {
    pub target_metrics: SourceLocation,
    pub peer_metrics: SourceLocation,
    pub analyst_ratings: SourceLocation,
    pub peer_news: SourceLocation,
}

impl DataSources {
    pub fn from_dir(dir: &Path, cfg: &DataConfig) -> Self {
        Self {
            target_metrics: SourceLocation::Path(dir.join(&cfg.target_metrics_file)),
            peer_metrics: SourceLocation::Path(dir.join(&cfg.peer_metrics_file)),
            analyst_ratings: SourceLocation::Path(dir.join(&cfg.analyst_ratings_file)),
            peer_news: SourceLocation::Path(dir.join(&cfg.peer_news_file)),
        }
    }

    /// Resolve the data directory: explicit `data_dir`, else the first existing
    /// search path, else the first search path (the load will then report what is missing).
    pub fn discover(cfg: &DataConfig) -> Self {
        if let Some(dir) = &cfg.data_dir {
            return Self::from_dir(dir, cfg);
        }
        if let Some(dir) = cfg.search_paths.iter().find(|p| p.is_dir()) {
            debug!("Using data directory {}", dir.display());
            return Self::from_dir(dir, cfg);
        }
        let fallback = cfg
            .search_paths
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("./data"));
        warn!(
            "No data directory found among {:?}, using {}",
            cfg.search_paths,
            fallback.display()
        );
        Self::from_dir(&fallback, cfg)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &SourceLocation)> {
        [
            ("target_metrics", &self.target_metrics),
            ("peer_metrics", &self.peer_metrics),
            ("analyst_ratings", &self.analyst_ratings),
            ("peer_news", &self.peer_news),
        ]
        .into_iter()
    }
}

/// Read-only snapshot of all four tables
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceDataBundle {
    target_metrics: Vec<Record>,
    peer_metrics: Vec<Record>,
    analyst_ratings: Vec<Record>,
    peer_news: Vec<Record>,
    loaded_at: DateTime<Utc>,
}

impl ReferenceDataBundle {
    pub fn new(
        target_metrics: Vec<Record>,
        peer_metrics: Vec<Record>,
        analyst_ratings: Vec<Record>,
        peer_news: Vec<Record>,
    ) -> Self {
        Self {
            target_metrics,
            peer_metrics,
            analyst_ratings,
            peer_news,
            loaded_at: Utc::now(),
        }
    }

    /// Target-company metrics, most recent period first
    pub fn target_metrics(&self) -> &[Record] {
        &self.target_metrics
    }

    pub fn peer_metrics(&self) -> &[Record] {
        &self.peer_metrics
    }

    pub fn analyst_ratings(&self) -> &[Record] {
        &self.analyst_ratings
    }

    pub fn peer_news(&self) -> &[Record] {
        &self.peer_news
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn table_sizes(&self) -> [(&'static str, usize); 4] {
        [
            ("target_metrics", self.target_metrics.len()),
            ("peer_metrics", self.peer_metrics.len()),
            ("analyst_ratings", self.analyst_ratings.len()),
            ("peer_news", self.peer_news.len()),
        ]
    }
}

/// Per-request budget for URL sources when none is configured
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch and parse all four sources. Fails as a whole if any one source fails.
pub async fn load(sources: &DataSources, ingestor: TabularIngestor) -> Result<ReferenceDataBundle> {
    load_with_timeout(sources, ingestor, DEFAULT_FETCH_TIMEOUT).await
}

/// [`load`] with an explicit per-request budget for URL sources
pub async fn load_with_timeout(
    sources: &DataSources,
    ingestor: TabularIngestor,
    fetch_timeout: Duration,
) -> Result<ReferenceDataBundle> {
    let client = reqwest::Client::builder()
        .timeout(fetch_timeout)
        .build()
        .map_err(|e| WarRoomError::Internal {
            message: format!("Failed to build HTTP client: {}", e),
        })?;
    let (target_metrics, peer_metrics, analyst_ratings, peer_news) = futures_util::try_join!(
        load_table("target_metrics", &sources.target_metrics, &client, ingestor),
        load_table("peer_metrics", &sources.peer_metrics, &client, ingestor),
        load_table("analyst_ratings", &sources.analyst_ratings, &client, ingestor),
        load_table("peer_news", &sources.peer_news, &client, ingestor),
    )?;

    let bundle = ReferenceDataBundle::new(target_metrics, peer_metrics, analyst_ratings, peer_news);
    info!("Reference data loaded: {:?}", bundle.table_sizes());
    Ok(bundle)
}

async fn load_table(
    name: &'static str,
    location: &SourceLocation,
    client: &reqwest::Client,
    ingestor: TabularIngestor,
) -> Result<Vec<Record>> {
    let text = location
        .fetch(client)
        .await
        .map_err(|message| WarRoomError::DataLoad {
            source_name: name.to_string(),
            message,
        })?;

    // A source without even a header row is unparsable, not an empty table
    if text.trim().is_empty() {
        return Err(WarRoomError::DataLoad {
            source_name: name.to_string(),
            message: format!("{} is empty", location),
        });
    }

    let records = ingestor.parse(&text);
    debug!("{}: {} rows from {}", name, records.len(), location);
    Ok(records)
}
