//! Question metadata cache
//!
//! An in-memory index over a JSON snapshot of the site's question list. The
//! snapshot is read once, on the first lookup, and the index stays read-only
//! for the rest of the process. `update` rewrites the snapshot from the
//! remote list; the new content is picked up by the next process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::client::{Client, ClientError, RemoteQuestion};
use crate::config::AppConfig;

/// Snapshots at least this old trigger a staleness warning
pub const STALE_AFTER_DAYS: i64 = 14;

/// Errors that can occur while refreshing the snapshot
#[derive(Debug, Error)]
pub enum CacheError {
    /// Creating directories or writing the snapshot failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the snapshot failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fetching the question list failed
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// One question in the snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionRecord {
    #[serde(rename = "FrontendId")]
    pub frontend_id: String,
    #[serde(rename = "Slug")]
    pub slug: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "CnTitle")]
    pub localized_title: String,
    #[serde(rename = "Difficulty")]
    pub difficulty: String,
    #[serde(rename = "Tags")]
    pub tags: Vec<String>,
    #[serde(rename = "PaidOnly")]
    pub paid_only: bool,
}

impl From<RemoteQuestion> for QuestionRecord {
    fn from(q: RemoteQuestion) -> Self {
        Self {
            frontend_id: q.question_frontend_id,
            slug: q.title_slug,
            title: q.title,
            localized_title: q.translated_title.unwrap_or_default(),
            difficulty: q.difficulty,
            tags: q.topic_tags.into_iter().map(|t| t.slug).collect(),
            paid_only: q.is_paid_only,
        }
    }
}

/// Outcome of the one-time snapshot load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// Loaded and younger than the staleness threshold
    Fresh,
    /// Loaded, but the file is `age_days` old
    Stale { age_days: i64 },
    /// Missing or unreadable; the cache is empty
    Unavailable(String),
}

struct Index {
    by_slug: HashMap<String, Arc<QuestionRecord>>,
    by_frontend_id: HashMap<String, Arc<QuestionRecord>>,
    status: CacheStatus,
}

impl Index {
    fn build(records: Vec<QuestionRecord>, status: CacheStatus) -> Self {
        let mut by_slug = HashMap::with_capacity(records.len());
        let mut by_frontend_id = HashMap::with_capacity(records.len());
        for record in records {
            let record = Arc::new(record);
            by_slug.insert(record.slug.clone(), record.clone());
            by_frontend_id.insert(record.frontend_id.clone(), record);
        }
        Self {
            by_slug,
            by_frontend_id,
            status,
        }
    }

    fn empty(status: CacheStatus) -> Self {
        Self::build(Vec::new(), status)
    }
}

/// Lazily loaded question index backed by a snapshot file
pub struct QuestionCache {
    path: PathBuf,
    index: OnceLock<Index>,
    #[cfg(test)]
    loads: std::sync::atomic::AtomicUsize,
}

static SHARED: OnceLock<QuestionCache> = OnceLock::new();

impl QuestionCache {
    /// Creates a cache over the snapshot at `path`; nothing is read yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: OnceLock::new(),
            #[cfg(test)]
            loads: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Process-wide cache at the configured snapshot path
    ///
    /// The first caller's configuration decides the path.
    pub fn shared(config: &AppConfig) -> &'static QuestionCache {
        SHARED.get_or_init(|| QuestionCache::new(config.cache_file()))
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up a question by its URL slug
    pub fn get_by_slug(&self, slug: &str) -> Option<&QuestionRecord> {
        self.index().by_slug.get(slug).map(Arc::as_ref)
    }

    /// Looks up a question by its front-end id (the number shown on the site)
    pub fn get_by_id(&self, id: &str) -> Option<&QuestionRecord> {
        self.index().by_frontend_id.get(id).map(Arc::as_ref)
    }

    /// Result of loading the snapshot, loading it if necessary
    pub fn status(&self) -> &CacheStatus {
        &self.index().status
    }

    /// Number of loaded questions
    pub fn len(&self) -> usize {
        self.index().by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // OnceLock blocks concurrent first callers until the single load has
    // built both maps, so nobody sees a half-built index.
    fn index(&self) -> &Index {
        self.index.get_or_init(|| self.load())
    }

    fn load(&self) -> Index {
        #[cfg(test)]
        self.loads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        match read_snapshot(&self.path) {
            Ok(records) => {
                tracing::debug!("Loaded {} questions from {:?}", records.len(), self.path);
                Index::build(records, self.check_update_time())
            }
            Err(e) => {
                tracing::warn!("failed to load cache, try updating with `cache update`: {}", e);
                Index::empty(CacheStatus::Unavailable(e.to_string()))
            }
        }
    }

    fn check_update_time(&self) -> CacheStatus {
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return CacheStatus::Fresh,
        };

        let age = Utc::now().signed_duration_since(modified);
        if age >= chrono::Duration::days(STALE_AFTER_DAYS) {
            tracing::warn!("cache is too old, try updating with `cache update`");
            CacheStatus::Stale {
                age_days: age.num_days(),
            }
        } else {
            CacheStatus::Fresh
        }
    }

    /// Replaces the snapshot with the full remote question list
    ///
    /// Returns the number of questions written. Not safe to run concurrently
    /// with itself.
    pub async fn update(&self, client: &dyn Client) -> Result<usize, CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let questions = client.get_all_questions().await?;
        let records: Vec<QuestionRecord> = questions.into_iter().map(QuestionRecord::from).collect();

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        records.serialize(&mut serializer)?;
        buf.push(b'\n');

        tokio::fs::write(&self.path, &buf).await?;
        tracing::info!(path = %self.path.display(), "cache updated");
        Ok(records.len())
    }
}

fn read_snapshot(path: &Path) -> Result<Vec<QuestionRecord>, CacheError> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}
