use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use snafu::{Location, ResultExt as _, Snafu};
use tokio::fs;
use tokio::io::AsyncWriteExt as _;
use tracing::instrument;

use crate::lock::{FileLock, LockError};
use crate::model::{DailyView, Metrics};
use crate::time::{self, Date};
use crate::Located;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    #[snafu(display("could not read view history `{}`: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// The document exists but is not a list of daily views. It is never reset.
    #[snafu(display("view history `{}` is corrupted: {source}", path.display()))]
    Corrupted {
        path: PathBuf,
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not serialize view history: {source}"))]
    Encode {
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not write view history `{}`: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(context(false), display("{source}"))]
    Lock { source: LockError },
}

impl StoreError {
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StoreError::Lock { source } if source.is_timeout())
    }
}

impl Located for StoreError {
    fn location(&self) -> Location {
        match self {
            StoreError::Read { location, .. }
            | StoreError::Corrupted { location, .. }
            | StoreError::Encode { location, .. }
            | StoreError::Write { location, .. } => *location,
            StoreError::Lock { source } => source.location(),
        }
    }
}

/// Per-day view counts persisted as one JSON document.
///
/// Every mutation runs under the [FileLock], so several processes may share the
/// same document. Reads are not locked; the document is replaced through a rename
/// so a reader sees either the previous or the next version, never a torn one.
#[derive(Debug, Clone)]
pub struct ViewStore {
    path: PathBuf,
    lock: FileLock,
}

impl ViewStore {
    /// Creates the directories for the document and its lock marker. The document
    /// itself is created lazily by the first [ViewStore::load] or [ViewStore::record_view].
    pub async fn open(path: impl Into<PathBuf>, lock: FileLock) -> Result<Self> {
        let path = path.into();

        for file in [path.as_path(), lock.path()] {
            if let Some(parent) = file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .context(WriteSnafu { path: parent })?;
            }
        }

        Ok(Self { path, lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole history. A missing document is initialized to an empty one.
    #[instrument(skip(self), fields(store = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<DailyView>> {
        if let Some(history) = self.read().await? {
            return Ok(history);
        }

        tracing::info!("no view history found, initializing an empty one");
        self.lock.scoped(|| self.initialize()).await
    }

    #[instrument(skip(self), fields(store = %self.path.display()))]
    pub async fn record_view(&self) -> Result<u64> {
        self.record_view_on(time::today()).await
    }

    /// Adds one view to `today`'s bucket and returns the bucket's new count.
    pub async fn record_view_on(&self, today: Date) -> Result<u64> {
        let views = self.lock.scoped(|| self.increment(today)).await?;
        tracing::debug!(%today, views, "recorded page view");

        Ok(views)
    }

    #[instrument(skip(self), fields(store = %self.path.display()))]
    pub async fn compute_metrics(&self) -> Result<Metrics> {
        self.compute_metrics_on(time::today()).await
    }

    pub async fn compute_metrics_on(&self, today: Date) -> Result<Metrics> {
        let history = self.load().await?;
        Ok(Metrics::aggregate(&history, today))
    }

    async fn initialize(&self) -> Result<Vec<DailyView>> {
        if let Some(history) = self.read().await? {
            return Ok(history);
        }

        self.persist(&[]).await?;
        Ok(Vec::new())
    }

    async fn increment(&self, today: Date) -> Result<u64> {
        let mut history = self.read().await?.unwrap_or_default();

        let views = match history.iter_mut().find(|entry| entry.date == today) {
            Some(entry) => {
                entry.views = entry.views.saturating_add(1);
                entry.views
            }
            None => {
                history.push(DailyView::new(today, 1));
                1
            }
        };

        self.persist(&history).await?;
        Ok(views)
    }

    async fn read(&self) -> Result<Option<Vec<DailyView>>> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error).context(ReadSnafu { path: &self.path }),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .context(CorruptedSnafu { path: &self.path })
    }

    /// Must only be called while holding the lock.
    async fn persist(&self, history: &[DailyView]) -> Result<()> {
        let content = serde_json::to_vec_pretty(history).context(EncodeSnafu)?;
        let staging = self.staging_path();

        let mut file = fs::File::create(&staging)
            .await
            .context(WriteSnafu { path: &staging })?;
        file.write_all(&content)
            .await
            .context(WriteSnafu { path: &staging })?;
        file.sync_all()
            .await
            .context(WriteSnafu { path: &staging })?;
        drop(file);

        fs::rename(&staging, &self.path)
            .await
            .context(WriteSnafu { path: &self.path })
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
