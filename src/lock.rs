use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use snafu::{Location, ResultExt as _, Snafu};
use tokio::fs::OpenOptions;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::instrument;

use crate::Located;

pub type Result<T, E = LockError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LockError {
    #[snafu(display("timed out acquiring lock `{}` after {attempts} attempts", path.display()))]
    LockTimeout {
        path: PathBuf,
        attempts: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not create lock marker `{}`: {source}", path.display()))]
    CreateMarker {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not remove lock marker `{}`: {source}", path.display()))]
    RemoveMarker {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::LockTimeout { .. })
    }
}

impl Located for LockError {
    fn location(&self) -> Location {
        match self {
            LockError::LockTimeout { location, .. }
            | LockError::CreateMarker { location, .. }
            | LockError::RemoveMarker { location, .. } => *location,
        }
    }
}

/// How long [FileLock::acquire] keeps polling a marker that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of create attempts, the first one included.
    pub max_attempts: usize,
    /// Wait between two consecutive attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.interval).take(self.attempts() - 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(100))
    }
}

/// Cross-process mutual exclusion through an empty marker file.
///
/// The marker is created with `O_CREAT | O_EXCL` semantics, so whichever process
/// creates it first owns the lock until it deletes the marker again.
///
/// A process that dies while holding the lock leaves the marker behind. Such a
/// marker is never expired automatically: every later writer times out until an
/// operator removes the file by hand.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    policy: RetryPolicy,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    #[instrument(skip(self), fields(lock = %self.path.display()))]
    pub async fn acquire(&self) -> Result<()> {
        let path = &self.path;
        let create_marker =
            || async move { OpenOptions::new().write(true).create_new(true).open(path).await };
        let is_held = |error: &std::io::Error| error.kind() == ErrorKind::AlreadyExists;

        match RetryIf::start(self.policy.strategy(), create_marker, is_held).await {
            Ok(_marker) => {
                tracing::trace!("acquired lock");
                Ok(())
            }
            Err(error) if is_held(&error) => {
                tracing::warn!(attempts = self.policy.attempts(), "lock is still held, giving up");
                LockTimeoutSnafu {
                    path,
                    attempts: self.policy.attempts(),
                }
                .fail()
            }
            Err(error) => Err(error).context(CreateMarkerSnafu { path }),
        }
    }

    /// Deletes the marker. A marker that is already gone counts as released.
    #[instrument(skip(self), fields(lock = %self.path.display()))]
    pub async fn release(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::trace!("released lock");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::debug!("lock marker was already removed");
                Ok(())
            }
            Err(error) => Err(error).context(RemoveMarkerSnafu { path: &self.path }),
        }
    }

    /// Runs `critical` while holding the lock and releases it on every exit path.
    ///
    /// When both the critical section and the release fail, the critical section's
    /// error wins and the release failure is only logged. Dropping the returned future
    /// after the lock was taken (a timeout, a disconnected client) still removes the
    /// marker.
    pub async fn scoped<F, Fut, T, E>(&self, critical: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        self.acquire().await?;
        let held = HeldMarker { path: Some(&self.path) };

        let outcome = critical().await;
        let released = self.release().await;
        held.disarm();

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(error)) => Err(error.into()),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(release_error)) => {
                tracing::error!(
                    error = %release_error,
                    location = %release_error.location(),
                    "could not release lock after a failed critical section"
                );
                Err(error)
            }
        }
    }
}

/// Removes the marker when a [FileLock::scoped] future is dropped mid-section.
struct HeldMarker<'a> {
    path: Option<&'a Path>,
}

impl HeldMarker<'_> {
    fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for HeldMarker<'_> {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };

        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(lock = %path.display(), "released lock of a cancelled critical section"),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => tracing::error!(
                lock = %path.display(),
                %error,
                "could not release lock of a cancelled critical section"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn acquire_creates_and_release_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("store.lock"));

        lock.acquire().await.unwrap();
        assert!(lock.path().exists());

        lock.release().await.unwrap();
        assert!(!lock.path().exists());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("store.lock"));

        lock.release().await.unwrap();

        lock.acquire().await.unwrap();
        lock.release().await.unwrap();
        lock.release().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn contender_waits_until_holder_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");

        let holder = FileLock::new(&path);
        let contender = FileLock::new(&path).with_policy(quick_policy(200));

        holder.acquire().await.unwrap();

        let waiting = tokio::spawn(async move { contender.acquire().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            !waiting.is_finished(),
            "contender must not get the lock while the marker exists"
        );

        holder.release().await.unwrap();
        waiting.await.unwrap().unwrap();
        assert!(path.exists(), "contender now owns the marker");
    }

    #[tokio::test]
    async fn exhausted_retries_fail_with_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        std::fs::write(&path, "").unwrap();

        let lock = FileLock::new(&path).with_policy(quick_policy(3));
        let error = lock.acquire().await.unwrap_err();

        assert!(error.is_timeout(), "unexpected error: {error}");
        assert!(matches!(error, LockError::LockTimeout { attempts: 3, .. }));
        assert!(path.exists(), "a timed out acquirer must leave the marker alone");
    }

    #[tokio::test]
    async fn other_io_failures_are_not_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("missing").join("store.lock"))
            .with_policy(quick_policy(5));

        let error = lock.acquire().await.unwrap_err();

        assert!(!error.is_timeout());
        assert!(matches!(error, LockError::CreateMarker { .. }));
    }

    #[tokio::test]
    async fn scoped_releases_when_critical_section_fails() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("store.lock"));

        #[derive(Debug)]
        enum Failure {
            Lock,
            Critical,
        }

        impl From<LockError> for Failure {
            fn from(_: LockError) -> Self {
                Failure::Lock
            }
        }

        let result: Result<(), Failure> = lock
            .scoped(|| async {
                assert!(lock.path().exists());
                Err(Failure::Critical)
            })
            .await;

        assert!(matches!(result, Err(Failure::Critical)));
        assert!(!lock.path().exists());

        let value: Result<u32, Failure> = lock.scoped(|| async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);
        assert!(!lock.path().exists());
    }

    #[tokio::test]
    async fn cancelled_critical_section_releases_marker() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("store.lock")).with_policy(quick_policy(5));

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            lock.scoped(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, LockError>(())
            }),
        )
        .await;

        assert!(cancelled.is_err(), "critical section should have been cut short");
        assert!(!lock.path().exists(), "dropping the section must remove the marker");

        lock.acquire().await.unwrap();
        lock.release().await.unwrap();
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.strategy().count(), 0);

        assert_eq!(RetryPolicy::default().strategy().count(), 9);
    }
}
