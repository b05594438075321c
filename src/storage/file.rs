//! File snapshot backend
//!
//! Decorates any [`MetricStore`] with JSON snapshots on disk:
//!
//! - **Restore**: on construction the snapshot file is loaded into the wrapped
//!   store (missing file is a no-op, an empty file is skipped with a warning,
//!   malformed JSON fails construction).
//! - **Write-through**: with a non-zero store interval every write is followed
//!   by a full snapshot save, and a background task also saves on each tick.
//! - **Interval zero**: no automatic saves at all; only [`FileBackend::save_snapshot`]
//!   and shutdown persist state.
//!
//! Saves go to a temporary file in the target directory which is fsynced and
//! renamed over the snapshot, so a crash mid-write leaves the previous
//! snapshot intact. A save that races a concurrent write may miss it; the
//! next save picks it up.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::backend::{HealthStatus, MetricSnapshot, MetricStore};
use super::error::{StorageError, StorageResult};

/// Snapshot settings for a [`FileBackend`]
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Snapshot file location
    pub path: PathBuf,

    /// Period of the background save loop; zero disables automatic saves
    pub store_interval: Duration,

    /// Load the snapshot file into the wrapped store on startup
    pub restore: bool,
}

/// Serializes snapshot saves of one store to one file
struct Snapshotter<S> {
    store: Arc<S>,
    path: PathBuf,
    lock: Mutex<()>,
}

impl<S: MetricStore> Snapshotter<S> {
    async fn save(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let snapshot = self.store.snapshot().await?;
        write_snapshot(&self.path, &snapshot).await
    }
}

/// Storage backend persisting a wrapped store to a JSON snapshot file
pub struct FileBackend<S> {
    snapshotter: Arc<Snapshotter<S>>,
    store_interval: Duration,
    loop_cancel: CancellationToken,
    snapshot_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<S: MetricStore + 'static> FileBackend<S> {
    /// Wrap `store`, restoring and starting the snapshot loop as configured
    ///
    /// The loop stops (after one last save) when `cancel` fires or the
    /// backend is shut down.
    #[instrument(skip_all, fields(path = %options.path.display()))]
    pub async fn new(
        store: S,
        options: FileOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<Self> {
        let snapshotter = Arc::new(Snapshotter {
            store: Arc::new(store),
            path: options.path,
            lock: Mutex::new(()),
        });

        if options.restore {
            restore_into(&*snapshotter.store, &snapshotter.path).await?;
        }

        let loop_cancel = cancel.child_token();
        let snapshot_task = if options.store_interval.is_zero() {
            info!("snapshot interval is zero, automatic snapshots disabled");
            None
        } else {
            info!(
                "saving snapshots every {}s",
                options.store_interval.as_secs_f32()
            );
            Some(tokio::spawn(run_snapshot_loop(
                snapshotter.clone(),
                options.store_interval,
                loop_cancel.clone(),
            )))
        };

        Ok(Self {
            snapshotter,
            store_interval: options.store_interval,
            loop_cancel,
            snapshot_task: Mutex::new(snapshot_task),
            closed: AtomicBool::new(false),
        })
    }

    /// The wrapped store (writes through it are not snapshotted)
    pub fn inner(&self) -> &S {
        &self.snapshotter.store
    }

    pub fn path(&self) -> &Path {
        &self.snapshotter.path
    }

    /// Write the full contents of the wrapped store to the snapshot file
    pub async fn save_snapshot(&self) -> StorageResult<()> {
        self.snapshotter.save().await
    }

    /// Merge the snapshot file into the wrapped store
    pub async fn load_snapshot(&self) -> StorageResult<()> {
        restore_into(&*self.snapshotter.store, &self.snapshotter.path).await
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    /// Save after a successful write
    ///
    /// The write has already landed in the wrapped store, so failures are
    /// always `Snapshot` errors and never retriable.
    async fn write_through(&self) -> StorageResult<()> {
        if self.store_interval.is_zero() {
            return Ok(());
        }
        self.snapshotter.save().await.map_err(|e| match e {
            StorageError::Snapshot(_) => e,
            other => StorageError::Snapshot(format!("write-through snapshot failed: {other}")),
        })
    }
}

#[async_trait]
impl<S: MetricStore + 'static> MetricStore for FileBackend<S> {
    async fn set_gauge(&self, name: &str, value: f64) -> StorageResult<f64> {
        self.ensure_open()?;
        let stored = self.snapshotter.store.set_gauge(name, value).await?;
        self.write_through().await?;
        Ok(stored)
    }

    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        self.snapshotter.store.get_gauge(name).await
    }

    async fn set_counter(&self, name: &str, delta: i64) -> StorageResult<i64> {
        self.ensure_open()?;
        let total = self.snapshotter.store.set_counter(name, delta).await?;
        self.write_through().await?;
        Ok(total)
    }

    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        self.snapshotter.store.get_counter(name).await
    }

    async fn gauges(&self) -> StorageResult<HashMap<String, f64>> {
        self.snapshotter.store.gauges().await
    }

    async fn counters(&self) -> StorageResult<HashMap<String, i64>> {
        self.snapshotter.store.counters().await
    }

    async fn update_counters_and_gauges(
        &self,
        counters: &HashMap<String, i64>,
        gauges: &HashMap<String, f64>,
    ) -> StorageResult<()> {
        self.ensure_open()?;
        self.snapshotter
            .store
            .update_counters_and_gauges(counters, gauges)
            .await?;
        self.write_through().await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let mut status = self.snapshotter.store.health_check().await?;
        status
            .metadata
            .insert("snapshot_path".to_string(), self.path().display().to_string());
        status.metadata.insert(
            "store_interval_secs".to_string(),
            self.store_interval.as_secs().to_string(),
        );
        if self.closed.load(Ordering::Acquire) {
            status.healthy = false;
            status.message = "file backend is shut down".to_string();
        }
        Ok(status)
    }

    #[instrument(skip(self), fields(path = %self.path().display()))]
    async fn shutdown(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // the loop performs the final save when it is cancelled
        let task = self.snapshot_task.lock().await.take();
        match task {
            Some(task) => {
                self.loop_cancel.cancel();
                if let Err(e) = task.await {
                    error!("snapshot loop panicked: {e}");
                }
            }
            None => self.snapshotter.save().await?,
        }

        info!("file backend closed");
        self.snapshotter.store.shutdown().await
    }
}

async fn run_snapshot_loop<S: MetricStore>(
    snapshotter: Arc<Snapshotter<S>>,
    period: Duration,
    cancel: CancellationToken,
) {
    debug!("starting snapshot loop");
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = snapshotter.save().await {
                    warn!("final snapshot failed: {e}");
                }
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = snapshotter.save().await {
                    error!("periodic snapshot failed: {e}");
                }
            }
        }
    }

    debug!("snapshot loop stopped");
}

async fn restore_into<S: MetricStore + ?Sized>(store: &S, path: &Path) -> StorageResult<()> {
    let Some(snapshot) = read_snapshot(path).await? else {
        return Ok(());
    };

    info!(
        "restoring {} gauges and {} counters from {}",
        snapshot.gauges.len(),
        snapshot.counters.len(),
        path.display()
    );
    store
        .update_counters_and_gauges(&snapshot.counters, &snapshot.gauges)
        .await
}

/// Read a snapshot file
///
/// Returns `None` if the file does not exist or is empty.
pub async fn read_snapshot(path: &Path) -> StorageResult<Option<MetricSnapshot>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no snapshot at {}, starting empty", path.display());
            return Ok(None);
        }
        Err(e) => return Err(StorageError::from_io("failed to read snapshot", e)),
    };

    if bytes.is_empty() {
        warn!("snapshot file {} is empty, skipping restore", path.display());
        return Ok(None);
    }

    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        StorageError::Snapshot(format!("malformed snapshot {}: {e}", path.display()))
    })
}

/// Atomically replace the snapshot file at `path`
pub async fn write_snapshot(path: &Path, snapshot: &MetricSnapshot) -> StorageResult<()> {
    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| StorageError::Snapshot(format!("failed to serialize snapshot: {e}")))?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .map_err(|e| StorageError::from_io("failed to create snapshot directory", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| StorageError::from_io("failed to create temporary snapshot", e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StorageError::from_io("failed to write snapshot", e))?;
        tmp.persist(&path)
            .map_err(|e| StorageError::from_io("failed to replace snapshot", e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StorageError::Snapshot(format!("snapshot writer task failed: {e}")))?
}
