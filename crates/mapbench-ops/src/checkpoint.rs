use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use mapbench_types::{samples::SampleBuffer, BenchError, Result};
use tracing::{debug, info, warn};

/// Well-known key of the single checkpoint entry.
pub const CHECKPOINT_KEY: &str = "checkpoint";

/// Durable home for the in-progress sample buffer of a run.
///
/// At most one checkpoint exists at a time. Its presence at startup means the
/// previous run never reached a clean finish.
pub trait CheckpointStore: Send + Sync {
    fn try_persist(&self, snapshot: &SampleBuffer) -> Result<()>;

    /// Reads and deletes the checkpoint so a second startup does not see it again.
    fn recover_if_present(&self) -> Result<Option<SampleBuffer>>;

    fn try_clear(&self) -> Result<()>;

    /// Overwrites the checkpoint. Storage failures only cost recovery fidelity,
    /// so they are logged and swallowed.
    fn persist(&self, snapshot: &SampleBuffer) {
        if let Err(err) = self.try_persist(snapshot) {
            warn!("Checkpoint not persisted, continuing without it: {err}");
        }
    }

    fn clear(&self) {
        if let Err(err) = self.try_clear() {
            warn!("Failed to clear checkpoint: {err}");
        }
    }
}

fn checkpoint_error(message: impl Into<String>) -> BenchError {
    BenchError::Checkpoint(message.into())
}

fn decode(raw: &str) -> Option<SampleBuffer> {
    match serde_json::from_str(raw) {
        Ok(buffer) => Some(buffer),
        Err(err) => {
            warn!("Discarding unreadable checkpoint: {err}");
            None
        }
    }
}

/// Checkpoint kept as `<dir>/checkpoint.json`.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_KEY}.json"))
    }

    fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(checkpoint_error(format!(
                "failed to delete {}: {err}",
                path.display()
            ))),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn try_persist(&self, snapshot: &SampleBuffer) -> Result<()> {
        let body = serde_json::to_vec(snapshot)
            .map_err(|err| checkpoint_error(format!("failed to encode checkpoint: {err}")))?;
        fs::create_dir_all(&self.dir)
            .map_err(|err| checkpoint_error(format!("failed to create checkpoint dir: {err}")))?;

        // Written beside the target and renamed over it so readers never see a torn file.
        let path = self.path();
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(|err| {
            checkpoint_error(format!("failed to write {}: {err}", staging.display()))
        })?;
        fs::rename(&staging, &path).map_err(|err| {
            checkpoint_error(format!("failed to replace {}: {err}", path.display()))
        })?;
        debug!(frames = snapshot.frame_count(), "Checkpoint persisted");
        Ok(())
    }

    fn recover_if_present(&self) -> Result<Option<SampleBuffer>> {
        let path = self.path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(checkpoint_error(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        Self::remove(&path)?;
        let recovered = decode(&raw);
        if recovered.is_some() {
            info!("Recovered checkpoint from {:?}", path);
        }
        Ok(recovered)
    }

    fn try_clear(&self) -> Result<()> {
        Self::remove(&self.path())
    }
}

/// Process-local checkpoint, used where no durable storage is wanted.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entry: Mutex<Option<String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail, as a full or disabled storage would.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn is_present(&self) -> bool {
        self.entry.lock().map(|entry| entry.is_some()).unwrap_or(false)
    }

    /// Current checkpoint without consuming it.
    pub fn peek(&self) -> Option<SampleBuffer> {
        let entry = self.entry.lock().ok()?;
        entry.as_deref().and_then(decode)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn try_persist(&self, snapshot: &SampleBuffer) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(checkpoint_error("storage quota exceeded"));
        }
        let body = serde_json::to_string(snapshot)
            .map_err(|err| checkpoint_error(format!("failed to encode checkpoint: {err}")))?;
        let mut entry = self
            .entry
            .lock()
            .map_err(|_| checkpoint_error("failed to lock checkpoint entry"))?;
        *entry = Some(body);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn recover_if_present(&self) -> Result<Option<SampleBuffer>> {
        let mut entry = self
            .entry
            .lock()
            .map_err(|_| checkpoint_error("failed to lock checkpoint entry"))?;
        Ok(entry.take().as_deref().and_then(decode))
    }

    fn try_clear(&self) -> Result<()> {
        let mut entry = self
            .entry
            .lock()
            .map_err(|_| checkpoint_error("failed to lock checkpoint entry"))?;
        *entry = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapbench_types::samples::Metric;

    fn sample_buffer() -> SampleBuffer {
        let mut buffer = SampleBuffer::new();
        buffer.record(Metric::Fps, 58.5);
        buffer.record(Metric::Draws, 12.0);
        buffer.record(Metric::BadFps, 14.0);
        buffer.record(Metric::GpuMem, 512.25);
        buffer.record(Metric::CpuMem, 96.0);
        buffer
    }

    fn temp_store() -> FileCheckpointStore {
        FileCheckpointStore::new(
            std::env::temp_dir().join(format!("mapbench-checkpoint-{}", uuid::Uuid::new_v4())),
        )
    }

    #[test]
    fn file_round_trip_is_single_use() {
        let store = temp_store();
        let buffer = sample_buffer();
        store.try_persist(&buffer).expect("persist");

        let recovered = store.recover_if_present().expect("recover");
        assert_eq!(recovered, Some(buffer));
        assert!(!store.path().exists());
        assert_eq!(store.recover_if_present().expect("second recover"), None);
        fs::remove_dir_all(store.dir.clone()).expect("cleanup");
    }

    #[test]
    fn file_round_trip_keeps_run_with_non_finite_samples() {
        let store = temp_store();
        let mut buffer = SampleBuffer::new();
        for _ in 0..50 {
            buffer.record(Metric::Fps, 60.0);
            buffer.record(Metric::Draws, 8.0);
        }
        buffer.record(Metric::Fps, f64::INFINITY);
        buffer.record(Metric::Draws, 8.0);
        store.try_persist(&buffer).expect("persist");

        let recovered = store
            .recover_if_present()
            .expect("recover")
            .expect("checkpoint kept");
        assert_eq!(recovered.frame_count(), 51);
        assert_eq!(recovered.fps.last(), Some(&f64::INFINITY));
        assert_eq!(recovered, buffer);
        fs::remove_dir_all(store.dir.clone()).expect("cleanup");
    }

    #[test]
    fn file_persist_overwrites_previous_entry() {
        let store = temp_store();
        store.persist(&SampleBuffer::new());
        let latest = sample_buffer();
        store.persist(&latest);
        assert_eq!(store.recover_if_present().expect("recover"), Some(latest));
        fs::remove_dir_all(store.dir.clone()).expect("cleanup");
    }

    #[test]
    fn file_clear_removes_entry_and_tolerates_absence() {
        let store = temp_store();
        store.persist(&sample_buffer());
        store.try_clear().expect("clear");
        assert!(!store.path().exists());
        store.try_clear().expect("clear again");
        assert_eq!(store.recover_if_present().expect("recover"), None);
        fs::remove_dir_all(store.dir.clone()).expect("cleanup");
    }

    #[test]
    fn corrupt_file_is_discarded() {
        let store = temp_store();
        fs::create_dir_all(&store.dir).expect("dir");
        fs::write(store.path(), "{not json").expect("write");
        assert_eq!(store.recover_if_present().expect("recover"), None);
        assert!(!store.path().exists());
        fs::remove_dir_all(store.dir.clone()).expect("cleanup");
    }

    #[test]
    fn file_recovers_checkpoint_written_by_hand() {
        let store = temp_store();
        fs::create_dir_all(&store.dir).expect("dir");
        let raw = r#"{"tiles":[1],"draws":[2],"vertices":[0.5],"fps":[60],"badfps":[],"models":[3],"mem":{"gpu":[100],"cpu":[200]}}"#;
        fs::write(store.path(), raw).expect("write");
        let recovered = store
            .recover_if_present()
            .expect("recover")
            .expect("present");
        assert_eq!(recovered.series(Metric::Fps), &[60.0]);
        assert_eq!(recovered.mem.cpu, vec![200.0]);
        fs::remove_dir_all(store.dir.clone()).expect("cleanup");
    }

    #[test]
    fn memory_store_swallows_write_failures() {
        let store = MemoryCheckpointStore::new();
        store.fail_writes(true);
        store.persist(&sample_buffer());
        assert!(store.try_persist(&sample_buffer()).is_err());
        assert!(!store.is_present());
        assert_eq!(store.writes(), 0);

        store.fail_writes(false);
        store.persist(&sample_buffer());
        assert_eq!(store.writes(), 1);
        assert_eq!(store.peek(), Some(sample_buffer()));
        assert_eq!(store.recover_if_present().expect("recover"), Some(sample_buffer()));
        assert!(!store.is_present());
    }

    #[test]
    fn memory_store_clear() {
        let store = MemoryCheckpointStore::new();
        store.persist(&sample_buffer());
        store.clear();
        assert_eq!(store.recover_if_present().expect("recover"), None);
    }
}
