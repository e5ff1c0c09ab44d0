//! On-disk experiment: a directory of time-indexed snapshots plus the live
//! ecosystem they were taken from.
//!
//! Layout:
//!
//! ```text
//! <root>/0_to_999/snapshot_0000000000.json.zst
//! <root>/0_to_999/snapshot_0000000050.json.zst
//! <root>/1000_to_1999/snapshot_0000001000.json.zst
//! ```
//!
//! The live engine sits behind a single mutex. The simulation thread holds it
//! for the whole of `evolve()` and for the state read of `save()`; readers use
//! [`ExperimentStore::try_lock`] and simply skip a frame when it is busy.
//! `load()` decodes the replacement engine off-lock and only swaps under it.

use crate::checkpoint::{Snapshot, SnapshotError};
use crate::config::{Config, ConfigError};
use crate::grid::BiotopeError;
use crate::stats::Census;
use crate::world::Ecosystem;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const SNAPSHOT_PREFIX: &str = "snapshot_";
const SNAPSHOT_SUFFIX: &str = ".json.zst";
const TMP_SUFFIX: &str = ".tmp";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no snapshot stored for tick {tick}")]
    MissingSnapshot { tick: u64 },
    #[error("corrupt snapshot {path}: {source}")]
    CorruptSnapshot {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("experiment is opened read-only")]
    ReadOnly,
    #[error("ecosystem lock poisoned")]
    Poisoned,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot build ecosystem: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("ecosystem error: {0}")]
    Engine(#[from] BiotopeError),
}

impl StoreError {
    fn fs(path: &Path, source: io::Error) -> Self {
        StoreError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Whether the store may write snapshots
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// What the store is doing with the live engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StorePhase {
    Ready = 0,
    Evolving = 1,
    Swapping = 2,
}

impl StorePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => StorePhase::Evolving,
            2 => StorePhase::Swapping,
            _ => StorePhase::Ready,
        }
    }
}

/// A time-indexed experiment directory and its live ecosystem
pub struct ExperimentStore {
    root: PathBuf,
    mode: AccessMode,
    config: Config,
    engine: Mutex<Ecosystem>,
    phase: AtomicU8,
}

impl ExperimentStore {
    /// Start a new experiment in `root`, wiping anything already there.
    /// The fresh population is saved as tick 0.
    pub fn create<P: AsRef<Path>>(root: P, config: Config, seed: u64) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        config.validate()?;

        if root.exists() {
            log::warn!("Overwriting experiment at {}", root.display());
            fs::remove_dir_all(&root).map_err(|e| StoreError::fs(&root, e))?;
        }
        fs::create_dir_all(&root).map_err(|e| StoreError::fs(&root, e))?;

        let engine = Ecosystem::new_with_seed(config.clone(), seed)?;
        log::info!(
            "Created experiment at {} ({}x{}, {} organisms, seed {})",
            root.display(),
            config.biotope.width,
            config.biotope.height,
            engine.population(),
            seed
        );

        let store = Self::with_engine(root, AccessMode::ReadWrite, engine);
        store.save()?;
        Ok(store)
    }

    /// Resume an experiment from its latest saved tick
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let tick = latest_tick_in(&root)?.ok_or(StoreError::MissingSnapshot { tick: 0 })?;
        let engine = read_snapshot(&find_snapshot(&root, tick)?)?;
        log::info!("Opened experiment at {} (tick {})", root.display(), tick);
        Ok(Self::with_engine(root, AccessMode::ReadWrite, engine))
    }

    /// `open` if the directory holds any snapshot, `create` otherwise
    pub fn open_or_create<P: AsRef<Path>>(
        root: P,
        config: Config,
        seed: u64,
    ) -> Result<Self, StoreError> {
        let root = root.as_ref();
        if latest_tick_in(root)?.is_some() {
            Self::open(root)
        } else {
            Self::create(root, config, seed)
        }
    }

    /// Open a private engine at a historical tick. Nothing is ever written.
    pub fn open_read_only<P: AsRef<Path>>(root: P, tick: u64) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let engine = read_snapshot(&find_snapshot(&root, tick)?)?;
        log::info!(
            "Opened experiment at {} read-only (tick {})",
            root.display(),
            tick
        );
        Ok(Self::with_engine(root, AccessMode::ReadOnly, engine))
    }

    fn with_engine(root: PathBuf, mode: AccessMode, engine: Ecosystem) -> Self {
        Self {
            root,
            mode,
            config: engine.config().clone(),
            engine: Mutex::new(engine),
            phase: AtomicU8::new(StorePhase::Ready as u8),
        }
    }

    // --- Simulation ---

    /// Run one tick. In read-write mode the new tick is saved when it falls
    /// on the backup period. Returns the new tick.
    pub fn evolve(&self) -> Result<u64, StoreError> {
        let mut eco = self.lock()?;
        self.set_phase(StorePhase::Evolving);
        let result = eco.evolve();
        self.set_phase(StorePhase::Ready);
        result?;

        let tick = eco.time();
        if self.mode == AccessMode::ReadWrite && tick % self.backup_period() == 0 {
            let snapshot = eco.create_snapshot();
            let census = Census::of(&eco);
            drop(eco);
            self.persist(&snapshot, &census)?;
        }
        Ok(tick)
    }

    /// Save the live engine at its current tick
    pub fn save(&self) -> Result<PathBuf, StoreError> {
        if self.mode == AccessMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }
        let (snapshot, census) = {
            let eco = self.lock()?;
            (eco.create_snapshot(), Census::of(&eco))
        };
        self.persist(&snapshot, &census)
    }

    fn persist(&self, snapshot: &Snapshot, census: &Census) -> Result<PathBuf, StoreError> {
        let tick = snapshot.state.tick_count;
        let path = self.snapshot_path(tick);
        let bytes = snapshot
            .to_compressed(self.config.experiment.compression_level)
            .map_err(|source| StoreError::CorruptSnapshot {
                path: path.clone(),
                source,
            })?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::fs(dir, e))?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &bytes).map_err(|e| StoreError::fs(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::fs(&path, e))?;

        log::info!(
            "Saved tick {} to {} ({} bytes) {}",
            tick,
            path.display(),
            bytes.len(),
            census
        );
        Ok(path)
    }

    /// Replace the live engine with the one saved at `tick`
    pub fn load(&self, tick: u64) -> Result<(), StoreError> {
        let path = self.snapshot_path(tick);
        let replacement = read_snapshot(&path)?;

        let previous = {
            let mut eco = self.lock()?;
            self.set_phase(StorePhase::Swapping);
            let previous = std::mem::replace(&mut *eco, replacement);
            self.set_phase(StorePhase::Ready);
            previous
        };
        drop(previous);

        log::info!("Loaded tick {} from {}", tick, path.display());
        Ok(())
    }

    // --- Enumeration ---

    /// Saved ticks, ascending
    pub fn list_available_ticks(&self) -> Result<Vec<u64>, StoreError> {
        list_ticks_in(&self.root)
    }

    /// Most recent saved tick
    pub fn latest_tick(&self) -> Result<Option<u64>, StoreError> {
        latest_tick_in(&self.root)
    }

    /// Total bytes stored under the experiment root
    pub fn size_on_disk_bytes(&self) -> Result<u64, StoreError> {
        let mut total = 0;
        walk_files(&self.root, &mut |_, meta| total += meta.len())?;
        Ok(total)
    }

    /// Human readable size of the experiment directory
    pub fn size_on_disk(&self) -> Result<String, StoreError> {
        Ok(format_bytes(self.size_on_disk_bytes()?))
    }

    // --- Locking ---

    /// Block until the live engine is available
    pub fn lock(&self) -> Result<MutexGuard<'_, Ecosystem>, StoreError> {
        self.engine.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Take the live engine if nobody else holds it
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Ecosystem>> {
        self.engine.try_lock().ok()
    }

    /// Release a guard obtained from `lock` or `try_lock`
    pub fn unlock(&self, guard: MutexGuard<'_, Ecosystem>) {
        drop(guard);
    }

    // --- Accessors ---

    pub fn current_tick(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.time())
    }

    pub fn phase(&self) -> StorePhase {
        StorePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: StorePhase) {
        log::trace!("Store phase -> {:?}", phase);
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Constants the experiment was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backup_period(&self) -> u64 {
        self.config.experiment.backup_period
    }

    /// Directory name of the bucket holding `tick`, e.g. `0_to_999`
    pub fn bucket_name(&self, tick: u64) -> String {
        bucket_name(tick, self.config.experiment.bucket_size)
    }

    /// Where the snapshot for `tick` lives
    pub fn snapshot_path(&self, tick: u64) -> PathBuf {
        snapshot_path_in(&self.root, tick, self.config.experiment.bucket_size)
    }
}

fn bucket_name(tick: u64, bucket_size: u64) -> String {
    let size = bucket_size.max(1);
    let lo = tick / size * size;
    format!("{}_to_{}", lo, lo + size - 1)
}

fn snapshot_file_name(tick: u64) -> String {
    format!("{}{:010}{}", SNAPSHOT_PREFIX, tick, SNAPSHOT_SUFFIX)
}

fn snapshot_path_in(root: &Path, tick: u64, bucket_size: u64) -> PathBuf {
    root.join(bucket_name(tick, bucket_size))
        .join(snapshot_file_name(tick))
}

/// Parse `snapshot_<digits>.json.zst` back into a tick
fn parse_snapshot_file_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Visit every regular file below `dir`. A missing directory has no files.
fn walk_files(dir: &Path, visit: &mut dyn FnMut(&Path, &fs::Metadata)) -> Result<(), StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::fs(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::fs(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| StoreError::fs(&path, e))?;
        if meta.is_dir() {
            walk_files(&path, visit)?;
        } else if meta.is_file() {
            visit(&path, &meta);
        }
    }
    Ok(())
}

fn snapshots_in(root: &Path) -> Result<Vec<(u64, PathBuf)>, StoreError> {
    let mut found = Vec::new();
    walk_files(root, &mut |path, _| {
        let tick = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_snapshot_file_name);
        if let Some(tick) = tick {
            found.push((tick, path.to_path_buf()));
        }
    })?;
    found.sort();
    Ok(found)
}

fn list_ticks_in(root: &Path) -> Result<Vec<u64>, StoreError> {
    let mut ticks: Vec<u64> = snapshots_in(root)?.into_iter().map(|(t, _)| t).collect();
    ticks.dedup();
    Ok(ticks)
}

fn latest_tick_in(root: &Path) -> Result<Option<u64>, StoreError> {
    Ok(list_ticks_in(root)?.last().copied())
}

/// Path of the stored snapshot for `tick`, whatever bucket size it was saved with
fn find_snapshot(root: &Path, tick: u64) -> Result<PathBuf, StoreError> {
    snapshots_in(root)?
        .into_iter()
        .find(|(t, _)| *t == tick)
        .map(|(_, path)| path)
        .ok_or(StoreError::MissingSnapshot { tick })
}

fn read_snapshot(path: &Path) -> Result<Ecosystem, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let tick = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_snapshot_file_name)
                .unwrap_or(0);
            return Err(StoreError::MissingSnapshot { tick });
        }
        Err(e) => return Err(StoreError::fs(path, e)),
    };
    let corrupt = |source: SnapshotError| StoreError::CorruptSnapshot {
        path: path.to_path_buf(),
        source,
    };
    Snapshot::from_compressed(&bytes)
        .and_then(Snapshot::decode)
        .map_err(corrupt)
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
