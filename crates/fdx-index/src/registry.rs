//! Catalog of indexed roots.
//!
//! The registry records, for every indexed root, where its index lives, the
//! settings it was scanned with and when it was last fully scanned. The catalog
//! is a single `registry.json` in the data directory, rewritten atomically.
//!
//! Data directory resolution:
//! - `FDX_DATA_DIR` if set
//! - otherwise the platform data directory for `fdx`

use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    hash::{Hash, Hasher},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use fdx_config::IndexingSettings;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher24;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::RegistryError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "FDX_DATA_DIR";

/// Current schema version. Bump this when index field definitions change.
pub const SCHEMA_VERSION: u32 = 1;

/// Catalog file name inside the data directory.
const REGISTRY_FILE: &str = "registry.json";

/// Subdirectory holding one index per root.
const INDEXES_DIR: &str = "indexes";

/// Marker file of a Tantivy index.
const INDEX_META: &str = "meta.json";

/// Returns the data directory, honouring `FDX_DATA_DIR`.
pub fn default_data_dir() -> Result<PathBuf, RegistryError> {
    if let Some(dir) = env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("", "", "fdx")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(RegistryError::NoDataDirectory)
}

/// Settings that change what a scan produces, hashed to detect stale indexes.
#[derive(Hash)]
struct ScanFingerprint<'a> {
    /// Schema version.
    schema_version: u32,
    /// Ignore patterns in order.
    ignore_patterns: &'a [String],
    /// Content size limit in MiB.
    max_file_size: u64,
    /// Hidden-file policy.
    include_hidden: bool,
    /// Symlink policy.
    follow_symlinks: bool,
    /// Content indexing switch.
    content: bool,
}

/// Computes the hex hash of the scan-affecting settings.
pub fn config_hash(settings: &IndexingSettings) -> String {
    let fingerprint = ScanFingerprint {
        schema_version: SCHEMA_VERSION,
        ignore_patterns: &settings.ignore_patterns,
        max_file_size: settings.max_file_size,
        include_hidden: settings.include_hidden,
        follow_symlinks: settings.follow_symlinks,
        content: settings.content,
    };
    let mut hasher = SipHasher24::new();
    fingerprint.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Status of a root's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// Index exists and was built with the current settings.
    Current,
    /// Index exists but the settings changed since the last full scan.
    ConfigChanged,
    /// No usable index exists.
    Missing,
}

impl IndexStatus {
    /// Returns a human-readable description for display.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::ConfigChanged => "stale (config changed)",
            Self::Missing => "missing",
        }
    }

    /// Returns true if the index needs a full rebuild.
    pub fn needs_rebuild(&self) -> bool {
        !matches!(self, Self::Current)
    }
}

/// One indexed root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoot {
    /// Canonical root directory.
    pub root_path: PathBuf,
    /// Directory holding the Tantivy index.
    pub index_location: PathBuf,
    /// Settings used for scans of this root, including its ignore rules.
    pub settings: IndexingSettings,
    /// Completion time of the last full scan.
    pub last_full_scan_time: Option<DateTime<Utc>>,
    /// Hash of the settings at the last full scan.
    pub config_hash: Option<String>,
    /// Entries written by the last full scan.
    pub entry_count: u64,
}

impl IndexRoot {
    /// Returns the ignore rules in declaration order.
    pub fn ignore_rules(&self) -> &[String] {
        &self.settings.ignore_patterns
    }

    /// Compares the stored index with `current` settings.
    pub fn status(&self, current: &IndexingSettings) -> IndexStatus {
        if self.last_full_scan_time.is_none() || !self.index_location.join(INDEX_META).exists() {
            return IndexStatus::Missing;
        }
        match &self.config_hash {
            Some(hash) if *hash == config_hash(current) => IndexStatus::Current,
            _ => IndexStatus::ConfigChanged,
        }
    }
}

/// On-disk catalog layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    /// Catalog format version.
    #[serde(default)]
    version: u32,
    /// Registered roots.
    #[serde(default)]
    roots: Vec<IndexRoot>,
}

/// The catalog of indexed roots.
///
/// Mutations of one root are serialized through [`Registry::root_lock`]; the
/// map itself sits behind a read-write lock, so unrelated roots never wait on
/// each other's scans.
pub struct Registry {
    /// Data directory.
    data_dir: PathBuf,
    /// Registered roots by canonical path.
    roots: RwLock<BTreeMap<PathBuf, IndexRoot>>,
    /// Per-root mutation locks.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Registry {
    /// Opens the registry in `data_dir`, creating it if needed.
    pub fn open(data_dir: &Path) -> Result<Self, RegistryError> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(REGISTRY_FILE);

        let catalog = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str::<Catalog>(&contents)
                .map_err(|source| RegistryError::Parse { path, source })?
        } else {
            Catalog::default()
        };

        let roots = catalog
            .roots
            .into_iter()
            .map(|root| (root.root_path.clone(), root))
            .collect();
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            roots: RwLock::new(roots),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Opens the registry in the default data directory.
    pub fn open_default() -> Result<Self, RegistryError> {
        Self::open(&default_data_dir()?)
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the index directory assigned to a canonical root.
    pub fn index_location(&self, root: &Path) -> PathBuf {
        let mut hasher = SipHasher24::new();
        root.to_string_lossy().hash(&mut hasher);
        self.data_dir
            .join(INDEXES_DIR)
            .join(format!("{:016x}", hasher.finish()))
    }

    /// Returns the lock serializing mutations of `root`.
    pub fn root_lock(&self, root: &Path) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(root.to_path_buf())
            .or_default()
            .clone()
    }

    /// Registers a canonical root, or updates the settings of a known one.
    ///
    /// A new root gets an index location but no scan time; its status stays
    /// [`IndexStatus::Missing`] until [`Registry::record_scan`].
    pub fn register(
        &self,
        root: &Path,
        settings: &IndexingSettings,
    ) -> Result<IndexRoot, RegistryError> {
        let mut roots = self.roots.write();
        let index_location = self.index_location(root);
        let entry = roots
            .entry(root.to_path_buf())
            .and_modify(|existing| existing.settings = settings.clone())
            .or_insert_with(|| IndexRoot {
                root_path: root.to_path_buf(),
                index_location,
                settings: settings.clone(),
                last_full_scan_time: None,
                config_hash: None,
                entry_count: 0,
            })
            .clone();
        self.persist(&roots)?;
        debug!(root = %root.display(), "registered root");
        Ok(entry)
    }

    /// Records a completed full scan.
    pub fn record_scan(
        &self,
        root: &Path,
        time: DateTime<Utc>,
        entries: u64,
    ) -> Result<IndexRoot, RegistryError> {
        let mut roots = self.roots.write();
        let entry = roots
            .get_mut(root)
            .ok_or_else(|| RegistryError::NotRegistered(root.to_path_buf()))?;
        entry.last_full_scan_time = Some(time);
        entry.config_hash = Some(config_hash(&entry.settings));
        entry.entry_count = entries;
        let updated = entry.clone();
        self.persist(&roots)?;
        Ok(updated)
    }

    /// Unregisters a root and deletes its index directory.
    pub fn remove(&self, root: &Path) -> Result<IndexRoot, RegistryError> {
        let mut roots = self.roots.write();
        let removed = roots
            .remove(root)
            .ok_or_else(|| RegistryError::NotRegistered(root.to_path_buf()))?;
        self.persist(&roots)?;
        drop(roots);

        if removed.index_location.exists() {
            fs::remove_dir_all(&removed.index_location)?;
        }
        self.locks.lock().remove(root);
        info!(root = %root.display(), "removed root");
        Ok(removed)
    }

    /// Returns all registered roots, sorted by path.
    pub fn list(&self) -> Vec<IndexRoot> {
        self.roots.read().values().cloned().collect()
    }

    /// Returns the registration for an exact root.
    pub fn get(&self, root: &Path) -> Option<IndexRoot> {
        self.roots.read().get(root).cloned()
    }

    /// Returns the innermost registered root containing `path`.
    pub fn lookup_containing(&self, path: &Path) -> Option<IndexRoot> {
        self.roots
            .read()
            .values()
            .filter(|root| path.starts_with(&root.root_path))
            .max_by_key(|root| root.root_path.components().count())
            .cloned()
    }

    /// Writes the catalog atomically.
    fn persist(&self, roots: &BTreeMap<PathBuf, IndexRoot>) -> Result<(), RegistryError> {
        let catalog = Catalog {
            version: SCHEMA_VERSION,
            roots: roots.values().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&catalog).map_err(RegistryError::Serialize)?;

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(self.data_dir.join(REGISTRY_FILE))
            .map_err(|e| e.error)?;
        Ok(())
    }
}
