use crate::analysis::Analysis;
use crate::data::Table;
use crate::error::{AnalysisError, Result};
use indexmap::IndexMap;
use log::debug;
use fd_lock::RwLock as FileLock;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Persistence for uploaded tables and saved analyses, keyed by generated id.
///
/// Implementations must be safe to share between requests; writes to the same
/// record are last-write-wins.
pub trait Store: Send + Sync {
    fn insert_table(&self, table: Table) -> Result<()>;
    fn table(&self, id: &str) -> Result<Option<Table>>;
    fn tables_for(&self, owner: &str) -> Result<Vec<Table>>;

    /// Insert or replace.
    fn put_analysis(&self, analysis: Analysis) -> Result<()>;
    fn analysis(&self, id: &str) -> Result<Option<Analysis>>;
    fn analyses_for(&self, owner: &str) -> Result<Vec<Analysis>>;
    /// Hard delete; returns whether anything was removed.
    fn remove_analysis(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    tables: IndexMap<String, Table>,
    #[serde(default)]
    analyses: IndexMap<String, Analysis>,
}

impl Database {
    fn tables_for(&self, owner: &str) -> Vec<Table> {
        self.tables.values().filter(|t| t.owner == owner).cloned().collect()
    }

    fn analyses_for(&self, owner: &str) -> Vec<Analysis> {
        self.analyses.values().filter(|a| a.owner == owner).cloned().collect()
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    db: RwLock<Database>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert_table(&self, table: Table) -> Result<()> {
        self.db.write().tables.insert(table.id.clone(), table);
        Ok(())
    }

    fn table(&self, id: &str) -> Result<Option<Table>> {
        Ok(self.db.read().tables.get(id).cloned())
    }

    fn tables_for(&self, owner: &str) -> Result<Vec<Table>> {
        Ok(self.db.read().tables_for(owner))
    }

    fn put_analysis(&self, analysis: Analysis) -> Result<()> {
        self.db.write().analyses.insert(analysis.id.clone(), analysis);
        Ok(())
    }

    fn analysis(&self, id: &str) -> Result<Option<Analysis>> {
        Ok(self.db.read().analyses.get(id).cloned())
    }

    fn analyses_for(&self, owner: &str) -> Result<Vec<Analysis>> {
        Ok(self.db.read().analyses_for(owner))
    }

    fn remove_analysis(&self, id: &str) -> Result<bool> {
        Ok(self.db.write().analyses.shift_remove(id).is_some())
    }
}

/// Single JSON document on disk, shared by every handle opened on the same
/// directory.
///
/// Reads load the current file. Mutations hold an exclusive lock on
/// `store.lock`, re-read the file, apply the change to that fresh copy and
/// atomically replace the file with it; nothing is kept in memory.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    pub const FILE_NAME: &'static str = "store.json";
    pub const LOCK_FILE_NAME: &'static str = "store.lock";

    /// Open (or start) the store file inside `dir`. A corrupt file fails here.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let store = Self {
            dir: dir.to_path_buf(),
            path: dir.join(Self::FILE_NAME),
            lock_path: dir.join(Self::LOCK_FILE_NAME),
        };
        store.load()?;
        debug!("Opened store at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Database> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AnalysisError::Storage(format!("Corrupt store file '{}': {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Database::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&self, db: &Database) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(db)
            .map_err(|e| AnalysisError::Storage(format!("Failed to serialize store: {}", e)))?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path).map_err(|e| {
            AnalysisError::Storage(format!("Failed to replace '{}': {}", self.path.display(), e))
        })?;
        Ok(())
    }

    /// Locked read-modify-write. The file is untouched when any step fails.
    fn mutate<T>(&self, f: impl FnOnce(&mut Database) -> T) -> Result<T> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let mut lock = FileLock::new(file);
        let _guard = lock.write()?;

        let mut db = self.load()?;
        let out = f(&mut db);
        self.flush(&db)?;
        Ok(out)
    }
}

impl Store for JsonFileStore {
    fn insert_table(&self, table: Table) -> Result<()> {
        self.mutate(|db| {
            db.tables.insert(table.id.clone(), table);
        })
    }

    fn table(&self, id: &str) -> Result<Option<Table>> {
        Ok(self.load()?.tables.shift_remove(id))
    }

    fn tables_for(&self, owner: &str) -> Result<Vec<Table>> {
        Ok(self.load()?.tables_for(owner))
    }

    fn put_analysis(&self, analysis: Analysis) -> Result<()> {
        self.mutate(|db| {
            db.analyses.insert(analysis.id.clone(), analysis);
        })
    }

    fn analysis(&self, id: &str) -> Result<Option<Analysis>> {
        Ok(self.load()?.analyses.shift_remove(id))
    }

    fn analyses_for(&self, owner: &str) -> Result<Vec<Analysis>> {
        Ok(self.load()?.analyses_for(owner))
    }

    fn remove_analysis(&self, id: &str) -> Result<bool> {
        self.mutate(|db| db.analyses.shift_remove(id).is_some())
    }
}
