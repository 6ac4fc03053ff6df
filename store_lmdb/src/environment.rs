//! LMDB environment setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use tracing::info;

use crate::session::LmdbSessionStore;
use crate::LmdbError;

/// Name of the database holding session records.
pub const SESSIONS_DB: &str = "sessions";

/// Default maximum map size: 1 GiB. Session records are small.
pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    sessions_db: Database<Str, Bytes>,
    path: PathBuf,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process per path; the
        // server never opens the same directory twice concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let sessions_db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some(SESSIONS_DB))?;
        wtxn.commit()?;

        info!(path = %path.display(), "opened LMDB environment");

        Ok(Self {
            env: Arc::new(env),
            sessions_db,
            path: path.to_path_buf(),
        })
    }

    /// The underlying environment, shared with integrity checks.
    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush pending writes to disk.
    pub fn sync(&self) -> Result<(), LmdbError> {
        self.env.force_sync()?;
        Ok(())
    }

    /// A session store backed by this environment.
    pub fn session_store(&self) -> LmdbSessionStore {
        LmdbSessionStore {
            env: self.env.clone(),
            sessions_db: self.sessions_db,
        }
    }
}
