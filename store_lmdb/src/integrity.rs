//! LMDB database integrity checks.
//!
//! Run on startup to detect corruption early, before the server begins
//! accepting sessions.

use std::path::Path;
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::Env;

use kyc_types::KycSession;

use crate::environment::SESSIONS_DB;
use crate::LmdbError;

/// Summary of an integrity check run.
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Returns `true` if no errors were detected.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Databases that we expect to exist in a valid environment.
const EXPECTED_DATABASES: &[&str] = &[SESSIONS_DB];

/// Check LMDB database integrity on startup.
///
/// Opens each expected database and decodes every entry. Undecodable records
/// are recorded in the report rather than causing a hard error.
pub fn check_integrity(env: &Arc<Env>) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport {
        databases_checked: 0,
        total_entries: 0,
        errors: Vec::new(),
    };

    let rtxn = env.read_txn()?;

    for &db_name in EXPECTED_DATABASES {
        let db = match env.open_database::<Str, Bytes>(&rtxn, Some(db_name)) {
            Ok(Some(db)) => db,
            Ok(None) => {
                report
                    .errors
                    .push(format!("database '{db_name}' is missing"));
                continue;
            }
            Err(e) => {
                report
                    .errors
                    .push(format!("failed to open database '{db_name}': {e}"));
                continue;
            }
        };
        report.databases_checked += 1;

        let iter = match db.iter(&rtxn) {
            Ok(iter) => iter,
            Err(e) => {
                report
                    .errors
                    .push(format!("failed to read database '{db_name}': {e}"));
                continue;
            }
        };
        for entry in iter {
            match entry {
                Ok((key, bytes)) => {
                    report.total_entries += 1;
                    if let Err(e) = bincode::deserialize::<KycSession>(bytes) {
                        report
                            .errors
                            .push(format!("undecodable record '{key}' in '{db_name}': {e}"));
                    }
                }
                Err(e) => {
                    report
                        .errors
                        .push(format!("cursor error in '{db_name}': {e}"));
                    break;
                }
            }
        }
    }

    Ok(report)
}

/// Check if the LMDB data directory looks valid before opening.
///
/// Returns `Ok(())` for a fresh (nonexistent or empty) directory. Returns an
/// error if the directory has contents but `data.mdb` is missing, which
/// suggests corruption or a misconfigured path.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let is_empty = std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    if is_empty {
        return Ok(());
    }
    let data_file = path.join("data.mdb");
    if !data_file.exists() {
        return Err(format!(
            "LMDB directory exists but data.mdb is missing at {}",
            path.display()
        ));
    }
    Ok(())
}
