use chrono::{NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{AppError, AppResult};

/// Максимальное количество хранимых бэкапов
const MAX_BACKUPS: usize = 30;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const MAX_SAME_SECOND: u32 = 99;

fn ensure_backup_dir(backup_dir: &Path) -> AppResult<()> {
    if !backup_dir.exists() {
        fs::create_dir_all(backup_dir)?;
        log::info!("Created backup directory: {}", backup_dir.display());
    }
    Ok(())
}

/// Creates a timestamped copy of the database and prunes old copies.
///
/// SQLite's `VACUUM INTO` is used so the copy is consistent even while other
/// connections write (WAL contents included).
///
/// # Returns
///
/// Path of the new backup.
pub fn create_backup(conn: &rusqlite::Connection, db_path: &Path, backup_dir: &Path) -> AppResult<PathBuf> {
    ensure_backup_dir(backup_dir)?;

    let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let db_name = db_path.file_name().and_then(|n| n.to_str()).unwrap_or("data.db");
    let backup_path = free_backup_path(backup_dir, &timestamp, db_name)?;

    let target = backup_path
        .to_str()
        .ok_or_else(|| AppError::Validation("Backup path is not valid UTF-8".to_string()))?;
    conn.execute("VACUUM INTO ?1", [target])?;
    log::info!("Created backup: {}", backup_path.display());

    cleanup_old_backups(backup_dir)?;

    Ok(backup_path)
}

/// `<timestamp>_<name>`, or `<timestamp>_<n>_<name>` for further backups in the same second
fn free_backup_path(backup_dir: &Path, timestamp: &str, db_name: &str) -> AppResult<PathBuf> {
    let first = backup_dir.join(format!("{}_{}", timestamp, db_name));
    if !first.exists() {
        return Ok(first);
    }
    (1..=MAX_SAME_SECOND)
        .map(|n| backup_dir.join(format!("{}_{}_{}", timestamp, n, db_name)))
        .find(|path| !path.exists())
        .ok_or_else(|| AppError::Conflict(format!("Too many backups at {}", timestamp)))
}

/// Sequence number after the timestamp, 0 for the first backup of a second
fn backup_sequence(file_name: &str) -> u32 {
    file_name
        .get(16..)
        .and_then(|rest| rest.split_once('_'))
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

/// Удаляет старые бэкапы, оставляя только последние MAX_BACKUPS
fn cleanup_old_backups(backup_dir: &Path) -> AppResult<()> {
    let backups = list_backups(backup_dir)?;

    for (path, _) in backups.iter().skip(MAX_BACKUPS) {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove old backup {}: {}", path.display(), e);
        } else {
            log::info!("Removed old backup: {}", path.display());
        }
    }

    Ok(())
}

/// Lists backups, newest first
pub fn list_backups(backup_dir: &Path) -> AppResult<Vec<(PathBuf, NaiveDateTime)>> {
    let mut backups: Vec<(PathBuf, NaiveDateTime, u32)> = Vec::new();
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }

    for entry in fs::read_dir(backup_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        // Формат: YYYYMMDD_HHMMSS[_N]_data.db
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stamp) = name.get(0..15) else {
            continue;
        };
        if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) {
            let sequence = backup_sequence(name);
            backups.push((path, dt, sequence));
        }
    }

    backups.sort_by(|a, b| (b.1, b.2).cmp(&(a.1, a.2)));
    Ok(backups.into_iter().map(|(path, dt, _)| (path, dt)).collect())
}
