//! Change database location and connection setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::migrations::run_migrations;

/// File name of the change database inside a data directory.
pub const DB_FILE_NAME: &str = "sdsync.db";

/// How long a writer waits for another process holding the lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Location of the change database.
///
/// `{dir}/sdsync.db` when `dir` is given, else
/// `$XDG_DATA_HOME/sdsync/sdsync.db`, else `~/.local/share/sdsync/sdsync.db`.
///
/// # Errors
///
/// Returns an error if neither `XDG_DATA_HOME` nor `HOME` is set (when `dir` is `None`).
pub fn db_path(dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(d) = dir {
        return Ok(d.join(DB_FILE_NAME));
    }

    let data_home = match std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => {
            let home = std::env::var("HOME").context("HOME environment variable is not set")?;
            PathBuf::from(home).join(".local").join("share")
        }
    };
    Ok(data_home.join("sdsync").join(DB_FILE_NAME))
}

/// Opens (or creates) the change database at `path` and migrates it.
///
/// Missing parent directories are created.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created, or a
/// migration fails.
pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    prepare(&conn)?;

    tracing::debug!(path = %path.display(), "change store opened");
    Ok(conn)
}

/// Opens a migrated database that lives only as long as the connection.
///
/// # Errors
///
/// Returns an error if `SQLite` cannot allocate the database or a migration fails.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    run_migrations(conn).context("database migration failed")
}
