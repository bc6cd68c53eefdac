//! Change tracking for incremental Schedules Direct syncs.
//!
//! Holds the last-seen version marker of every lineup, schedule day and
//! program, persisted with `rusqlite` (bundled `SQLite`) between runs, and
//! the diff engine that compares fresh markers against that state.

mod connection;
/// Hash/marker diff engine.
pub mod diff;
/// Marker categories and key encodings.
pub mod markers;
mod migrations;
/// `ChangeStore` implementations.
pub mod store;

pub use connection::{DB_FILE_NAME, db_path, open_db, open_in_memory};
pub use diff::{Diff, diff};
pub use markers::{Category, MarkerMap, ScheduleKey};
#[allow(clippy::module_name_repetitions)]
pub use store::{ChangeSet, ChangeStore, MemoryStore, NullStore, SqliteStore};
