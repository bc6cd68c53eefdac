//! Marker categories and key encodings.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Stored `key -> marker` mapping of one category.
pub type MarkerMap = HashMap<String, String>;

/// Kind of object a marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Lineup name -> last modified timestamp.
    Lineup,
    /// `(station_id, date)` -> schedule day md5.
    Schedule,
    /// Program ID -> program md5.
    Program,
}

impl Category {
    /// All categories, in sync order.
    pub const ALL: [Self; 3] = [Self::Lineup, Self::Schedule, Self::Program];

    /// Stable name used as the storage discriminator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lineup => "lineup",
            Self::Schedule => "schedule",
            Self::Program => "program",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one station's schedule for one broadcast day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey {
    /// Station ID.
    pub station_id: String,
    /// Broadcast day (`YYYY-MM-DD`).
    pub date: String,
}

impl ScheduleKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(station_id: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            date: date.into(),
        }
    }

    /// Encodes as `"{station_id}/{date}"` for storage.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}/{}", self.station_id, self.date)
    }

    /// Decodes a stored key. The date never contains `/`, so the last
    /// separator splits the two parts.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let (station_id, date) = raw.rsplit_once('/')?;
        if station_id.is_empty() || date.is_empty() {
            return None;
        }
        Some(Self::new(station_id, date))
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.station_id, self.date)
    }
}

/// Loads every marker of `category`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn load_markers(conn: &Connection, category: Category) -> Result<MarkerMap> {
    let mut stmt = conn
        .prepare("SELECT key, marker FROM change_markers WHERE category = ?1")
        .context("failed to prepare change_markers query")?;

    let rows = stmt
        .query_map([category.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .with_context(|| format!("failed to query {category} markers"))?;

    rows.collect::<std::result::Result<MarkerMap, _>>()
        .with_context(|| format!("failed to read {category} markers"))
}

/// Replaces every marker of `category` in one transaction.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn replace_markers(conn: &Connection, category: Category, markers: &MarkerMap) -> Result<()> {
    replace_categories(conn, &[(category, markers)])
}

/// Replaces several categories in one transaction. Either every category
/// is written or none is.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn replace_categories(conn: &Connection, batches: &[(Category, &MarkerMap)]) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin transaction")?;

    for &(category, markers) in batches {
        write_category(&tx, category, markers)?;
    }

    tx.commit().context("failed to commit markers")?;
    Ok(())
}

fn write_category(conn: &Connection, category: Category, markers: &MarkerMap) -> Result<()> {
    conn.execute(
        "DELETE FROM change_markers WHERE category = ?1",
        [category.as_str()],
    )
    .with_context(|| format!("failed to clear {category} markers"))?;

    let mut stmt = conn
        .prepare_cached("INSERT INTO change_markers (category, key, marker) VALUES (?1, ?2, ?3)")
        .context("failed to prepare change_markers insert")?;

    for (key, marker) in markers {
        stmt.execute(rusqlite::params![category.as_str(), key, marker])
            .with_context(|| format!("failed to insert {category} marker {key}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::connection::open_in_memory;

    fn setup_db() -> Connection {
        open_in_memory().unwrap()
    }

    #[test]
    fn test_schedule_key_encode_decode() {
        // Arrange
        let key = ScheduleKey::new("10021", "2019-03-01");

        // Act
        let encoded = key.encode();
        let decoded = ScheduleKey::decode(&encoded);

        // Assert
        assert_eq!(encoded, "10021/2019-03-01");
        assert_eq!(decoded, Some(key));
    }

    #[test]
    fn test_schedule_key_decode_rejects_malformed() {
        // Arrange & Act & Assert
        assert_eq!(ScheduleKey::decode("10021"), None);
        assert_eq!(ScheduleKey::decode("/2019-03-01"), None);
        assert_eq!(ScheduleKey::decode("10021/"), None);
    }

    #[test]
    fn test_save_and_load_markers() {
        // Arrange
        let conn = setup_db();
        let markers = MarkerMap::from([
            (String::from("USA-IL57303-X"), String::from("2019-02-15T14:01:03Z")),
            (String::from("USA-OTA-60030"), String::from("2019-01-02T00:00:00Z")),
        ]);

        // Act
        replace_markers(&conn, Category::Lineup, &markers).unwrap();
        let loaded = load_markers(&conn, Category::Lineup).unwrap();

        // Assert
        assert_eq!(loaded, markers);
    }

    #[test]
    fn test_categories_are_independent() {
        // Arrange
        let conn = setup_db();
        let programs = MarkerMap::from([(String::from("EP018632100004"), String::from("J+AO"))]);

        // Act
        replace_markers(&conn, Category::Program, &programs).unwrap();
        let lineups = load_markers(&conn, Category::Lineup).unwrap();
        let loaded = load_markers(&conn, Category::Program).unwrap();

        // Assert
        assert!(lineups.is_empty());
        assert_eq!(loaded, programs);
    }

    #[test]
    fn test_replace_categories_rolls_back_on_failure() {
        // Arrange
        let conn = setup_db();
        let lineups = MarkerMap::from([(String::from("USA-OTA-60030"), String::from("t1"))]);
        replace_markers(&conn, Category::Lineup, &lineups).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_programs BEFORE INSERT ON change_markers
             WHEN NEW.category = 'program'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
        let programs = MarkerMap::from([(String::from("EP018632100004"), String::from("m"))]);
        let schedules = MarkerMap::from([(String::from("10021/2019-03-01"), String::from("d"))]);
        let changed = MarkerMap::from([(String::from("USA-OTA-60030"), String::from("t2"))]);

        // Act
        let result = replace_categories(
            &conn,
            &[
                (Category::Schedule, &schedules),
                (Category::Program, &programs),
                (Category::Lineup, &changed),
            ],
        );

        // Assert
        assert!(result.is_err());
        assert!(load_markers(&conn, Category::Schedule).unwrap().is_empty());
        assert_eq!(load_markers(&conn, Category::Lineup).unwrap(), lineups);
    }

    #[test]
    fn test_replace_drops_previous_rows() {
        // Arrange
        let conn = setup_db();
        let old = MarkerMap::from([(String::from("a"), String::from("1"))]);
        let new = MarkerMap::from([(String::from("b"), String::from("2"))]);
        replace_markers(&conn, Category::Program, &old).unwrap();

        // Act
        replace_markers(&conn, Category::Program, &new).unwrap();
        let loaded = load_markers(&conn, Category::Program).unwrap();

        // Assert
        assert_eq!(loaded, new);
    }
}
