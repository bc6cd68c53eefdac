//! Persisted change state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use rusqlite::Connection;

use super::connection::{db_path, open_db, open_in_memory};
use super::markers::{
    Category, MarkerMap, ScheduleKey, load_markers, replace_categories, replace_markers,
};

/// Durable `key -> marker` storage, one map per [`Category`].
///
/// `load` returns an empty map when nothing was stored yet, so a first run
/// treats every object as changed. `save` overwrites the whole category.
pub trait ChangeStore {
    /// Loads the stored markers of `category`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self, category: Category) -> Result<MarkerMap>;

    /// Replaces the stored markers of `category`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, category: Category, markers: &MarkerMap) -> Result<()>;

    /// Replaces several categories at once, in the given order.
    ///
    /// The default saves one category at a time and stops at the first
    /// failure. Stores that can write atomically override it.
    ///
    /// # Errors
    ///
    /// Returns an error if any category cannot be written.
    fn save_all(&self, batches: &[(Category, &MarkerMap)]) -> Result<()> {
        for &(category, markers) in batches {
            self.save(category, markers)?;
        }
        Ok(())
    }
}

impl<S: ChangeStore + ?Sized> ChangeStore for &S {
    fn load(&self, category: Category) -> Result<MarkerMap> {
        (**self).load(category)
    }

    fn save(&self, category: Category, markers: &MarkerMap) -> Result<()> {
        (**self).save(category, markers)
    }

    fn save_all(&self, batches: &[(Category, &MarkerMap)]) -> Result<()> {
        (**self).save_all(batches)
    }
}

/// `SQLite`-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wraps an already migrated connection.
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens `{dir}/sdsync.db` (or the default data path).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(dir: Option<&PathBuf>) -> Result<Self> {
        Self::open_at(&db_path(dir)?)
    }

    /// Opens the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        open_db(path).map(Self::new)
    }

    /// Opens a store that forgets everything when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        open_in_memory().map(Self::new)
    }

    /// Deletes every stored marker, forcing the next run to fetch everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<()> {
        let empty = MarkerMap::new();
        let batches = Category::ALL.map(|category| (category, &empty));
        replace_categories(&self.conn, &batches)
    }
}

impl ChangeStore for SqliteStore {
    fn load(&self, category: Category) -> Result<MarkerMap> {
        load_markers(&self.conn, category)
    }

    fn save(&self, category: Category, markers: &MarkerMap) -> Result<()> {
        replace_markers(&self.conn, category, markers)?;
        tracing::debug!(%category, count = markers.len(), "markers saved");
        Ok(())
    }

    fn save_all(&self, batches: &[(Category, &MarkerMap)]) -> Result<()> {
        replace_categories(&self.conn, batches)?;
        tracing::debug!(categories = batches.len(), "markers saved");
        Ok(())
    }
}

/// Store that remembers nothing: every fetch is treated as changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl ChangeStore for NullStore {
    fn load(&self, _category: Category) -> Result<MarkerMap> {
        Ok(MarkerMap::new())
    }

    fn save(&self, _category: Category, _markers: &MarkerMap) -> Result<()> {
        Ok(())
    }
}

/// In-process store. Keeps state for the lifetime of the value and counts
/// `save` calls.
#[derive(Debug, Default)]
pub struct MemoryStore {
    maps: Mutex<HashMap<Category, MarkerMap>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far (all categories).
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ChangeStore for MemoryStore {
    fn load(&self, category: Category) -> Result<MarkerMap> {
        let maps = self
            .maps
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(maps.get(&category).cloned().unwrap_or_default())
    }

    fn save(&self, category: Category, markers: &MarkerMap) -> Result<()> {
        let mut maps = self
            .maps
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        maps.insert(category, markers.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Markers accumulated during one sync run.
///
/// Each category is loaded from the store when its phase starts, mutated
/// by the diff engine, and written back only by [`ChangeSet::commit`].
#[derive(Debug, Default)]
pub struct ChangeSet {
    lineups: Option<MarkerMap>,
    schedules: Option<HashMap<ScheduleKey, String>>,
    programs: Option<MarkerMap>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads lineup markers from `store`, replacing any in-memory state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn reload_lineups(&mut self, store: &impl ChangeStore) -> Result<&mut MarkerMap> {
        let loaded = store.load(Category::Lineup)?;
        Ok(self.lineups.insert(loaded))
    }

    /// Loads schedule markers from `store`, replacing any in-memory state.
    /// Stored keys that cannot be decoded are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn reload_schedules(
        &mut self,
        store: &impl ChangeStore,
    ) -> Result<&mut HashMap<ScheduleKey, String>> {
        let loaded = store.load(Category::Schedule)?;
        let mut decoded = HashMap::with_capacity(loaded.len());
        for (raw, marker) in loaded {
            if let Some(key) = ScheduleKey::decode(&raw) {
                decoded.insert(key, marker);
            } else {
                tracing::warn!(key = %raw, "dropping malformed schedule marker key");
            }
        }
        Ok(self.schedules.insert(decoded))
    }

    /// Loads program markers from `store`, replacing any in-memory state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn reload_programs(&mut self, store: &impl ChangeStore) -> Result<&mut MarkerMap> {
        let loaded = store.load(Category::Program)?;
        Ok(self.programs.insert(loaded))
    }

    /// Forgets a schedule day so the next run sees it as changed.
    /// Returns `true` if the key was present.
    pub fn evict_schedule(&mut self, key: &ScheduleKey) -> bool {
        self.schedules
            .as_mut()
            .is_some_and(|s| s.remove(key).is_some())
    }

    /// In-memory lineup markers, if loaded.
    #[must_use]
    pub const fn lineups(&self) -> Option<&MarkerMap> {
        self.lineups.as_ref()
    }

    /// In-memory schedule markers, if loaded.
    #[must_use]
    pub const fn schedules(&self) -> Option<&HashMap<ScheduleKey, String>> {
        self.schedules.as_ref()
    }

    /// In-memory program markers, if loaded.
    #[must_use]
    pub const fn programs(&self) -> Option<&MarkerMap> {
        self.programs.as_ref()
    }

    /// Writes every loaded category back to `store` through one
    /// [`ChangeStore::save_all`] call and clears the set.
    ///
    /// Categories are passed programs first and lineups last, so a store
    /// that writes them one by one never keeps lineup markers whose
    /// programs were lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write. The set is left
    /// untouched in that case.
    pub fn commit(&mut self, store: &impl ChangeStore) -> Result<()> {
        let schedules: Option<MarkerMap> = self.schedules.as_ref().map(|schedules| {
            schedules
                .iter()
                .map(|(key, marker)| (key.encode(), marker.clone()))
                .collect()
        });

        let batches: Vec<(Category, &MarkerMap)> = [
            (Category::Program, self.programs.as_ref()),
            (Category::Schedule, schedules.as_ref()),
            (Category::Lineup, self.lineups.as_ref()),
        ]
        .into_iter()
        .filter_map(|(category, markers)| markers.map(|m| (category, m)))
        .collect();

        if !batches.is_empty() {
            store.save_all(&batches)?;
        }
        *self = Self::default();
        Ok(())
    }
}
