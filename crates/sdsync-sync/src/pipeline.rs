//! Incremental sync pipeline.
//!
//! Each phase diffs server-supplied change markers against the stored state
//! and fetches only what changed:
//!
//! 1. [`SyncPipeline::get_lineups`]: status -> changed lineups -> station IDs
//! 2. [`SyncPipeline::get_schedules`]: day digests -> changed days -> program digests
//! 3. [`SyncPipeline::get_programs`]: changed programs, merged in batches of 500
//!
//! Markers are written back only when the program cursor is exhausted.
#![allow(clippy::future_not_send)]

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{Context, Result};
use sdsync_api::{
    LocalSdApi, Lineup, MAX_PROGRAMS_PER_REQUEST, MAX_STATIONS_PER_REQUEST, Program,
    ProgramPayload, Schedule, ScheduleEntry, ScheduleFailure, ScheduleSlot, Station, StationDays,
    artwork_key,
};
use sdsync_db::{ChangeSet, ChangeStore, ScheduleKey, diff};
use tracing::instrument;

use super::filter::ChannelFilter;

/// Progress of a pipeline through one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No phase has run yet.
    Idle,
    /// Lineups were diffed and fetched.
    LineupsFetched,
    /// Schedules were diffed and fetched.
    SchedulesFetched,
    /// A program cursor is open.
    ProgramsFetching,
    /// The program cursor was exhausted and markers were saved.
    Committed,
}

/// Output of [`SyncPipeline::get_lineups`].
#[derive(Debug, Clone, Default)]
pub struct LineupPhase {
    /// Changed lineups, with all their stations.
    pub lineups: Vec<Lineup>,
    /// Unique station IDs selected for the schedules phase, in lineup order.
    pub station_ids: Vec<String>,
}

impl LineupPhase {
    /// Station index over all lineups. The first lineup listing a station wins.
    #[must_use]
    pub fn stations(&self) -> HashMap<String, Station> {
        let mut stations = HashMap::new();
        for station in self.lineups.iter().flat_map(|l| &l.stations) {
            stations
                .entry(station.id.clone())
                .or_insert_with(|| station.clone());
        }
        stations
    }
}

/// Output of [`SyncPipeline::get_schedules`].
#[derive(Debug, Clone, Default)]
pub struct SchedulePhase {
    /// Changed schedule days.
    pub schedules: Vec<Schedule>,
    /// `(program_id, md5)` of every airing in `schedules`.
    pub program_hashes: Vec<(String, String)>,
}

impl SchedulePhase {
    /// Airings grouped by program ID.
    #[must_use]
    pub fn airings(&self) -> HashMap<String, Vec<ScheduleSlot>> {
        let mut airings: HashMap<String, Vec<ScheduleSlot>> = HashMap::new();
        for slot in self.schedules.iter().flat_map(|s| &s.slots) {
            airings
                .entry(slot.program_id.clone())
                .or_default()
                .push(slot.clone());
        }
        airings
    }
}

/// Everything one full run produced.
#[derive(Debug, Clone, Default)]
pub struct SyncOutput {
    /// Changed lineups.
    pub lineups: Vec<Lineup>,
    /// Changed schedule days.
    pub schedules: Vec<Schedule>,
    /// Changed programs, merged.
    pub programs: Vec<Program>,
}

/// Incremental sync over an API client and a change store.
#[derive(Debug)]
pub struct SyncPipeline<A, S> {
    api: A,
    store: S,
    changes: ChangeSet,
    filter: ChannelFilter,
    phase: Phase,
}

impl<A: LocalSdApi, S: ChangeStore> SyncPipeline<A, S> {
    /// Creates a pipeline. `api` must already be logged in.
    pub fn new(api: A, store: S) -> Self {
        Self {
            api,
            store,
            changes: ChangeSet::new(),
            filter: ChannelFilter::default(),
            phase: Phase::Idle,
        }
    }

    /// Restricts the schedules phase to stations matching `filter`.
    #[must_use]
    pub fn with_channel_filter(mut self, filter: ChannelFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Underlying API client.
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Underlying change store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Diffs lineup modification times and fetches every changed lineup.
    ///
    /// Lineups flagged as deleted are ignored. Every station of a changed
    /// lineup that passes the channel filter is selected for the schedules
    /// phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the change store cannot be read or an API call
    /// fails (including `LoginRequired`).
    #[instrument(skip_all)]
    pub async fn get_lineups(&mut self) -> Result<LineupPhase> {
        let status = self.api.status().await.context("failed to fetch status")?;
        let current: Vec<(String, String)> = status
            .lineups
            .into_iter()
            .filter(|l| {
                if l.is_deleted {
                    tracing::debug!(lineup = %l.lineup, "skipping deleted lineup");
                }
                !l.is_deleted
            })
            .map(|l| (l.lineup, l.modified))
            .collect();

        let markers = self
            .changes
            .reload_lineups(&self.store)
            .context("failed to load lineup markers")?;
        let changed: Vec<String> = diff(markers, current).collect();

        let mut phase = LineupPhase::default();
        let mut seen = HashSet::new();
        for name in changed {
            let payload = self
                .api
                .lineup(&name)
                .await
                .with_context(|| format!("failed to fetch lineup {name}"))?;
            let lineup = Lineup::from_payload(name, payload);
            for station in &lineup.stations {
                if self.filter.matches(station) && seen.insert(station.id.clone()) {
                    phase.station_ids.push(station.id.clone());
                }
            }
            phase.lineups.push(lineup);
        }

        tracing::info!(
            changed = phase.lineups.len(),
            stations = phase.station_ids.len(),
            "lineups fetched"
        );
        self.phase = Phase::LineupsFetched;
        Ok(phase)
    }

    /// Diffs per-day schedule digests of the selected stations and fetches
    /// every changed day. Runs [`Self::get_lineups`] when `lineups` is `None`.
    ///
    /// Days the server reports as failed are evicted from the in-memory
    /// markers so the next run requests them again.
    ///
    /// # Errors
    ///
    /// Returns an error if the change store cannot be read or an API call
    /// fails.
    #[instrument(skip_all)]
    pub async fn get_schedules(&mut self, lineups: Option<&LineupPhase>) -> Result<SchedulePhase> {
        let fetched;
        let lineups = if let Some(l) = lineups {
            l
        } else {
            fetched = self.get_lineups().await?;
            &fetched
        };

        let mut hashes = Vec::new();
        for chunk in lineups.station_ids.chunks(MAX_STATIONS_PER_REQUEST) {
            tracing::debug!(stations = chunk.len(), "schedule digest batch");
            let batch = self
                .api
                .schedule_hashes(chunk)
                .await
                .context("failed to fetch schedule digests")?;
            hashes.extend(batch);
        }

        let current = hashes
            .into_iter()
            .map(|h| (ScheduleKey::new(h.station_id, h.date), h.md5));
        let markers = self
            .changes
            .reload_schedules(&self.store)
            .context("failed to load schedule markers")?;
        let changed: Vec<ScheduleKey> = diff(markers, current).collect();
        let requests = group_by_station(changed);

        let mut phase = SchedulePhase::default();
        for chunk in requests.chunks(MAX_STATIONS_PER_REQUEST) {
            tracing::debug!(stations = chunk.len(), "schedule batch");
            let entries = self
                .api
                .schedules(chunk)
                .await
                .context("failed to fetch schedules")?;
            for entry in entries {
                match entry {
                    ScheduleEntry::Day(payload) => {
                        let schedule = Schedule::from_payload(payload);
                        phase.program_hashes.extend(
                            schedule
                                .slots
                                .iter()
                                .map(|s| (s.program_id.clone(), s.md5.clone())),
                        );
                        phase.schedules.push(schedule);
                    }
                    ScheduleEntry::Failed(failure) => self.evict_failed(&failure, chunk),
                }
            }
        }

        tracing::info!(
            changed = phase.schedules.len(),
            airings = phase.program_hashes.len(),
            "schedules fetched"
        );
        self.phase = Phase::SchedulesFetched;
        Ok(phase)
    }

    /// Diffs program digests and returns a cursor that fetches and merges
    /// changed programs batch by batch. Runs the earlier phases for any
    /// argument that is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if an earlier phase fails or the change store
    /// cannot be read.
    #[instrument(skip_all)]
    pub async fn get_programs(
        &mut self,
        lineups: Option<&LineupPhase>,
        schedules: Option<&SchedulePhase>,
    ) -> Result<ProgramCursor<'_, A, S>> {
        let fetched_lineups;
        let lineups = if let Some(l) = lineups {
            l
        } else {
            fetched_lineups = self.get_lineups().await?;
            &fetched_lineups
        };
        let fetched_schedules;
        let schedules = if let Some(s) = schedules {
            s
        } else {
            fetched_schedules = self.get_schedules(Some(lineups)).await?;
            &fetched_schedules
        };

        let stations = lineups.stations();
        let airings = schedules.airings();

        let markers = self
            .changes
            .reload_programs(&self.store)
            .context("failed to load program markers")?;
        let mut seen = HashSet::new();
        let changed: Vec<String> = diff(markers, schedules.program_hashes.iter().cloned())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let batches: VecDeque<Vec<String>> = changed
            .chunks(MAX_PROGRAMS_PER_REQUEST)
            .map(<[String]>::to_vec)
            .collect();

        tracing::info!(
            changed = changed.len(),
            batches = batches.len(),
            "program changes detected"
        );
        self.phase = Phase::ProgramsFetching;

        Ok(ProgramCursor {
            pipeline: self,
            batches,
            ready: VecDeque::new(),
            airings,
            stations,
            emitted: 0,
            done: false,
        })
    }

    /// Runs all phases and collects the changed records.
    ///
    /// # Errors
    ///
    /// Returns an error if any phase fails; nothing is saved in that case.
    #[instrument(skip_all)]
    pub async fn sync(&mut self) -> Result<SyncOutput> {
        let lineups = self.get_lineups().await?;
        let schedules = self.get_schedules(Some(&lineups)).await?;
        let programs = self
            .get_programs(Some(&lineups), Some(&schedules))
            .await?
            .collect_all()
            .await?;
        Ok(SyncOutput {
            lineups: lineups.lineups,
            schedules: schedules.schedules,
            programs,
        })
    }

    fn evict_failed(&mut self, failure: &ScheduleFailure, batch: &[StationDays]) {
        let keys: Vec<ScheduleKey> = match (&failure.station_id, &failure.date) {
            (Some(station_id), Some(date)) => vec![ScheduleKey::new(station_id.clone(), date.clone())],
            (Some(station_id), None) => batch
                .iter()
                .filter(|r| &r.station_id == station_id)
                .flat_map(|r| r.dates.iter())
                .map(|d| ScheduleKey::new(station_id.clone(), d.clone()))
                .collect(),
            (None, _) => Vec::new(),
        };

        if keys.is_empty() {
            tracing::error!(
                code = failure.code,
                message = %failure.message,
                "schedule request failed for an unidentified station"
            );
            return;
        }
        for key in keys {
            self.changes.evict_schedule(&key);
            tracing::error!(
                station_id = %key.station_id,
                date = %key.date,
                code = failure.code,
                message = %failure.message,
                "schedule unavailable, will retry next run"
            );
        }
    }
}

/// Groups schedule keys by station, keeping first-seen station order and
/// each station's day order.
#[must_use]
pub fn group_by_station(keys: Vec<ScheduleKey>) -> Vec<StationDays> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<StationDays> = Vec::new();
    for key in keys {
        if let Some(&i) = index.get(&key.station_id) {
            if let Some(group) = groups.get_mut(i) {
                group.dates.push(key.date);
            }
        } else {
            index.insert(key.station_id.clone(), groups.len());
            groups.push(StationDays {
                station_id: key.station_id,
                dates: vec![key.date],
            });
        }
    }
    groups
}

/// Forward-only sequence of merged programs.
///
/// Each batch issues one program, one description and one artwork request.
/// Markers are committed when [`ProgramCursor::next`] first returns
/// `Ok(None)`; dropping the cursor earlier saves nothing.
#[derive(Debug)]
pub struct ProgramCursor<'p, A, S> {
    pipeline: &'p mut SyncPipeline<A, S>,
    batches: VecDeque<Vec<String>>,
    ready: VecDeque<Program>,
    airings: HashMap<String, Vec<ScheduleSlot>>,
    stations: HashMap<String, Station>,
    emitted: usize,
    done: bool,
}

impl<A: LocalSdApi, S: ChangeStore> ProgramCursor<'_, A, S> {
    /// Returns the next merged program, fetching a batch when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a batch request fails or the change state cannot
    /// be saved at the end.
    pub async fn next(&mut self) -> Result<Option<Program>> {
        loop {
            if let Some(program) = self.ready.pop_front() {
                self.emitted = self.emitted.saturating_add(1);
                return Ok(Some(program));
            }
            let Some(batch) = self.batches.pop_front() else {
                self.finish()?;
                return Ok(None);
            };
            self.fetch_batch(&batch).await?;
        }
    }

    /// Drains the cursor.
    ///
    /// # Errors
    ///
    /// See [`Self::next`].
    pub async fn collect_all(mut self) -> Result<Vec<Program>> {
        let mut programs = Vec::new();
        while let Some(program) = self.next().await? {
            programs.push(program);
        }
        Ok(programs)
    }

    /// Batches not fetched yet.
    #[must_use]
    pub fn remaining_batches(&self) -> usize {
        self.batches.len()
    }

    async fn fetch_batch(&mut self, ids: &[String]) -> Result<()> {
        let api = &self.pipeline.api;
        tracing::debug!(programs = ids.len(), "program batch");

        let programs = api
            .programs(ids)
            .await
            .context("failed to fetch programs")?;
        let mut descriptions = api
            .descriptions(ids)
            .await
            .context("failed to fetch program descriptions")?;

        let mut seen = HashSet::new();
        let artwork_ids: Vec<String> = ids
            .iter()
            .map(|id| artwork_key(id))
            .filter(|key| seen.insert(*key))
            .map(String::from)
            .collect();
        let artwork = api
            .artwork(&artwork_ids)
            .await
            .context("failed to fetch artwork")?;

        let mut by_id: HashMap<String, ProgramPayload> = programs
            .into_iter()
            .map(|p| (p.program_id.clone(), p))
            .collect();

        for id in ids {
            let Some(payload) = by_id.remove(id) else {
                tracing::debug!(program_id = %id, "no program data returned");
                continue;
            };
            let airings = self.airings.remove(id).unwrap_or_default();
            let mut program = Program::from_payload(payload).with_airings(&airings, &self.stations);
            if let Some(metadata) = descriptions.remove(id) {
                program = program.with_descriptions(metadata);
            }
            if let Some(art) = artwork.get(artwork_key(id)) {
                program = program.with_artwork(art.clone());
            }
            self.ready.push_back(program);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.pipeline
            .changes
            .commit(&self.pipeline.store)
            .context("failed to save change state")?;
        self.done = true;
        self.pipeline.phase = Phase::Committed;
        tracing::info!(programs = self.emitted, "sync committed");
        Ok(())
    }
}
