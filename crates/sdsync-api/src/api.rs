//! `SdApi` trait definition.
#![allow(clippy::future_not_send)]

use std::collections::HashMap;

use super::error::ApiError;
use super::models::Artwork;
use super::types::{
    DayHash, DescriptionPayload, LineupPayload, ProgramPayload, ScheduleEntry, StationDays,
    StatusResponse,
};

/// Maximum stations per `/schedules/md5` or `/schedules` request.
pub const MAX_STATIONS_PER_REQUEST: usize = 5000;

/// Maximum program IDs per `/programs`, `/metadata/description` or
/// `/metadata/programs` request.
pub const MAX_PROGRAMS_PER_REQUEST: usize = 500;

/// Schedules Direct data endpoints.
///
/// Abstracts the authenticated transport for mock substitution in tests.
/// Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(SdApi: Send)]
pub trait LocalSdApi {
    /// Fetches account and system status, including registered lineups.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a server error envelope.
    async fn status(&self) -> Result<StatusResponse, ApiError>;

    /// Fetches the tuning map and stations of one lineup.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a server error envelope.
    async fn lineup(&self, name: &str) -> Result<LineupPayload, ApiError>;

    /// Fetches per-day schedule digests for up to 5,000 stations.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a server error envelope.
    async fn schedule_hashes(&self, station_ids: &[String]) -> Result<Vec<DayHash>, ApiError>;

    /// Fetches schedule days. Per-item failures are returned as
    /// [`ScheduleEntry::Failed`] entries rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a server error envelope.
    async fn schedules(&self, requests: &[StationDays]) -> Result<Vec<ScheduleEntry>, ApiError>;

    /// Fetches full program objects. Unknown IDs are omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a server error envelope.
    async fn programs(&self, program_ids: &[String]) -> Result<Vec<ProgramPayload>, ApiError>;

    /// Fetches description metadata keyed by program ID.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a server error envelope.
    async fn descriptions(
        &self,
        program_ids: &[String],
    ) -> Result<HashMap<String, DescriptionPayload>, ApiError>;

    /// Fetches artwork keyed by 10-character program ID prefixes.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a server error envelope.
    async fn artwork(
        &self,
        artwork_ids: &[String],
    ) -> Result<HashMap<String, Vec<Artwork>>, ApiError>;
}
