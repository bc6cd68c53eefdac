//! Schedules Direct API client for sdsync.
//!
//! Provides the authenticated JSON transport, wire payload types and the
//! merged guide records built from them.

/// `SdApi` trait.
pub mod api;
/// HTTP client implementation.
pub mod client;
/// Error type.
pub mod error;
/// Guide records.
pub mod models;
/// Wire payloads and response parsers.
pub mod types;

pub use api::{LocalSdApi, MAX_PROGRAMS_PER_REQUEST, MAX_STATIONS_PER_REQUEST, SdApi};
pub use client::{DEFAULT_BASE_URL, SdClient, SdClientBuilder};
pub use error::ApiError;
pub use models::{
    Artwork, Lineup, LocalizedText, Person, Program, Rating, Schedule, ScheduleSlot, Station,
    artwork_key,
};
pub use types::{
    DayHash, DescriptionPayload, LineupPayload, ProgramPayload, ScheduleEntry, ScheduleFailure,
    StationDays, StatusResponse,
};
