//! Wire payloads and tolerant response parsers.
//!
//! Response shapes follow the Schedules Direct `20141201` JSON API. Endpoints
//! that mix real data with per-item error placeholders are parsed item by
//! item so that one bad entry never fails a whole batch.

use std::collections::{BTreeMap, HashMap};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::{envelope_message, is_error_envelope};
use super::models::{Artwork, LocalizedText, Person, Rating, Station};

/// Artwork lookup result code meaning "no artwork for this program".
pub const ARTWORK_NOT_FOUND: i64 = 5000;

/// Deserializes a `u32` sent either as a JSON number or as a numeric string.
///
/// # Errors
///
/// Returns an error if the value is neither.
pub fn deserialize_u32_lenient<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("number out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|e| D::Error::custom(format!("failed to parse u32 {s:?}: {e}"))),
        other => Err(D::Error::custom(format!("expected number, got {other}"))),
    }
}

/// Like [`deserialize_u32_lenient`], mapping absent, null or empty to `0`.
///
/// # Errors
///
/// Returns an error if a present value is not numeric.
pub fn deserialize_u32_or_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(v) => deserialize_u32_lenient(v).map_err(D::Error::custom),
    }
}

/// `GET /status` response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Account details.
    #[serde(default)]
    pub account: Option<AccountStatus>,
    /// Lineups registered to the account.
    #[serde(default)]
    pub lineups: Vec<StatusLineup>,
    /// Last time the server ingested new data.
    #[serde(default)]
    pub last_data_update: Option<String>,
    /// Service health entries.
    #[serde(default)]
    pub system_status: Vec<SystemStatus>,
}

/// Account part of the status response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    /// Subscription expiry timestamp.
    #[serde(default)]
    pub expires: Option<String>,
    /// Maximum number of lineups.
    #[serde(default)]
    pub max_lineups: Option<u32>,
}

/// A lineup as listed by the status response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusLineup {
    /// Lineup name (e.g. `USA-IL57303-X`).
    pub lineup: String,
    /// Last modification timestamp, used as the lineup's change marker.
    pub modified: String,
    /// Relative URI of the lineup.
    #[serde(default)]
    pub uri: Option<String>,
    /// Set when the lineup was removed from the account.
    #[serde(default)]
    pub is_deleted: bool,
}

/// One service health entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemStatus {
    /// Timestamp of the entry.
    #[serde(default)]
    pub date: Option<String>,
    /// Status word (e.g. `Online`).
    pub status: String,
    /// Free form message.
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /lineups/{name}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LineupPayload {
    /// Tuning entries, one per station.
    #[serde(default)]
    pub map: Vec<ChannelMapping>,
    /// Station identity entries.
    #[serde(default)]
    pub stations: Vec<Station>,
    /// Lineup metadata.
    #[serde(default)]
    pub metadata: Option<LineupMetadata>,
}

/// Lineup metadata block.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LineupMetadata {
    /// Lineup name.
    #[serde(default)]
    pub lineup: Option<String>,
    /// Last modification timestamp.
    #[serde(default)]
    pub modified: Option<String>,
    /// Distribution system (`Cable`, `Antenna`, ...).
    #[serde(default)]
    pub transport: Option<String>,
}

/// Tuning information of one station within a lineup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMapping {
    /// Station ID.
    #[serde(rename = "stationID")]
    pub station_id: String,
    /// Channel number as displayed (e.g. `55.29`).
    #[serde(default)]
    pub channel: Option<String>,
    /// ATSC major channel.
    #[serde(default)]
    pub channel_major: Option<u32>,
    /// ATSC minor channel.
    #[serde(default)]
    pub channel_minor: Option<u32>,
    /// Call sign used by the provider.
    #[serde(default)]
    pub provider_callsign: Option<String>,
}

impl ChannelMapping {
    /// Display channel number, falling back to `major.minor`.
    #[must_use]
    pub fn channel_number(&self) -> Option<String> {
        if let Some(ref channel) = self.channel {
            return Some(channel.clone());
        }
        match (self.channel_major, self.channel_minor) {
            (Some(major), Some(minor)) => Some(format!("{major}.{minor}")),
            (Some(major), None) => Some(major.to_string()),
            _ => None,
        }
    }
}

/// Schedule hash of one station for one day (`POST /schedules/md5`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayHash {
    /// Station ID.
    pub station_id: String,
    /// Broadcast day (`YYYY-MM-DD`).
    pub date: String,
    /// Schedule digest.
    pub md5: String,
}

/// Flattens a `/schedules/md5` response into station-then-day ordered hashes.
///
/// Stations with no days, and days without an `md5`, are skipped.
#[must_use]
pub fn parse_schedule_hashes(value: &Value) -> Vec<DayHash> {
    let Some(stations) = value.as_object() else {
        return Vec::new();
    };

    let mut hashes = Vec::new();
    for (station_id, days) in stations {
        let Some(days) = days.as_object() else {
            continue;
        };
        for (date, day) in days {
            if let Some(md5) = day.get("md5").and_then(Value::as_str) {
                hashes.push(DayHash {
                    station_id: station_id.clone(),
                    date: date.clone(),
                    md5: String::from(md5),
                });
            }
        }
    }
    hashes
}

/// Request body entry for `POST /schedules`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationDays {
    /// Station ID.
    #[serde(rename = "stationID")]
    pub station_id: String,
    /// Requested days (`YYYY-MM-DD`).
    #[serde(rename = "date")]
    pub dates: Vec<String>,
}

/// One station/day of a `POST /schedules` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulePayload {
    /// Station ID.
    #[serde(rename = "stationID")]
    pub station_id: String,
    /// Airings of the day.
    #[serde(default)]
    pub programs: Vec<SlotPayload>,
    /// Day metadata.
    #[serde(default)]
    pub metadata: Option<ScheduleMetadata>,
}

/// Metadata of one schedule day.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMetadata {
    /// Schedule digest.
    #[serde(default)]
    pub md5: Option<String>,
    /// Broadcast day (`YYYY-MM-DD`).
    #[serde(default)]
    pub start_date: Option<String>,
}

/// One airing inside a schedule day.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPayload {
    /// Program ID.
    #[serde(rename = "programID")]
    pub program_id: String,
    /// Air time (UTC).
    pub air_date_time: chrono::DateTime<chrono::Utc>,
    /// Duration in seconds.
    #[serde(deserialize_with = "deserialize_u32_lenient")]
    pub duration: u32,
    /// Program digest, the program's change marker.
    pub md5: String,
    /// Audio property tags (`cc`, `stereo`, ...).
    #[serde(default)]
    pub audio_properties: Vec<String>,
    /// Content ratings.
    #[serde(default)]
    pub ratings: Vec<Rating>,
    /// First airing flag.
    #[serde(default, rename = "new")]
    pub is_new: bool,
}

/// A station/day the server could not produce.
#[derive(Debug, Clone)]
pub struct ScheduleFailure {
    /// Station ID, if reported.
    pub station_id: Option<String>,
    /// Requested day (`YYYY-MM-DD`), if it could be determined.
    pub date: Option<String>,
    /// Server error code.
    pub code: i64,
    /// Server message.
    pub message: String,
}

/// One entry of a `POST /schedules` response.
#[derive(Debug, Clone)]
pub enum ScheduleEntry {
    /// A schedule day.
    Day(SchedulePayload),
    /// A per-item error envelope.
    Failed(ScheduleFailure),
}

impl ScheduleEntry {
    /// Classifies one response entry.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-envelope entry is not a valid schedule.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if !is_error_envelope(&value) {
            return serde_json::from_value(value).map(Self::Day);
        }

        let station_id = value
            .get("stationID")
            .and_then(Value::as_str)
            .map(String::from);
        let date = ["requestedDate", "date", "airDateTime"]
            .iter()
            .find_map(|field| value.get(*field).and_then(Value::as_str))
            .and_then(|raw| raw.get(..10))
            .map(String::from);

        Ok(Self::Failed(ScheduleFailure {
            station_id,
            date,
            code: value.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: envelope_message(&value),
        }))
    }
}

/// `POST /programs` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramPayload {
    /// Program ID.
    #[serde(rename = "programID")]
    pub program_id: String,
    /// Titles, each a single `{"title<N>": text}` object.
    #[serde(default)]
    pub titles: Vec<BTreeMap<String, String>>,
    /// Episode title.
    #[serde(default)]
    pub episode_title150: Option<String>,
    /// Descriptions keyed by `description<N>`.
    #[serde(default)]
    pub descriptions: BTreeMap<String, Vec<LocalizedText>>,
    /// Original air date (`YYYY-MM-DD`).
    #[serde(default)]
    pub original_air_date: Option<String>,
    /// Genres.
    #[serde(default)]
    pub genres: Vec<String>,
    /// Entity type (`Show`, `Episode`, ...).
    #[serde(default)]
    pub entity_type: Option<String>,
    /// Show type (`Series`, `Special`, ...).
    #[serde(default)]
    pub show_type: Option<String>,
    /// Cast.
    #[serde(default)]
    pub cast: Vec<Person>,
    /// Crew.
    #[serde(default)]
    pub crew: Vec<Person>,
    /// Program digest.
    #[serde(default)]
    pub md5: Option<String>,
}

/// Parses `POST /programs` entries, skipping error placeholders and
/// entries that do not match the program shape.
#[must_use]
pub fn parse_programs(entries: Vec<Value>) -> Vec<ProgramPayload> {
    let mut programs = Vec::with_capacity(entries.len());
    for entry in entries {
        if is_error_envelope(&entry) {
            let program_id = entry
                .get("programID")
                .and_then(Value::as_str)
                .unwrap_or("-");
            tracing::debug!(
                program_id,
                message = %envelope_message(&entry),
                "program unavailable"
            );
            continue;
        }
        match serde_json::from_value::<ProgramPayload>(entry) {
            Ok(p) => programs.push(p),
            Err(e) => tracing::warn!(error = %e, "skipping malformed program entry"),
        }
    }
    programs
}

/// Description metadata of one program (`POST /metadata/description`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionPayload {
    /// First air date reported by the metadata endpoint.
    pub start_airdate: Option<String>,
    /// Descriptions ranked by their length class.
    pub descriptions: BTreeMap<u32, Vec<LocalizedText>>,
}

impl DescriptionPayload {
    /// Reads one metadata entry. Returns `None` when `value` is not an object.
    ///
    /// Accepts `description<N>` keys holding one object or a list, either at
    /// the top level or nested under `descriptions`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut payload = Self {
            start_airdate: obj
                .get("startAirdate")
                .and_then(Value::as_str)
                .map(String::from),
            descriptions: BTreeMap::new(),
        };

        let nested = obj.get("descriptions").and_then(Value::as_object);
        for (key, texts) in obj.iter().chain(nested.into_iter().flatten()) {
            let Some(rank) = rank_suffix(key, "description") else {
                continue;
            };
            let parsed = localized_texts(texts);
            if !parsed.is_empty() {
                payload.descriptions.insert(rank, parsed);
            }
        }
        Some(payload)
    }
}

/// Parses a `/metadata/description` response into a map keyed by program ID.
///
/// The endpoint sometimes answers with an empty list instead of an object;
/// anything that is not an object yields an empty map.
#[must_use]
pub fn parse_descriptions(value: &Value) -> HashMap<String, DescriptionPayload> {
    let Some(obj) = value.as_object() else {
        return HashMap::new();
    };
    obj.iter()
        .filter(|(_, v)| !is_error_envelope(v))
        .filter_map(|(id, v)| DescriptionPayload::from_value(v).map(|d| (id.clone(), d)))
        .collect()
}

/// Parses a `/metadata/programs` response into artwork keyed by the
/// 10-character program ID prefix.
///
/// Entries whose `data` is a "not found" placeholder (code 5000) are
/// skipped; artwork items that fail to parse are dropped individually.
#[must_use]
pub fn parse_artwork(value: &Value) -> HashMap<String, Vec<Artwork>> {
    let Some(entries) = value.as_array() else {
        return HashMap::new();
    };

    let mut artwork = HashMap::new();
    for entry in entries {
        let Some(id) = entry.get("programID").and_then(Value::as_str) else {
            continue;
        };
        let Some(items) = entry.get("data").and_then(Value::as_array) else {
            let code = entry
                .get("data")
                .and_then(|d| d.get("code"))
                .and_then(Value::as_i64);
            if code != Some(ARTWORK_NOT_FOUND) {
                tracing::debug!(program_id = id, ?code, "unexpected artwork payload");
            }
            continue;
        };
        let parsed: Vec<Artwork> = items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect();
        artwork.insert(String::from(id), parsed);
    }
    artwork
}

/// Reads the numeric suffix of keys like `title120` / `description1000`.
#[must_use]
pub fn rank_suffix(key: &str, prefix: &str) -> Option<u32> {
    key.strip_prefix(prefix)?.parse().ok()
}

/// Reads one localized text object or a list of them.
fn localized_texts(value: &Value) -> Vec<LocalizedText> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| serde_json::from_value(i.clone()).ok())
            .collect(),
        Value::Object(_) => serde_json::from_value(value.clone())
            .map(|t| vec![t])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
