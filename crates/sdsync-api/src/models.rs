//! Guide records: lineups, stations, schedule slots and programs.
//!
//! Programs are assembled from several endpoints. Precedence when fields
//! overlap: program payload, then schedule airings, then description
//! metadata, then artwork (later sources win).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
    ChannelMapping, DescriptionPayload, LineupPayload, ProgramPayload, SchedulePayload,
    SlotPayload, deserialize_u32_or_zero, rank_suffix,
};

/// Base URL relative artwork URIs are resolved against.
pub const IMAGE_BASE_URL: &str = "https://json.schedulesdirect.org/20141201/image/";

/// Length of the program ID prefix artwork is keyed by.
pub const ARTWORK_ID_LEN: usize = 10;

/// Returns the artwork lookup key of a program ID (its first 10 characters).
#[must_use]
pub fn artwork_key(program_id: &str) -> &str {
    program_id
        .char_indices()
        .nth(ARTWORK_ID_LEN)
        .map_or(program_id, |(end, _)| &program_id[..end])
}

/// A piece of text tagged with its language.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocalizedText {
    /// ISO language code, if given.
    #[serde(default, rename = "descriptionLanguage")]
    pub language: Option<String>,
    /// The text.
    #[serde(rename = "description")]
    pub text: String,
}

/// Content rating of an airing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rating {
    /// Rating body (e.g. `USA Parental Rating`).
    #[serde(default)]
    pub body: Option<String>,
    /// Rating code (e.g. `TV14`).
    pub code: String,
}

/// Cast or crew member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Person ID.
    #[serde(default)]
    pub person_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Role (`Actor`, `Director`, ...).
    #[serde(default)]
    pub role: Option<String>,
    /// Character played, for cast.
    #[serde(default)]
    pub character_name: Option<String>,
    /// Billing position, `0` when absent.
    #[serde(default, deserialize_with = "deserialize_u32_or_zero")]
    pub billing_order: u32,
}

/// An image attached to a program or station.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Artwork {
    /// Width in pixels.
    #[serde(default, deserialize_with = "deserialize_u32_or_zero")]
    pub width: u32,
    /// Height in pixels.
    #[serde(default, deserialize_with = "deserialize_u32_or_zero")]
    pub height: u32,
    /// Absolute or image-base-relative URI. Station logos send `URL`.
    #[serde(alias = "URL")]
    pub uri: String,
    /// Whether the image contains text.
    #[serde(default, deserialize_with = "deserialize_yes_no")]
    pub text: bool,
    /// Aspect ratio (e.g. `2x3`).
    #[serde(default)]
    pub aspect: Option<String>,
    /// Size class (`Sm`, `Md`, `Lg`, `Ms`).
    #[serde(default)]
    pub size: Option<String>,
    /// Category (e.g. `Banner-L1`).
    #[serde(default)]
    pub category: Option<String>,
}

impl Artwork {
    /// Absolute image URL.
    #[must_use]
    pub fn url(&self) -> String {
        if self.uri.starts_with("http://") || self.uri.starts_with("https://") {
            self.uri.clone()
        } else {
            format!("{IMAGE_BASE_URL}{}", self.uri.trim_start_matches('/'))
        }
    }
}

fn deserialize_yes_no<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("yes"),
        _ => false,
    })
}

/// A broadcast station.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Station ID.
    #[serde(rename = "stationID")]
    pub id: String,
    /// Full name.
    #[serde(default)]
    pub name: Option<String>,
    /// Call sign.
    #[serde(default)]
    pub callsign: Option<String>,
    /// Network affiliate.
    #[serde(default)]
    pub affiliate: Option<String>,
    /// Channel number within the lineup this station was read from.
    #[serde(default)]
    pub channel: Option<String>,
    /// Broadcast languages.
    #[serde(default)]
    pub broadcast_language: Vec<String>,
    /// Station logo.
    #[serde(default)]
    pub logo: Option<Artwork>,
}

impl Station {
    /// Copies the tuning information of `mapping` onto the station.
    pub fn apply_mapping(&mut self, mapping: &ChannelMapping) {
        if let Some(channel) = mapping.channel_number() {
            self.channel = Some(channel);
        }
        if self.callsign.is_none() {
            self.callsign.clone_from(&mapping.provider_callsign);
        }
    }

    /// Name used for display: call sign, then name, then ID.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.callsign
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// A channel lineup and its stations.
#[derive(Debug, Clone, Serialize)]
pub struct Lineup {
    /// Lineup name (e.g. `USA-IL57303-X`).
    pub id: String,
    /// Last modification timestamp.
    pub modified: Option<String>,
    /// Distribution system.
    pub transport: Option<String>,
    /// Stations in lineup order, each carrying its channel number.
    pub stations: Vec<Station>,
    /// Tuning entries keyed by station ID.
    pub station_map: BTreeMap<String, ChannelMapping>,
}

impl Lineup {
    /// Joins the tuning map with the station entries of a lineup response.
    #[must_use]
    pub fn from_payload(id: impl Into<String>, payload: LineupPayload) -> Self {
        let station_map: BTreeMap<String, ChannelMapping> = payload
            .map
            .into_iter()
            .map(|m| (m.station_id.clone(), m))
            .collect();

        let stations = payload
            .stations
            .into_iter()
            .map(|mut station| {
                if let Some(mapping) = station_map.get(&station.id) {
                    station.apply_mapping(mapping);
                }
                station
            })
            .collect();

        let metadata = payload.metadata.unwrap_or_default();

        Self {
            id: id.into(),
            modified: metadata.modified,
            transport: metadata.transport,
            stations,
            station_map,
        }
    }

    /// Station IDs in lineup order.
    pub fn station_ids(&self) -> impl Iterator<Item = &str> {
        self.stations.iter().map(|s| s.id.as_str())
    }
}

/// One airing of a program on a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSlot {
    /// Station ID.
    pub station_id: String,
    /// Program ID.
    pub program_id: String,
    /// Air time (UTC).
    pub air_date_time: DateTime<Utc>,
    /// Duration in seconds.
    pub duration: u32,
    /// Program digest at the time of scheduling.
    pub md5: String,
    /// Content ratings.
    pub ratings: Vec<Rating>,
    /// Audio property tags.
    pub audio_properties: Vec<String>,
    /// First airing flag.
    pub is_new: bool,
    /// Station the slot airs on, when known.
    pub station: Option<Station>,
}

impl ScheduleSlot {
    /// Builds a slot from a wire airing.
    #[must_use]
    pub fn from_payload(station_id: &str, payload: SlotPayload) -> Self {
        Self {
            station_id: String::from(station_id),
            program_id: payload.program_id,
            air_date_time: payload.air_date_time,
            duration: payload.duration,
            md5: payload.md5,
            ratings: payload.ratings,
            audio_properties: payload.audio_properties,
            is_new: payload.is_new,
            station: None,
        }
    }

    /// End of the airing.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.air_date_time + Duration::seconds(i64::from(self.duration))
    }
}

/// All airings of one station for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Station ID.
    pub station_id: String,
    /// Broadcast day (`YYYY-MM-DD`), when reported.
    pub date: Option<String>,
    /// Day digest.
    pub md5: Option<String>,
    /// Airings in server order.
    pub slots: Vec<ScheduleSlot>,
}

impl Schedule {
    /// Builds a schedule day from a wire payload.
    #[must_use]
    pub fn from_payload(payload: SchedulePayload) -> Self {
        let (date, md5) = payload
            .metadata
            .map_or((None, None), |m| (m.start_date, m.md5));
        let station_id = payload.station_id;
        let slots = payload
            .programs
            .into_iter()
            .map(|p| ScheduleSlot::from_payload(&station_id, p))
            .collect();
        Self {
            station_id,
            date,
            md5,
            slots,
        }
    }
}

/// A fully merged program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Program {
    /// Program ID.
    pub id: String,
    /// Program digest.
    pub md5: Option<String>,
    /// Titles ranked by their length class.
    pub titles: BTreeMap<u32, String>,
    /// Episode title.
    pub episode_title: Option<String>,
    /// Descriptions ranked by their length class.
    pub descriptions: BTreeMap<u32, Vec<LocalizedText>>,
    /// Genres.
    pub genres: Vec<String>,
    /// Cast, by billing order.
    pub cast: Vec<Person>,
    /// Crew, by billing order.
    pub crew: Vec<Person>,
    /// Original air date.
    pub original_air_date: Option<NaiveDate>,
    /// Entity type.
    pub entity_type: Option<String>,
    /// Show type.
    pub show_type: Option<String>,
    /// Artwork.
    pub artwork: Vec<Artwork>,
    /// Airings seen in this sync, each with its station attached.
    pub airings: Vec<ScheduleSlot>,
}

impl Program {
    /// Builds a program from a `/programs` entry.
    #[must_use]
    pub fn from_payload(payload: ProgramPayload) -> Self {
        let titles = payload
            .titles
            .into_iter()
            .flatten()
            .filter_map(|(key, text)| rank_suffix(&key, "title").map(|rank| (rank, text)))
            .collect();
        let descriptions = payload
            .descriptions
            .into_iter()
            .filter_map(|(key, texts)| rank_suffix(&key, "description").map(|rank| (rank, texts)))
            .collect();
        let original_air_date = payload.original_air_date.as_deref().and_then(parse_date);

        let mut cast = payload.cast;
        cast.sort_by_key(|p| p.billing_order);
        let mut crew = payload.crew;
        crew.sort_by_key(|p| p.billing_order);

        Self {
            id: payload.program_id,
            md5: payload.md5,
            titles,
            episode_title: payload.episode_title150,
            descriptions,
            genres: payload.genres,
            cast,
            crew,
            original_air_date,
            entity_type: payload.entity_type,
            show_type: payload.show_type,
            artwork: Vec::new(),
            airings: Vec::new(),
        }
    }

    /// Attaches airings, resolving each slot's station from `stations`.
    #[must_use]
    pub fn with_airings(
        mut self,
        airings: &[ScheduleSlot],
        stations: &HashMap<String, Station>,
    ) -> Self {
        self.airings = airings
            .iter()
            .map(|slot| {
                let mut slot = slot.clone();
                slot.station = stations.get(&slot.station_id).cloned();
                slot
            })
            .collect();
        self
    }

    /// Merges description metadata. Ranks present in `metadata` replace
    /// those of the program payload.
    #[must_use]
    pub fn with_descriptions(mut self, metadata: DescriptionPayload) -> Self {
        self.descriptions.extend(metadata.descriptions);
        if self.original_air_date.is_none() {
            self.original_air_date = metadata.start_airdate.as_deref().and_then(parse_date);
        }
        self
    }

    /// Sets the artwork.
    #[must_use]
    pub fn with_artwork(mut self, artwork: Vec<Artwork>) -> Self {
        self.artwork = artwork;
        self
    }

    /// Shortest title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.titles.first_key_value().map(|(_, t)| t.as_str())
    }

    /// Longest title.
    #[must_use]
    pub fn title_long(&self) -> Option<&str> {
        self.titles.last_key_value().map(|(_, t)| t.as_str())
    }

    /// Alias of [`Self::title_long`]. With a single title this equals
    /// [`Self::title`].
    #[must_use]
    pub fn subtitle(&self) -> Option<&str> {
        self.title_long()
    }

    /// Episode title, if any.
    #[must_use]
    pub fn episode_title(&self) -> Option<&str> {
        self.episode_title.as_deref()
    }

    /// First text of the shortest description class.
    #[must_use]
    pub fn description_short(&self) -> Option<&str> {
        self.descriptions
            .values()
            .find_map(|texts| texts.first())
            .map(|t| t.text.as_str())
    }

    /// First text of the longest description class.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.descriptions
            .values()
            .rev()
            .find_map(|texts| texts.first())
            .map(|t| t.text.as_str())
    }

    /// Longest description in the first language of `languages` that has
    /// one, else [`Program::description`].
    #[must_use]
    pub fn description_for(&self, languages: &[String]) -> Option<&LocalizedText> {
        for lang in languages {
            let found = self.descriptions.values().rev().find_map(|texts| {
                texts
                    .iter()
                    .find(|t| t.language.as_deref() == Some(lang.as_str()))
            });
            if found.is_some() {
                return found;
            }
        }
        self.descriptions
            .values()
            .rev()
            .find_map(|texts| texts.first())
    }

    /// Largest artwork by pixel area.
    #[must_use]
    pub fn best_artwork(&self) -> Option<&Artwork> {
        self.artwork
            .iter()
            .max_by_key(|a| u64::from(a.width) * u64::from(a.height))
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date = raw.get(..10).unwrap_or(raw);
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::debug!(raw, error = %e, "ignoring malformed date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use serde_json::json;

    use super::*;

    fn program_payload() -> ProgramPayload {
        serde_json::from_value(json!({
            "programID": "EP018632100004",
            "titles": [{"title120": "The Tonight Show"}, {"title40": "Tonight"}],
            "episodeTitle150": "Guest Night",
            "descriptions": {
                "description100": [{"descriptionLanguage": "en", "description": "Short."}],
                "description1000": [
                    {"descriptionLanguage": "en", "description": "Long English."},
                    {"descriptionLanguage": "es", "description": "Largo."}
                ]
            },
            "originalAirDate": "2015-03-02",
            "genres": ["Talk"],
            "cast": [
                {"name": "B", "role": "Guest", "billingOrder": "02"},
                {"name": "A", "role": "Host", "billingOrder": "01"},
                {"name": "C", "role": "Guest"}
            ],
            "md5": "J+AOJ/ofAQdp12Bh3U+C+A"
        }))
        .unwrap()
    }

    #[test]
    fn test_artwork_key_truncates_to_ten_characters() {
        // Arrange & Act & Assert
        assert_eq!(artwork_key("SH031652540000"), "SH03165254");
        assert_eq!(artwork_key("SH0316"), "SH0316");
    }

    #[test]
    fn test_title_precedence() {
        // Arrange
        let program = Program::from_payload(program_payload());

        // Act & Assert
        assert_eq!(program.title(), Some("Tonight"));
        assert_eq!(program.title_long(), Some("The Tonight Show"));
        assert_eq!(program.subtitle(), Some("The Tonight Show"));
        assert_eq!(program.episode_title(), Some("Guest Night"));
    }

    #[test]
    fn test_single_title_is_both_short_and_long() {
        // Arrange
        let payload: ProgramPayload = serde_json::from_value(json!({
            "programID": "SH031652540000",
            "titles": [{"title120": "Utah State of the State"}]
        }))
        .unwrap();

        // Act
        let program = Program::from_payload(payload);

        // Assert
        assert_eq!(program.title(), Some("Utah State of the State"));
        assert_eq!(program.subtitle(), program.title());
        assert_eq!(program.episode_title(), None);
    }

    #[test]
    fn test_descriptions_by_rank_and_language() {
        // Arrange
        let program = Program::from_payload(program_payload());

        // Act & Assert
        assert_eq!(program.description_short(), Some("Short."));
        assert_eq!(program.description(), Some("Long English."));
        assert_eq!(
            program
                .description_for(&[String::from("es")])
                .map(|t| t.text.as_str()),
            Some("Largo.")
        );
        assert_eq!(
            program
                .description_for(&[String::from("fr")])
                .map(|t| t.text.as_str()),
            Some("Long English.")
        );
    }

    #[test]
    fn test_cast_sorted_by_billing_order() {
        // Arrange & Act
        let program = Program::from_payload(program_payload());

        // Assert
        let names: Vec<&str> = program.cast.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
        assert_eq!(program.original_air_date, NaiveDate::from_ymd_opt(2015, 3, 2));
    }

    #[test]
    fn test_metadata_descriptions_override_program_payload() {
        // Arrange
        let program = Program::from_payload(program_payload());
        let mut metadata = DescriptionPayload::default();
        metadata.descriptions.insert(
            1000,
            vec![LocalizedText {
                language: Some(String::from("en")),
                text: String::from("From metadata."),
            }],
        );

        // Act
        let merged = program.with_descriptions(metadata);

        // Assert
        assert_eq!(merged.description(), Some("From metadata."));
        assert_eq!(merged.description_short(), Some("Short."));
    }

    #[test]
    fn test_with_airings_attaches_stations() {
        // Arrange
        let station: Station =
            serde_json::from_value(json!({"stationID": "10021", "callsign": "AMC"})).unwrap();
        let stations = HashMap::from([(String::from("10021"), station)]);
        let slot = ScheduleSlot {
            station_id: String::from("10021"),
            program_id: String::from("EP018632100004"),
            air_date_time: "2015-03-03T01:56:00Z".parse().unwrap(),
            duration: 3600,
            md5: String::from("x"),
            ratings: Vec::new(),
            audio_properties: Vec::new(),
            is_new: false,
            station: None,
        };

        // Act
        let program = Program::from_payload(program_payload()).with_airings(&[slot], &stations);

        // Assert
        let airing = &program.airings[0];
        assert_eq!(airing.station.as_ref().unwrap().display_name(), "AMC");
        assert_eq!(airing.end().to_rfc3339(), "2015-03-03T02:56:00+00:00");
    }

    #[test]
    fn test_lineup_joins_map_and_stations() {
        // Arrange
        let payload: LineupPayload = serde_json::from_value(json!({
            "map": [{"stationID": "20454", "channel": "002"}],
            "stations": [
                {"stationID": "20454", "name": "WLS", "callsign": "WLS",
                 "logo": {"URL": "https://s3.amazonaws.com/logo.png", "height": 270, "width": 360}},
                {"stationID": "99999", "name": "Unmapped"}
            ],
            "metadata": {"lineup": "USA-IL57303-X", "modified": "2019-02-15T14:01:03Z", "transport": "Cable"}
        }))
        .unwrap();

        // Act
        let lineup = Lineup::from_payload("USA-IL57303-X", payload);

        // Assert
        assert_eq!(lineup.stations[0].channel.as_deref(), Some("002"));
        assert_eq!(lineup.stations[1].channel, None);
        assert_eq!(
            lineup.stations[0].logo.as_ref().unwrap().url(),
            "https://s3.amazonaws.com/logo.png"
        );
        assert_eq!(lineup.station_ids().collect::<Vec<_>>(), vec!["20454", "99999"]);
    }

    #[test]
    fn test_relative_artwork_url_uses_image_base() {
        // Arrange
        let art: Artwork = serde_json::from_value(json!({
            "width": "240", "height": "360", "uri": "assets/p1.jpg", "text": "no"
        }))
        .unwrap();

        // Act & Assert
        assert_eq!(
            art.url(),
            "https://json.schedulesdirect.org/20141201/image/assets/p1.jpg"
        );
        assert!(!art.text);
    }
}
