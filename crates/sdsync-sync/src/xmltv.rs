//! XMLTV export of synced lineups and programs.

use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use sdsync_api::{Lineup, Program, ScheduleSlot, Station};

/// XMLTV timestamp layout (UTC).
const TIME_FORMAT: &str = "%Y%m%d%H%M%S +0000";

/// Export settings.
#[derive(Debug, Clone)]
pub struct XmltvOptions {
    /// Language priority for descriptions; the first entry also tags titles.
    pub languages: Vec<String>,
    /// `generator-info-name` attribute.
    pub generator_name: String,
    /// `generator-info-url` attribute.
    pub generator_url: String,
}

impl Default for XmltvOptions {
    fn default() -> Self {
        Self {
            languages: vec![String::from("en")],
            generator_name: String::from("sdsync"),
            generator_url: String::from("https://github.com/naa0yama/sdsync"),
        }
    }
}

impl XmltvOptions {
    fn default_language(&self) -> &str {
        self.languages.first().map_or("en", String::as_str)
    }
}

/// Counts of written elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmltvSummary {
    /// `<channel>` elements.
    pub channels: usize,
    /// `<programme>` elements.
    pub programmes: usize,
}

/// Writes a `<tv>` document with one `<channel>` per distinct station and
/// one `<programme>` per program airing.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn write_xmltv<W: Write>(
    out: W,
    lineups: &[Lineup],
    programs: &[Program],
    options: &XmltvOptions,
) -> Result<XmltvSummary> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    let mut summary = XmltvSummary::default();

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("failed to write XML declaration")?;

    let tv = BytesStart::new("tv").with_attributes([
        ("source-info-url", "https://www.schedulesdirect.org/"),
        ("source-info-name", "Schedules Direct"),
        ("generator-info-name", options.generator_name.as_str()),
        ("generator-info-url", options.generator_url.as_str()),
    ]);
    writer
        .write_event(Event::Start(tv))
        .context("failed to write <tv>")?;

    let mut seen = HashSet::new();
    for station in lineups.iter().flat_map(|l| &l.stations) {
        if seen.insert(station.id.as_str()) {
            write_channel(&mut writer, station)?;
            summary.channels = summary.channels.saturating_add(1);
        }
    }

    for program in programs {
        for slot in &program.airings {
            write_programme(&mut writer, program, slot, options)
                .with_context(|| format!("failed to write programme {}", program.id))?;
            summary.programmes = summary.programmes.saturating_add(1);
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("tv")))
        .context("failed to write </tv>")?;
    writer
        .into_inner()
        .flush()
        .context("failed to flush XMLTV output")?;

    tracing::info!(
        channels = summary.channels,
        programmes = summary.programmes,
        "XMLTV written"
    );
    Ok(summary)
}

fn write_channel<W: Write>(writer: &mut Writer<W>, station: &Station) -> Result<()> {
    writer
        .write_event(Event::Start(
            BytesStart::new("channel").with_attributes([("id", station.id.as_str())]),
        ))
        .context("failed to write <channel>")?;

    let mut names: Vec<&str> = Vec::new();
    for name in [
        station.name.as_deref(),
        station.callsign.as_deref(),
        station.channel.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    for name in names {
        writer
            .create_element("display-name")
            .write_text_content(BytesText::new(name))
            .context("failed to write <display-name>")?;
    }

    if let Some(ref logo) = station.logo {
        let url = logo.url();
        writer
            .create_element("icon")
            .with_attribute(("src", url.as_str()))
            .write_empty()
            .context("failed to write <icon>")?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .context("failed to write </channel>")?;
    Ok(())
}

fn write_programme<W: Write>(
    writer: &mut Writer<W>,
    program: &Program,
    slot: &ScheduleSlot,
    options: &XmltvOptions,
) -> Result<()> {
    let lang = options.default_language();
    let start = slot.air_date_time.format(TIME_FORMAT).to_string();
    let stop = slot.end().format(TIME_FORMAT).to_string();

    writer.write_event(Event::Start(BytesStart::new("programme").with_attributes([
        ("start", start.as_str()),
        ("stop", stop.as_str()),
        ("channel", slot.station_id.as_str()),
    ])))?;

    let title = program.title().unwrap_or(program.id.as_str());
    text_element(writer, "title", title, Some(lang))?;

    if let Some(subtitle) = program.episode_title().or_else(|| program.subtitle())
        && subtitle != title
    {
        text_element(writer, "sub-title", subtitle, Some(lang))?;
    }

    if let Some(desc) = program.description_for(&options.languages) {
        let desc_lang = desc.language.as_deref().unwrap_or(lang);
        text_element(writer, "desc", &desc.text, Some(desc_lang))?;
    }

    let directors: Vec<&str> = program
        .crew
        .iter()
        .filter(|p| p.role.as_deref() == Some("Director"))
        .map(|p| p.name.as_str())
        .collect();
    if !directors.is_empty() || !program.cast.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("credits")))?;
        for name in directors {
            text_element(writer, "director", name, None)?;
        }
        for person in &program.cast {
            text_element(writer, "actor", &person.name, None)?;
        }
        writer.write_event(Event::End(BytesEnd::new("credits")))?;
    }

    if let Some(date) = program.original_air_date {
        text_element(writer, "date", &date.format("%Y%m%d").to_string(), None)?;
    }

    for genre in &program.genres {
        text_element(writer, "category", genre, Some(lang))?;
    }

    if let Some(art) = program.artwork.first() {
        let url = art.url();
        writer
            .create_element("icon")
            .with_attribute(("src", url.as_str()))
            .write_empty()?;
    }

    if slot.is_new {
        writer.create_element("new").write_empty()?;
    }

    for rating in &slot.ratings {
        let mut start = BytesStart::new("rating");
        if let Some(ref body) = rating.body {
            start.push_attribute(("system", body.as_str()));
        }
        writer.write_event(Event::Start(start))?;
        text_element(writer, "value", &rating.code, None)?;
        writer.write_event(Event::End(BytesEnd::new("rating")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("programme")))?;
    Ok(())
}

fn text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
    lang: Option<&str>,
) -> Result<()> {
    let mut element = writer.create_element(name);
    if let Some(lang) = lang {
        element = element.with_attribute(("lang", lang));
    }
    element
        .write_text_content(BytesText::new(text))
        .with_context(|| format!("failed to write <{name}>"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::{BTreeMap, HashMap};

    use sdsync_api::types::LineupPayload;
    use sdsync_api::{Artwork, LocalizedText, Person, Rating};
    use serde_json::json;

    use super::*;

    fn lineup() -> Lineup {
        let payload: LineupPayload = serde_json::from_value(json!({
            "map": [{"stationID": "20454", "channel": "007"}],
            "stations": [{
                "stationID": "20454", "name": "WLS", "callsign": "WLS",
                "logo": {"URL": "https://s3.amazonaws.com/wls.png", "width": 360, "height": 270}
            }]
        }))
        .unwrap();
        Lineup::from_payload("USA-IL57303-X", payload)
    }

    fn program(lineup: &Lineup) -> Program {
        let stations: HashMap<String, Station> = lineup
            .stations
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        let slot = ScheduleSlot {
            station_id: String::from("20454"),
            program_id: String::from("EP018632100004"),
            air_date_time: "2019-03-01T06:00:00Z".parse().unwrap(),
            duration: 1800,
            md5: String::from("x"),
            ratings: vec![Rating {
                body: Some(String::from("USA Parental Rating")),
                code: String::from("TV14"),
            }],
            audio_properties: Vec::new(),
            is_new: true,
            station: None,
        };
        Program {
            id: String::from("EP018632100004"),
            md5: None,
            titles: BTreeMap::from([(120, String::from("Kids & Family"))]),
            episode_title: Some(String::from("Pilot")),
            descriptions: BTreeMap::from([(
                1000,
                vec![LocalizedText {
                    language: Some(String::from("en")),
                    text: String::from("A story."),
                }],
            )]),
            genres: vec![String::from("Comedy")],
            cast: vec![Person {
                person_id: None,
                name: String::from("Jane Doe"),
                role: Some(String::from("Actor")),
                character_name: None,
                billing_order: 1,
            }],
            crew: Vec::new(),
            original_air_date: chrono::NaiveDate::from_ymd_opt(2019, 2, 17),
            entity_type: None,
            show_type: None,
            artwork: vec![Artwork {
                width: 240,
                height: 360,
                uri: String::from("assets/p1.jpg"),
                text: false,
                aspect: None,
                size: None,
                category: None,
            }],
            airings: Vec::new(),
        }
        .with_airings(&[slot], &stations)
    }

    fn render(lineups: &[Lineup], programs: &[Program]) -> (String, XmltvSummary) {
        let mut out = Vec::new();
        let summary = write_xmltv(&mut out, lineups, programs, &XmltvOptions::default()).unwrap();
        (String::from_utf8(out).unwrap(), summary)
    }

    #[test]
    fn test_writes_channels_and_programmes() {
        // Arrange
        let lineup = lineup();
        let program = program(&lineup);

        // Act
        let (xml, summary) = render(&[lineup], &[program]);

        // Assert
        assert_eq!(summary, XmltvSummary { channels: 1, programmes: 1 });
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<channel id=\"20454\">"));
        assert!(xml.contains("<display-name>WLS</display-name>"));
        assert!(xml.contains("<display-name>007</display-name>"));
        assert_eq!(xml.matches("<display-name>WLS</display-name>").count(), 1);
        assert!(xml.contains("<icon src=\"https://s3.amazonaws.com/wls.png\"/>"));
        assert!(xml.contains(
            "<programme start=\"20190301060000 +0000\" stop=\"20190301063000 +0000\" channel=\"20454\">"
        ));
        assert!(xml.contains("<title lang=\"en\">Kids &amp; Family</title>"));
        assert!(xml.contains("<sub-title lang=\"en\">Pilot</sub-title>"));
        assert!(xml.contains("<desc lang=\"en\">A story.</desc>"));
        assert!(xml.contains("<actor>Jane Doe</actor>"));
        assert!(xml.contains("<date>20190217</date>"));
        assert!(xml.contains("<category lang=\"en\">Comedy</category>"));
        assert!(xml.contains(
            "<icon src=\"https://json.schedulesdirect.org/20141201/image/assets/p1.jpg\"/>"
        ));
        assert!(xml.contains("<new/>"));
        assert!(xml.contains("<value>TV14</value>"));
        assert!(xml.trim_end().ends_with("</tv>"));
    }

    #[test]
    fn test_sub_title_omitted_when_equal_to_title() {
        // Arrange
        let lineup = lineup();
        let mut program = program(&lineup);
        program.episode_title = None;

        // Act
        let (xml, _) = render(&[lineup], &[program]);

        // Assert
        assert!(!xml.contains("<sub-title"));
    }

    #[test]
    fn test_sub_title_uses_long_title_without_episode_title() {
        // Arrange
        let lineup = lineup();
        let mut program = program(&lineup);
        program.episode_title = None;
        program.titles.insert(40, String::from("Kids"));

        // Act
        let (xml, _) = render(&[lineup], &[program]);

        // Assert
        assert!(xml.contains("<title lang=\"en\">Kids</title>"));
        assert!(xml.contains("<sub-title lang=\"en\">Kids &amp; Family</sub-title>"));
    }

    #[test]
    fn test_duplicate_stations_written_once() {
        // Arrange
        let first = lineup();
        let mut second = lineup();
        second.id = String::from("USA-OTA-60030");

        // Act
        let (xml, summary) = render(&[first, second], &[]);

        // Assert
        assert_eq!(summary.channels, 1);
        assert_eq!(xml.matches("<channel ").count(), 1);
    }
}
