//! Page-capture boundary.
//!
//! A [`RaceSource`] hands out the rendered text of the racing lobby, a venue's
//! consolidated race card, or a single race selected by venue and start time. The
//! parsers only ever see the text; how it was obtained stays behind the trait.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::parser::lines::clean_lines;
use crate::parser::venues::{extract_section, location_times, VenueSchedule, KNOWN_COUNTRIES};

const LOBBY_ATTEMPTS: u32 = 5;
const RETRY_DELAY_MS: u64 = 2000;

/// Text captured for one venue, or for one race when `time` is set.
#[derive(Debug, Clone, Default)]
pub struct RaceCapture {
    pub venue: String,
    pub time: Option<String>,
    pub runner_lines: Vec<String>,
    pub form_blocks: Vec<String>,
}

impl RaceCapture {
    pub fn from_text(venue: &str, time: Option<&str>, runners: &str, form: &str) -> Self {
        RaceCapture {
            venue: venue.to_string(),
            time: time.map(str::to_string),
            runner_lines: clean_lines(runners).into_iter().map(String::from).collect(),
            form_blocks: split_blocks(form),
        }
    }

    pub fn label(&self) -> String {
        match &self.time {
            Some(t) => format!("{} {}", self.venue, t),
            None => self.venue.clone(),
        }
    }
}

/// Split text into blank-line-separated blocks of trimmed lines.
pub fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks
}

pub trait RaceSource {
    /// Current text of the racing lobby.
    fn lobby(&mut self) -> Result<String>;

    /// Open a venue's full card. `None` when the venue cannot be opened as a whole.
    fn open_meeting(&mut self, venue: &str) -> Result<Option<RaceCapture>>;

    /// Open one race at `venue` starting at `time` (`HH:MM`).
    fn open_race(&mut self, venue: &str, time: &str) -> Result<Option<RaceCapture>>;
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub country: String,
    pub lobby_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            country: "Australia".to_string(),
            lobby_attempts: LOBBY_ATTEMPTS,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

impl SessionConfig {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Default::default()
        }
    }

    pub fn with_lobby_attempts(mut self, attempts: u32) -> Self {
        self.lobby_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Every known country heading except the target one.
    pub fn boundaries(&self) -> Vec<&'static str> {
        KNOWN_COUNTRIES
            .iter()
            .copied()
            .filter(|c| !c.eq_ignore_ascii_case(&self.country))
            .collect()
    }
}

/// Re-read the lobby until the target country lists at least one venue.
///
/// Each venue carries the start times the lobby shows for it. Returns an empty list once
/// `lobby_attempts` reads have come back empty or failed.
pub fn wait_for_venues(
    source: &mut dyn RaceSource,
    config: &SessionConfig,
) -> Result<Vec<VenueSchedule>> {
    let boundaries = config.boundaries();

    for attempt in 1..=config.lobby_attempts {
        match source.lobby() {
            Ok(text) => {
                let venues = extract_section(&text, &config.country, &boundaries);
                if !venues.is_empty() {
                    let schedule = location_times(&text, KNOWN_COUNTRIES);
                    info!("Found {} {} venues", venues.len(), config.country);
                    return Ok(venues
                        .into_iter()
                        .map(|venue| {
                            let times = schedule
                                .iter()
                                .find(|s| s.venue == venue)
                                .map(|s| s.times.clone())
                                .unwrap_or_default();
                            VenueSchedule { venue, times }
                        })
                        .collect());
                }
                debug!("No {} venues in lobby yet (attempt {})", config.country, attempt);
            }
            Err(e) => warn!("Lobby read failed (attempt {}): {:#}", attempt, e),
        }

        if attempt < config.lobby_attempts {
            std::thread::sleep(config.retry_delay);
        }
    }

    warn!(
        "Gave up waiting for {} venues after {} attempts",
        config.country, config.lobby_attempts
    );
    Ok(Vec::new())
}

/// Collect a venue's races: the whole card if it opens, otherwise each listed race time.
pub fn collect_meeting(source: &mut dyn RaceSource, schedule: &VenueSchedule) -> Vec<RaceCapture> {
    let venue = &schedule.venue;

    match source.open_meeting(venue) {
        Ok(Some(capture)) => return vec![capture],
        Ok(None) => info!("Could not open {}, trying individual race times", venue),
        Err(e) => warn!("Opening {} failed: {:#}; trying individual race times", venue, e),
    }

    let mut captures = Vec::new();
    for time in &schedule.times {
        match source.open_race(venue, time) {
            Ok(Some(capture)) => captures.push(capture),
            Ok(None) => warn!("Skipping race at {} for {}: could not be opened", venue, time),
            Err(e) => warn!("Skipping race at {} for {}: {:#}", venue, time, e),
        }
    }
    captures
}

pub fn collect_all(source: &mut dyn RaceSource, schedules: &[VenueSchedule]) -> Vec<RaceCapture> {
    schedules
        .iter()
        .flat_map(|s| collect_meeting(source, s))
        .collect()
}

/// Directory key for a venue: lowercase with spaces and hyphens removed.
pub fn venue_key(venue: &str) -> String {
    venue
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Captures saved to disk.
///
/// ```text
/// lobby.txt
/// <venue>/runners.txt, <venue>/form.txt            whole card
/// <venue>/<HHMM>/runners.txt, <venue>/<HHMM>/form.txt   single race
/// ```
#[derive(Debug, Clone)]
pub struct CaptureDir {
    root: PathBuf,
}

impl CaptureDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_capture(dir: &Path, venue: &str, time: Option<&str>) -> Result<Option<RaceCapture>> {
        let runners = dir.join("runners.txt");
        let form = dir.join("form.txt");
        if !runners.exists() && !form.exists() {
            return Ok(None);
        }
        let runners = read_optional(&runners)?;
        let form = read_optional(&form)?;
        Ok(Some(RaceCapture::from_text(venue, time, &runners, &form)))
    }
}

fn read_optional(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

impl RaceSource for CaptureDir {
    fn lobby(&mut self) -> Result<String> {
        let path = self.root.join("lobby.txt");
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read lobby {}", path.display()))
    }

    fn open_meeting(&mut self, venue: &str) -> Result<Option<RaceCapture>> {
        let dir = self.root.join(venue_key(venue));
        Self::read_capture(&dir, venue, None)
    }

    fn open_race(&mut self, venue: &str, time: &str) -> Result<Option<RaceCapture>> {
        let dir = self.root.join(venue_key(venue)).join(time.replace(':', ""));
        Self::read_capture(&dir, venue, Some(time))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURES: &str = "tests/fixtures/captures/greyhound";

    fn quick() -> SessionConfig {
        SessionConfig::default().with_retry_delay(Duration::ZERO)
    }

    /// Lobby that stays empty for a few reads and records every open request.
    struct Scripted {
        lobbies: Vec<Result<String>>,
        meetings: Vec<String>,
        opened: Vec<String>,
    }

    impl RaceSource for Scripted {
        fn lobby(&mut self) -> Result<String> {
            if self.lobbies.is_empty() {
                return Ok(String::new());
            }
            self.lobbies.remove(0)
        }

        fn open_meeting(&mut self, venue: &str) -> Result<Option<RaceCapture>> {
            self.opened.push(venue.to_string());
            if self.meetings.iter().any(|m| m == venue) {
                Ok(Some(RaceCapture::from_text(venue, None, "", "")))
            } else {
                Ok(None)
            }
        }

        fn open_race(&mut self, venue: &str, time: &str) -> Result<Option<RaceCapture>> {
            self.opened.push(format!("{venue}@{time}"));
            if time == "20:15" {
                anyhow::bail!("element not clickable");
            }
            Ok(Some(RaceCapture::from_text(venue, Some(time), "", "")))
        }
    }

    fn scripted(lobbies: Vec<Result<String>>, meetings: &[&str]) -> Scripted {
        Scripted {
            lobbies,
            meetings: meetings.iter().map(|m| m.to_string()).collect(),
            opened: Vec::new(),
        }
    }

    #[test]
    fn blocks_split_on_blank_lines() {
        let blocks = split_blocks("A\n 1 \n\n\n  \nB\nC\n\n");
        assert_eq!(blocks, vec!["A\n1", "B\nC"]);
        assert!(split_blocks("\n\n").is_empty());
    }

    #[test]
    fn venue_keys() {
        assert_eq!(venue_key("Wentworth Park"), "wentworthpark");
        assert_eq!(venue_key("Murray Bridge - Straight"), "murraybridgestraight");
    }

    #[test]
    fn waits_through_empty_and_failed_lobbies() {
        let mut source = scripted(
            vec![
                Ok("Loading".to_string()),
                Err(anyhow::anyhow!("timed out")),
                Ok("Australia\nBendigo\n19:10\nNew Zealand\nAddington\n19:20".to_string()),
            ],
            &[],
        );
        let venues = wait_for_venues(&mut source, &quick()).unwrap();
        assert_eq!(
            venues,
            vec![VenueSchedule {
                venue: "Bendigo".into(),
                times: vec!["19:10".into()],
            }]
        );
    }

    #[test]
    fn gives_up_after_configured_attempts() {
        let mut source = scripted(vec![], &[]);
        let config = quick().with_lobby_attempts(3);
        assert!(wait_for_venues(&mut source, &config).unwrap().is_empty());
    }

    #[test]
    fn whole_card_wins_over_race_times() {
        let mut source = scripted(vec![], &["Bendigo"]);
        let schedule = VenueSchedule {
            venue: "Bendigo".into(),
            times: vec!["19:10".into(), "19:40".into()],
        };
        let captures = collect_meeting(&mut source, &schedule);
        assert_eq!(captures.len(), 1);
        assert_eq!(source.opened, vec!["Bendigo"]);
    }

    #[test]
    fn falls_back_to_each_time_once() {
        let mut source = scripted(vec![], &[]);
        let schedule = VenueSchedule {
            venue: "Gawler".into(),
            times: vec!["19:50".into(), "20:15".into(), "20:40".into()],
        };
        let captures = collect_meeting(&mut source, &schedule);
        let labels: Vec<String> = captures.iter().map(RaceCapture::label).collect();
        assert_eq!(labels, vec!["Gawler 19:50", "Gawler 20:40"]);
        assert_eq!(
            source.opened,
            vec!["Gawler", "Gawler@19:50", "Gawler@20:15", "Gawler@20:40"]
        );
    }

    #[test]
    fn capture_dir_round() {
        let mut dir = CaptureDir::new(CAPTURES);
        let venues = wait_for_venues(&mut dir, &quick()).unwrap();
        let names: Vec<&str> = venues.iter().map(|v| v.venue.as_str()).collect();
        assert_eq!(names, vec!["Sandown Park", "Wentworth Park"]);
        assert_eq!(venues[1].times, vec!["19:50", "20:15"]);

        let captures = collect_all(&mut dir, &venues);
        let labels: Vec<String> = captures.iter().map(RaceCapture::label).collect();
        assert_eq!(labels, vec!["Sandown Park", "Wentworth Park 19:50"]);
        assert_eq!(captures[0].form_blocks.len(), 3);
        assert_eq!(captures[1].form_blocks.len(), 1);
        assert_eq!(captures[1].runner_lines[0], "19:50 Wentworth Park");
    }

    #[test]
    fn missing_lobby_is_an_error() {
        let mut dir = CaptureDir::new("tests/fixtures/captures/nowhere");
        assert!(dir.lobby().is_err());
        assert!(dir.open_meeting("Bendigo").unwrap().is_none());
    }
}
