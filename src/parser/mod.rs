pub mod form;
pub mod lines;
pub mod runners;
pub mod schema;
pub mod venues;

use tracing::{debug, warn};

use crate::db::{EntrantSnapshot, HistoricalRaceRecord};
use crate::session::RaceCapture;
use schema::SpeciesSchema;

/// Everything parsed out of one capture.
#[derive(Debug, Clone, Default)]
pub struct ParsedRace {
    pub label: String,
    pub entrants: Vec<EntrantSnapshot>,
    pub history: Vec<HistoricalRaceRecord>,
}

impl ParsedRace {
    pub fn is_empty(&self) -> bool {
        self.entrants.is_empty() && self.history.is_empty()
    }
}

/// Runner list and form blocks of a capture, parsed independently.
pub fn process_capture(capture: &RaceCapture, schema: &SpeciesSchema) -> ParsedRace {
    let label = capture.label();
    let entrants = runners::parse_runners(&capture.runner_lines, schema);
    let history = form::parse_form_blocks(&capture.form_blocks, schema);

    let parsed = ParsedRace {
        label,
        entrants,
        history,
    };

    if parsed.is_empty() {
        warn!("Nothing parsed for {}, skipping", parsed.label);
        return parsed;
    }
    if parsed.entrants.is_empty() {
        warn!("No race data found for {}, skipping", parsed.label);
    }
    if parsed.history.is_empty() {
        warn!("No form data found for {}, skipping", parsed.label);
    }
    debug!(
        "{}: {} entrants, {} history rows from {} form blocks",
        parsed.label,
        parsed.entrants.len(),
        parsed.history.len(),
        capture.form_blocks.len()
    );
    parsed
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::schema::GREYHOUND;
    use crate::session::{CaptureDir, RaceSource};

    #[test]
    fn consolidated_capture() {
        let mut dir = CaptureDir::new("tests/fixtures/captures/greyhound");
        let capture = dir.open_meeting("Sandown Park").unwrap().unwrap();
        let parsed = process_capture(&capture, &GREYHOUND);

        assert_eq!(parsed.label, "Sandown Park");
        let names: Vec<&str> = parsed.entrants.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Fast Dog", "Quick Bolt", "Slow Coach"]);
        assert_eq!(parsed.entrants[2].race_label(), Some("20:05 Sandown Park"));
        assert_eq!(parsed.entrants[2].win.as_deref(), Some("12.00"));
        assert_eq!(parsed.entrants[2].place, None);

        // Slow Coach has no history section.
        assert_eq!(parsed.history.len(), 2);
        assert_eq!(parsed.history[1].competitor, "Quick Bolt");
    }

    #[test]
    fn empty_capture_parses_to_nothing() {
        let capture = RaceCapture::from_text("Bendigo", Some("19:10"), "", "");
        let parsed = process_capture(&capture, &GREYHOUND);
        assert!(parsed.is_empty());
        assert_eq!(parsed.label, "Bendigo 19:10");
    }
}
