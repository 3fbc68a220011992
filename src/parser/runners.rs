use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use super::lines::{is_number, is_race_time, FORM_RE};
use super::schema::{Species, SpeciesSchema};
use crate::db::{EntrantSnapshot, EntrantStatus, RaceContext};

/// `Fast Dog (1)`
static NAMED_RUNNER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*?)\((\d+)\)$").unwrap());
/// `1. Swift Arrow (4)`
static NUMBERED_RUNNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.\s+(.*?)\s+\((\d+)\)$").unwrap());
static NUMBERED_START_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s+").unwrap());

const SCRATCHED: &str = "Scratched";
const JOCKEY_LABEL: &str = "J";
const TRAINER_LABEL: &str = "T";

/// Parse a runner listing into entrant snapshots, one per entrant anchor, tagged with
/// the most recent race-time line.
pub fn parse_runners<S: AsRef<str>>(lines: &[S], schema: &SpeciesSchema) -> Vec<EntrantSnapshot> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .collect();
    let mut entrants = Vec::new();
    let mut race: Option<RaceContext> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_race_time(line) {
            let (ctx, next) = open_race(&lines, i, schema);
            race = Some(ctx);
            i = next;
            continue;
        }

        let next = match schema.species {
            Species::Greyhound => NAMED_RUNNER_RE.captures(line).map(|caps| {
                let (entrant, next) = named_entrant(&lines, i, &caps, schema, &race);
                entrants.push(entrant);
                next
            }),
            Species::Horse => NUMBERED_RUNNER_RE.captures(line).map(|caps| {
                let (entrant, next) = numbered_entrant(&lines, i, &caps, schema, &race);
                entrants.extend(entrant);
                next
            }),
        };

        i = next.unwrap_or(i + 1);
    }

    entrants
}

/// A line that closes any open entrant lookahead.
fn ends_entrant(line: &str, species: Species) -> bool {
    is_race_time(line)
        || match species {
            Species::Greyhound => NAMED_RUNNER_RE.is_match(line),
            Species::Horse => NUMBERED_START_RE.is_match(line),
        }
}

fn open_race(lines: &[&str], start: usize, schema: &SpeciesSchema) -> (RaceContext, usize) {
    let header: Vec<String> = lines[start + 1..]
        .iter()
        .take(schema.race_header_lines)
        .take_while(|l| !ends_entrant(l, schema.species))
        .map(|l| l.to_string())
        .collect();
    let next = start + 1 + header.len();
    let mut header = header.into_iter();

    let ctx = RaceContext {
        raw: lines[start].to_string(),
        name: header.next(),
        distance: header.next(),
        track: header.next(),
    };
    (ctx, next)
}

/// Fixed-stride layout: form at a known offset, prices from a later offset to the next anchor.
/// Always emits; missing prices stay null.
fn named_entrant(
    lines: &[&str],
    start: usize,
    caps: &Captures,
    schema: &SpeciesSchema,
    race: &Option<RaceContext>,
) -> (EntrantSnapshot, usize) {
    let end = (start + 1..lines.len())
        .find(|&j| ends_entrant(lines[j], schema.species))
        .unwrap_or(lines.len());

    let form = schema
        .form_offset
        .map(|offset| start + offset)
        .filter(|&j| j < end)
        .map(|j| lines[j])
        .filter(|l| FORM_RE.is_match(l))
        .map(str::to_string);

    let price_start = (start + schema.price_offset).min(end);
    let prices: Vec<&str> = lines[price_start..end]
        .iter()
        .copied()
        .filter(|l| is_number(l))
        .collect();
    let (win, place) = last_two(&prices);

    let entrant = EntrantSnapshot {
        race: race.clone(),
        number: caps[2].to_string(),
        name: caps[1].trim().to_string(),
        form,
        win,
        place,
        jockey: None,
        trainer: None,
        barrier: None,
        age_sex: None,
        status: EntrantStatus::Active,
    };
    (entrant, end)
}

/// Labelled layout: scan forward picking up jockey/trainer pairs, form, age/sex and prices
/// until the next anchor. `Scratched` ends the scan and emits without prices; otherwise
/// the entrant is dropped unless every field was found.
fn numbered_entrant(
    lines: &[&str],
    start: usize,
    caps: &Captures,
    schema: &SpeciesSchema,
    race: &Option<RaceContext>,
) -> (Option<EntrantSnapshot>, usize) {
    let species = schema.species;
    let mut entrant = EntrantSnapshot {
        race: race.clone(),
        number: caps[1].to_string(),
        name: caps[2].trim().to_string(),
        form: None,
        win: None,
        place: None,
        jockey: None,
        trainer: None,
        barrier: Some(caps[3].to_string()),
        age_sex: None,
        status: EntrantStatus::Active,
    };
    let mut prices: Vec<&str> = Vec::new();
    let mut j = start + schema.price_offset;

    while j < lines.len() {
        let line = lines[j];
        let value = lines
            .get(j + 1)
            .copied()
            .filter(|v| !ends_entrant(v, species));

        if line == JOCKEY_LABEL && value.is_some() {
            entrant.jockey = value.map(str::to_string);
            j += 2;
            continue;
        }
        if line == TRAINER_LABEL && value.is_some() {
            entrant.trainer = value.map(str::to_string);
            j += 2;
            continue;
        }
        if FORM_RE.is_match(line) {
            entrant.form = Some(line.to_string());
            j += 1;
            continue;
        }
        if schema.is_age_sex(line) {
            entrant.age_sex = Some(line.to_string());
            j += 1;
            continue;
        }
        if line == SCRATCHED {
            entrant.status = EntrantStatus::Scratched;
            return (Some(entrant), j + 1);
        }
        if is_number(line) {
            prices.push(line);
            j += 1;
            continue;
        }
        if ends_entrant(line, species) {
            break;
        }
        j += 1;
    }

    (entrant.win, entrant.place) = last_two(&prices);

    if schema.require_complete_entrant && !is_complete(&entrant) {
        debug!(
            "Dropping incomplete entrant {} {} in {}",
            entrant.number,
            entrant.name,
            entrant.race_label().unwrap_or("unknown race")
        );
        return (None, j);
    }
    (Some(entrant), j)
}

fn is_complete(e: &EntrantSnapshot) -> bool {
    [&e.barrier, &e.jockey, &e.trainer, &e.form, &e.age_sex, &e.win, &e.place]
        .iter()
        .all(|f| f.is_some())
}

/// Back and place price: the last two candidates in order, or a lone back price.
fn last_two(prices: &[&str]) -> (Option<String>, Option<String>) {
    match prices {
        [.., win, place] => (Some(win.to_string()), Some(place.to_string())),
        [win] => (Some(win.to_string()), None),
        [] => (None, None),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lines::clean_lines;
    use crate::parser::schema::{GREYHOUND, HORSE};

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.txt", name)).unwrap()
    }

    fn find<'a>(entrants: &'a [EntrantSnapshot], name: &str) -> &'a EntrantSnapshot {
        entrants
            .iter()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("{name} missing from {entrants:?}"))
    }

    #[test]
    fn greyhound_fixture() {
        let text = fixture("greyhound_runners");
        let entrants = parse_runners(&clean_lines(&text), &GREYHOUND);
        assert_eq!(entrants.len(), 6, "{entrants:?}");

        let fast = find(&entrants, "Fast Dog");
        assert_eq!(fast.number, "1");
        assert_eq!(fast.race_label(), Some("19:42 Wentworth Park"));
        assert_eq!(fast.form.as_deref(), Some("1X21"));
        assert_eq!(fast.win.as_deref(), Some("3.50"));
        assert_eq!(fast.place.as_deref(), Some("1.60"));

        // single price: win only
        let slow = find(&entrants, "Slow Coach");
        assert_eq!(slow.win.as_deref(), Some("12.00"));
        assert_eq!(slow.place, None);

        // no prices: still emitted
        let late = find(&entrants, "Late Bloomer");
        assert_eq!(late.win, None);
        assert_eq!(late.place, None);
        assert_eq!(late.form, None);

        let next_race = find(&entrants, "Harbour Lights");
        assert_eq!(next_race.race_label(), Some("20:04 Wentworth Park"));
    }

    #[test]
    fn greyhound_lookahead_stops_at_next_anchor() {
        // Second runner sits inside the first runner's nominal price window.
        let lines = ["09:15 Angle Park", "Alpha (1)", "4.00", "Bravo (2)", "Box 2", "Last 5", "21", "-", "5.00", "2.00"];
        let entrants = parse_runners(&lines, &GREYHOUND);
        assert_eq!(entrants.len(), 2);
        assert_eq!(entrants[0].name, "Alpha");
        assert_eq!(entrants[0].win, None);
        assert_eq!(entrants[1].name, "Bravo");
        assert_eq!(entrants[1].form.as_deref(), Some("21"));
        assert_eq!(entrants[1].win.as_deref(), Some("5.00"));
        assert_eq!(entrants[1].place.as_deref(), Some("2.00"));
    }

    #[test]
    fn greyhound_before_any_race_line() {
        let entrants = parse_runners(&["Orphan (7)", "a", "b", "X1", "c", "2.10", "1.30"], &GREYHOUND);
        assert_eq!(entrants.len(), 1);
        assert_eq!(entrants[0].race, None);
        assert_eq!(entrants[0].form.as_deref(), Some("X1"));
    }

    #[test]
    fn last_two_prices_win() {
        let lines = ["Alpha (1)", "a", "b", "c", "d", "9.00", "4.00", "3.80", "1.70"];
        let entrants = parse_runners(&lines, &GREYHOUND);
        assert_eq!(entrants[0].win.as_deref(), Some("3.80"));
        assert_eq!(entrants[0].place.as_deref(), Some("1.70"));
    }

    #[test]
    fn horse_fixture() {
        let text = fixture("horse_runners");
        let entrants = parse_runners(&clean_lines(&text), &HORSE);
        let names: Vec<&str> = entrants.iter().map(|e| e.name.as_str()).collect();
        // Bold Venture has a single price and is dropped.
        assert_eq!(names, vec!["Swift Arrow", "Night Raider", "Late Charge", "Coastal Breeze"]);

        let swift = find(&entrants, "Swift Arrow");
        let race = swift.race.as_ref().unwrap();
        assert_eq!(race.raw, "13:15 Flemington");
        assert_eq!(race.name.as_deref(), Some("Race 3 - Lexus Stakes"));
        assert_eq!(race.distance.as_deref(), Some("1600m"));
        assert_eq!(race.track.as_deref(), Some("Flemington"));
        assert_eq!(swift.number, "1");
        assert_eq!(swift.barrier.as_deref(), Some("4"));
        assert_eq!(swift.jockey.as_deref(), Some("J McDonald"));
        assert_eq!(swift.trainer.as_deref(), Some("C Waller"));
        assert_eq!(swift.form.as_deref(), Some("X1121"));
        assert_eq!(swift.age_sex.as_deref(), Some("4yo G"));
        assert_eq!(swift.win.as_deref(), Some("3.20"));
        assert_eq!(swift.place.as_deref(), Some("1.45"));
        assert_eq!(swift.status, EntrantStatus::Active);

        let night = find(&entrants, "Night Raider");
        assert_eq!(night.status, EntrantStatus::Scratched);
        assert_eq!(night.win, None);
        assert_eq!(night.place, None);
        assert_eq!(night.jockey.as_deref(), Some("D Oliver"));

        let coastal = find(&entrants, "Coastal Breeze");
        assert_eq!(coastal.race_label(), Some("13:50 Flemington"));
        assert_eq!(coastal.race.as_ref().unwrap().distance.as_deref(), Some("1200m"));
    }

    #[test]
    fn horse_incomplete_dropped() {
        // no trainer
        let lines = ["14:00 Randwick", "Race 1", "1000m", "Randwick", "1. Quiet One (2)", "J", "T Berry", "3yo F", "21", "4.40", "1.80"];
        assert!(parse_runners(&lines, &HORSE).is_empty());
    }

    #[test]
    fn horse_anchor_is_not_consumed_as_jockey() {
        let lines = [
            "1. First Up (1)", "T", "A Trainer", "4yo G", "11", "2.00", "1.20", "J",
            "2. Second Up (2)", "J", "B Rider", "T", "B Trainer", "5yo M", "32", "3.00", "1.50",
        ];
        let entrants = parse_runners(&lines, &HORSE);
        assert_eq!(entrants.len(), 1);
        assert_eq!(entrants[0].name, "Second Up");
        assert_eq!(entrants[0].jockey.as_deref(), Some("B Rider"));
    }

    #[test]
    fn empty_input() {
        let none: [&str; 0] = [];
        assert!(parse_runners(&none, &GREYHOUND).is_empty());
        assert!(parse_runners(&none, &HORSE).is_empty());
    }
}
