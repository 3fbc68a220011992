use super::lines::is_bare_time;

/// Country headings rendered in the racing lobby, in lobby order.
pub const KNOWN_COUNTRIES: &[&str] = &[
    "Australia",
    "Brazil",
    "Chile",
    "Italy",
    "New Zealand",
    "France",
    "Germany",
    "Japan",
    "Korea",
    "Malaysia",
    "South Africa",
    "Turkey",
    "UK & Ireland",
    "United States",
    "Canada",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueSchedule {
    pub venue: String,
    pub times: Vec<String>,
}

/// Venue names listed under `target` up to the next country heading in `boundaries`.
///
/// The target heading matches case-insensitively. Lines starting with a digit, `:`, `-`
/// or `,` are race numbers and times, not venues.
pub fn extract_section(blob: &str, target: &str, boundaries: &[&str]) -> Vec<String> {
    let mut venues = Vec::new();
    let mut inside = false;

    for line in blob.lines().map(str::trim) {
        if line.eq_ignore_ascii_case(target) {
            inside = true;
            continue;
        }
        if boundaries.contains(&line) {
            if inside {
                break;
            }
            continue;
        }
        if inside && is_venue_line(line) {
            venues.push(line.to_string());
        }
    }

    venues
}

fn is_venue_line(line: &str) -> bool {
    match line.chars().next() {
        None => false,
        Some(c) => !c.is_ascii_digit() && !matches!(c, ':' | '-' | ','),
    }
}

/// Venue table with race times: each venue line is followed by its `HH:MM` start times.
///
/// Bare race numbers and `exclude`d words are skipped. A venue that appears twice keeps
/// its first position but only the times listed under its last heading.
pub fn location_times(blob: &str, exclude: &[&str]) -> Vec<VenueSchedule> {
    let mut schedule: Vec<VenueSchedule> = Vec::new();
    let mut current: Option<usize> = None;

    for line in blob.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_bare_time(line) {
            if let Some(idx) = current {
                schedule[idx].times.push(line.to_string());
            }
            continue;
        }
        if line.bytes().all(|b| b.is_ascii_digit()) || exclude.contains(&line) {
            continue;
        }

        current = Some(match schedule.iter().position(|v| v.venue == line) {
            Some(idx) => {
                schedule[idx].times.clear();
                idx
            }
            None => {
                schedule.push(VenueSchedule {
                    venue: line.to_string(),
                    times: Vec::new(),
                });
                schedule.len() - 1
            }
        });
    }

    schedule
}

// ── Tests ──
