use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static PLACING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+/\d+$").unwrap());
static RACE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}(\s+.*)?$").unwrap());
static BARE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}$").unwrap());
static PLAIN_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").unwrap());
static IN_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+,)*\d*$").unwrap());
// Finishing-order line such as `1. Fast Dog` or `10. Late Charge`. The dot must not be a
// decimal point, so times like `26.05` are excluded.
static PLACING_DETAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.(\D|$)").unwrap());
/// `SPELL`, `Spell - 90 days`, `LET-UP`. The marker is the whole line, not a word inside a name.
static SPELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(spell|let-up)(\s*[-:(].*)?$").unwrap());

pub static FORM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\dX\-]+$").unwrap());
pub static AGE_SEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+yo\s+[A-Z]$").unwrap());

/// Header line that opens the history section of a form block.
pub const HISTORY_MARKER: &str = "Race History";
/// Column header row; the first placing token follows it.
pub const TABLE_HEADER: &str = "Plc";
const BOUNDARY_MARKERS: &[&str] = &[HISTORY_MARKER, "Back to top"];

pub const NOT_AVAILABLE: &str = "N/A";

/// How a single line of a form block reads, before any positional consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Placing(&'a str),
    Price(&'a str),
    Spell,
    Boundary,
    Text(&'a str),
}

pub fn classify(line: &str) -> Line<'_> {
    if is_placing(line) {
        Line::Placing(line)
    } else if is_spell(line) {
        Line::Spell
    } else if is_boundary(line) {
        Line::Boundary
    } else if line.starts_with('$') {
        Line::Price(line)
    } else {
        Line::Text(line)
    }
}

/// `finishPosition/fieldSize`, e.g. `3/8`. Nothing else opens a history record.
pub fn is_placing(line: &str) -> bool {
    PLACING_RE.is_match(line)
}

/// `HH:MM`, optionally followed by venue text.
pub fn is_race_time(line: &str) -> bool {
    RACE_TIME_RE.is_match(line)
}

pub fn is_bare_time(line: &str) -> bool {
    BARE_TIME_RE.is_match(line)
}

/// Spell and let-up annotations carry no data.
pub fn is_spell(line: &str) -> bool {
    SPELL_RE.is_match(line)
}

pub fn is_boundary(line: &str) -> bool {
    BOUNDARY_MARKERS.contains(&line)
}

/// Integer or decimal with no sign, exponent or separators.
pub fn is_plain_number(token: &str) -> bool {
    PLAIN_NUMBER_RE.is_match(token)
}

/// Anything that parses as a finite float. Looser than [`is_plain_number`]; used for
/// price candidates in runner lists.
pub fn is_number(token: &str) -> bool {
    token.parse::<f64>().is_ok_and(f64::is_finite)
}

pub fn is_in_run(token: &str) -> bool {
    IN_RUN_RE.is_match(token)
}

/// `1. Fast Dog`, `10. Some Horse (3)`. A bare decimal like `26.05` is not a detail line.
pub fn is_placing_detail(line: &str) -> bool {
    PLACING_DETAIL_RE.is_match(line)
}

/// `DD/MM/YYYY` becomes `YYYY-MM-DD`; any other token comes back unchanged.
pub fn normalize_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Trimmed, non-empty lines of a captured block.
pub fn clean_lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placing_tokens() {
        for ok in ["1/6", "10/12", "0/0"] {
            assert!(is_placing(ok), "{ok}");
        }
        for bad in ["1/6a", " 1/6", "1/", "/6", "1-6", "1/6/2023", "05/03/2023", "$2.50"] {
            assert!(!is_placing(bad), "{bad}");
        }
    }

    #[test]
    fn classify_lines_by_shape() {
        assert_eq!(classify("2/7"), Line::Placing("2/7"));
        assert_eq!(classify("$4.10"), Line::Price("$4.10"));
        assert_eq!(classify("Spell - 90 days"), Line::Spell);
        assert_eq!(classify("LET-UP"), Line::Spell);
        assert_eq!(classify("Back to top"), Line::Boundary);
        assert_eq!(classify("Wentworth Park"), Line::Text("Wentworth Park"));
    }

    #[test]
    fn spell_markers_are_whole_lines() {
        for marker in ["SPELL", "Spell", "SPELL - 60 DAYS", "Spell - 90 days", "LET-UP", "let-up (2)"] {
            assert!(is_spell(marker), "{marker}");
        }
        for data in ["Spellbound", "1. Spellbound", "Let-Up Larry", "2. Let-Up Larry", "Dispell"] {
            assert!(!is_spell(data), "{data}");
        }
    }

    #[test]
    fn race_time_with_or_without_venue() {
        assert!(is_race_time("19:42 Wentworth Park"));
        assert!(is_race_time("07:05"));
        assert!(!is_race_time("7:05 Bendigo"));
        assert!(!is_race_time("Wentworth Park 19:42"));
        assert!(is_bare_time("19:42"));
        assert!(!is_bare_time("19:42 Wentworth Park"));
    }

    #[test]
    fn date_normalization() {
        assert_eq!(normalize_date("05/03/2023"), "2023-03-05");
        assert_eq!(normalize_date("31/12/2022"), "2022-12-31");
        // idempotent on ISO
        assert_eq!(normalize_date("2023-03-05"), "2023-03-05");
        assert_eq!(normalize_date(&normalize_date("05/03/2023")), "2023-03-05");
        // total: bad input passes through
        for raw in ["", "31/02/2023", "yesterday", "05/03/23x", "N/A"] {
            assert_eq!(normalize_date(raw), raw);
        }
    }

    #[test]
    fn number_shapes() {
        assert!(is_plain_number("450"));
        assert!(is_plain_number("2.5"));
        assert!(!is_plain_number("1,2,1"));
        assert!(!is_plain_number("-3"));
        assert!(!is_plain_number("A"));
        assert!(!is_plain_number("$2.50"));
        assert!(is_number("3.50"));
        assert!(is_number("12"));
        assert!(!is_number("inf"));
        assert!(!is_number("1X21"));
    }

    #[test]
    fn in_run_and_detail_lines() {
        assert!(is_in_run("1,2,1"));
        assert!(is_in_run("4"));
        assert!(!is_in_run("1,2,x"));
        assert!(is_placing_detail("1. Fast Dog"));
        assert!(is_placing_detail("10. Late Charge (2)"));
        assert!(!is_placing_detail("26.05"));
        assert!(!is_placing_detail("Fast Dog 1."));
    }

    #[test]
    fn clean_lines_drops_blanks() {
        assert_eq!(clean_lines("  a \n\n b\n   \n"), vec!["a", "b"]);
    }
}
