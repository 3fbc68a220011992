//! Per-species layout descriptors.
//!
//! Greyhound and horse pages render the same families of text with different field sets
//! and strides. Everything that differs between the two lives here as data, so the
//! runner and form parsers stay single code paths.

use serde::Serialize;

use super::lines::{is_plain_number, AGE_SEX_RE};
use crate::table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Greyhound,
    Horse,
}

impl Species {
    pub fn schema(self) -> &'static SpeciesSchema {
        match self {
            Species::Greyhound => &GREYHOUND,
            Species::Horse => &HORSE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Species::Greyhound => "greyhound",
            Species::Horse => "horse",
        }
    }
}

/// Named slots of the numeric tail that follows the track name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TailField {
    Days,
    RaceTime,
    Distance,
    Margin,
    Class,
    Barrier,
    InRun,
}

/// Extra condition an arity rule places on the tail, for lengths with two layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailShape {
    Any,
    LastNumeric,
    LastText,
}

#[derive(Debug)]
pub struct ArityRule {
    pub len: usize,
    pub shape: TailShape,
    pub fields: &'static [TailField],
}

impl ArityRule {
    fn matches(&self, tail: &[&str]) -> bool {
        if tail.len() != self.len {
            return false;
        }
        let last_numeric = tail.last().is_some_and(|t| is_plain_number(t));
        match self.shape {
            TailShape::Any => true,
            TailShape::LastNumeric => last_numeric,
            TailShape::LastText => !last_numeric,
        }
    }
}

/// Fields read after the numeric tail, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailer {
    /// `$`-prefixed starting price; only taken when present.
    Price,
    /// Taken unconditionally.
    Sectional,
    /// Taken unconditionally.
    RaceTime,
    /// Numeric, `N/A` or `0`; otherwise left as `N/A` and the line is not consumed.
    Best,
    /// `S`, `G` or `H`.
    Condition,
    /// Bare integer.
    Barrier,
    /// Comma-separated positions.
    InRun,
    /// Taken unconditionally.
    Jockey,
    /// Plain number.
    Weight,
}

pub const TRACK_CONDITIONS: &[&str] = &["S", "G", "H"];

#[derive(Debug)]
pub struct SpeciesSchema {
    pub species: Species,
    /// Lines after the race-time anchor that carry race name, distance and track.
    pub race_header_lines: usize,
    /// Fixed offset from the entrant anchor to the form code; `None` scans for it.
    pub form_offset: Option<usize>,
    /// Offset from the entrant anchor where price collection starts.
    pub price_offset: usize,
    /// Drop entrants missing any required field instead of emitting nulls.
    pub require_complete_entrant: bool,
    /// The track region also ends at a track-condition line.
    pub region_ends_at_condition: bool,
    /// Discard history rows whose rendered jockey is `N/A`.
    pub drop_unridden: bool,
    pub arity: &'static [ArityRule],
    pub trailer: &'static [Trailer],
    pub entrant_columns: &'static [&'static str],
    pub history_columns: &'static [&'static str],
}

use TailField::*;

pub static GREYHOUND: SpeciesSchema = SpeciesSchema {
    species: Species::Greyhound,
    race_header_lines: 0,
    form_offset: Some(3),
    price_offset: 5,
    require_complete_entrant: false,
    region_ends_at_condition: false,
    drop_unridden: false,
    arity: &[
        ArityRule {
            len: 6,
            shape: TailShape::Any,
            fields: &[Days, Distance, Margin, Class, Barrier, InRun],
        },
        ArityRule {
            len: 5,
            shape: TailShape::Any,
            fields: &[Distance, Margin, Class, Barrier, InRun],
        },
    ],
    trailer: &[Trailer::Price, Trailer::Sectional, Trailer::RaceTime, Trailer::Best],
    entrant_columns: table::ENTRANT_COLUMNS,
    history_columns: table::HISTORY_COLUMNS,
};

pub static HORSE: SpeciesSchema = SpeciesSchema {
    species: Species::Horse,
    race_header_lines: 3,
    form_offset: None,
    price_offset: 1,
    require_complete_entrant: true,
    region_ends_at_condition: true,
    drop_unridden: true,
    arity: &[
        ArityRule {
            len: 5,
            shape: TailShape::Any,
            fields: &[Days, RaceTime, Distance, Margin, Class],
        },
        ArityRule {
            len: 4,
            shape: TailShape::LastNumeric,
            fields: &[Days, RaceTime, Distance, Margin],
        },
        ArityRule {
            len: 4,
            shape: TailShape::LastText,
            fields: &[RaceTime, Distance, Margin, Class],
        },
        ArityRule {
            len: 3,
            shape: TailShape::Any,
            fields: &[RaceTime, Distance, Margin],
        },
    ],
    trailer: &[
        Trailer::Condition,
        Trailer::Barrier,
        Trailer::InRun,
        Trailer::Jockey,
        Trailer::Weight,
        Trailer::Price,
    ],
    entrant_columns: table::HORSE_ENTRANT_COLUMNS,
    history_columns: table::HORSE_HISTORY_COLUMNS,
};

impl SpeciesSchema {
    pub fn resolve_arity(&self, tail: &[&str]) -> Option<&ArityRule> {
        self.arity.iter().find(|rule| rule.matches(tail))
    }

    /// First line past the track + numeric-tail region.
    pub fn ends_region(&self, line: &str) -> bool {
        line.starts_with('$')
            || (self.region_ends_at_condition && TRACK_CONDITIONS.contains(&line))
    }

    pub fn is_age_sex(&self, line: &str) -> bool {
        AGE_SEX_RE.is_match(line)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_slot_assigned_once() {
        for schema in [&GREYHOUND, &HORSE] {
            for rule in schema.arity {
                assert_eq!(rule.fields.len(), rule.len, "{:?} len {}", schema.species, rule.len);
                let unique: HashSet<_> = rule.fields.iter().collect();
                assert_eq!(unique.len(), rule.fields.len(), "{:?} len {}", schema.species, rule.len);
            }
        }
    }

    #[test]
    fn table_covers_three_to_six() {
        let lens: HashSet<usize> = GREYHOUND
            .arity
            .iter()
            .chain(HORSE.arity)
            .map(|r| r.len)
            .collect();
        assert_eq!(lens, HashSet::from([3, 4, 5, 6]));
    }

    #[test]
    fn horse_four_dispatches_on_last_token() {
        let numeric = HORSE.resolve_arity(&["14", "70.45", "1200", "0.5"]).unwrap();
        assert_eq!(numeric.fields, &[Days, RaceTime, Distance, Margin]);
        let text = HORSE.resolve_arity(&["82.10", "1400", "2.3", "BM78"]).unwrap();
        assert_eq!(text.fields, &[RaceTime, Distance, Margin, Class]);
    }

    #[test]
    fn unknown_arity_is_none() {
        assert!(GREYHOUND.resolve_arity(&["450", "2.5", "A"]).is_none());
        assert!(HORSE.resolve_arity(&["1", "2", "3", "4", "5", "6"]).is_none());
        assert!(HORSE.resolve_arity(&[]).is_none());
    }

    #[test]
    fn region_terminators() {
        assert!(GREYHOUND.ends_region("$2.50"));
        assert!(!GREYHOUND.ends_region("G"));
        assert!(HORSE.ends_region("G"));
        assert!(HORSE.ends_region("$3.20"));
        assert!(!HORSE.ends_region("Geelong"));
    }
}
