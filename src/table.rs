//! Fixed-column tabular output for entrant snapshots and form history.

use crate::db::{EntrantSnapshot, HistoricalRaceRecord};
use crate::parser::schema::{Species, SpeciesSchema};

pub const ENTRANT_COLUMNS: &[&str] = &[
    "Race", "Entrant Number", "Name", "Form", "Win Price", "Place Price",
];

pub const HORSE_ENTRANT_COLUMNS: &[&str] = &[
    "Race", "Entrant Number", "Name", "Form", "Win Price", "Place Price",
    "Jockey", "Trainer", "Barrier", "Age/Sex", "Status",
];

pub const HISTORY_COLUMNS: &[&str] = &[
    "Competitor", "Placing", "Date", "Track", "Days", "Distance", "Margin", "Class",
    "Box/Barrier", "In-Run", "Weight", "Price", "Sectional", "Time", "Best", "Placing-Detail",
];

pub const HORSE_HISTORY_COLUMNS: &[&str] = &[
    "Competitor", "Placing", "Date", "Track", "Days", "Distance", "Margin", "Class",
    "Box/Barrier", "In-Run", "Weight", "Price", "Sectional", "Time", "Best", "Placing-Detail",
    "Jockey", "Condition",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn entrants(schema: &SpeciesSchema, entrants: &[EntrantSnapshot]) -> Self {
        let rows = entrants
            .iter()
            .map(|e| entrant_row(e, schema.species))
            .collect();
        Table {
            columns: schema.entrant_columns,
            rows,
        }
    }

    pub fn history(schema: &SpeciesSchema, records: &[HistoricalRaceRecord]) -> Self {
        let rows = records
            .iter()
            .map(|r| history_row(r, schema.species))
            .collect();
        Table {
            columns: schema.history_columns,
            rows,
        }
    }

    pub fn empty(columns: &'static [&'static str]) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends `other` after the existing rows. Both tables must share a column schema.
    pub fn append(&mut self, other: Table) {
        debug_assert_eq!(self.columns, other.columns, "appending tables with different schemas");
        self.rows.extend(other.rows);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Concatenates per-race tables in the order given.
pub fn concat(columns: &'static [&'static str], tables: impl IntoIterator<Item = Table>) -> Table {
    let mut out = Table::empty(columns);
    for t in tables {
        out.append(t);
    }
    out
}

fn cell(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn entrant_row(e: &EntrantSnapshot, species: Species) -> Vec<String> {
    let mut row = vec![
        e.race_label().unwrap_or_default().to_string(),
        e.number.clone(),
        e.name.clone(),
        cell(&e.form),
        cell(&e.win),
        cell(&e.place),
    ];
    if species == Species::Horse {
        row.extend([
            cell(&e.jockey),
            cell(&e.trainer),
            cell(&e.barrier),
            cell(&e.age_sex),
            e.status.as_str().to_string(),
        ]);
    }
    row
}

fn history_row(r: &HistoricalRaceRecord, species: Species) -> Vec<String> {
    let mut row = vec![
        r.competitor.clone(),
        r.placing.clone(),
        r.date.clone(),
        r.track.clone(),
        r.days.clone(),
        r.distance.clone(),
        r.margin.clone(),
        r.class.clone(),
        r.barrier.clone(),
        r.in_run.clone(),
        r.weight.clone(),
        r.price.clone(),
        r.sectional.clone(),
        r.race_time.clone(),
        r.best.clone(),
        r.placing_detail.clone(),
    ];
    if species == Species::Horse {
        row.extend([r.jockey.clone(), r.condition.clone()]);
    }
    row
}
