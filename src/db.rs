use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::parser::lines::NOT_AVAILABLE;
use crate::parser::schema::Species;

const DB_PATH: &str = "data/racing.sqlite";
const DB_PATH_ENV: &str = "FORM_SCRAPER_DB";

pub fn db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DB_PATH))
}

pub fn connect() -> Result<Connection> {
    let path = db_path();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    open(&path)
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS entrants (
            id            INTEGER PRIMARY KEY,
            species       TEXT NOT NULL CHECK(species IN ('greyhound','horse')),
            race          TEXT,
            race_name     TEXT,
            distance      TEXT,
            track         TEXT,
            number        TEXT NOT NULL,
            name          TEXT NOT NULL,
            form          TEXT,
            win_price     TEXT,
            place_price   TEXT,
            jockey        TEXT,
            trainer       TEXT,
            barrier       TEXT,
            age_sex       TEXT,
            status        TEXT NOT NULL CHECK(status IN ('Active','Scratched')),
            captured_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_entrants_race ON entrants(race);

        CREATE TABLE IF NOT EXISTS form_history (
            id             INTEGER PRIMARY KEY,
            species        TEXT NOT NULL CHECK(species IN ('greyhound','horse')),
            competitor     TEXT NOT NULL,
            placing        TEXT NOT NULL,
            race_date      TEXT NOT NULL,
            track          TEXT NOT NULL,
            days           TEXT,
            distance       TEXT,
            margin         TEXT,
            class          TEXT,
            barrier        TEXT,
            in_run         TEXT,
            weight         TEXT,
            price          TEXT,
            sectional      TEXT,
            race_time      TEXT,
            best           TEXT,
            placing_detail TEXT,
            jockey         TEXT,
            condition      TEXT,
            captured_at    TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(species, competitor, race_date, track, placing)
        );
        CREATE INDEX IF NOT EXISTS idx_history_competitor ON form_history(competitor);
        ",
    )?;
    Ok(())
}

// ── Entrant snapshots ──

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RaceContext {
    /// The race-time line as rendered, e.g. `19:42 Wentworth Park`.
    pub raw: String,
    pub name: Option<String>,
    pub distance: Option<String>,
    pub track: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntrantStatus {
    Active,
    Scratched,
}

impl EntrantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntrantStatus::Active => "Active",
            EntrantStatus::Scratched => "Scratched",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrantSnapshot {
    /// `None` when the entrant precedes any race-time line.
    pub race: Option<RaceContext>,
    pub number: String,
    pub name: String,
    pub form: Option<String>,
    pub win: Option<String>,
    pub place: Option<String>,
    pub jockey: Option<String>,
    pub trainer: Option<String>,
    pub barrier: Option<String>,
    pub age_sex: Option<String>,
    pub status: EntrantStatus,
}

impl EntrantSnapshot {
    pub fn race_label(&self) -> Option<&str> {
        self.race.as_ref().map(|r| r.raw.as_str())
    }
}

pub fn save_entrants(conn: &Connection, species: Species, rows: &[EntrantSnapshot]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO entrants
             (species, race, race_name, distance, track, number, name, form,
              win_price, place_price, jockey, trainer, barrier, age_sex, status)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        )?;
        for e in rows {
            let race = e.race.as_ref();
            count += stmt.execute(rusqlite::params![
                species.as_str(),
                race.map(|r| &r.raw),
                race.and_then(|r| r.name.as_ref()),
                race.and_then(|r| r.distance.as_ref()),
                race.and_then(|r| r.track.as_ref()),
                e.number, e.name, e.form, e.win, e.place,
                e.jockey, e.trainer, e.barrier, e.age_sex,
                e.status.as_str(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Form history ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalRaceRecord {
    pub competitor: String,
    pub placing: String,
    pub date: String,
    pub track: String,
    pub days: String,
    pub distance: String,
    pub margin: String,
    pub class: String,
    pub barrier: String,
    pub in_run: String,
    pub weight: String,
    pub price: String,
    pub sectional: String,
    pub race_time: String,
    pub best: String,
    pub placing_detail: String,
    pub jockey: String,
    pub condition: String,
}

impl HistoricalRaceRecord {
    /// Every field not yet read from the block reads `N/A`, except the track and the
    /// jockey, which stay empty until a line is consumed for them.
    pub fn new(competitor: &str, placing: &str) -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            competitor: competitor.to_string(),
            placing: placing.to_string(),
            date: na(),
            track: String::new(),
            days: na(),
            distance: na(),
            margin: na(),
            class: na(),
            barrier: na(),
            in_run: na(),
            weight: na(),
            price: na(),
            sectional: na(),
            race_time: na(),
            best: na(),
            placing_detail: na(),
            jockey: String::new(),
            condition: na(),
        }
    }
}

/// Returns the number of new rows; history already stored from an earlier capture is skipped.
pub fn save_history(
    conn: &Connection,
    species: Species,
    rows: &[HistoricalRaceRecord],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO form_history
             (species, competitor, placing, race_date, track, days, distance, margin, class,
              barrier, in_run, weight, price, sectional, race_time, best, placing_detail,
              jockey, condition)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                species.as_str(),
                r.competitor, r.placing, r.date, r.track, r.days, r.distance, r.margin,
                r.class, r.barrier, r.in_run, r.weight, r.price, r.sectional, r.race_time,
                r.best, r.placing_detail, r.jockey, r.condition,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_history(
    conn: &Connection,
    species: Species,
    competitor: &str,
) -> Result<Vec<HistoricalRaceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT competitor, placing, race_date, track, days, distance, margin, class,
                barrier, in_run, weight, price, sectional, race_time, best, placing_detail,
                jockey, condition
         FROM form_history
         WHERE species = ?1 AND competitor = ?2
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![species.as_str(), competitor], |row| {
            Ok(HistoricalRaceRecord {
                competitor: row.get(0)?,
                placing: row.get(1)?,
                date: row.get(2)?,
                track: row.get(3)?,
                days: row.get(4)?,
                distance: row.get(5)?,
                margin: row.get(6)?,
                class: row.get(7)?,
                barrier: row.get(8)?,
                in_run: row.get(9)?,
                weight: row.get(10)?,
                price: row.get(11)?,
                sectional: row.get(12)?,
                race_time: row.get(13)?,
                best: row.get(14)?,
                placing_detail: row.get(15)?,
                jockey: row.get(16)?,
                condition: row.get(17)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub entrants: usize,
    pub scratched: usize,
    pub history: usize,
    pub competitors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let entrants: usize = conn.query_row("SELECT COUNT(*) FROM entrants", [], |r| r.get(0))?;
    let scratched: usize = conn.query_row(
        "SELECT COUNT(*) FROM entrants WHERE status = 'Scratched'",
        [],
        |r| r.get(0),
    )?;
    let history: usize = conn.query_row("SELECT COUNT(*) FROM form_history", [], |r| r.get(0))?;
    let competitors: usize = conn.query_row(
        "SELECT COUNT(DISTINCT competitor) FROM form_history",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        entrants,
        scratched,
        history,
        competitors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn record(placing: &str, date: &str) -> HistoricalRaceRecord {
        HistoricalRaceRecord {
            date: date.to_string(),
            track: "Wentworth Park".to_string(),
            ..HistoricalRaceRecord::new("Fast Dog", placing)
        }
    }

    #[test]
    fn new_record_defaults_to_na() {
        let r = HistoricalRaceRecord::new("Fast Dog", "1/6");
        assert_eq!(r.placing, "1/6");
        assert_eq!(r.date, "N/A");
        assert_eq!(r.in_run, "N/A");
        assert_eq!(r.placing_detail, "N/A");
        assert!(r.track.is_empty());
        assert!(r.jockey.is_empty());
    }

    #[test]
    fn history_is_deduplicated_across_saves() {
        let conn = memory();
        let rows = vec![record("1/6", "2023-03-05"), record("2/7", "2023-02-20")];
        assert_eq!(save_history(&conn, Species::Greyhound, &rows).unwrap(), 2);
        assert_eq!(save_history(&conn, Species::Greyhound, &rows).unwrap(), 0);

        let back = fetch_history(&conn, Species::Greyhound, "Fast Dog").unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn entrants_and_stats() {
        let conn = memory();
        let base = EntrantSnapshot {
            race: Some(RaceContext {
                raw: "19:42 Wentworth Park".into(),
                ..Default::default()
            }),
            number: "1".into(),
            name: "Fast Dog".into(),
            form: Some("1X21".into()),
            win: Some("3.50".into()),
            place: Some("1.60".into()),
            jockey: None,
            trainer: None,
            barrier: None,
            age_sex: None,
            status: EntrantStatus::Active,
        };
        let scratched = EntrantSnapshot {
            number: "2".into(),
            name: "Slow Coach".into(),
            win: None,
            place: None,
            status: EntrantStatus::Scratched,
            ..base.clone()
        };
        assert_eq!(save_entrants(&conn, Species::Greyhound, &[base, scratched]).unwrap(), 2);
        save_history(&conn, Species::Greyhound, &[record("1/6", "2023-03-05")]).unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.entrants, 2);
        assert_eq!(s.scratched, 1);
        assert_eq!(s.history, 1);
        assert_eq!(s.competitors, 1);
    }
}
