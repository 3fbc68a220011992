mod db;
mod export;
mod odds;
mod parser;
mod session;
mod table;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use parser::schema::{Species, SpeciesSchema};
use session::{CaptureDir, RaceCapture, SessionConfig};
use table::Table;

const CHUNK_SIZE: usize = 64;
const CELL_WIDTH: usize = 24;

#[derive(Parser)]
#[command(name = "form_scraper", about = "Racing runner lists and form history from captured race pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the venues a captured lobby shows for a country
    Venues {
        /// Capture directory containing lobby.txt
        dir: PathBuf,
        #[arg(short, long, default_value = "Australia")]
        country: String,
    },
    /// Venue table with race times from a lobby capture
    Schedule {
        file: PathBuf,
    },
    /// Parse a runner list
    Runners {
        #[arg(value_enum)]
        species: Species,
        file: PathBuf,
    },
    /// Parse form blocks (one competitor per blank-line-separated block)
    Form {
        #[arg(value_enum)]
        species: Species,
        file: PathBuf,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Collect every race in a capture directory, write CSVs and save to the database
    Process {
        #[arg(value_enum)]
        species: Species,
        dir: PathBuf,
        /// Output directory for CSV files
        #[arg(short, long, default_value = "data")]
        out: PathBuf,
        #[arg(short, long, default_value = "Australia")]
        country: String,
        /// Lobby reads before giving up
        #[arg(long, default_value = "5")]
        attempts: u32,
        /// Skip the database
        #[arg(long)]
        no_db: bool,
    },
    /// Live fixed-win prices for today's open races
    Odds {
        #[arg(value_enum)]
        species: Species,
        /// Also write the rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Stored form history for one competitor
    History {
        #[arg(value_enum)]
        species: Species,
        competitor: String,
    },
    /// Show database statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Venues { dir, country } => {
            let mut source = CaptureDir::new(dir);
            let config = SessionConfig::new(country);
            let venues = session::wait_for_venues(&mut source, &config)?;
            if venues.is_empty() {
                println!("No {} venues found.", config.country);
                return Ok(());
            }
            for v in &venues {
                println!("{:<24} {}", truncate(&v.venue, CELL_WIDTH), v.times.join(" "));
            }
            println!("\n{} venues", venues.len());
            Ok(())
        }
        Commands::Schedule { file } => {
            let text = read_text(&file)?;
            let schedule = parser::venues::location_times(&text, parser::venues::KNOWN_COUNTRIES);
            for v in &schedule {
                println!("{:<24} {}", truncate(&v.venue, CELL_WIDTH), v.times.join(" "));
            }
            Ok(())
        }
        Commands::Runners { species, file } => {
            let text = read_text(&file)?;
            let schema = species.schema();
            let lines = parser::lines::clean_lines(&text);
            let entrants = parser::runners::parse_runners(&lines, schema);
            if entrants.is_empty() {
                println!("No entrants found.");
                return Ok(());
            }
            print_table(&Table::entrants(schema, &entrants), entrants.len());
            Ok(())
        }
        Commands::Form { species, file, limit } => {
            let text = read_text(&file)?;
            let schema = species.schema();
            let blocks = session::split_blocks(&text);
            let records = parser::form::parse_form_blocks(&blocks, schema);
            if records.is_empty() {
                println!("No form history found.");
                return Ok(());
            }
            print_table(&Table::history(schema, &records), limit);
            println!("\n{} records from {} blocks", records.len(), blocks.len());
            Ok(())
        }
        Commands::Process {
            species,
            dir,
            out,
            country,
            attempts,
            no_db,
        } => {
            let config = SessionConfig::new(country).with_lobby_attempts(attempts);
            let mut source = CaptureDir::new(dir);
            let venues = session::wait_for_venues(&mut source, &config)?;
            if venues.is_empty() {
                println!("No {} venues in lobby. Nothing to process.", config.country);
                return Ok(());
            }

            let t_collect = Instant::now();
            let captures = session::collect_all(&mut source, &venues);
            println!(
                "Collected {} captures from {} venues in {:.1}s",
                captures.len(),
                venues.len(),
                t_collect.elapsed().as_secs_f64()
            );
            if captures.is_empty() {
                println!("No races could be opened.");
                return Ok(());
            }

            let conn = if no_db {
                None
            } else {
                let conn = db::connect()?;
                db::init_schema(&conn)?;
                Some(conn)
            };

            let output = process_captures(conn.as_ref(), &captures, species.schema())?;
            let race_csv = export::race_data_path(&out, species);
            let form_csv = export::form_data_path(&out, species);
            export::write_table_file(&race_csv, &output.entrants)?;
            export::write_table_file(&form_csv, &output.history)?;
            output.counts.print();
            if output.history.is_empty() {
                println!("No form history parsed; {} has a header row only.", form_csv.display());
            }
            println!("Wrote {} and {}", race_csv.display(), form_csv.display());
            Ok(())
        }
        Commands::Odds { species, csv } => {
            let rows = odds::fetch_odds(odds::OddsClient::default(), species).await?;
            if rows.is_empty() {
                println!("No open {} races with prices.", species.as_str());
                return Ok(());
            }
            let table = Table {
                columns: odds::ODDS_COLUMNS,
                rows: rows.iter().map(odds::OddsRow::cells).collect(),
            };
            print_table(&table, table.len());
            if let Some(path) = csv {
                export::write_table_file(&path, &table)?;
                println!("\nSaved {} rows to {}", table.len(), path.display());
            }
            Ok(())
        }
        Commands::History { species, competitor } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let records = db::fetch_history(&conn, species, &competitor)?;
            if records.is_empty() {
                println!("No stored history for {}.", competitor);
                return Ok(());
            }
            print_table(&Table::history(species.schema(), &records), records.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Entrants:    {}", s.entrants);
            println!("Scratched:   {}", s.scratched);
            println!("History:     {}", s.history);
            println!("Competitors: {}", s.competitors);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

struct ProcessCounts {
    races: usize,
    entrants: usize,
    history: usize,
    saved_entrants: usize,
    saved_history: usize,
    empty: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Parsed {} captures: {} entrants, {} history rows ({} empty blocks skipped).",
            self.races, self.entrants, self.history, self.empty,
        );
        println!(
            "Saved {} entrants, {} new history rows.",
            self.saved_entrants, self.saved_history,
        );
    }
}

struct ProcessOutput {
    counts: ProcessCounts,
    entrants: Table,
    history: Table,
}

/// Parse captures in parallel chunks; tables keep capture order.
fn process_captures(
    conn: Option<&rusqlite::Connection>,
    captures: &[RaceCapture],
    schema: &SpeciesSchema,
) -> anyhow::Result<ProcessOutput> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(captures.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        races: 0,
        entrants: 0,
        history: 0,
        saved_entrants: 0,
        saved_history: 0,
        empty: 0,
    };
    let mut entrant_tables = Vec::new();
    let mut history_tables = Vec::new();

    for chunk in captures.chunks(CHUNK_SIZE) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|c| parser::process_capture(c, schema))
            .collect();

        for race in results {
            counts.races += 1;
            counts.empty += race.entrants.is_empty() as usize + race.history.is_empty() as usize;

            if !race.entrants.is_empty() {
                counts.entrants += race.entrants.len();
                if let Some(conn) = conn {
                    counts.saved_entrants += db::save_entrants(conn, schema.species, &race.entrants)?;
                }
                entrant_tables.push(Table::entrants(schema, &race.entrants));
            }
            if !race.history.is_empty() {
                counts.history += race.history.len();
                if let Some(conn) = conn {
                    counts.saved_history += db::save_history(conn, schema.species, &race.history)?;
                }
                history_tables.push(Table::history(schema, &race.history));
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(ProcessOutput {
        counts,
        entrants: table::concat(schema.entrant_columns, entrant_tables),
        history: table::concat(schema.history_columns, history_tables),
    })
}

/// Column-aligned console table; cells are cut to [`CELL_WIDTH`] and newlines flattened.
fn print_table(table: &Table, limit: usize) {
    let shown: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(limit)
        .map(|row| {
            row.iter()
                .map(|c| truncate(&c.replace('\n', " / "), CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, h)| {
            shown
                .iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain([h.chars().count()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    println!("{}", format_row(table.columns, &widths));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1)));
    for row in &shown {
        println!("{}", format_row(row, &widths));
    }
    if table.len() > shown.len() {
        println!("... {} more rows", table.len() - shown.len());
    }
}

fn format_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(c, w)| format!("{:<w$}", c.as_ref(), w = *w))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──
