use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::parser::schema::Species;
use crate::table::Table;

const SEP: char = ',';

fn needs_quotes(field: &str) -> bool {
    field.contains(SEP) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one CSV row. Fields with separators, quotes or line breaks are quoted and
/// embedded quotes doubled.
pub fn write_row<W: Write, S: AsRef<str>>(mut w: W, row: &[S]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{}", SEP)?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

/// Header row, then every data row.
pub fn write_table<W: Write>(mut w: W, table: &Table) -> io::Result<()> {
    write_row(&mut w, table.columns)?;
    for row in &table.rows {
        write_row(&mut w, row)?;
    }
    Ok(())
}

pub fn write_table_file(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    write_table(&mut w, table).with_context(|| format!("Failed to write {}", path.display()))?;
    w.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

pub fn race_data_path(dir: &Path, species: Species) -> PathBuf {
    dir.join(format!("{}_race_data.csv", species.as_str()))
}

pub fn form_data_path(dir: &Path, species: Species) -> PathBuf {
    dir.join(format!("{}_form_data.csv", species.as_str()))
}

// ── Tests ──
