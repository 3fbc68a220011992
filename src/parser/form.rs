use tracing::{debug, warn};

use super::lines::{
    classify, clean_lines, is_boundary, is_in_run, is_placing, is_placing_detail,
    is_plain_number, is_spell, normalize_date, Line, HISTORY_MARKER, NOT_AVAILABLE, TABLE_HEADER,
};
use super::schema::{SpeciesSchema, TailField, Trailer, TRACK_CONDITIONS};
use crate::db::HistoricalRaceRecord;

/// Parse every competitor block in order. Records from one block stay contiguous.
pub fn parse_form_blocks<S: AsRef<str>>(
    blocks: &[S],
    schema: &SpeciesSchema,
) -> Vec<HistoricalRaceRecord> {
    blocks
        .iter()
        .flat_map(|b| parse_form_block(b.as_ref(), schema))
        .collect()
}

/// Parse one competitor's block: identity line(s), then the race-history table.
/// Emits one record per placing-token line, in the order rendered.
pub fn parse_form_block(block: &str, schema: &SpeciesSchema) -> Vec<HistoricalRaceRecord> {
    let lines = clean_lines(block);

    let Some(name) = competitor_name(&lines) else {
        debug!("Form block without a competitor name, skipping");
        return Vec::new();
    };
    let Some(history) = lines.iter().position(|l| l.contains(HISTORY_MARKER)) else {
        debug!("No race history for {}", name);
        return Vec::new();
    };
    let Some(header) = lines[history..].iter().position(|l| *l == TABLE_HEADER) else {
        debug!("Race history for {} has no table header", name);
        return Vec::new();
    };

    let mut records = Vec::new();
    let mut i = history + header + 1;

    while i < lines.len() {
        match classify(lines[i]) {
            Line::Placing(placing) => {
                let (record, next) = read_record(&lines, i + 1, name, placing, schema);
                if schema.drop_unridden && record.jockey == NOT_AVAILABLE {
                    debug!("Dropping {} {} on {}: no jockey", name, record.placing, record.date);
                } else {
                    records.push(record);
                }
                i = next;
            }
            Line::Spell => {
                debug!("Skipping spell marker for {}: {}", name, lines[i]);
                i += 1;
            }
            _ => i += 1,
        }
    }

    records
}

/// First identity line before the history section that is not a bare number or separator.
fn competitor_name<'a>(lines: &[&'a str]) -> Option<&'a str> {
    lines
        .iter()
        .take_while(|l| **l != "T:" && !l.contains(HISTORY_MARKER))
        .find(|l| **l != "," && !l.bytes().all(|b| b.is_ascii_digit()))
        .copied()
}

/// Lines a record may read as data. Record anchors, section markers and spell
/// annotations never are.
fn data_line<'a>(lines: &[&'a str], i: usize) -> Option<&'a str> {
    lines
        .get(i)
        .copied()
        .filter(|l| !is_placing(l) && !is_boundary(l) && !is_spell(l))
}

fn read_record(
    lines: &[&str],
    mut i: usize,
    name: &str,
    placing: &str,
    schema: &SpeciesSchema,
) -> (HistoricalRaceRecord, usize) {
    let mut record = HistoricalRaceRecord::new(name, placing);

    if let Some(raw) = data_line(lines, i) {
        record.date = normalize_date(raw);
        i += 1;
    }

    // Track name and numeric tail run up to the price (or, for horses, the condition).
    let mut region = Vec::new();
    while i < lines.len() && !schema.ends_region(lines[i]) {
        let line = lines[i];
        if is_placing(line) || is_boundary(line) {
            break;
        }
        if !is_spell(line) {
            region.push(line);
        }
        i += 1;
    }

    let (track, tail) = split_region(&region);
    record.track = track;
    match schema.resolve_arity(tail) {
        Some(rule) => {
            for (field, value) in rule.fields.iter().zip(tail) {
                assign(&mut record, *field, value);
            }
        }
        None => {
            warn!(
                "Invalid number of values ({}) between track and price for {} on {}",
                tail.len(),
                name,
                record.date
            );
            record.in_run = NOT_AVAILABLE.to_string();
        }
    }

    for step in schema.trailer {
        let Some(line) = data_line(lines, i) else {
            break;
        };
        if take_trailer(&mut record, *step, line) {
            i += 1;
        }
    }

    if record.in_run != NOT_AVAILABLE && !is_in_run(&record.in_run) {
        warn!(
            "Invalid in-run data '{}' for {} on {}",
            record.in_run, name, record.date
        );
        record.in_run = NOT_AVAILABLE.to_string();
    }

    let mut detail = Vec::new();
    while i < lines.len() {
        let line = lines[i];
        if is_placing(line) || is_boundary(line) || is_spell(line) {
            break;
        }
        if is_placing_detail(line) {
            detail.push(line);
        }
        i += 1;
    }
    if !detail.is_empty() {
        record.placing_detail = detail.join("\n");
    }

    (record, i)
}

/// Track name is everything before the first plain number; the rest is the numeric tail.
fn split_region<'r, 'a>(region: &'r [&'a str]) -> (String, &'r [&'a str]) {
    let split = region
        .iter()
        .position(|t| is_plain_number(t))
        .unwrap_or(region.len());
    (region[..split].join(" "), &region[split..])
}

fn assign(record: &mut HistoricalRaceRecord, field: TailField, value: &str) {
    let slot = match field {
        TailField::Days => &mut record.days,
        TailField::RaceTime => &mut record.race_time,
        TailField::Distance => &mut record.distance,
        TailField::Margin => &mut record.margin,
        TailField::Class => &mut record.class,
        TailField::Barrier => &mut record.barrier,
        TailField::InRun => &mut record.in_run,
    };
    *slot = value.to_string();
}

/// Returns whether the line was consumed.
fn take_trailer(record: &mut HistoricalRaceRecord, step: Trailer, line: &str) -> bool {
    let slot = match step {
        Trailer::Price if line.starts_with('$') => &mut record.price,
        Trailer::Sectional => &mut record.sectional,
        Trailer::RaceTime => &mut record.race_time,
        Trailer::Best if is_plain_number(line) || line == NOT_AVAILABLE || line == "0" => {
            &mut record.best
        }
        Trailer::Condition if TRACK_CONDITIONS.contains(&line) => &mut record.condition,
        Trailer::Barrier if line.bytes().all(|b| b.is_ascii_digit()) => &mut record.barrier,
        Trailer::InRun if line.contains(',') || is_in_run(line) => &mut record.in_run,
        Trailer::Jockey => &mut record.jockey,
        Trailer::Weight if is_plain_number(line) => &mut record.weight,
        _ => return false,
    };
    *slot = line.to_string();
    true
}

// ── Tests ──
