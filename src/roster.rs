//! Gradebook CSV input and final-grade CSV output.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use crate::config::GradingConfig;
use crate::error::GradeError;
use crate::types::{FinalGradeTable, Roster, RosterRow};

/// Loads a roster CSV from disk.
pub fn load_roster(path: &Path, config: &GradingConfig) -> Result<Roster> {
    let file =
        File::open(path).with_context(|| format!("Failed to open roster: {}", path.display()))?;
    read_roster(file, config).with_context(|| format!("Failed to load roster: {}", path.display()))
}

/// Reads a roster from CSV with a header row.
///
/// The id and group columns are required; ignored columns are skipped and
/// every other column is treated as an assignment score.
pub fn read_roster<R: Read>(reader: R, config: &GradingConfig) -> Result<Roster> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| GradeError::MissingColumn(name.to_string()))
    };
    let id_idx = find(&config.id_column)?;
    let group_idx = find(&config.group_column)?;

    let score_idx: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| {
            *i != id_idx
                && *i != group_idx
                && !config.ignore_columns.iter().any(|c| c.as_str() == *h)
        })
        .map(|(i, _)| i)
        .collect();
    let columns = score_idx.iter().map(|&i| headers[i].to_string()).collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let id = record.get(id_idx).unwrap_or_default().to_string();
        let flag = record.get(group_idx).unwrap_or_default();
        let minoritized = parse_flag(flag).ok_or_else(|| GradeError::InvalidGroupFlag {
            student: id.clone(),
            value: flag.to_string(),
        })?;
        let scores = score_idx
            .iter()
            .map(|&i| record.get(i).unwrap_or_default().to_string());
        rows.push(RosterRow::new(id, minoritized, scores));
    }

    debug!(
        students = rows.len(),
        score_columns = score_idx.len(),
        "Read roster"
    );

    Ok(Roster::new(columns, rows)?)
}

/// Parses a boolean group flag.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Writes the final grade table as CSV; missing values are empty cells.
pub fn write_final_grades<W: Write>(writer: W, table: &FinalGradeTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["ID".to_string(), "minoritized".to_string()];
    header.extend(table.categories.iter().cloned());
    header.push("Final_Grade".to_string());
    wtr.write_record(&header)?;

    let cell = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for row in &table.rows {
        let mut record = vec![row.id.clone(), row.minoritized.to_string()];
        record.extend(
            table
                .categories
                .iter()
                .map(|c| cell(row.category_averages.get(c).copied().flatten())),
        );
        record.push(cell(row.final_grade));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes the final grade table to a CSV file.
pub fn save_final_grades(path: &Path, table: &FinalGradeTable) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create grades file: {}", path.display()))?;
    write_final_grades(file, table)
}
