use crate::error::{CliError, Result};
use graphite::core::models::species::Species;
use graphite::core::models::structure::Structure;
use nalgebra::{Matrix3, Point3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// On-disk form of a structure.
///
/// Species are given either as element `symbols` or as atomic `numbers`.
/// `cell` rows are the lattice vectors; `pbc` defaults to periodic along all
/// three axes when a cell is present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StructureRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numbers: Option<Vec<u32>>,
    pub positions: Vec<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<[[f64; 3]; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbc: Option<[bool; 3]>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Many(Vec<StructureRecord>),
    One(StructureRecord),
}

impl StructureRecord {
    pub fn into_structure(self, index: usize) -> Result<Structure> {
        let record_error = |reason: String| CliError::Record { index, reason };

        let species = match (self.symbols, self.numbers) {
            (Some(symbols), None) => symbols
                .iter()
                .map(|s| {
                    Species::from_symbol(s)
                        .ok_or_else(|| record_error(format!("unknown element symbol '{s}'")))
                })
                .collect::<Result<Vec<_>>>()?,
            (None, Some(numbers)) => numbers.into_iter().map(Species::new).collect(),
            (Some(_), Some(_)) => {
                return Err(record_error(
                    "give either 'symbols' or 'numbers', not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(record_error("missing 'symbols' or 'numbers'".to_string()));
            }
        };
        let positions = self
            .positions
            .iter()
            .map(|&[x, y, z]| Point3::new(x, y, z))
            .collect();

        let structure = match self.cell {
            Some(rows) => Structure::periodic(
                species,
                positions,
                Matrix3::from_fn(|i, j| rows[i][j]),
                self.pbc.unwrap_or([true; 3]),
            ),
            None if self.pbc.is_some_and(|p| p.iter().any(|&b| b)) => {
                return Err(record_error("'pbc' is set but 'cell' is missing".to_string()));
            }
            None => Structure::new(species, positions),
        };
        structure.map_err(|e| record_error(e.to_string()))
    }

    pub fn from_structure(structure: &Structure, id: Option<String>) -> Self {
        let symbols: Option<Vec<String>> = structure
            .species()
            .iter()
            .map(|s| s.symbol().map(str::to_string))
            .collect();
        let numbers = match symbols {
            Some(_) => None,
            None => Some(structure.species().iter().map(|s| s.0).collect()),
        };
        let lattice = structure.lattice();
        Self {
            id,
            symbols,
            numbers,
            positions: structure
                .positions()
                .iter()
                .map(|p| [p.x, p.y, p.z])
                .collect(),
            cell: lattice.map(|l| {
                let m = l.matrix();
                std::array::from_fn(|i| std::array::from_fn(|j| m[(i, j)]))
            }),
            pbc: lattice.map(|l| l.pbc()),
        }
    }
}

fn is_json_lines(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("jsonl")
}

/// Reads a single record, a JSON array of records, or JSON lines (`.jsonl`).
pub fn read_records(path: &Path) -> Result<Vec<StructureRecord>> {
    debug!("Reading structures from {:?}", path);
    let parse_error = |e: serde_json::Error| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let reader = BufReader::new(File::open(path)?);

    if is_json_lines(path) {
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line).map_err(parse_error)?);
        }
        return Ok(records);
    }

    match serde_json::from_reader(reader).map_err(parse_error)? {
        RecordFile::Many(records) => Ok(records),
        RecordFile::One(record) => Ok(vec![record]),
    }
}

pub fn read_structures(path: &Path) -> Result<Vec<(Option<String>, Structure)>> {
    read_records(path)?
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let id = record.id.clone();
            Ok((id, record.into_structure(index)?))
        })
        .collect()
}

/// Writes records in the format implied by the extension of `path`.
pub fn write_records(path: &Path, records: &[StructureRecord]) -> Result<()> {
    let write_error = |e: serde_json::Error| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    if is_json_lines(path) {
        for record in records {
            serde_json::to_writer(&mut writer, record).map_err(write_error)?;
            writeln!(writer)?;
        }
    } else if let [record] = records {
        serde_json::to_writer_pretty(&mut writer, record).map_err(write_error)?;
    } else {
        serde_json::to_writer_pretty(&mut writer, records).map_err(write_error)?;
    }
    writer.flush()?;
    Ok(())
}
