//! Load/save of integrator tables.
//!
//! The format is picked from the file extension:
//! - `.csv`: header row plus one record per line, fixed column order
//! - `.bin`: compact bincode encoding of the row vector
//! - `.jsonl`: one JSON object per row

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::{
    ErrorRate, ErrorRates, IntegratedData, IntegratedInstance, Label, ObservedInstance,
    PredictedInstance,
};

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("unsupported table format: {0}")]
    UnsupportedFormat(String),
    #[error("binary encoding error: {0}")]
    Binary(String),
    #[error("json error: {0}")]
    Json(String),
    #[error("label {0:?} cannot be written to CSV")]
    InvalidLabel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Binary,
    JsonLines,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "bin" => Ok(Self::Binary),
            "jsonl" => Ok(Self::JsonLines),
            _ => Err(DataError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A row type with a fixed CSV column layout.
trait TableRow: Serialize + DeserializeOwned {
    const HEADER: &'static str;

    fn to_csv(&self) -> Result<String, DataError>;

    fn from_csv(fields: &[&str], line: usize) -> Result<Self, DataError>;
}

fn csv_label(label: &Label) -> Result<&str, DataError> {
    let name = label.name();
    if name.contains([',', '\n', '\r']) {
        return Err(DataError::InvalidLabel(name.to_string()));
    }
    Ok(name)
}

fn expect_fields(fields: &[&str], n: usize, line: usize) -> Result<(), DataError> {
    if fields.len() != n {
        return Err(DataError::Parse {
            line,
            message: format!("expected {n} fields, found {}", fields.len()),
        });
    }
    Ok(())
}

fn parse_field<T: std::str::FromStr>(raw: &str, name: &str, line: usize) -> Result<T, DataError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| DataError::Parse {
        line,
        message: format!("invalid {name} {raw:?}: {e}"),
    })
}

fn parse_bool(raw: &str, line: usize) -> Result<bool, DataError> {
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(DataError::Parse {
            line,
            message: format!("invalid boolean {other:?}"),
        }),
    }
}

impl TableRow for PredictedInstance {
    const HEADER: &'static str = "ID,LABEL,FUNCTION_ID,VALUE";

    fn to_csv(&self) -> Result<String, DataError> {
        Ok(format!(
            "{},{},{},{}",
            self.id,
            csv_label(&self.label)?,
            self.function_id,
            self.value
        ))
    }

    fn from_csv(fields: &[&str], line: usize) -> Result<Self, DataError> {
        expect_fields(fields, 4, line)?;
        Ok(Self {
            id: parse_field(fields[0], "ID", line)?,
            label: Label::new(fields[1]),
            function_id: parse_field(fields[2], "FUNCTION_ID", line)?,
            value: parse_field(fields[3], "VALUE", line)?,
        })
    }
}

impl TableRow for ObservedInstance {
    const HEADER: &'static str = "ID,LABEL,VALUE";

    fn to_csv(&self) -> Result<String, DataError> {
        Ok(format!("{},{},{}", self.id, csv_label(&self.label)?, self.value))
    }

    fn from_csv(fields: &[&str], line: usize) -> Result<Self, DataError> {
        expect_fields(fields, 3, line)?;
        Ok(Self {
            id: parse_field(fields[0], "ID", line)?,
            label: Label::new(fields[1]),
            value: parse_bool(fields[2], line)?,
        })
    }
}

impl TableRow for ErrorRate {
    const HEADER: &'static str = "LABEL,FUNCTION_ID,VALUE";

    fn to_csv(&self) -> Result<String, DataError> {
        Ok(format!(
            "{},{},{}",
            csv_label(&self.label)?,
            self.function_id,
            self.value
        ))
    }

    fn from_csv(fields: &[&str], line: usize) -> Result<Self, DataError> {
        expect_fields(fields, 3, line)?;
        Ok(Self {
            label: Label::new(fields[0]),
            function_id: parse_field(fields[1], "FUNCTION_ID", line)?,
            value: parse_field(fields[2], "VALUE", line)?,
        })
    }
}

impl TableRow for IntegratedInstance {
    const HEADER: &'static str = "ID,LABEL,VALUE";

    fn to_csv(&self) -> Result<String, DataError> {
        Ok(format!("{},{},{}", self.id, csv_label(&self.label)?, self.value))
    }

    fn from_csv(fields: &[&str], line: usize) -> Result<Self, DataError> {
        expect_fields(fields, 3, line)?;
        Ok(Self {
            id: parse_field(fields[0], "ID", line)?,
            label: Label::new(fields[1]),
            value: parse_field(fields[2], "VALUE", line)?,
        })
    }
}

fn save_rows<T: TableRow>(path: &Path, rows: &[T]) -> Result<(), DataError> {
    let format = TableFormat::from_path(path)?;
    // Encode everything first so a bad row never leaves a truncated file behind.
    let bytes = match format {
        TableFormat::Csv => {
            let mut out = String::with_capacity(rows.len() * 32);
            out.push_str(T::HEADER);
            out.push('\n');
            for row in rows {
                out.push_str(&row.to_csv()?);
                out.push('\n');
            }
            out.into_bytes()
        }
        TableFormat::Binary => bincode::serde::encode_to_vec(rows, bincode::config::standard())
            .map_err(|e| DataError::Binary(e.to_string()))?,
        TableFormat::JsonLines => {
            let mut out = Vec::with_capacity(rows.len() * 64);
            for row in rows {
                serde_json::to_writer(&mut out, row).map_err(|e| DataError::Json(e.to_string()))?;
                out.push(b'\n');
            }
            out
        }
    };
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

fn load_rows<T: TableRow>(path: &Path) -> Result<Vec<T>, DataError> {
    match TableFormat::from_path(path)? {
        TableFormat::Csv => {
            let reader = BufReader::new(File::open(path)?);
            let mut rows = Vec::new();
            for (idx, line) in reader.lines().enumerate() {
                let line = line?;
                let line_no = idx + 1;
                if idx == 0 {
                    if line.trim() != T::HEADER {
                        return Err(DataError::Parse {
                            line: line_no,
                            message: format!("expected header {:?}", T::HEADER),
                        });
                    }
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                let fields: Vec<&str> = line.split(',').collect();
                rows.push(T::from_csv(&fields, line_no)?);
            }
            Ok(rows)
        }
        TableFormat::Binary => {
            let bytes = std::fs::read(path)?;
            let (rows, _) = bincode::serde::decode_from_slice::<Vec<T>, _>(
                &bytes,
                bincode::config::standard(),
            )
            .map_err(|e| DataError::Binary(e.to_string()))?;
            Ok(rows)
        }
        TableFormat::JsonLines => {
            let reader = BufReader::new(File::open(path)?);
            let mut rows = Vec::new();
            for (idx, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let row = serde_json::from_str(&line).map_err(|e| DataError::Parse {
                    line: idx + 1,
                    message: e.to_string(),
                })?;
                rows.push(row);
            }
            Ok(rows)
        }
    }
}

pub fn save_predicted_instances(
    path: impl AsRef<Path>,
    rows: &[PredictedInstance],
) -> Result<(), DataError> {
    save_rows(path.as_ref(), rows)
}

pub fn load_predicted_instances(
    path: impl AsRef<Path>,
) -> Result<Vec<PredictedInstance>, DataError> {
    load_rows(path.as_ref())
}

pub fn save_observed_instances(
    path: impl AsRef<Path>,
    rows: &[ObservedInstance],
) -> Result<(), DataError> {
    save_rows(path.as_ref(), rows)
}

pub fn load_observed_instances(path: impl AsRef<Path>) -> Result<Vec<ObservedInstance>, DataError> {
    load_rows(path.as_ref())
}

pub fn save_error_rates(path: impl AsRef<Path>, table: &ErrorRates) -> Result<(), DataError> {
    save_rows(path.as_ref(), table.rows())
}

pub fn load_error_rates(path: impl AsRef<Path>) -> Result<ErrorRates, DataError> {
    load_rows(path.as_ref()).map(ErrorRates::new)
}

pub fn save_integrated_data(
    path: impl AsRef<Path>,
    table: &IntegratedData,
) -> Result<(), DataError> {
    save_rows(path.as_ref(), table.rows())
}

pub fn load_integrated_data(path: impl AsRef<Path>) -> Result<IntegratedData, DataError> {
    load_rows(path.as_ref()).map(IntegratedData::new)
}
