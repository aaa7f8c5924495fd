use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::DVector;

use crate::error::{Error, Result};

/// Read one observation per line from delimited text with no header.
///
/// Blank lines are skipped. Fields may be padded with whitespace. Every row
/// must have the dimension of the first.
///
/// # Errors
/// On I/O failure, an unparseable field, a ragged row, or no rows at all.
pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> Result<Vec<DVector<f64>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut observations: Vec<DVector<f64>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line_no = line_of(&record);

        let fields: Vec<f64> = record.deserialize(None).map_err(|err| {
            Error::MalformedObservation {
                line: line_no,
                reason: err.to_string(),
            }
        })?;

        if let Some(x) = fields.iter().find(|x| !x.is_finite()) {
            return Err(Error::MalformedObservation {
                line: line_no,
                reason: format!("non-finite value {x}"),
            });
        }

        if let Some(first) = observations.first()
            && first.len() != fields.len()
        {
            return Err(Error::MalformedObservation {
                line: line_no,
                reason: format!("expected {} fields, found {}", first.len(), fields.len()),
            });
        }

        observations.push(DVector::from_vec(fields));
    }

    if observations.is_empty() {
        return Err(Error::EmptyData);
    }
    Ok(observations)
}

/// Read a comma separated file of observations.
///
/// # Errors
/// See [`read_delimited`].
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<DVector<f64>>> {
    let file = File::open(path)?;
    read_delimited(file, b',')
}

fn line_of(record: &StringRecord) -> usize {
    record
        .position()
        .and_then(|pos| usize::try_from(pos.line()).ok())
        .unwrap_or(0)
}

fn malformed(err: csv::Error) -> Error {
    let line = err
        .position()
        .and_then(|pos| usize::try_from(pos.line()).ok())
        .unwrap_or(0);
    match err.into_kind() {
        csv::ErrorKind::Io(err) => Error::Io(err),
        kind => Error::MalformedObservation {
            line,
            reason: format!("{kind:?}"),
        },
    }
}
