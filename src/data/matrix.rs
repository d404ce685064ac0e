use std::path::Path;

use ndarray::{s, Array1, Array2};

use crate::error::{Result, ResultExt, TrainerError};

/// Read a CSV file of numbers into a row-major matrix.
///
/// Every record must have the same number of fields. Cells are trimmed before
/// parsing; a cell that is not a number fails with its 1-based row and column.
pub fn load_matrix<P: AsRef<Path>>(path: P, has_headers: bool) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut values = Vec::new();
    let mut n_rows = 0;
    let mut n_cols = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        if row == 0 {
            n_cols = record.len();
        }
        for (col, cell) in record.iter().enumerate() {
            let value: f64 = cell.parse().map_err(|_| {
                TrainerError::InvalidInput(format!(
                    "{}: row {}, column {}: '{}' is not a number",
                    path.display(),
                    row + 1,
                    col + 1,
                    cell
                ))
            })?;
            values.push(value);
        }
        n_rows += 1;
    }

    Array2::from_shape_vec((n_rows, n_cols), values).map_err(|e| {
        TrainerError::InvalidInput(format!("{}: {}", path.display(), e))
    })
}

/// Split a matrix into features (all but the last column) and target (the
/// last column).
pub fn split_features_target(matrix: &Array2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_cols = matrix.ncols();
    if n_cols == 0 {
        return Err(TrainerError::InvalidInput(
            "matrix has no columns to take a target from".to_string(),
        ));
    }
    let features = matrix.slice(s![.., ..n_cols - 1]).to_owned();
    let target = matrix.column(n_cols - 1).to_owned();
    Ok((features, target))
}

/// Write a single column of values as CSV with the given header.
pub fn write_column<P: AsRef<Path>>(path: P, header: &str, values: &Array1<f64>) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record([header])?;
    for value in values {
        wtr.write_record([value.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}
