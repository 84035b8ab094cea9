//! Data loading utilities
//!
//! CSV is the only interchange format of the pipeline. Everything is read
//! through polars and handed to the numeric code as row-major `Array2<f64>`
//! with missing cells encoded as `NaN`.

use crate::error::{QcError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Rows scanned for schema inference. SECOM columns can be empty for
/// hundreds of leading rows, so the whole file is scanned.
const INFER_SCHEMA_ROWS: Option<usize> = None;

/// Load a CSV file with a header row
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(QcError::FileNotFound(path.to_path_buf()));
    }

    let start = Instant::now();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(INFER_SCHEMA_ROWS)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(
        path = %path.display(),
        rows = df.height(),
        cols = df.width(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded CSV"
    );
    Ok(df)
}

/// Parse an in-memory CSV document (uploaded batches)
pub fn read_csv_bytes(bytes: Vec<u8>) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(INFER_SCHEMA_ROWS)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Write a DataFrame as CSV through a temporary sibling file, so readers
/// never observe a half-written table.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(df)?;
    write_atomic(path, &buffer)
}

/// Write bytes to `path` via `path.tmp` + rename, creating parent directories
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Column names of a frame, in order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Read one column as nullable f64 values (non-numeric cells become null)
pub fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| QcError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Extract named columns into a row-major `Array2<f64>`; nulls become `NaN`
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| {
            column_to_f64(df, name)
                .map(|values| values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        })
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_data[c][r]))
}

/// All columns of a frame as a row-major matrix
pub fn frame_to_array2(df: &DataFrame) -> Result<Array2<f64>> {
    columns_to_array2(df, &column_names(df))
}

/// Build a frame of f64 columns from a matrix
pub fn array2_to_frame(x: &Array2<f64>, col_names: &[String]) -> Result<DataFrame> {
    if x.ncols() != col_names.len() {
        return Err(QcError::ShapeError {
            expected: format!("{} columns", col_names.len()),
            actual: format!("{} columns", x.ncols()),
        });
    }

    let columns: Vec<Column> = col_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let values: Vec<f64> = x.column(j).to_vec();
            Column::new(name.as_str().into(), values)
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

/// Append an integer label column to a frame
pub fn with_label_column(df: &DataFrame, name: &str, labels: &Array1<i64>) -> Result<DataFrame> {
    if labels.len() != df.height() {
        return Err(QcError::ShapeError {
            expected: format!("{} labels", df.height()),
            actual: format!("{} labels", labels.len()),
        });
    }

    let mut columns: Vec<Column> = df.get_columns().to_vec();
    columns.push(Column::new(name.into(), labels.to_vec()));
    Ok(DataFrame::new(columns)?)
}

/// Split a frame into its feature columns and an integer label vector
pub fn split_target(df: &DataFrame, target: &str) -> Result<(DataFrame, Array1<i64>)> {
    let raw = column_to_f64(df, target)?;
    let labels = raw
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(|v| v.round() as i64).ok_or_else(|| {
                QcError::DataError(format!("missing '{}' value at row {}", target, row))
            })
        })
        .collect::<Result<Vec<i64>>>()?;

    let features = df.drop(target)?;
    Ok((features, Array1::from_vec(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file() {
        let err = load_csv(Path::new("does/not/exist.csv")).unwrap_err();
        assert!(matches!(err, QcError::FileNotFound(_)));
    }

    #[test]
    fn test_csv_roundtrip_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.csv");

        let mut df = df!(
            "a" => &[Some(1.5), None, Some(3.0)],
            "b" => &[1i64, 2, 3]
        )
        .unwrap();
        write_csv(&mut df, &path).unwrap();
        assert!(!path.with_extension("csv.tmp").exists());

        let loaded = load_csv(&path).unwrap();
        assert_eq!(loaded.shape(), (3, 2));
        let a = column_to_f64(&loaded, "a").unwrap();
        assert_eq!(a, vec![Some(1.5), None, Some(3.0)]);
    }

    #[test]
    fn test_columns_to_array2_uses_nan_for_nulls() {
        let df = df!(
            "x" => &[Some(1.0), None],
            "y" => &[Some(2.0), Some(4.0)]
        )
        .unwrap();
        let x = frame_to_array2(&df).unwrap();
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(x[[0, 1]], 2.0);
        assert!(x[[1, 0]].is_nan());
    }

    #[test]
    fn test_split_target() {
        let df = df!(
            "s1" => &[0.1, 0.2, 0.3],
            "Target" => &[0i64, 1, 0]
        )
        .unwrap();
        let (features, y) = split_target(&df, "Target").unwrap();
        assert_eq!(column_names(&features), vec!["s1".to_string()]);
        assert_eq!(y.to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn test_split_target_missing_column() {
        let df = df!("s1" => &[0.1]).unwrap();
        assert!(matches!(
            split_target(&df, "Target"),
            Err(QcError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_array2_to_frame_shape_mismatch() {
        let x = Array2::<f64>::zeros((2, 3));
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(array2_to_frame(&x, &names).is_err());
    }
}
