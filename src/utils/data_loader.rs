//! Data loading utilities

use crate::error::{ForestError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Reads raw telemetry tables into polars data frames
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows used to infer the CSV schema
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: 1000,
        }
    }

    /// Set the number of rows used for CSV schema inference
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = n.max(1);
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;
        Ok(df)
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: &Path) -> Result<DataFrame> {
        let file = open(path)?;
        Ok(ParquetReader::new(file).finish()?)
    }

    /// Load a JSON file
    pub fn load_json(&self, path: &Path) -> Result<DataFrame> {
        let file = open(path)?;
        Ok(JsonReader::new(file).finish()?)
    }

    /// Detect file format from extension and load, CSV is the fallback
    pub fn load_auto(&self, path: &Path) -> Result<DataFrame> {
        let start = Instant::now();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let df = match ext.as_str() {
            "parquet" | "pq" => self.load_parquet(path)?,
            "json" | "jsonl" => self.load_json(path)?,
            _ => self.load_csv(path)?,
        };

        info!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded input table"
        );
        Ok(df)
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        ForestError::Data(format!("Input file not found: {} ({})", path.display(), e))
    })
}

/// Writes data frames back to disk
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header row
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
        Ok(())
    }
}

/// Extract a column as optional f64 values, casting numeric or string data.
/// Values that cannot be represented as f64 become `None`.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| ForestError::MissingColumns(vec![name.to_string()]))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Whether the frame has a column with this name
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_values_casts_integers() {
        let df = df!(
            "a" => &[1i64, 2, 3],
            "b" => &[Some(1.5), None, Some(3.5)]
        )
        .unwrap();

        assert_eq!(column_values(&df, "a").unwrap(), vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(column_values(&df, "b").unwrap(), vec![Some(1.5), None, Some(3.5)]);
    }

    #[test]
    fn test_column_values_missing_column() {
        let df = df!("a" => &[1.0, 2.0]).unwrap();
        let err = column_values(&df, "zzz").unwrap_err();
        assert!(matches!(err, ForestError::MissingColumns(_)));
        assert!(!has_column(&df, "zzz"));
        assert!(has_column(&df, "a"));
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.csv");
        let mut df = df!("cpu_usage" => &[10.0, 20.0, 30.0], "net_in" => &[1.0, 2.0, 3.0]).unwrap();

        DataSaver::save_csv(&mut df, &path).unwrap();
        let loaded = DataLoader::new().load_auto(&path).unwrap();

        assert_eq!(loaded.height(), 3);
        assert_eq!(column_values(&loaded, "net_in").unwrap()[2], Some(3.0));
    }

    #[test]
    fn test_load_missing_file() {
        let result = DataLoader::new().load_parquet(Path::new("/nonexistent/data.parquet"));
        assert!(matches!(result, Err(ForestError::Data(_))));
    }
}
