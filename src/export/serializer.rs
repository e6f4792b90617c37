//! JSON document serialization
//!
//! Reads and writes the bundle documents in a directory.

use super::bundle::{BundleMetadata, ForestDocument, ModelBundle, ScalerDocument};
use crate::error::{ForestError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "metadata.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const FOREST_FILE: &str = "forest.json";
pub const ONNX_FILE: &str = "model.onnx.json";
pub const GUIDE_FILE: &str = "integration_guide.json";
pub const DEBUG_DATA_FILE: &str = "preprocessed_data.csv";

/// Write a value as pretty JSON
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        ForestError::Export(format!("Failed to create {}: {}", path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| {
        ForestError::Serialization(format!("Failed to write {}: {}", path.display(), e))
    })?;
    writer.flush()?;
    Ok(())
}

/// Read a JSON document
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ForestError::Serialization(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|e| {
        ForestError::Serialization(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Write the three required documents, returning their paths
pub fn save_bundle(bundle: &ModelBundle, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| {
        ForestError::Export(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let paths = vec![dir.join(METADATA_FILE), dir.join(SCALER_FILE), dir.join(FOREST_FILE)];
    write_json(&bundle.metadata, &paths[0])?;
    write_json(&bundle.scaler, &paths[1])?;
    write_json(&bundle.forest, &paths[2])?;
    Ok(paths)
}

/// Read and cross-check the required documents
pub fn load_bundle(dir: impl AsRef<Path>) -> Result<ModelBundle> {
    let dir = dir.as_ref();
    let metadata: BundleMetadata = read_json(dir.join(METADATA_FILE))?;
    let scaler: ScalerDocument = read_json(dir.join(SCALER_FILE))?;
    let forest: ForestDocument = read_json(dir.join(FOREST_FILE))?;

    let bundle = ModelBundle {
        metadata,
        scaler,
        forest,
    };
    bundle.validate()?;
    Ok(bundle)
}
