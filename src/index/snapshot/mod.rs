//! Durable snapshot of a [`VectorIndex`].
//!
//! A snapshot is a directory holding `manifest.json` and a LanceDB database
//! with a single `chunks` table. The manifest is written last and is the
//! marker of a complete snapshot; persisting writes into a temporary sibling
//! directory and renames it into place.


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{IndexLoadError, VectorIndex};
use crate::embeddings::Chunk;
use crate::{AgentError, Result};

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
const DATA_DIR: &str = "data";
const TABLE_NAME: &str = "chunks";

/// Metadata describing a persisted snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    /// [`VectorIndex::checksum`] of the persisted rows
    pub checksum: String,
    /// SHA-256 of the source document, when known
    #[serde(default)]
    pub source_sha256: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// SHA-256 of a file's contents, hex encoded
#[inline]
pub fn file_sha256<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Read only the manifest of the snapshot at `path`
#[inline]
pub fn read_manifest<P: AsRef<Path>>(path: P) -> std::result::Result<Manifest, IndexLoadError> {
    let manifest_path = path.as_ref().join(MANIFEST_FILE);

    if !manifest_path.is_file() {
        return Err(IndexLoadError::NotFound(path.as_ref().to_path_buf()));
    }

    let content = fs::read_to_string(&manifest_path)
        .map_err(|e| IndexLoadError::Corrupt(format!("failed to read manifest: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| IndexLoadError::Corrupt(format!("failed to parse manifest: {}", e)))
}

/// Persist `index` to `path`, replacing any snapshot already there
#[inline]
pub async fn persist<P: AsRef<Path>>(
    index: &VectorIndex,
    path: P,
    source_sha256: Option<String>,
) -> Result<Manifest> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            AgentError::IndexBuild(format!("invalid snapshot path: {}", path.display()))
        })?;

    fs::create_dir_all(parent)?;

    for orphan in orphaned_staging_dirs(path) {
        debug!("Removing leftover staging directory {:?}", orphan);
        if let Err(e) = fs::remove_dir_all(&orphan) {
            warn!("Failed to remove {:?}: {}", orphan, e);
        }
    }

    let staging = parent.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()));
    let manifest = match write_snapshot(index, &staging, source_sha256).await {
        Ok(manifest) => manifest,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!("Failed to remove staging directory {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }
    };

    let retired = parent.join(format!(".{}.old-{}", name, uuid::Uuid::new_v4()));
    match swap_into_place(&staging, path, &retired) {
        Ok(true) => {
            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!("Failed to remove previous snapshot {:?}: {}", retired, e);
            }
        }
        Ok(false) => {}
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!("Failed to remove staging directory {:?}: {}", staging, cleanup);
            }
            return Err(e.into());
        }
    }

    info!(
        "Persisted snapshot of {} chunks to {}",
        manifest.chunk_count,
        path.display()
    );

    Ok(manifest)
}

/// Load the snapshot at `path` for a provider of `expected_dimension`
#[inline]
pub async fn load<P: AsRef<Path>>(
    path: P,
    expected_dimension: usize,
) -> std::result::Result<VectorIndex, IndexLoadError> {
    load_verified(path, expected_dimension, None).await
}

/// Like [`load`], additionally rejecting snapshots whose recorded source hash
/// differs from `source_sha256`
#[inline]
pub async fn load_verified<P: AsRef<Path>>(
    path: P,
    expected_dimension: usize,
    source_sha256: Option<&str>,
) -> std::result::Result<VectorIndex, IndexLoadError> {
    let path = path.as_ref();
    let manifest = read_manifest(path)?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexLoadError::UnsupportedVersion(manifest.format_version));
    }

    if manifest.dimension != expected_dimension {
        return Err(IndexLoadError::DimensionMismatch {
            expected: expected_dimension,
            found: manifest.dimension,
        });
    }

    if let Some(expected) = source_sha256 {
        if manifest.source_sha256.as_deref() != Some(expected) {
            return Err(IndexLoadError::StaleSource);
        }
    }

    let (chunks, vectors) = read_rows(&path.join(DATA_DIR), &manifest)
        .await
        .map_err(IndexLoadError::Corrupt)?;

    let index =
        VectorIndex::from_parts(&manifest.model, chunks, vectors).map_err(IndexLoadError::Corrupt)?;

    if index.dimension() != manifest.dimension {
        return Err(IndexLoadError::Corrupt(format!(
            "table holds {}-dimensional vectors, manifest says {}",
            index.dimension(),
            manifest.dimension
        )));
    }

    if index.checksum() != manifest.checksum {
        return Err(IndexLoadError::Corrupt("checksum mismatch".to_string()));
    }

    info!(
        "Loaded snapshot of {} chunks from {}",
        index.len(),
        path.display()
    );

    Ok(index)
}

async fn write_snapshot(
    index: &VectorIndex,
    dir: &Path,
    source_sha256: Option<String>,
) -> Result<Manifest> {
    fs::create_dir_all(dir)?;

    let connection = connect(&dir.join(DATA_DIR))
        .await
        .map_err(|e| AgentError::IndexBuild(format!("Failed to open snapshot database: {}", e)))?;

    let schema = create_schema(index.dimension())?;
    let batch = create_record_batch(index, Arc::clone(&schema))?;

    let table = connection
        .create_empty_table(TABLE_NAME, Arc::clone(&schema))
        .execute()
        .await
        .map_err(|e| AgentError::IndexBuild(format!("Failed to create table: {}", e)))?;

    let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
    table
        .add(reader)
        .execute()
        .await
        .map_err(|e| AgentError::IndexBuild(format!("Failed to insert chunks: {}", e)))?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        model: index.model().to_string(),
        dimension: index.dimension(),
        chunk_count: index.len(),
        checksum: index.checksum(),
        source_sha256,
        created_at: Utc::now(),
    };

    let content = serde_json::to_string_pretty(&manifest)
        .map_err(|e| AgentError::IndexBuild(format!("Failed to serialize manifest: {}", e)))?;
    fs::write(dir.join(MANIFEST_FILE), content)?;

    debug!("Wrote snapshot to staging directory {:?}", dir);
    Ok(manifest)
}

async fn connect(db_path: &Path) -> lancedb::Result<Connection> {
    let uri = format!("file://{}", db_path.display());
    lancedb::connect(&uri).execute().await
}

fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
    let size = i32::try_from(vector_dim)
        .map_err(|_| AgentError::IndexBuild(format!("dimension {} is too large", vector_dim)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("position", DataType::UInt64, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), size),
            false,
        ),
    ])))
}

fn create_record_batch(index: &VectorIndex, schema: Arc<Schema>) -> Result<RecordBatch> {
    let len = index.len();
    let dim = index.dimension();

    let mut positions = Vec::with_capacity(len);
    let mut pages = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dim);

    for (position, (chunk, vector)) in index.entries().enumerate() {
        positions.push(position as u64);
        pages.push(to_u32(chunk.page, "page")?);
        chunk_indices.push(to_u32(chunk.chunk_index, "chunk_index")?);
        texts.push(chunk.text.as_str());
        flat_values.extend_from_slice(vector);
    }

    let size = i32::try_from(dim)
        .map_err(|_| AgentError::IndexBuild(format!("dimension {} is too large", dim)))?;
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, size, Arc::new(Float32Array::from(flat_values)), None)
            .map_err(|e| AgentError::IndexBuild(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(UInt64Array::from(positions)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(texts)),
        Arc::new(vector_array),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| AgentError::IndexBuild(format!("Failed to create record batch: {}", e)))
}

fn to_u32(value: usize, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| AgentError::IndexBuild(format!("{} value {} does not fit in u32", column, value)))
}

type Rows = (Vec<Chunk>, Vec<Vec<f32>>);

async fn read_rows(db_path: &Path, manifest: &Manifest) -> std::result::Result<Rows, String> {
    if !db_path.is_dir() {
        return Err(format!("missing table directory {}", db_path.display()));
    }

    let connection = connect(db_path)
        .await
        .map_err(|e| format!("failed to open snapshot database: {}", e))?;

    let table = connection
        .open_table(TABLE_NAME)
        .execute()
        .await
        .map_err(|e| format!("failed to open table: {}", e))?;

    let count = table
        .count_rows(None)
        .await
        .map_err(|e| format!("failed to count rows: {}", e))?;

    if count != manifest.chunk_count {
        return Err(format!(
            "table holds {} rows, manifest says {}",
            count, manifest.chunk_count
        ));
    }

    let mut stream = table
        .query()
        .limit(count.max(1))
        .execute()
        .await
        .map_err(|e| format!("failed to query table: {}", e))?;

    let mut rows: Vec<(u64, Chunk, Vec<f32>)> = Vec::with_capacity(count);
    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| format!("failed to read result stream: {}", e))?
    {
        rows.extend(parse_batch(&batch)?);
    }

    rows.sort_by_key(|(position, _, _)| *position);

    Ok(rows
        .into_iter()
        .map(|(_, chunk, vector)| (chunk, vector))
        .unzip())
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> std::result::Result<&'a T, String> {
    batch
        .column_by_name(name)
        .ok_or_else(|| format!("missing {} column", name))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("invalid {} column type", name))
}

fn parse_batch(batch: &RecordBatch) -> std::result::Result<Vec<(u64, Chunk, Vec<f32>)>, String> {
    let positions = column::<UInt64Array>(batch, "position")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let texts = column::<StringArray>(batch, "text")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values = vectors.value(row);
        let values = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| "invalid vector item type".to_string())?;

        rows.push((
            positions.value(row),
            Chunk {
                text: texts.value(row).to_string(),
                page: pages.value(row) as usize,
                chunk_index: chunk_indices.value(row) as usize,
            },
            values.values().to_vec(),
        ));
    }

    Ok(rows)
}

/// Move `staging` to `path`, parking any snapshot already there at `retired`.
/// Returns whether one was parked. If the move fails the parked snapshot is
/// put back at `path`.
fn swap_into_place(staging: &Path, path: &Path, retired: &Path) -> std::io::Result<bool> {
    let parked = if path.exists() {
        fs::rename(path, retired)?;
        true
    } else {
        false
    };

    if let Err(e) = fs::rename(staging, path) {
        if parked {
            if let Err(restore) = fs::rename(retired, path) {
                warn!("Failed to restore previous snapshot {:?}: {}", retired, restore);
            }
        }
        return Err(e);
    }

    Ok(parked)
}

/// Location of the staging directories `persist` may leave behind on crash
#[inline]
pub fn orphaned_staging_dirs<P: AsRef<Path>>(path: P) -> Vec<PathBuf> {
    let path = path.as_ref();
    let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
    else {
        return Vec::new();
    };

    let prefixes = [format!(".{}.tmp-", name), format!(".{}.old-", name)];
    fs::read_dir(parent)
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| prefixes.iter().any(|prefix| n.starts_with(prefix)))
                })
                .collect()
        })
        .unwrap_or_default()
}
