use anyhow::Context;
use arrow::{
    compute::concat_batches,
    csv::ReaderBuilder,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{fs::File, path::Path, sync::Arc};
use thiserror::Error;
use tracing::info;

const BATCH_SIZE: usize = 1024;

/// Failures the extractor reports instead of raising. The caller decides
/// whether the run proceeds.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("input file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse {path}: {cause:#}")]
    Parse { path: String, cause: anyhow::Error },
}

/// Read a delimited text file into a single all-string record batch.
///
/// Every column is kept as `Utf8` so the transform stage owns all numeric
/// coercion; headers are taken verbatim from the file's first row.
pub fn extract_table(path: &Path) -> Result<RecordBatch, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound(path.display().to_string()));
    }

    let batch = read_csv(path).map_err(|cause| ExtractError::Parse {
        path: path.display().to_string(),
        cause,
    })?;

    info!(
        path = %path.display(),
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "extracted input file"
    );
    Ok(batch)
}

fn read_csv(path: &Path) -> anyhow::Result<RecordBatch> {
    // Sniff the header record first so the whole file can be parsed with an
    // explicit all-Utf8 schema.
    let mut sniffer = csv::Reader::from_path(path).context("opening input file")?;
    let headers: Vec<String> = sniffer
        .headers()
        .context("reading header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    drop(sniffer);

    let fields: Vec<Field> = headers
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let file = File::open(path).context("opening input file")?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(BATCH_SIZE)
        .build(file)
        .context("creating CSV reader")?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.context("reading CSV batch")?);
    }

    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    concat_batches(&schema, &batches).context("concatenating CSV batches")
}
