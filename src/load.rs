use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{Array, Float64Array, StringArray},
    record_batch::RecordBatch,
};
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::error::Error as BqError;
use google_cloud_bigquery::http::job::query::QueryRequest;
use google_cloud_bigquery::http::table::{
    Table, TableFieldMode, TableFieldSchema, TableFieldType, TableReference, TableSchema,
};
use google_cloud_bigquery::http::tabledata::insert_all::{InsertAllRequest, Row as InsertRow};
use google_cloud_bigquery::query::row::Row;
use serde::Serialize;
use tracing::info;

use crate::config::EtlConfig;
use crate::transform::COLUMN_NAMES;

/// One cleaned emissions record, shaped for the insertAll payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionRow {
    pub location: String,
    pub percent_global_total: Option<f64>,
    pub fossil_emissions_2023: Option<f64>,
    pub fossil_emissions_2000: Option<f64>,
    pub percent_change_from_2000: Option<f64>,
}

/// Authenticate a BigQuery client through application-default credentials.
pub async fn connect() -> Result<Client> {
    let (config, _) = ClientConfig::new_with_auth()
        .await
        .context("authenticating BigQuery client")?;
    Client::new(config)
        .await
        .context("building BigQuery client")
}

/// Destination schema: the location is required, the four numeric columns
/// are nullable.
fn table_schema() -> TableSchema {
    TableSchema {
        fields: vec![
            field(COLUMN_NAMES[0], TableFieldType::String, TableFieldMode::Required),
            field(COLUMN_NAMES[1], TableFieldType::Float, TableFieldMode::Nullable),
            field(COLUMN_NAMES[2], TableFieldType::Float, TableFieldMode::Nullable),
            field(COLUMN_NAMES[3], TableFieldType::Float, TableFieldMode::Nullable),
            field(COLUMN_NAMES[4], TableFieldType::Float, TableFieldMode::Nullable),
        ],
        ..Default::default()
    }
}

fn field(name: &str, data_type: TableFieldType, mode: TableFieldMode) -> TableFieldSchema {
    TableFieldSchema {
        name: name.to_string(),
        data_type,
        mode: Some(mode),
        ..Default::default()
    }
}

/// Make sure the destination table exists, creating it with the fixed
/// schema when the service reports it missing.
pub async fn ensure_table(client: &Client, cfg: &EtlConfig) -> Result<()> {
    match client
        .table()
        .get(&cfg.project_id, &cfg.dataset_id, &cfg.table_id)
        .await
    {
        Ok(_) => Ok(()),
        Err(BqError::Response(resp)) if resp.code == 404 => {
            let table = Table {
                table_reference: TableReference {
                    project_id: cfg.project_id.clone(),
                    dataset_id: cfg.dataset_id.clone(),
                    table_id: cfg.table_id.clone(),
                },
                schema: Some(table_schema()),
                ..Default::default()
            };
            client
                .table()
                .create(&table)
                .await
                .context("creating destination table")?;
            info!(table = %cfg.table_ref(), "created destination table");
            Ok(())
        }
        Err(e) => Err(e).context("checking destination table"),
    }
}

/// Append every row of the cleaned batch to the destination table. The
/// insertAll call acknowledges synchronously; any per-row rejection in the
/// response fails the run.
pub async fn append_rows(client: &Client, cfg: &EtlConfig, batch: &RecordBatch) -> Result<usize> {
    let rows = batch_to_rows(batch)?;
    let count = rows.len();
    if count == 0 {
        info!(table = %cfg.table_ref(), "nothing to load");
        return Ok(0);
    }

    let request = InsertAllRequest {
        rows: rows
            .into_iter()
            .map(|json| InsertRow {
                insert_id: None,
                json,
            })
            .collect(),
        ..Default::default()
    };
    let response = client
        .tabledata()
        .insert(&cfg.project_id, &cfg.dataset_id, &cfg.table_id, &request)
        .await
        .context("appending rows to destination table")?;

    if let Some(errors) = response.insert_errors {
        if !errors.is_empty() {
            bail!("destination table rejected {} rows: {:?}", errors.len(), errors);
        }
    }

    info!(rows = count, table = %cfg.table_ref(), "loaded rows");
    Ok(count)
}

/// Read back at most ten rows from the destination table and print them.
/// Sanity check only; the returned rows carry no pipeline significance.
pub async fn verify_load(client: &Client, cfg: &EtlConfig) -> Result<Vec<EmissionRow>> {
    let request = QueryRequest {
        query: format!("SELECT * FROM `{}` LIMIT 10", cfg.table_ref()),
        use_legacy_sql: false,
        ..Default::default()
    };
    let mut iter = client
        .query::<Row>(&cfg.project_id, request)
        .await
        .context("running verification query")?;

    let mut rows = Vec::new();
    while let Some(row) = iter.next().await? {
        let record = EmissionRow {
            location: row.column::<String>(0)?,
            percent_global_total: row.column::<Option<f64>>(1)?,
            fossil_emissions_2023: row.column::<Option<f64>>(2)?,
            fossil_emissions_2000: row.column::<Option<f64>>(3)?,
            percent_change_from_2000: row.column::<Option<f64>>(4)?,
        };
        println!("{record:?}");
        rows.push(record);
    }
    info!(rows = rows.len(), table = %cfg.table_ref(), "verification query complete");
    Ok(rows)
}

/// Flatten the cleaned batch into insert payload rows.
fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<EmissionRow>> {
    let location = batch
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("location column is not a string column"))?;
    let numeric: Vec<&Float64Array> = (1..batch.num_columns())
        .map(|idx| {
            batch
                .column(idx)
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| anyhow!("column {idx} is not a float column"))
        })
        .collect::<Result<_>>()?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if location.is_null(i) {
            bail!("row {i}: location must not be null");
        }
        rows.push(EmissionRow {
            location: location.value(i).to_string(),
            percent_global_total: value_at(numeric[0], i),
            fossil_emissions_2023: value_at(numeric[1], i),
            fossil_emissions_2000: value_at(numeric[2], i),
            percent_change_from_2000: value_at(numeric[3], i),
        });
    }
    Ok(rows)
}

fn value_at(arr: &Float64Array, i: usize) -> Option<f64> {
    if arr.is_null(i) {
        None
    } else {
        Some(arr.value(i))
    }
}
