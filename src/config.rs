use anyhow::{Context, Result};
use std::path::PathBuf;

/// Default destination dataset for the emissions table.
pub const DEFAULT_DATASET_ID: &str = "co2_emission";

/// Default destination table name.
pub const DEFAULT_TABLE_ID: &str = "fossil";

/// Default input file, as shipped alongside the binary.
pub const DEFAULT_FILE_PATH: &str = "./CO2 Emission Country.csv";

/// Where the pipeline reads from and writes to. Plain data so tests can
/// point a run at a scratch dataset without touching the code.
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub file_path: PathBuf,
}

impl EtlConfig {
    /// Build the default configuration. The project id has no sane default
    /// and must come from the environment; everything else matches the
    /// standing deployment.
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var("GOOGLE_CLOUD_PROJECT")
            .context("Please set env var GOOGLE_CLOUD_PROJECT")?;
        Ok(Self {
            project_id,
            dataset_id: DEFAULT_DATASET_ID.to_string(),
            table_id: DEFAULT_TABLE_ID.to_string(),
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
        })
    }

    /// Fully qualified `project.dataset.table` reference.
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}
