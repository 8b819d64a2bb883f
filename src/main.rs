use anyhow::Result;
use co2loader::{config::EtlConfig, extract, load, transform};
use rustls::crypto::aws_lc_rs::default_provider;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    let _ = default_provider().install_default();
    info!("startup");

    let cfg = EtlConfig::from_env()?;

    // ─── 2) extract ──────────────────────────────────────────────────
    let raw = match extract::extract_table(&cfg.file_path) {
        Ok(batch) => batch,
        Err(err) => {
            error!("extraction failed: {err}");
            anyhow::bail!("no input data; aborting before transform");
        }
    };

    // ─── 3) transform ────────────────────────────────────────────────
    let cleaned = transform::clean_table(&raw)?;

    // ─── 4) load + verify ────────────────────────────────────────────
    let client = load::connect().await?;
    load::ensure_table(&client, &cfg).await?;
    load::append_rows(&client, &cfg, &cleaned).await?;
    load::verify_load(&client, &cfg).await?;

    info!("all done");
    Ok(())
}
