use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub public_base_url: String,
    pub source_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Hotel media asset pipeline")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_PIPELINE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_PIPELINE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory the storage tiers live under (overrides MEDIA_PIPELINE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides MEDIA_PIPELINE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL public renditions are served from (overrides MEDIA_PIPELINE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Per-request timeout for source image downloads, in seconds
    /// (overrides MEDIA_PIPELINE_SOURCE_TIMEOUT_SECS)
    #[arg(long)]
    pub source_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("MEDIA_PIPELINE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("MEDIA_PIPELINE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing MEDIA_PIPELINE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading MEDIA_PIPELINE_PORT"),
        };
        let env_storage =
            env::var("MEDIA_PIPELINE_STORAGE_DIR").unwrap_or_else(|_| "./data/media".into());
        let env_db = env::var("MEDIA_PIPELINE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/media_pipeline.db".into());
        let env_public_base = env::var("MEDIA_PIPELINE_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/media/public".into());
        let env_timeout = match env::var("MEDIA_PIPELINE_SOURCE_TIMEOUT_SECS") {
            Ok(value) => value.parse::<u64>().with_context(|| {
                format!("parsing MEDIA_PIPELINE_SOURCE_TIMEOUT_SECS value `{}`", value)
            })?,
            Err(env::VarError::NotPresent) => 30,
            Err(err) => return Err(err).context("reading MEDIA_PIPELINE_SOURCE_TIMEOUT_SECS"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url: args.public_base_url.unwrap_or(env_public_base),
            source_timeout_secs: args.source_timeout_secs.unwrap_or(env_timeout),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
