use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_API_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DojoConfig {
    pub api_port: u16,
    pub public_url: String,
    pub paths: DojoPaths,
    pub file: FileConfig,
    pub identity: IdentityConfig,
}

impl DojoConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("DOJO_HOME") {
            Ok(raw) if !raw.trim().is_empty() => DojoPaths::from_base_dir(raw.trim())?,
            _ => DojoPaths::discover()?,
        };
        let api_port = env::var("DOJO_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_API_PORT);
        let public_url = non_empty_var("DOJO_PUBLIC_URL")
            .map(|raw| raw.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default_public_url(api_port));
        Ok(Self {
            api_port,
            public_url,
            paths,
            file: FileConfig::from_env(),
            identity: IdentityConfig::from_env(),
        })
    }

    pub fn new(api_port: u16, paths: DojoPaths) -> Self {
        Self {
            api_port,
            public_url: default_public_url(api_port),
            paths,
            file: FileConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

fn default_public_url(api_port: u16) -> String {
    format!("http://localhost:{api_port}")
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|raw| !raw.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct FileConfig {
    pub max_upload_bytes: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl FileConfig {
    pub fn from_env() -> Self {
        let max_upload_bytes = env::var("DOJO_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        Self { max_upload_bytes }
    }
}

/// Connection details for the external identity provider's REST API. Profile
/// sync is disabled while `api_url` is unset.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl IdentityConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: non_empty_var("DOJO_IDENTITY_API_URL")
                .map(|raw| raw.trim_end_matches('/').to_string()),
            api_key: non_empty_var("DOJO_IDENTITY_API_KEY"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DojoPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub blobs_dir: PathBuf,
}

impl DojoPaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("dojo.db");
        let blobs_dir = base.join("blobs");

        Ok(Self {
            base,
            data_dir,
            db_path,
            blobs_dir,
        })
    }
}
