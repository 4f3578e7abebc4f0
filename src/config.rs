//! Service configuration.
//!
//! Values come from the environment (a `.env` file is loaded first by
//! `main`). Header aliases are read from an optional JSON file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::normalizer::fields::CanonicalField;
use crate::normalizer::mapping::HeaderTable;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_API_URL: &str = "http://localhost:3000/api/v1";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Username and password; login happens at startup when both are set.
    pub api_credentials: Option<(String, String)>,
    pub max_upload_bytes: usize,
    pub header_aliases_path: Option<PathBuf>,
}

/// `{ "aliases": { "<header text>": "<canonical field path>" } }`
#[derive(Debug, Deserialize)]
struct HeaderAliasFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_upload_bytes = match var("IMPORT_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("IMPORT_MAX_UPLOAD_BYTES must be a byte count, got '{}'", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let api_credentials = match (var("RECORDS_API_USERNAME"), var("RECORDS_API_PASSWORD")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        Ok(Self {
            bind_addr: var("IMPORT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            api_base_url: var("RECORDS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_token: var("RECORDS_API_TOKEN"),
            api_credentials,
            max_upload_bytes,
            header_aliases_path: var("IMPORT_HEADER_ALIASES").map(PathBuf::from),
        })
    }

    /// Builtin header table, extended with configured aliases if any.
    pub fn header_table(&self) -> Result<HeaderTable> {
        let table = HeaderTable::builtin();
        match &self.header_aliases_path {
            Some(path) => {
                let aliases = load_aliases(path)?;
                info!("Loaded {} header alias(es) from {:?}", aliases.len(), path);
                Ok(table.with_aliases(aliases))
            }
            None => Ok(table),
        }
    }
}

fn load_aliases(path: &Path) -> Result<Vec<(String, CanonicalField)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read header aliases: {:?}", path))?;
    parse_aliases(&content).with_context(|| format!("Failed to parse header aliases: {:?}", path))
}

fn parse_aliases(content: &str) -> Result<Vec<(String, CanonicalField)>> {
    let file: HeaderAliasFile = serde_json::from_str(content)?;
    file.aliases
        .into_iter()
        .map(|(header, path)| {
            let field = CanonicalField::from_path(&path)
                .with_context(|| format!("Unknown field '{}' for header alias '{}'", path, header))?;
            Ok((header, field))
        })
        .collect()
}
