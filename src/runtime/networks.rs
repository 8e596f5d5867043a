//! Registry of named networks loaded from a JSON file.
//!
//! Each entry names an RPC endpoint. `$VARNAME` tokens inside the endpoint
//! are expanded from the environment when the registry is loaded, which
//! keeps API keys out of the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_NETWORKS_PATH: &str = "configs/networks.json";
pub const DEFAULT_ENV_PATH: &str = ".env";

const EVM_NETWORK_TYPE: &str = "evm";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkEntry {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default = "default_network_type")]
    pub network_type: String,
}

fn default_network_type() -> String {
    EVM_NETWORK_TYPE.to_string()
}

#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    entries: Vec<NetworkEntry>,
}

impl NetworkRegistry {
    /// Loads [`DEFAULT_NETWORKS_PATH`] relative to the working directory,
    /// after importing variables from [`DEFAULT_ENV_PATH`] when it exists.
    pub fn load_default() -> Result<Self> {
        load_env_file(DEFAULT_ENV_PATH)?;
        Self::load(DEFAULT_NETWORKS_PATH)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read network registry {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid network registry {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Self::parse_with(raw, |name| std::env::var(name).ok())
    }

    fn parse_with<F>(raw: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let entries: Vec<NetworkEntry> =
            serde_json::from_str(raw).context("failed to parse network entries")?;

        let mut resolved = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if entry.name.trim().is_empty() {
                bail!("network entry with endpoint {:?} has no name", entry.endpoint);
            }
            if resolved
                .iter()
                .any(|existing: &NetworkEntry| existing.name == entry.name)
            {
                bail!("network {} is defined more than once", entry.name);
            }
            if entry.network_type != EVM_NETWORK_TYPE {
                bail!(
                    "network {} has unsupported type {:?}",
                    entry.name,
                    entry.network_type
                );
            }
            entry.endpoint = expand_env(&entry.endpoint, &lookup)
                .with_context(|| format!("failed to expand endpoint of network {}", entry.name))?;
            resolved.push(entry);
        }

        Ok(Self { entries: resolved })
    }

    pub fn resolve(&self, name: &str) -> Result<&NetworkEntry> {
        match self.entries.iter().find(|entry| entry.name == name) {
            Some(entry) => Ok(entry),
            None => bail!(
                "unknown network {name:?} (known networks: {})",
                self.names().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replaces every `$NAME` token (`NAME` made of ASCII letters, digits, and `_`).
/// Imports `KEY=value` pairs from a dotenv file without overriding variables
/// that are already set. Returns `false` when the file does not exist.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(err) if err.not_found() => Ok(false),
        Err(err) => {
            Err(err).with_context(|| format!("failed to load environment file {}", path.display()))
        }
    }
}

fn expand_env<F>(template: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('$') {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if len == 0 {
            expanded.push('$');
        } else {
            let name = &after[..len];
            match lookup(name) {
                Some(value) => expanded.push_str(&value),
                None => bail!("environment variable {name} is not set"),
            }
        }
        rest = &after[len..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}
