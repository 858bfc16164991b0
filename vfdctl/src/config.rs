use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use libvfd::host::HostDirectory;
use libvfd::{DirectoryHandle, FdTable};
use serde::Deserialize;
use tracing::info;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub preopens: Vec<PreopenSpec>,
}

/// A host directory exposed to the guest under `guest`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct PreopenSpec {
    pub guest: String,
    pub host: PathBuf,
}

impl FromStr for PreopenSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (guest, host) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("preopen `{s}` must look like GUEST=HOST"))?;
        if guest.is_empty() || host.is_empty() {
            return Err(anyhow!("preopen `{s}` has an empty side"));
        }
        Ok(Self {
            guest: guest.to_string(),
            host: PathBuf::from(host),
        })
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// Open every host directory and register it, in order, as a preopen.
pub async fn build_table(specs: &[PreopenSpec]) -> anyhow::Result<FdTable> {
    if specs.is_empty() {
        return Err(anyhow!("no preopens configured; pass --preopen GUEST=HOST"));
    }
    let mut preopens: Vec<(String, Arc<dyn DirectoryHandle>)> = Vec::with_capacity(specs.len());
    for spec in specs {
        let dir: Arc<dyn DirectoryHandle> = HostDirectory::open(&spec.host)
            .await
            .with_context(|| format!("cannot preopen {}", spec.host.display()))?;
        info!(guest = %spec.guest, host = %spec.host.display(), "preopen");
        preopens.push((spec.guest.clone(), dir));
    }
    Ok(FdTable::new(preopens))
}
