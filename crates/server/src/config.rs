use annrec::{ArtifactPaths, RecommenderConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "ANNREC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./annrec.json";

/// Startup configuration, read once from a JSON file.
///
/// ```json
/// {
///   "recommender": { "metric": "dot", "max_connections": 16, "top_k": 10 },
///   "paths": {
///     "user_vectors": "user_vectors.json",
///     "item_vectors": "item_vectors.json",
///     "user_mapping": "user_mapping.json",
///     "item_mapping": "item_mapping.json"
///   }
/// }
/// ```
///
/// Relative artifact paths resolve against the config file's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub recommender: RecommenderConfig,
    pub paths: ArtifactPaths,
}

impl ServerConfig {
    /// Load from `$ANNREC_CONFIG`, falling back to `./annrec.json`.
    pub fn from_env() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: ServerConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.recommender.validate()?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let paths = &mut config.paths;
        for p in [
            &mut paths.user_vectors,
            &mut paths.item_vectors,
            &mut paths.user_mapping,
            &mut paths.item_mapping,
        ] {
            *p = resolve(base, p);
        }
        Ok(config)
    }
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
