use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::BoundingBox;
use crate::pip::BALTIC_CHART_AREA;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    /// Rectangle used by the cheap region test
    #[serde(default = "default_chart_area")]
    pub chart_area: BoundingBox,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/baltic-index.json.gz")
}

fn default_chart_area() -> BoundingBox {
    BALTIC_CHART_AREA
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            chart_area: default_chart_area(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }
}
