use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub boundaries: BoundariesConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub results_csv: PathBuf,
    /// State to analyze, matched case-insensitively against the state column.
    pub state: String,
    pub state_column: String,
    pub district_column: String,
    pub party_column: String,
    pub votes_column: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoundariesConfig {
    /// Remote ZIP archive containing the shapefile. Ignored when `path` is set.
    pub url: Option<String>,
    /// Local .shp or .geojson, used instead of downloading.
    pub path: Option<PathBuf>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    pub state_field: String,
    pub district_field: String,
    /// Override for the source CRS when no .prj sidecar is present,
    /// e.g. "EPSG:4326" or "EPSG:3857".
    pub crs: Option<String>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Categorical fill by winning party.
    Winner,
    /// Continuous fill by Republican vote share.
    Share,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub static_map: PathBuf,
    pub tile_dir: PathBuf,
    pub min_zoom: u8,
    pub max_zoom: u8,
    #[serde(default = "default_width")]
    pub width: u32,
    pub fill: FillMode,
    #[serde(default = "default_dem_color")]
    pub dem_color: String,
    #[serde(default = "default_rep_color")]
    pub rep_color: String,
    #[serde(default = "default_tie_color")]
    pub tie_color: String,
}

fn default_width() -> u32 {
    1200
}

fn default_dem_color() -> String {
    "#2166ac".to_string()
}

fn default_rep_color() -> String {
    "#b2182b".to_string()
}

fn default_tie_color() -> String {
    "#762a83".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
