//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri degli stage
//! - Definisce `Layout`, il contratto delle directory (sorgenti, staging, dist)
//! - Fornisce validazione dei parametri di input
//! - Supporta il caricamento della configurazione da file JSON
//! - Fornisce valori di default identici alla configurazione storica del progetto
//!
//! ## Parametri di configurazione:
//! - `layout`: Percorsi di entry, staging e distribuzione (default: `app/`, `dist/`)
//! - `browserslist`: Query per il vendor prefixing (default: "defaults, not IE 11")
//! - `jpeg_quality`: Qualità JPEG progressive (1-100, default: 82)
//! - `webp_quality`: Qualità WebP (1-100, default: 82)
//! - `png_optimization_level`: Livello optipng (0-7, default: 5)
//! - `gif_interlaced`: Interlacciamento GIF (default: true)
//! - `svgo_plugins`: Plugin SVGO attivi/disattivi
//! - `server`: Host e porta del dev server (default: 127.0.0.1:3000)
//! - `watch`: Debounce degli eventi filesystem (default: 100ms)
//! - `workers`: Numero di file immagine elaborati in parallelo (default: 4)
//! - `state_dir`: Directory dello state file (default: `~/.asset-pipeline`)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     jpeg_quality: 85,
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the project root
pub const CONFIG_FILE_NAME: &str = "asset-pipeline.json";

/// Directory layout shared by every stage. All paths are relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Layout {
    /// Staging tree, also the dev server document root
    pub source_dir: PathBuf,
    /// Distribution tree, recreated on each build
    pub dist_dir: PathBuf,
    pub scss_dir: PathBuf,
    pub scss_entry: PathBuf,
    pub css_dir: PathBuf,
    pub css_name: String,
    pub js_dir: PathBuf,
    pub js_entries: Vec<PathBuf>,
    pub js_bundle_name: String,
    pub images_dir: PathBuf,
    pub sprite_dir: PathBuf,
    pub sprite_name: String,
    pub favicon_dir: PathBuf,
    pub fonts_dir: PathBuf,
    pub manifest_name: String,
    pub archive_name: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("app"),
            dist_dir: PathBuf::from("dist"),
            scss_dir: PathBuf::from("app/scss"),
            scss_entry: PathBuf::from("app/scss/index.scss"),
            css_dir: PathBuf::from("app/css"),
            css_name: "index.css".to_string(),
            js_dir: PathBuf::from("app/js"),
            js_entries: vec![PathBuf::from("app/js/index.js")],
            js_bundle_name: "index.min.js".to_string(),
            images_dir: PathBuf::from("app/images"),
            sprite_dir: PathBuf::from("app/images/sprite"),
            sprite_name: "sprite.svg".to_string(),
            favicon_dir: PathBuf::from("app/images/favicon"),
            fonts_dir: PathBuf::from("app/fonts"),
            manifest_name: "manifest.json".to_string(),
            archive_name: "archive.zip".to_string(),
        }
    }
}

impl Layout {
    /// Path of the bundled script inside the staging tree
    pub fn js_bundle(&self) -> PathBuf {
        self.js_dir.join(&self.js_bundle_name)
    }

    /// Path of the compiled stylesheet inside the staging tree
    pub fn css_output(&self) -> PathBuf {
        self.css_dir.join(&self.css_name)
    }

    /// Mirror a staging directory into the distribution tree (`app/css` -> `dist/css`)
    pub fn dist_for(&self, staged: &Path) -> PathBuf {
        match staged.strip_prefix(&self.source_dir) {
            Ok(rel) => self.dist_dir.join(rel),
            Err(_) => self.dist_dir.join(staged),
        }
    }
}

/// A single SVGO plugin toggle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SvgoPlugin {
    pub name: String,
    pub active: bool,
}

impl SvgoPlugin {
    pub fn new(name: &str, active: bool) -> Self {
        Self {
            name: name.to_string(),
            active,
        }
    }
}

/// Dev server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Window used to coalesce bursts of filesystem events
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Configuration for the asset pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: Layout,
    /// Browser support queries used for vendor prefixing
    pub browserslist: Vec<String>,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// WebP quality (1-100)
    pub webp_quality: u8,
    /// optipng optimization level (0-7)
    pub png_optimization_level: u8,
    pub gif_interlaced: bool,
    pub svgo_plugins: Vec<SvgoPlugin>,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    /// Number of images processed concurrently
    pub workers: usize,
    /// Where the incremental state file lives (None = ~/.asset-pipeline)
    pub state_dir: Option<PathBuf>,
    /// Emit JSON events on stdout instead of human readable output
    #[serde(skip)]
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            browserslist: vec!["defaults, not IE 11".to_string()],
            jpeg_quality: 82,
            webp_quality: 82,
            png_optimization_level: 5,
            gif_interlaced: true,
            svgo_plugins: vec![
                SvgoPlugin::new("removeViewBox", true),
                SvgoPlugin::new("cleanupIds", false),
            ],
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
            workers: 4,
            state_dir: None,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(PipelineError::Validation("JPEG quality must be between 1 and 100".into()).into());
        }

        if self.webp_quality == 0 || self.webp_quality > 100 {
            return Err(PipelineError::Validation("WebP quality must be between 1 and 100".into()).into());
        }

        if self.png_optimization_level > 7 {
            return Err(PipelineError::Validation("PNG optimization level must be between 0 and 7".into()).into());
        }

        if self.workers == 0 {
            return Err(PipelineError::Validation("Number of workers must be greater than 0".into()).into());
        }

        if self.server.port == 0 {
            return Err(PipelineError::Validation("Server port must be greater than 0".into()).into());
        }

        if self.browserslist.is_empty() {
            return Err(PipelineError::Validation("At least one browserslist query is required".into()).into());
        }

        if self.layout.js_entries.is_empty() {
            return Err(PipelineError::Validation("At least one script entry is required".into()).into());
        }

        Ok(())
    }

    /// Load configuration from file, falling back to defaults when it does not exist
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.jpeg_quality = 82;
        config.png_optimization_level = 8;
        assert!(config.validate().is_err());

        config.png_optimization_level = 5;
        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 4;
        config.browserslist.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.jpeg_quality, 82);
        assert_eq!(config.webp_quality, 82);
        assert_eq!(config.png_optimization_level, 5);
        assert!(config.gif_interlaced);
        assert_eq!(config.browserslist, vec!["defaults, not IE 11".to_string()]);
        assert_eq!(config.layout.scss_entry, PathBuf::from("app/scss/index.scss"));
        assert_eq!(config.layout.js_bundle(), PathBuf::from("app/js/index.min.js"));
    }

    #[test]
    fn test_layout_dist_for() {
        let layout = Layout::default();
        assert_eq!(layout.dist_for(&layout.css_dir), PathBuf::from("dist/css"));
        assert_eq!(layout.dist_for(&layout.images_dir), PathBuf::from("dist/images"));
        assert_eq!(layout.dist_for(&layout.source_dir), PathBuf::from("dist"));
    }

    #[tokio::test]
    async fn test_config_loads_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let original_config = Config {
            jpeg_quality: 75,
            workers: 8,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            ..Default::default()
        };

        std::fs::write(&config_path, serde_json::to_string_pretty(&original_config).unwrap()).unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.jpeg_quality, 75);
        assert_eq!(loaded_config.workers, 8);
        assert_eq!(loaded_config.server.port, 8080);
        assert_eq!(loaded_config.layout, Layout::default());
    }

    #[tokio::test]
    async fn test_missing_config_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("missing.json")).await.unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[tokio::test]
    async fn test_partial_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&config_path, r#"{ "webp_quality": 70, "server": { "port": 4000 } }"#)
            .await
            .unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.webp_quality, 70);
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.jpeg_quality, 82);
    }
}
