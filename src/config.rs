use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: RecordBackend,
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BlobBackend,
    #[serde(default = "default_local_path")]
    pub local_path: String,
    /// Base of the durable URLs handed out for uploaded images
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

/// Maximum gallery size per entity kind. Cover slots always hold one image.
#[derive(Debug, Clone, Deserialize)]
pub struct GalleryConfig {
    #[serde(default = "default_aircraft_gallery")]
    pub aircraft: usize,
    #[serde(default = "default_car_gallery")]
    pub car: usize,
    #[serde(default = "default_yacht_gallery")]
    pub yacht: usize,
    #[serde(default = "default_helicopter_gallery")]
    pub helicopter: usize,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1309
}

fn default_max_upload_mb() -> usize {
    64
}

fn default_db_path() -> String {
    "data/aerodesk.db".to_string()
}

fn default_local_path() -> String {
    "data/blobs".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:1309/blobs".to_string()
}

fn default_aircraft_gallery() -> usize {
    4
}

fn default_car_gallery() -> usize {
    6
}

fn default_yacht_gallery() -> usize {
    5
}

fn default_helicopter_gallery() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: RecordBackend::default(),
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::default(),
            local_path: default_local_path(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            aircraft: default_aircraft_gallery(),
            car: default_car_gallery(),
            yacht: default_yacht_gallery(),
            helicopter: default_helicopter_gallery(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.validate()?;
        config.ensure_directories()?;
        tracing::info!(
            "Storage config: backend={:?}, public_base_url={}",
            config.storage.backend,
            config.storage.public_base_url
        );
        Ok(config)
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: AD_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("AD_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("AD_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = env::var("AD_CONF_SERVER_MAX_UPLOAD_MB") {
            if let Ok(mb) = val.parse() {
                self.server.max_upload_mb = mb;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("AD_CONF_DATABASE_BACKEND") {
            match val.trim().to_lowercase().as_str() {
                "sqlite" => self.database.backend = RecordBackend::Sqlite,
                "memory" => self.database.backend = RecordBackend::Memory,
                other => tracing::warn!("Ignoring unknown database backend: {}", other),
            }
        }
        if let Ok(val) = env::var("AD_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Ok(val) = env::var("AD_CONF_STORAGE_BACKEND") {
            match val.trim().to_lowercase().as_str() {
                "local" => self.storage.backend = BlobBackend::Local,
                "memory" => self.storage.backend = BlobBackend::Memory,
                other => tracing::warn!("Ignoring unknown storage backend: {}", other),
            }
        }
        if let Ok(val) = env::var("AD_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }
        if let Ok(val) = env::var("AD_CONF_STORAGE_PUBLIC_BASE_URL") {
            if !val.trim().is_empty() {
                self.storage.public_base_url = val;
            }
        }

        // Gallery overrides
        let gallery = [
            ("AD_CONF_GALLERY_AIRCRAFT", &mut self.gallery.aircraft),
            ("AD_CONF_GALLERY_CAR", &mut self.gallery.car),
            ("AD_CONF_GALLERY_YACHT", &mut self.gallery.yacht),
            ("AD_CONF_GALLERY_HELICOPTER", &mut self.gallery.helicopter),
        ];
        for (key, slot) in gallery {
            if let Ok(val) = env::var(key) {
                if let Ok(max) = val.parse() {
                    *slot = max;
                }
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let g = &self.gallery;
        if [g.aircraft, g.car, g.yacht, g.helicopter].contains(&0) {
            anyhow::bail!("gallery limits must be at least 1");
        }
        if self.server.max_upload_mb == 0 {
            anyhow::bail!("server.max_upload_mb must be at least 1");
        }
        Ok(())
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if self.database.backend == RecordBackend::Sqlite {
            if let Some(parent) = Path::new(&self.database.path).parent() {
                fs::create_dir_all(parent)?;
            }
        }

        if self.storage.backend == BlobBackend::Local {
            fs::create_dir_all(&self.storage.local_path)?;
        }

        Ok(())
    }
}
