use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "StrataNotes";
const APP_NAME: &str = "strata";

pub const ENV_CONFIG: &str = "STRATA_CONFIG";
pub const ENV_DATA: &str = "STRATA_DATA";
pub const ENV_SYNC_CLIENT_ID: &str = "STRATA_SYNC_CLIENT_ID";
pub const ENV_SYNC_API_KEY: &str = "STRATA_SYNC_API_KEY";
pub const ENV_SYNC_TOKEN: &str = "STRATA_SYNC_TOKEN";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            self.write_default_config(&default_cfg)?;
            default_cfg.post_load(&self.paths);
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths);
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub export_dir: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(ENV_CONFIG).ok().map(PathBuf::from);
        let override_data = env::var(ENV_DATA).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));

        Ok(Self::rooted(config_dir, config_file, data_root, state_dir))
    }

    /// Lays every directory out beneath one root. Handy for tests.
    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        let config_file = config_dir.join("config.toml");
        Self::rooted(config_dir, config_file, root.join("data"), root.join("state"))
    }

    fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            config_dir,
            config_file,
            database_path: data_dir.join("strata.db"),
            export_dir: data_dir.join("export"),
            log_dir: state_dir.join("logs"),
            data_dir,
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.log_dir, &self.state_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Show full error chains in the fallback screen instead of a summary.
    pub dev_mode: bool,
    pub storage: StorageOptions,
    pub sync: SyncConfig,
    pub diagram: DiagramConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) {
        self.storage.resolve(paths);
        self.sync.apply_env_overrides();
        if !self.sync.is_configured() {
            tracing::info!("remote sync credentials missing, sync disabled");
        }
        if let Some(default) = &self.ai.default_provider {
            if !self.ai.providers.contains_key(default) {
                tracing::warn!(provider = %default, "default ai provider is not configured");
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub client_id: Option<String>,
    pub api_key: Option<String>,
    /// Bearer token obtained from the external authorization flow.
    pub access_token: Option<String>,
    pub root_folder: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "auto_sync_delay_ms")]
    pub auto_sync_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            api_key: None,
            access_token: None,
            root_folder: "Strata".to_string(),
            auto_sync_delay: Duration::from_millis(30_000),
        }
    }
}

impl SyncConfig {
    /// Sync is only offered when both client id and api key are present.
    pub fn is_configured(&self) -> bool {
        non_blank(&self.client_id) && non_blank(&self.api_key)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var(ENV_SYNC_CLIENT_ID) {
            self.client_id = Some(value);
        }
        if let Ok(value) = env::var(ENV_SYNC_API_KEY) {
            self.api_key = Some(value);
        }
        if let Ok(value) = env::var(ENV_SYNC_TOKEN) {
            self.access_token = Some(value);
        }
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "render_debounce_ms")]
    pub render_debounce: Duration,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            render_debounce: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub default_provider: Option<String>,
    pub web_search: bool,
    pub extended_reasoning: bool,
    pub providers: IndexMap<String, ProviderSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenaiCompatible,
    Anthropic,
}
