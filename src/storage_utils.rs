use crate::candles::Interval;
use crate::exchange::{Category, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::klines::DEFAULT_KLINE_LIMIT;
use crate::screener::{ScreenerSettings, Thresholds};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS
// Every section has serde defaults, so a partial config.json still loads.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub category: Category, // e.g., "linear"
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            category: Category::Linear,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KlineConfig {
    pub limit: u32,         // e.g., 200 candles
    pub interval: Interval, // e.g., "5", "60", "D"
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_KLINE_LIMIT,
            interval: Interval::FiveMinutes,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub max_symbols_per_scan: usize,
    /// Kline requests in flight at once. 1 scans strictly one symbol after another.
    pub concurrency: usize,
    /// Regex the symbol must match, e.g. "USDT$".
    pub symbol_pattern: Option<String>,
    /// Instrument fields that must match exactly, e.g. {"status": "Trading"}.
    pub filters: HashMap<String, String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_symbols_per_scan: 10,
            concurrency: 1,
            symbol_pattern: None,
            filters: HashMap::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    // Nested structs organize the config logically
    pub exchange: ExchangeConfig,
    pub klines: KlineConfig,
    pub scan: ScanConfig,
    pub screener: ScreenerSettings,
    /// Initial values of the threshold form.
    pub thresholds: Thresholds,
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Stores the absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Creates a manager for `relative_path` next to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Self::new(base_dir).await
    }

    /// Creates a manager rooted at `base_dir`, creating the directory if needed.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    /// Serializes `data` to `<filename>.json`.
    /// Writes to a `.tmp` file first and renames it, so a crash mid-write
    /// leaves the previous file intact.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_for(filename);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", filename));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.path_for(filename);

        // Bytes rather than a String: serde_json validates UTF-8 while parsing anyway.
        let content = fs::read(&path).await?;
        let data = serde_json::from_slice(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(data)
    }

    /// Loads `<filename>.json`, writing `T::default()` there first if it does not exist.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let path = self.path_for(filename);
        if fs::try_exists(&path).await? {
            return self.load(filename).await;
        }

        let data = T::default();
        self.save(filename, &data).await?;
        info!(path = %path.display(), "Wrote default configuration");
        Ok(data)
    }
}
