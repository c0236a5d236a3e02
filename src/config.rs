use crate::error::{BridgeError, Result};
use crate::features::ambilight::AmbilightStyle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load `KEY=value` pairs from a `.env` file in the working directory.
/// Variables already present in the environment are left alone.
pub fn load_dotenv() {
    let Ok(content) = fs::read_to_string(".env") else {
        return;
    };

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');

        if std::env::var_os(key).is_none() {
            // SAFETY: called from main before the runtime starts any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Default location of the JSON configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ambilight-tv-bridge")
        .join("config.json")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tv: TvConfig,
    pub wake: WakeConfig,
    pub cache: CacheConfig,
    pub notify: NotifyConfig,
    pub ambilight: AmbilightConfig,
    /// Remote key remap, abstract key name to device key string.
    pub keys: HashMap<String, String>,
    /// Seconds between background refreshes; 0 disables the poller.
    pub auto_refresh_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TvConfig {
    /// Base URL including the API version, e.g. `https://10.0.0.20:1926/6/`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    pub mac_address: Option<String>,
    pub from_ip: Option<String>,
    pub port: u16,
    pub broadcast_address: String,
    pub num_packets: u32,
    pub interval_ms: u64,
    pub warm_up_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub power_ttl_ms: u64,
    pub screen_ttl_ms: u64,
    pub volume_ttl_ms: u64,
    pub ambilight_ttl_ms: u64,
}

/// Delay between a write and the resynchronisation of its dependants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub power_delay_ms: u64,
    pub screen_delay_ms: u64,
    pub volume_delay_ms: u64,
    pub ambilight_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbilightConfig {
    pub default_style_screen_on: Option<AmbilightStyle>,
    pub default_style_screen_off: Option<AmbilightStyle>,
    pub always_use_default_screen_on: bool,
    pub always_use_default_screen_off: bool,
    pub color_debounce_ms: u64,
}

impl Default for TvConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: None,
            password: None,
            timeout_ms: 3000,
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            mac_address: None,
            from_ip: None,
            port: 9,
            broadcast_address: "255.255.255.255".to_string(),
            num_packets: 3,
            interval_ms: 100,
            warm_up_ms: 5000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            power_ttl_ms: 2000,
            screen_ttl_ms: 2000,
            volume_ttl_ms: 2000,
            ambilight_ttl_ms: 2000,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            power_delay_ms: 1500,
            screen_delay_ms: 500,
            volume_delay_ms: 500,
            ambilight_delay_ms: 2500,
        }
    }
}

impl Default for AmbilightConfig {
    fn default() -> Self {
        Self {
            default_style_screen_on: None,
            default_style_screen_off: None,
            always_use_default_screen_on: false,
            always_use_default_screen_off: false,
            color_debounce_ms: 50,
        }
    }
}

impl WakeConfig {
    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.warm_up_ms)
    }
}

impl Config {
    /// Read the JSON file at `path` (missing file means defaults), then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        } else {
            log::info!(
                "No config file at {}, using defaults and environment",
                path.display()
            );
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("TV_BASE_URL") {
            self.tv.base_url = url;
        }
        if let Ok(username) = std::env::var("TV_USERNAME") {
            self.tv.username = Some(username);
        }
        if let Ok(password) = std::env::var("TV_PASSWORD") {
            self.tv.password = Some(password);
        }
        if let Ok(timeout) = std::env::var("TV_TIMEOUT_MS")
            && let Ok(t) = timeout.parse()
        {
            self.tv.timeout_ms = t;
        }
        if let Ok(mac) = std::env::var("TV_MAC_ADDRESS") {
            self.wake.mac_address = Some(mac);
        }
        if let Ok(secs) = std::env::var("TV_AUTO_REFRESH_SECS")
            && let Ok(s) = secs.parse()
        {
            self.auto_refresh_secs = Some(s);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tv.base_url.trim().is_empty() {
            return Err(BridgeError::Config(
                "tv.base_url is required (or set TV_BASE_URL)".to_string(),
            ));
        }
        if self.tv.username.is_some() != self.tv.password.is_some() {
            return Err(BridgeError::Config(
                "tv.username and tv.password must be given together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        match self.auto_refresh_secs.unwrap_or(10) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
