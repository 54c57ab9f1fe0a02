use crate::error::{LocationInsightError, Result};
use location_insight_common::AnalysisFocus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "LOCATION_INSIGHT_";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";

/// 起動時に一度だけ読み込む設定（以後は不変）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    pub model: String,
    pub zoom_level: u8,
    pub resolution: u32,
    pub alpha: f32,
    pub use_pytorch: bool,
    pub analysis_focus: AnalysisFocus,
    pub maps_api_key: Option<String>,
    pub geocoder_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            timeout_seconds: 30,
            retry_count: 3,
            model: "standard".into(),
            zoom_level: 15,
            resolution: 512,
            alpha: 0.5,
            use_pytorch: false,
            analysis_focus: AnalysisFocus::General,
            maps_api_key: None,
            geocoder_url: DEFAULT_GEOCODER_URL.into(),
        }
    }
}

impl Config {
    /// 設定ファイル → 環境変数の順に読み込み、検証する
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| LocationInsightError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("location-insight").join("config.json"))
    }

    /// `LOCATION_INSIGHT_*` による上書き
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = get("TIMEOUT_SECS") {
            self.timeout_seconds = parse_var("TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("RETRY_COUNT") {
            self.retry_count = parse_var("RETRY_COUNT", &v)?;
        }
        if let Some(v) = get("MODEL") {
            self.model = v;
        }
        if let Some(v) = get("ZOOM_LEVEL") {
            self.zoom_level = parse_var("ZOOM_LEVEL", &v)?;
        }
        if let Some(v) = get("RESOLUTION") {
            self.resolution = parse_var("RESOLUTION", &v)?;
        }
        if let Some(v) = get("ALPHA") {
            self.alpha = parse_var("ALPHA", &v)?;
        }
        if let Some(v) = get("USE_PYTORCH") {
            self.use_pytorch = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = get("ANALYSIS_FOCUS") {
            self.analysis_focus = v
                .parse()
                .map_err(LocationInsightError::Config)?;
        }
        if let Some(v) = get("MAPS_API_KEY") {
            self.maps_api_key = Some(v);
        }
        if let Some(v) = get("GEOCODER_URL") {
            self.geocoder_url = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(LocationInsightError::Config(format!(
                "api_base_url は http:// または https:// で始まる必要があります: {}",
                self.api_base_url
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(LocationInsightError::Config("timeout_seconds は1以上にしてください".into()));
        }
        if !(1..=21).contains(&self.zoom_level) {
            return Err(LocationInsightError::Config(format!(
                "zoom_level は 1..=21 の範囲です: {}",
                self.zoom_level
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(LocationInsightError::Config(format!("alpha は 0.0..=1.0 の範囲です: {}", self.alpha)));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// 末尾スラッシュを除いたベースURL
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        LocationInsightError::Config(format!("{}{} の値が不正です: {}", ENV_PREFIX, name, value))
    })
}
