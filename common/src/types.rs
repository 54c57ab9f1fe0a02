//! 解析結果の型定義
//!
//! CLIとレポート生成で共有される型:
//! - LocationQuery: ユーザー入力（場所 + 業種）
//! - ChangeDetectionRequest / VegetationRequest: バックエンドへのリクエスト
//! - AnalysisOutcome: 各解析の成功/失敗
//! - MergedAnalysisResult: 最終出力（2つの解析をマージ）

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// ============================================
// 入力
// ============================================

/// 解決済みの位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub lat: f64,
    pub lng: f64,
    pub display_name: String,
}

impl ResolvedLocation {
    pub fn new(lat: f64, lng: f64, display_name: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            display_name: display_name.into(),
        }
    }

    /// 緯度経度の範囲チェック
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::InvalidLocation(format!("緯度が範囲外です: {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::InvalidLocation(format!("経度が範囲外です: {}", self.lng)));
        }
        Ok(())
    }

    /// バックエンドに渡す "lat,lng" 形式
    pub fn to_query_string(&self) -> String {
        format!("{:.6},{:.6}", self.lat, self.lng)
    }
}

/// ユーザーの問い合わせ（作成後は不変、新しい問い合わせで置き換える）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    pub raw_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_location: Option<ResolvedLocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
}

impl LocationQuery {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Default::default()
        }
    }

    pub fn with_resolved(mut self, location: ResolvedLocation) -> Self {
        self.resolved_location = Some(location);
        self
    }

    pub fn with_business_type(mut self, business_type: impl Into<String>) -> Self {
        self.business_type = Some(business_type.into());
        self
    }

    /// 解決済みかつ範囲内の位置を返す
    pub fn validated_location(&self) -> Result<&ResolvedLocation> {
        if self.raw_text.trim().is_empty() && self.resolved_location.is_none() {
            return Err(Error::InvalidLocation("場所が入力されていません".into()));
        }
        let location = self.resolved_location.as_ref().ok_or_else(|| {
            Error::InvalidLocation(format!("位置が解決されていません: {}", self.raw_text))
        })?;
        location.validate()?;
        Ok(location)
    }

    /// 表示用の場所名
    pub fn display_name(&self) -> &str {
        match &self.resolved_location {
            Some(loc) if !loc.display_name.trim().is_empty() => &loc.display_name,
            _ => self.raw_text.trim(),
        }
    }
}

/// 植生解析の着目点
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisFocus {
    Vegetation,
    Urban,
    Water,
    #[default]
    General,
}

impl AnalysisFocus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisFocus::Vegetation => "vegetation",
            AnalysisFocus::Urban => "urban",
            AnalysisFocus::Water => "water",
            AnalysisFocus::General => "general",
        }
    }
}

impl std::str::FromStr for AnalysisFocus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vegetation" | "veg" | "green" => Ok(AnalysisFocus::Vegetation),
            "urban" | "city" => Ok(AnalysisFocus::Urban),
            "water" => Ok(AnalysisFocus::Water),
            "general" | "" => Ok(AnalysisFocus::General),
            _ => Err(format!(
                "Unknown focus: {}. Use vegetation, urban, water, or general",
                s
            )),
        }
    }
}

impl std::fmt::Display for AnalysisFocus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// リクエスト
// ============================================

/// POST /detect-change のボディ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDetectionRequest {
    pub location: String,
    pub zoom_level: u8,
    pub resolution: u32,
    pub model_type: String,
    #[serde(rename = "alpha")]
    pub alpha_blend: f32,
    pub use_pytorch: bool,
}

/// POST /analyze/ndvi のボディ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationRequest {
    pub location: String,
    pub zoom_level: u8,
    pub resolution: u32,
    pub analysis_focus: AnalysisFocus,
    pub want_recommendations: bool,
    pub want_visualizations: bool,
}

// ============================================
// 解析結果
// ============================================

/// 解析の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    ChangeDetection,
    Vegetation,
}

impl AnalysisKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::ChangeDetection => "change_detection",
            AnalysisKind::Vegetation => "vegetation",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// 変化検出の画像（base64 PNG）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeImages {
    pub before: Option<String>,
    pub after: Option<String>,
    pub mask: Option<String>,
    pub overlay: Option<String>,
}

/// 変化検出の正規化済みペイロード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetectionPayload {
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub before_date: String,
    #[serde(default)]
    pub after_date: String,
    pub changed_pixels: u64,
    pub total_pixels: u64,
    pub change_percentage: f64,
    #[serde(default)]
    pub images: ChangeImages,
    #[serde(default)]
    pub model_info: Option<String>,
}

/// 植生(NDVI)解析の正規化済みペイロード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegetationPayload {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub timeline_start: String,
    #[serde(default)]
    pub timeline_end: String,
    pub ndvi_before_mean: f64,
    pub ndvi_after_mean: f64,
    pub total_change_percentage: f64,
    #[serde(default)]
    pub dominant_change: String,
    pub vegetation_change_net: f64,
    pub urban_change_net: f64,
    #[serde(default)]
    pub water_change_net: f64,
    #[serde(default)]
    pub change_intensity: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub analysis_focus: AnalysisFocus,
}

impl VegetationPayload {
    pub fn ndvi_delta(&self) -> f64 {
        self.ndvi_after_mean - self.ndvi_before_mean
    }
}

/// 成功した解析のペイロード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum AnalysisPayload {
    ChangeDetection(ChangeDetectionPayload),
    Vegetation(VegetationPayload),
}

impl AnalysisPayload {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisPayload::ChangeDetection(_) => AnalysisKind::ChangeDetection,
            AnalysisPayload::Vegetation(_) => AnalysisKind::Vegetation,
        }
    }
}

/// 1つの解析の結果（成功/失敗）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success { result: AnalysisPayload },
    Failure { kind: AnalysisKind, error_message: String },
}

impl AnalysisOutcome {
    pub fn success(payload: AnalysisPayload) -> Self {
        AnalysisOutcome::Success { result: payload }
    }

    pub fn failure(kind: AnalysisKind, message: impl Into<String>) -> Self {
        AnalysisOutcome::Failure {
            kind,
            error_message: message.into(),
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisOutcome::Success { result } => result.kind(),
            AnalysisOutcome::Failure { kind, .. } => *kind,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success { .. })
    }
}

/// どの解析がマージ結果に寄与したか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataQuality {
    Both,
    ChangeOnly,
    VegetationOnly,
    None,
}

impl DataQuality {
    /// 存在するペイロードから一意に決まる
    pub fn from_presence(has_change: bool, has_vegetation: bool) -> Self {
        match (has_change, has_vegetation) {
            (true, true) => DataQuality::Both,
            (true, false) => DataQuality::ChangeOnly,
            (false, true) => DataQuality::VegetationOnly,
            (false, false) => DataQuality::None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataQuality::Both => "Both analyses",
            DataQuality::ChangeOnly => "Change detection only",
            DataQuality::VegetationOnly => "Vegetation only",
            DataQuality::None => "No data",
        }
    }
}

/// マージ済み解析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedAnalysisResult {
    pub source_query: LocationQuery,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_detection: Option<ChangeDetectionPayload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vegetation: Option<VegetationPayload>,

    pub combined_insights: Vec<String>,
    pub narrative_summary: String,
    pub data_quality: DataQuality,
}

// ============================================
// レポート入力
// ============================================

/// 周辺ビジネス（競合）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessListing {
    pub name: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub rating: Option<f32>,

    #[serde(default)]
    pub distance_km: Option<f64>,

    /// サムネイルのURLまたはファイルパス
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// レポート生成入力（生成直前に構築し、一度だけ使う）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSpec {
    pub location: String,
    pub business_type: String,
    pub analysis_snapshot: crate::snapshot::ReportSnapshot,

    #[serde(default)]
    pub business_listings: Vec<BusinessListing>,

    #[serde(default)]
    pub captured_visual_element_ids: Vec<String>,

    #[serde(default)]
    pub map_element_id: Option<String>,
}
