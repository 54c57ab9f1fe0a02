//! レポート用ビューモデル
//!
//! 値が無いものは None のまま保持し、描画時に "N/A" とする（推測値は作らない）。

use crate::analyzer::SIGNIFICANT_CHANGE_PCT;
use crate::format::{format_count, format_percent, format_signed_percent};
use crate::layout::KPI_COUNT;
use crate::types::{BusinessListing, DataQuality, MergedAnalysisResult};
use serde::{Deserialize, Serialize};

/// KPIアイコン
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiIcon {
    #[default]
    Score,
    Change,
    Urban,
    Vegetation,
    Competition,
    Population,
    Rent,
    Traffic,
}

impl KpiIcon {
    /// ZapfDingbatsのグリフ
    pub fn glyph(&self) -> char {
        match self {
            KpiIcon::Score => 'H',
            KpiIcon::Change => 'u',
            KpiIcon::Urban => 'n',
            KpiIcon::Vegetation => '`',
            KpiIcon::Competition => 's',
            KpiIcon::Population => 'l',
            KpiIcon::Rent => 'v',
            KpiIcon::Traffic => '4',
        }
    }
}

/// KPIの値の単位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiUnit {
    Percent,
    SignedPercent,
    #[default]
    Score,
    Count,
    Currency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    #[serde(default)]
    pub icon: KpiIcon,
    pub label: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: KpiUnit,
}

impl Kpi {
    pub fn new(icon: KpiIcon, label: impl Into<String>, value: Option<f64>, unit: KpiUnit) -> Self {
        Self {
            icon,
            label: label.into(),
            value,
            unit,
        }
    }

    pub fn formatted_value(&self) -> String {
        let Some(value) = self.value.filter(|v| v.is_finite()) else {
            return "N/A".to_string();
        };
        match self.unit {
            KpiUnit::Percent => format_percent(value),
            KpiUnit::SignedPercent => format_signed_percent(value),
            KpiUnit::Score => format!("{:.0}/100", value),
            KpiUnit::Count => format_count(value.max(0.0).round() as u64),
            KpiUnit::Currency => format!("${}", format_count(value.max(0.0).round() as u64)),
        }
    }
}

/// 横棒グラフ1本
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentBar {
    pub label: String,
    #[serde(default)]
    pub percentage: Option<f64>,
}

/// プロファイル指標（10点満点）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetric {
    pub label: String,
    #[serde(default)]
    pub score: Option<f64>,
}

impl ProfileMetric {
    /// "label: value/10"
    pub fn render(&self) -> String {
        match self.score.filter(|v| v.is_finite()) {
            Some(score) => format!("{}: {:.1}/10", self.label, score.clamp(0.0, 10.0)),
            None => format!("{}: N/A", self.label),
        }
    }
}

/// レポートに渡すスナップショット
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub kpis: Vec<Kpi>,
    #[serde(default)]
    pub demographics: Vec<PercentBar>,
    #[serde(default)]
    pub profile_metrics: Vec<ProfileMetric>,
    #[serde(default)]
    pub merged: Option<MergedAnalysisResult>,
}

impl ReportSnapshot {
    /// マージ済み結果と周辺ビジネスから決定的に導出
    pub fn from_analysis(merged: &MergedAnalysisResult, listings: &[BusinessListing]) -> Self {
        let change = merged.change_detection.as_ref();
        let vegetation = merged.vegetation.as_ref();
        let competitors = listings.len() as f64;

        let area_changed = change
            .map(|c| c.change_percentage)
            .or_else(|| vegetation.map(|v| v.total_change_percentage));

        let built_up_share = vegetation.and_then(|v| {
            (v.total_change_percentage > 0.0)
                .then(|| (v.urban_change_net.max(0.0) / v.total_change_percentage * 100.0).min(100.0))
        });

        let kpis = vec![
            Kpi::new(KpiIcon::Score, "Opportunity score", opportunity_score(merged, listings.len()), KpiUnit::Score),
            Kpi::new(KpiIcon::Change, "Area changed", area_changed, KpiUnit::Percent),
            Kpi::new(KpiIcon::Urban, "Net urban change", vegetation.map(|v| v.urban_change_net), KpiUnit::SignedPercent),
            Kpi::new(KpiIcon::Vegetation, "Net vegetation change", vegetation.map(|v| v.vegetation_change_net), KpiUnit::SignedPercent),
            Kpi::new(KpiIcon::Competition, "Nearby competitors", Some(competitors), KpiUnit::Count),
        ];
        debug_assert_eq!(kpis.len(), KPI_COUNT);

        let demographics = vec![
            PercentBar {
                label: "Area changed".to_string(),
                percentage: area_changed,
            },
            PercentBar {
                label: "Built-up share of change".to_string(),
                percentage: built_up_share,
            },
        ];

        let data_coverage = match merged.data_quality {
            DataQuality::Both => 10.0,
            DataQuality::ChangeOnly | DataQuality::VegetationOnly => 5.0,
            DataQuality::None => 0.0,
        };

        let profile_metrics = vec![
            ProfileMetric {
                label: "Development momentum".to_string(),
                score: vegetation.map(|v| round1((5.0 + v.urban_change_net).clamp(0.0, 10.0))),
            },
            ProfileMetric {
                label: "Green space".to_string(),
                score: vegetation.map(|v| round1((v.ndvi_after_mean * 10.0).clamp(0.0, 10.0))),
            },
            ProfileMetric {
                label: "Market saturation".to_string(),
                score: Some(competitors.min(10.0)),
            },
            ProfileMetric {
                label: "Data coverage".to_string(),
                score: Some(data_coverage),
            },
        ];

        Self {
            overall_score: opportunity_score(merged, listings.len()),
            kpis,
            demographics,
            profile_metrics,
            merged: Some(merged.clone()),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// 0..=100 の総合スコア。解析データが無い場合は None
pub fn opportunity_score(merged: &MergedAnalysisResult, competitor_count: usize) -> Option<f64> {
    if merged.data_quality == DataQuality::None {
        return None;
    }

    let mut score = 50.0;
    if let Some(v) = &merged.vegetation {
        score += (v.urban_change_net * 2.0).clamp(-15.0, 15.0);
        if v.vegetation_change_net >= 0.0 {
            score += 5.0;
        }
    }
    if let Some(c) = &merged.change_detection {
        if c.change_percentage >= SIGNIFICANT_CHANGE_PCT {
            score += 10.0;
        }
    }
    score -= competitor_count.min(10) as f64 * 2.0;

    Some(score.clamp(0.0, 100.0).round())
}
