//! 解析マージロジック（CLI/レポート共通）
//!
//! 変化検出とNDVI植生解析の2つの結果を1つの MergedAnalysisResult にまとめる。
//! 入力が同じなら結果は常に同じ（どちらが先に完了したかに依存しない）。

use crate::format::{
    format_count, format_ndvi, format_percent, format_signed_ndvi, format_signed_percent,
};
use crate::types::{
    AnalysisKind, AnalysisOutcome, AnalysisPayload, ChangeDetectionPayload, DataQuality,
    LocationQuery, MergedAnalysisResult, VegetationPayload,
};
use std::collections::HashSet;

/// combined_insights の上限
pub const MAX_COMBINED_INSIGHTS: usize = 5;
/// 植生解析の推奨事項から採用する件数
pub const MAX_RECOMMENDATIONS: usize = 3;
/// 合成インサイトの最大件数
pub const MAX_SYNTHESIZED: usize = 2;
/// 「有意な変化」とみなす変化率（%）
pub const SIGNIFICANT_CHANGE_PCT: f64 = 5.0;
/// 「有意な純変化」とみなす差分（%）
pub const SIGNIFICANT_NET_PCT: f64 = 1.0;

/// 両方失敗時の唯一のインサイト
pub const FALLBACK_INSIGHT: &str =
    "Analysis data is currently unavailable for this location. Please retry shortly.";

/// 2つの結果をマージ（引数の順序は結果に影響しない）
pub fn combine(
    query: &LocationQuery,
    first: &AnalysisOutcome,
    second: &AnalysisOutcome,
) -> MergedAnalysisResult {
    combine_outcomes(query, &[first.clone(), second.clone()])
}

/// 任意個の結果をマージ。種類ごとに最初の成功を採用し、欠けている種類は失敗扱い。
pub fn combine_outcomes(query: &LocationQuery, outcomes: &[AnalysisOutcome]) -> MergedAnalysisResult {
    let mut change: Option<&ChangeDetectionPayload> = None;
    let mut vegetation: Option<&VegetationPayload> = None;

    for outcome in outcomes {
        if let AnalysisOutcome::Success { result } = outcome {
            match result {
                AnalysisPayload::ChangeDetection(p) if change.is_none() => change = Some(p),
                AnalysisPayload::Vegetation(p) if vegetation.is_none() => vegetation = Some(p),
                _ => {}
            }
        }
    }

    let data_quality = DataQuality::from_presence(change.is_some(), vegetation.is_some());
    let name = location_name(query);

    let (insights, narrative_summary) = match (change, vegetation) {
        (Some(c), Some(v)) => {
            let mut insights = recommendations(v);
            insights.extend(cross_insights(c, v));
            (insights, narrative_both(&name, c, v))
        }
        (Some(c), None) => (change_insights(c), narrative_change_only(&name, c)),
        (None, Some(v)) => {
            let mut insights = recommendations(v);
            insights.extend(vegetation_insights(v));
            (insights, narrative_vegetation_only(&name, v))
        }
        (None, None) => (vec![FALLBACK_INSIGHT.to_string()], narrative_none(&name)),
    };

    MergedAnalysisResult {
        source_query: query.clone(),
        change_detection: change.cloned(),
        vegetation: vegetation.cloned(),
        combined_insights: dedup_and_cap(insights, MAX_COMBINED_INSIGHTS),
        narrative_summary,
        data_quality,
    }
}

/// 大文字小文字・前後空白を無視して重複除去し、先頭から max 件
pub fn dedup_and_cap(insights: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    insights
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(max)
        .collect()
}

fn location_name(query: &LocationQuery) -> String {
    let name = query.display_name();
    if name.is_empty() {
        "this location".to_string()
    } else {
        name.to_string()
    }
}

fn recommendations(v: &VegetationPayload) -> Vec<String> {
    dedup_and_cap(v.recommendations.clone(), MAX_RECOMMENDATIONS)
}

// ============================================
// 方向シグナル
// ============================================

fn change_is_significant(c: &ChangeDetectionPayload) -> bool {
    c.change_percentage >= SIGNIFICANT_CHANGE_PCT
}

fn vegetation_is_significant(v: &VegetationPayload) -> bool {
    v.total_change_percentage >= SIGNIFICANT_CHANGE_PCT
        || v.urban_change_net.abs() >= SIGNIFICANT_NET_PCT
}

/// 変化率の段階
pub fn change_intensity_label(change_percentage: f64) -> &'static str {
    if change_percentage < 2.0 {
        "minimal"
    } else if change_percentage < SIGNIFICANT_CHANGE_PCT {
        "low"
    } else if change_percentage < 15.0 {
        "moderate"
    } else {
        "high"
    }
}

/// "urban_expansion" → "urban expansion"
fn humanize_token(value: &str, fallback: &str) -> String {
    let cleaned = value.replace(['_', '-'], " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_lowercase()
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value.trim()
    }
}

// ============================================
// インサイト合成
// ============================================

fn cross_insights(c: &ChangeDetectionPayload, v: &VegetationPayload) -> Vec<String> {
    let mut out = Vec::new();

    let change_sig = change_is_significant(c);
    let veg_sig = vegetation_is_significant(v);
    let statement = match (change_sig, veg_sig) {
        (true, true) => format!(
            "Change detection ({} of pixels changed) and NDVI analysis (net urban change {}) both indicate active land-use change, so the signal is corroborated.",
            format_percent(c.change_percentage),
            format_signed_percent(v.urban_change_net)
        ),
        (false, false) => format!(
            "Both analyses indicate a stable landscape ({} pixel change, {} total land-cover change).",
            format_percent(c.change_percentage),
            format_percent(v.total_change_percentage)
        ),
        _ => format!(
            "Change detection and NDVI analysis disagree on the extent of change ({} vs {}); treat the change estimate with caution.",
            format_percent(c.change_percentage),
            format_percent(v.total_change_percentage)
        ),
    };
    out.push(statement);

    // 表示上 0.0% になる純変化は傾向として扱わない
    if change_sig && (v.vegetation_change_net * 10.0).round() != 0.0 {
        let trend = if v.vegetation_change_net < 0.0 {
            format!(
                "Vegetation loss of {} alongside {} pixel-level change suggests new development replacing green cover.",
                format_signed_percent(v.vegetation_change_net),
                format_percent(c.change_percentage)
            )
        } else {
            format!(
                "Vegetation gain of {} alongside {} pixel-level change suggests landscaping or greening activity.",
                format_signed_percent(v.vegetation_change_net),
                format_percent(c.change_percentage)
            )
        };
        out.push(trend);
    }

    out.truncate(MAX_SYNTHESIZED);
    out
}

fn change_insights(c: &ChangeDetectionPayload) -> Vec<String> {
    let mut out = vec![format!(
        "Change detection found {} change: {} of the analysed area ({} of {} pixels) differs between captures.",
        change_intensity_label(c.change_percentage),
        format_percent(c.change_percentage),
        format_count(c.changed_pixels),
        format_count(c.total_pixels)
    )];
    if change_is_significant(c) {
        out.push(
            "Significant surface change suggests ongoing construction or land-use conversion nearby."
                .to_string(),
        );
    } else {
        out.push(
            "The surrounding area appears stable, which points to an established neighbourhood."
                .to_string(),
        );
    }
    out.truncate(MAX_SYNTHESIZED);
    out
}

fn vegetation_insights(v: &VegetationPayload) -> Vec<String> {
    let mut out = vec![format!(
        "NDVI analysis shows {} as the dominant change with {} intensity (net vegetation {}, net urban {}).",
        humanize_token(&v.dominant_change, "no single trend"),
        humanize_token(&v.change_intensity, "unspecified"),
        format_signed_percent(v.vegetation_change_net),
        format_signed_percent(v.urban_change_net)
    )];
    if v.urban_change_net >= SIGNIFICANT_NET_PCT {
        out.push(format!(
            "Urban expansion of {} indicates growing development activity in the area.",
            format_signed_percent(v.urban_change_net)
        ));
    } else if v.vegetation_change_net <= -SIGNIFICANT_NET_PCT {
        out.push(format!(
            "Vegetation decline of {} may reduce local green amenities.",
            format_signed_percent(v.vegetation_change_net)
        ));
    }
    out.truncate(MAX_SYNTHESIZED);
    out
}

// ============================================
// ナラティブ（テンプレート）
// ============================================

fn change_paragraph(c: &ChangeDetectionPayload) -> String {
    format!(
        "Satellite change detection comparing {} and {} found that {} of the analysed area changed ({} of {} pixels), which is {} change.",
        or_default(&c.before_date, "the earlier capture"),
        or_default(&c.after_date, "the latest capture"),
        format_percent(c.change_percentage),
        format_count(c.changed_pixels),
        format_count(c.total_pixels),
        change_intensity_label(c.change_percentage)
    )
}

fn vegetation_paragraph(v: &VegetationPayload) -> String {
    format!(
        "NDVI vegetation analysis ({} to {}) reports a net vegetation change of {}, a net urban change of {} and a net water change of {}, with total change of {}. Mean NDVI moved from {} to {} ({}). Dominant change: {}; intensity: {}.",
        or_default(&v.timeline_start, "start"),
        or_default(&v.timeline_end, "present"),
        format_signed_percent(v.vegetation_change_net),
        format_signed_percent(v.urban_change_net),
        format_signed_percent(v.water_change_net),
        format_percent(v.total_change_percentage),
        format_ndvi(v.ndvi_before_mean),
        format_ndvi(v.ndvi_after_mean),
        format_signed_ndvi(v.ndvi_delta()),
        humanize_token(&v.dominant_change, "unspecified"),
        humanize_token(&v.change_intensity, "unspecified")
    )
}

fn narrative_both(name: &str, c: &ChangeDetectionPayload, v: &VegetationPayload) -> String {
    let agreement = if change_is_significant(c) == vegetation_is_significant(v) {
        "Both analyses point in the same direction, which increases confidence in these figures."
    } else {
        "The two analyses disagree on the extent of change, so these figures should be verified on site."
    };
    [
        format!("Location analysis for {}.", name),
        change_paragraph(c),
        vegetation_paragraph(v),
        agreement.to_string(),
    ]
    .join("\n\n")
}

fn narrative_change_only(name: &str, c: &ChangeDetectionPayload) -> String {
    [
        format!("Location analysis for {}.", name),
        change_paragraph(c),
        "The complementary land-cover analysis was unavailable for this query, so these figures reflect pixel-level change only.".to_string(),
    ]
    .join("\n\n")
}

fn narrative_vegetation_only(name: &str, v: &VegetationPayload) -> String {
    [
        format!("Location analysis for {}.", name),
        vegetation_paragraph(v),
        "Satellite change detection was unavailable for this query, so pixel-level change statistics are not included.".to_string(),
    ]
    .join("\n\n")
}

fn narrative_none(name: &str) -> String {
    [
        format!("We're sorry, but we couldn't complete the analysis for {}.", name),
        "Likely causes:\n- a network problem between this application and the analysis service\n- an invalid or unrecognised location\n- the analysis backend being temporarily unavailable".to_string(),
        "Please try again in a moment, or try a query such as \"Austin, TX\", \"40.7128,-74.0060\" or \"Shibuya, Tokyo\".".to_string(),
    ]
    .join("\n\n")
}

/// 失敗した解析の種類を列挙（ログ用）
pub fn failed_kinds<'a>(outcomes: impl IntoIterator<Item = &'a AnalysisOutcome>) -> Vec<AnalysisKind> {
    let mut kinds: Vec<AnalysisKind> = outcomes
        .into_iter()
        .filter(|o| !o.is_success())
        .map(|o| o.kind())
        .collect();
    kinds.sort();
    kinds.dedup();
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolvedLocation;
    use regex::Regex;

    fn query() -> LocationQuery {
        LocationQuery::new("Austin")
            .with_resolved(ResolvedLocation::new(30.2672, -97.7431, "Austin, TX"))
            .with_business_type("cafe")
    }

    fn change_ok(pct: f64) -> AnalysisOutcome {
        AnalysisOutcome::success(AnalysisPayload::ChangeDetection(ChangeDetectionPayload {
            before_date: "2019-06-01".into(),
            after_date: "2024-06-01".into(),
            changed_pixels: 32768,
            total_pixels: 262144,
            change_percentage: pct,
            ..Default::default()
        }))
    }

    fn vegetation_ok() -> AnalysisOutcome {
        AnalysisOutcome::success(AnalysisPayload::Vegetation(VegetationPayload {
            ndvi_before_mean: 0.412,
            ndvi_after_mean: 0.398,
            total_change_percentage: 12.5,
            dominant_change: "urban_expansion".into(),
            vegetation_change_net: -2.5,
            urban_change_net: 3.0,
            water_change_net: 0.0,
            change_intensity: "moderate".into(),
            recommendations: vec![
                "Monitor nearby construction permits".into(),
                "monitor nearby construction permits ".into(),
                "Consider outdoor seating near parks".into(),
                "Review parking availability".into(),
                "Track rent changes".into(),
            ],
            ..Default::default()
        }))
    }

    fn change_failed() -> AnalysisOutcome {
        AnalysisOutcome::failure(AnalysisKind::ChangeDetection, "timeout")
    }

    fn vegetation_failed() -> AnalysisOutcome {
        AnalysisOutcome::failure(AnalysisKind::Vegetation, "502 Bad Gateway")
    }

    #[test]
    fn test_scenario_both_succeed() {
        let merged = combine(&query(), &change_ok(12.5), &vegetation_ok());
        assert_eq!(merged.data_quality, DataQuality::Both);
        assert!(merged.narrative_summary.contains("-2.5%"));
        assert!(merged.narrative_summary.contains("+3.0%"));
        assert!(merged.narrative_summary.contains("12.5%"));
        assert!(merged.narrative_summary.contains("0.412"));
        assert!(merged.narrative_summary.contains("0.398"));
        assert!(merged.narrative_summary.contains("-0.014"));
        assert!(merged.change_detection.is_some());
        assert!(merged.vegetation.is_some());
    }

    #[test]
    fn test_both_insights_recommendations_first_then_synthesized() {
        let merged = combine(&query(), &change_ok(12.5), &vegetation_ok());
        let insights = &merged.combined_insights;
        // 重複推奨は除去、推奨は3件まで
        assert_eq!(insights[0], "Monitor nearby construction permits");
        assert_eq!(insights[1], "Consider outdoor seating near parks");
        assert_eq!(insights[2], "Review parking availability");
        assert!(insights[3].contains("corroborated"));
        assert!(insights[4].starts_with("Vegetation loss of -2.5%"));
        assert_eq!(insights.len(), MAX_COMBINED_INSIGHTS);
    }

    #[test]
    fn test_both_disagreement_emits_caveat() {
        let merged = combine(&query(), &change_ok(1.0), &vegetation_ok());
        assert!(merged
            .combined_insights
            .iter()
            .any(|s| s.contains("treat the change estimate with caution")));
        assert!(merged.narrative_summary.contains("verified on site"));
    }

    #[test]
    fn test_combine_is_order_independent() {
        let a = combine(&query(), &change_ok(12.5), &vegetation_ok());
        let b = combine(&query(), &vegetation_ok(), &change_ok(12.5));
        assert_eq!(a, b);

        let c = combine(&query(), &change_failed(), &vegetation_ok());
        let d = combine(&query(), &vegetation_ok(), &change_failed());
        assert_eq!(c, d);
    }

    #[test]
    fn test_combine_is_idempotent() {
        let first = combine(&query(), &change_ok(7.0), &vegetation_failed());
        let second = combine(&query(), &change_ok(7.0), &vegetation_failed());
        assert_eq!(first, second);
    }

    #[test]
    fn test_scenario_vegetation_fails() {
        let merged = combine(&query(), &change_ok(12.5), &vegetation_failed());
        assert_eq!(merged.data_quality, DataQuality::ChangeOnly);
        assert!(!merged.combined_insights.is_empty());
        assert!(merged.combined_insights[0].starts_with("Change detection found"));
        let lower = merged.narrative_summary.to_lowercase();
        assert!(!lower.contains("vegetation"));
        assert!(!lower.contains("ndvi"));
        for insight in &merged.combined_insights {
            assert!(!insight.to_lowercase().contains("vegetation"));
        }
    }

    #[test]
    fn test_vegetation_only() {
        let merged = combine(&query(), &change_failed(), &vegetation_ok());
        assert_eq!(merged.data_quality, DataQuality::VegetationOnly);
        assert!(merged.change_detection.is_none());
        assert_eq!(merged.combined_insights[0], "Monitor nearby construction permits");
        assert!(merged.combined_insights.iter().any(|s| s.starts_with("NDVI analysis shows urban expansion")));
        assert!(merged.narrative_summary.contains("pixel-level change statistics are not included"));
    }

    #[test]
    fn test_vegetation_only_without_recommendations_still_has_insight() {
        let outcome = AnalysisOutcome::success(AnalysisPayload::Vegetation(VegetationPayload::default()));
        let merged = combine(&query(), &change_failed(), &outcome);
        assert_eq!(merged.data_quality, DataQuality::VegetationOnly);
        assert!(!merged.combined_insights.is_empty());
    }

    #[test]
    fn test_scenario_both_fail() {
        let merged = combine(&query(), &change_failed(), &vegetation_failed());
        assert_eq!(merged.data_quality, DataQuality::None);
        assert_eq!(merged.combined_insights, vec![FALLBACK_INSIGHT.to_string()]);
        assert!(merged.narrative_summary.contains("network"));
        assert!(merged.narrative_summary.contains("invalid"));
        assert!(merged.narrative_summary.contains("backend"));
        assert!(merged.narrative_summary.contains("Austin, TX"));
    }

    #[test]
    fn test_totality_over_all_outcome_pairs() {
        let changes = [change_ok(0.0), change_ok(50.0), change_failed()];
        let vegetations = [vegetation_ok(), vegetation_failed()];
        for c in &changes {
            for v in &vegetations {
                let merged = combine(&query(), c, v);
                let expected =
                    DataQuality::from_presence(c.is_success(), v.is_success());
                assert_eq!(merged.data_quality, expected);
                if merged.data_quality != DataQuality::None {
                    assert!(!merged.combined_insights.is_empty());
                }
                assert!(merged.combined_insights.len() <= MAX_COMBINED_INSIGHTS);
            }
        }
    }

    #[test]
    fn test_percentages_have_one_decimal() {
        let pattern = Regex::new(r"[+-]?\d+(\.\d+)?%").unwrap();
        let strict = Regex::new(r"^[+-]?\d+\.\d%$").unwrap();
        let outcomes = [
            (change_ok(12.345), vegetation_ok()),
            (change_ok(0.04), vegetation_failed()),
            (change_failed(), vegetation_ok()),
        ];
        for (c, v) in &outcomes {
            let merged = combine(&query(), c, v);
            for m in pattern.find_iter(&merged.narrative_summary) {
                assert!(strict.is_match(m.as_str()), "bad percent: {}", m.as_str());
            }
        }
    }

    #[test]
    fn test_duplicate_kind_first_success_wins() {
        let merged = combine_outcomes(
            &query(),
            &[change_failed(), change_ok(3.0), change_ok(40.0)],
        );
        assert_eq!(merged.data_quality, DataQuality::ChangeOnly);
        assert!((merged.change_detection.unwrap().change_percentage - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_negligible_vegetation_net_has_no_trend_statement() {
        for net in [0.04, -0.04, 0.0, -0.0] {
            let vegetation = AnalysisOutcome::success(AnalysisPayload::Vegetation(VegetationPayload {
                vegetation_change_net: net,
                urban_change_net: 3.0,
                total_change_percentage: 12.5,
                ..Default::default()
            }));
            let merged = combine(&query(), &change_ok(12.5), &vegetation);
            assert!(
                !merged.combined_insights.iter().any(|s| s.starts_with("Vegetation")),
                "net {} should not produce a trend statement",
                net
            );
        }

        let vegetation = AnalysisOutcome::success(AnalysisPayload::Vegetation(VegetationPayload {
            vegetation_change_net: 0.05,
            urban_change_net: 3.0,
            total_change_percentage: 12.5,
            ..Default::default()
        }));
        let merged = combine(&query(), &change_ok(12.5), &vegetation);
        assert!(merged.combined_insights.iter().any(|s| s.starts_with("Vegetation gain of +0.1%")));
    }

    #[test]
    fn test_failed_kinds() {
        let kinds = failed_kinds(&[vegetation_failed(), change_ok(1.0), vegetation_failed()]);
        assert_eq!(kinds, vec![AnalysisKind::Vegetation]);
    }
}
