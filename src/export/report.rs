//! レポート生成
//!
//! 1. 要素を1つずつ順番にキャプチャ（失敗は警告してセクションごと省く）
//! 2. ページ構成（common::export::report_core）
//! 3. PDF書き出し（失敗した場合のみエラー）

use super::capture::{ThumbnailSource, VisualSurface};
use super::pdf::render_pdf;
use crate::error::{LocationInsightError, Result};
use location_insight_common::export::{
    compose_report, rendered_listings, report_file_name, CapturedAssets, PageKind, ReportDocument,
};
use location_insight_common::{BusinessListing, MergedAnalysisResult, ReportSnapshot, ReportSpec};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub output_dir: PathBuf,
    /// 表紙に出す生成日時（None なら現在時刻）
    pub generated_at: Option<String>,
}

impl ReportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            generated_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub path: PathBuf,
    pub pages: Vec<PageKind>,
}

/// マージ結果からレポート仕様を組み立てる
pub fn build_report_spec(
    merged: &MergedAnalysisResult,
    listings: Vec<BusinessListing>,
    chart_ids: Vec<String>,
    map_element_id: Option<String>,
) -> ReportSpec {
    let query = &merged.source_query;
    ReportSpec {
        location: query.display_name().to_string(),
        business_type: query.business_type.clone().unwrap_or_default(),
        analysis_snapshot: ReportSnapshot::from_analysis(merged, &listings),
        business_listings: listings,
        captured_visual_element_ids: chart_ids,
        map_element_id,
    }
}

/// 必要な要素を順番にキャプチャする
pub async fn capture_assets(
    spec: &ReportSpec,
    surface: &dyn VisualSurface,
    thumbnails: &dyn ThumbnailSource,
) -> CapturedAssets {
    let mut assets = CapturedAssets::default();
    let mut seen = HashSet::new();

    for element_id in &spec.captured_visual_element_ids {
        if !seen.insert(element_id.as_str()) {
            warn!(element_id = %element_id, "duplicate chart id skipped");
            continue;
        }
        match surface.capture(element_id).await {
            Ok(bitmap) => assets.charts.push((element_id.clone(), bitmap)),
            Err(e) => warn!(element_id = %element_id, error = %e, "chart capture failed, page omitted"),
        }
    }

    if let Some(map_id) = spec.map_element_id.as_deref().filter(|id| !id.trim().is_empty()) {
        match surface.capture(map_id).await {
            Ok(bitmap) => assets.map = Some(bitmap),
            Err(e) => warn!(element_id = map_id, error = %e, "map capture failed, page omitted"),
        }
    }

    for listing in rendered_listings(&spec.business_listings) {
        let thumbnail = match listing.thumbnail.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(reference) => match thumbnails.fetch(reference).await {
                Ok(bitmap) => Some(bitmap),
                Err(e) => {
                    warn!(listing = %listing.name, error = %e, "thumbnail unavailable");
                    None
                }
            },
            None => None,
        };
        assets.thumbnails.push(thumbnail);
    }

    assets
}

/// 存在しないファイル名になるまでミリ秒を進める
pub fn unique_output_path(dir: &Path, location: &str, unix_ms: u128) -> PathBuf {
    let mut stamp = unix_ms;
    loop {
        let candidate = dir.join(report_file_name(location, stamp));
        if !candidate.exists() {
            return candidate;
        }
        stamp += 1;
    }
}

/// 一時ファイルに書いてからリネームする（途中で失敗しても壊れたPDFを残さない）
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| LocationInsightError::ReportGeneration(format!("invalid output path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.part", file_name));

    let result = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// ページ構成のみ（保存しない）
pub async fn compose(
    spec: &ReportSpec,
    surface: &dyn VisualSurface,
    thumbnails: &dyn ThumbnailSource,
    generated_at: &str,
) -> ReportDocument {
    let assets = capture_assets(spec, surface, thumbnails).await;
    compose_report(spec, assets, generated_at)
}

/// レポートPDFを生成して保存する
pub async fn generate_report(
    spec: &ReportSpec,
    surface: &dyn VisualSurface,
    thumbnails: &dyn ThumbnailSource,
    options: &ReportOptions,
) -> Result<GeneratedReport> {
    let now = chrono::Local::now();
    let generated_at = options
        .generated_at
        .clone()
        .unwrap_or_else(|| now.format("%Y-%m-%d %H:%M").to_string());

    let document = compose(spec, surface, thumbnails, &generated_at).await;
    let pages = document.page_kinds();

    let bytes = render_pdf(&document).map_err(|e| LocationInsightError::ReportGeneration(e.to_string()))?;

    let save = || -> Result<PathBuf> {
        std::fs::create_dir_all(&options.output_dir)?;
        let path = unique_output_path(&options.output_dir, &spec.location, now.timestamp_millis().max(0) as u128);
        write_atomically(&path, &bytes)?;
        Ok(path)
    };
    let path = save().map_err(|e| LocationInsightError::ReportGeneration(e.to_string()))?;

    info!(path = %path.display(), pages = pages.len(), "report written");
    Ok(GeneratedReport { path, pages })
}
